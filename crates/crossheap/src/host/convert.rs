//! Conversions between [`JsValue`] and native Rust types
//!
//! Failures here are local coercion errors; nothing is thrown across the
//! boundary unless a conversion has to ask the script for a rendering.

use crate::error::{BridgeError, Result};
use crate::tag::TypeTag;

use super::reference::HostRef;
use super::runtime::HostRuntime;
use super::value::JsValue;

/// Extract a native value from a [`JsValue`].
pub trait FromJs: Sized {
    /// Convert, or fail with a coercion error
    fn from_js(runtime: &HostRuntime, value: &JsValue) -> Result<Self>;
}

/// Turn a native value into a [`JsValue`], creating script values as needed.
pub trait IntoJs {
    /// Convert, allocating script-side values if required
    fn into_js(self, runtime: &HostRuntime) -> Result<JsValue>;
}

fn reject<T>(value: &JsValue, to: &'static str) -> Result<T> {
    if value.is_null_like() {
        Err(BridgeError::NullValue { to })
    } else {
        Err(BridgeError::coercion(value.tag(), to))
    }
}

impl FromJs for JsValue {
    fn from_js(_: &HostRuntime, value: &JsValue) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromJs for f64 {
    fn from_js(runtime: &HostRuntime, value: &JsValue) -> Result<Self> {
        match value {
            JsValue::Number(n) => Ok(*n),
            JsValue::Ref(reference) if reference.tag() == TypeTag::BigInt => runtime.to_number(value),
            other => reject(other, "f64"),
        }
    }
}

impl FromJs for i32 {
    fn from_js(runtime: &HostRuntime, value: &JsValue) -> Result<Self> {
        let n = f64::from_js(runtime, value).or_else(|_| reject(value, "i32"))?;
        let in_range = n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX);
        if !in_range || n.fract() != 0.0 {
            return Err(BridgeError::coercion(TypeTag::Number, "i32"));
        }
        Ok(n as i32)
    }
}

impl FromJs for i128 {
    fn from_js(runtime: &HostRuntime, value: &JsValue) -> Result<Self> {
        runtime.bigint_value(value)
    }
}

impl FromJs for bool {
    fn from_js(_: &HostRuntime, value: &JsValue) -> Result<Self> {
        match value {
            JsValue::Bool(b) => Ok(*b),
            other => reject(other, "bool"),
        }
    }
}

impl FromJs for String {
    fn from_js(runtime: &HostRuntime, value: &JsValue) -> Result<Self> {
        match value {
            JsValue::Ref(reference) if reference.tag() == TypeTag::String => {
                runtime.to_js_string(value)
            }
            other => reject(other, "String"),
        }
    }
}

impl FromJs for HostRef {
    fn from_js(_: &HostRuntime, value: &JsValue) -> Result<Self> {
        match value {
            JsValue::Ref(reference) => Ok(reference.clone()),
            other => reject(other, "HostRef"),
        }
    }
}

impl<T: FromJs> FromJs for Option<T> {
    fn from_js(runtime: &HostRuntime, value: &JsValue) -> Result<Self> {
        if value.is_null_like() {
            return Ok(None);
        }
        T::from_js(runtime, value).map(Some)
    }
}

impl<T: FromJs> FromJs for Vec<T> {
    fn from_js(runtime: &HostRuntime, value: &JsValue) -> Result<Self> {
        match value.tag() {
            TypeTag::Array | TypeTag::TypedArray | TypeTag::SharedTypedArray => runtime
                .array_to_vec(value)?
                .iter()
                .map(|item| T::from_js(runtime, item))
                .collect(),
            _ => reject(value, "Vec"),
        }
    }
}

impl IntoJs for JsValue {
    fn into_js(self, _: &HostRuntime) -> Result<JsValue> {
        Ok(self)
    }
}

impl IntoJs for HostRef {
    fn into_js(self, _: &HostRuntime) -> Result<JsValue> {
        Ok(JsValue::Ref(self))
    }
}

impl IntoJs for () {
    fn into_js(self, _: &HostRuntime) -> Result<JsValue> {
        Ok(JsValue::Undefined)
    }
}

impl IntoJs for bool {
    fn into_js(self, _: &HostRuntime) -> Result<JsValue> {
        Ok(JsValue::Bool(self))
    }
}

impl IntoJs for f64 {
    fn into_js(self, _: &HostRuntime) -> Result<JsValue> {
        Ok(JsValue::Number(self))
    }
}

impl IntoJs for i32 {
    fn into_js(self, _: &HostRuntime) -> Result<JsValue> {
        Ok(JsValue::Number(f64::from(self)))
    }
}

impl IntoJs for i128 {
    fn into_js(self, runtime: &HostRuntime) -> Result<JsValue> {
        runtime.create_bigint(self)
    }
}

impl IntoJs for &str {
    fn into_js(self, runtime: &HostRuntime) -> Result<JsValue> {
        runtime.create_string(self).map(JsValue::Ref)
    }
}

impl IntoJs for String {
    fn into_js(self, runtime: &HostRuntime) -> Result<JsValue> {
        self.as_str().into_js(runtime)
    }
}

impl<T: IntoJs> IntoJs for Option<T> {
    fn into_js(self, runtime: &HostRuntime) -> Result<JsValue> {
        match self {
            Some(value) => value.into_js(runtime),
            None => Ok(JsValue::Null),
        }
    }
}

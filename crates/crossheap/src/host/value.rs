//! Decoded host-side values

use std::fmt;

use crate::tag::TypeTag;
use crate::wire::WireValue;

use super::reference::HostRef;

/// A value as the host sees it: one of the four value kinds, or a
/// reference to something living in the script heap.
///
/// Equality is SameValue: numbers compare bitwise except that every NaN
/// equals every NaN, and references compare by wrapper identity.
#[derive(Clone, Default)]
pub enum JsValue {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Double
    Number(f64),
    /// Any reference kind
    Ref(HostRef),
}

impl JsValue {
    /// Kind of this value
    pub fn tag(&self) -> TypeTag {
        match self {
            JsValue::Undefined => TypeTag::Undefined,
            JsValue::Null => TypeTag::Null,
            JsValue::Bool(_) => TypeTag::Bool,
            JsValue::Number(_) => TypeTag::Number,
            JsValue::Ref(reference) => reference.tag(),
        }
    }

    /// Encode for the wire
    pub fn to_wire(&self) -> WireValue {
        match self {
            JsValue::Undefined => WireValue::UNDEFINED,
            JsValue::Null => WireValue::NULL,
            JsValue::Bool(b) => WireValue::boolean(*b),
            JsValue::Number(n) => WireValue::number(*n),
            JsValue::Ref(reference) => reference.to_wire(),
        }
    }

    /// The wrapper, for reference kinds
    pub fn as_host_ref(&self) -> Option<&HostRef> {
        match self {
            JsValue::Ref(reference) => Some(reference),
            _ => None,
        }
    }

    /// Whether this is `undefined`
    pub fn is_undefined(&self) -> bool {
        matches!(self, JsValue::Undefined)
    }

    /// Whether this is `null` or `undefined`
    pub fn is_null_like(&self) -> bool {
        matches!(self, JsValue::Undefined | JsValue::Null)
    }
}

impl PartialEq for JsValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JsValue::Undefined, JsValue::Undefined) | (JsValue::Null, JsValue::Null) => true,
            (JsValue::Bool(a), JsValue::Bool(b)) => a == b,
            (JsValue::Number(a), JsValue::Number(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (JsValue::Ref(a), JsValue::Ref(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsValue::Undefined => write!(f, "undefined"),
            JsValue::Null => write!(f, "null"),
            JsValue::Bool(b) => write!(f, "{}", b),
            JsValue::Number(n) => write!(f, "{}", n),
            JsValue::Ref(reference) => write!(f, "{:?}", reference),
        }
    }
}

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        JsValue::Bool(b)
    }
}

impl From<f64> for JsValue {
    fn from(n: f64) -> Self {
        JsValue::Number(n)
    }
}

impl From<i32> for JsValue {
    fn from(n: i32) -> Self {
        JsValue::Number(f64::from(n))
    }
}

impl From<HostRef> for JsValue {
    fn from(reference: HostRef) -> Self {
        JsValue::Ref(reference)
    }
}

impl From<&HostRef> for JsValue {
    fn from(reference: &HostRef) -> Self {
        JsValue::Ref(reference.clone())
    }
}

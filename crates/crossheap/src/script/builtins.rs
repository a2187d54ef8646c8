//! Global bindings installed into every script runtime

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::ScriptError;

use super::ops;
use super::value::{Function, NativeFn, ObjectRef, PropertyKey, ScriptValue};

/// Function bodies the engine can "compile", keyed by source text.
pub(crate) type SourceTable = Rc<RefCell<HashMap<String, NativeFn>>>;

pub(crate) fn install(global: &ObjectRef, sources: SourceTable) {
    let mut object = global.borrow_mut();
    let mut define = |name: &str, value: ScriptValue| {
        object.properties.insert(PropertyKey::string(name), value);
    };

    define("BigInt", ScriptValue::native_fn("BigInt", |_, args| {
        to_bigint(args.first().unwrap_or(&ScriptValue::Undefined)).map(ScriptValue::BigInt)
    }));

    define("Symbol", ScriptValue::native_fn("Symbol", |_, args| {
        let description = match args.first() {
            None | Some(ScriptValue::Undefined) => None,
            Some(value) => Some(ops::to_display_string(value)),
        };
        Ok(ScriptValue::symbol(description.as_deref()))
    }));

    define("Object", ScriptValue::native_constructor("Object", |_, _| {
        Ok(ScriptValue::object())
    }));

    define("Array", ScriptValue::native_constructor("Array", |_, args| {
        Ok(ScriptValue::array(args.to_vec()))
    }));

    define("Function", ScriptValue::native_constructor("Function", move |_, args| {
        let body = args.last().map(ops::to_display_string).unwrap_or_default();
        let call = sources.borrow().get(&body).cloned().ok_or_else(|| {
            ScriptError::new(format!("SyntaxError: cannot compile function body {:?}", body))
        })?;
        Ok(ScriptValue::Object(ObjectRef::function(Function {
            name: "anonymous".to_owned(),
            call,
            constructible: true,
        })))
    }));
}

fn to_bigint(value: &ScriptValue) -> Result<i128, ScriptError> {
    match value {
        ScriptValue::BigInt(n) => Ok(*n),
        ScriptValue::Bool(b) => Ok(i128::from(*b)),
        ScriptValue::Number(n) => {
            if n.fract() != 0.0 || !n.is_finite() {
                return Err(ScriptError::RangeError(format!(
                    "The number {} cannot be converted to a BigInt because it is not an integer",
                    ops::number_to_string(*n)
                )));
            }
            Ok(*n as i128)
        }
        ScriptValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(0);
            }
            trimmed
                .parse()
                .map_err(|_| ScriptError::new(format!("SyntaxError: Cannot convert {} to a BigInt", s)))
        }
        other => Err(ScriptError::type_error(format!(
            "Cannot convert {} to a BigInt",
            ops::to_display_string(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global() -> ObjectRef {
        let global = ObjectRef::plain();
        install(&global, SourceTable::default());
        global
    }

    #[test]
    fn test_bigint_from_text_and_number() {
        let global = ScriptValue::Object(global());
        let key = PropertyKey::from("BigInt");
        let big = ops::invoke_method(&global, &key, &[ScriptValue::string("-170141183460469231731687303715884105728")]);
        assert!(matches!(big, Ok(ScriptValue::BigInt(i128::MIN))));
        let big = ops::invoke_method(&global, &key, &[ScriptValue::Number(12.0)]);
        assert!(matches!(big, Ok(ScriptValue::BigInt(12))));
        assert!(ops::invoke_method(&global, &key, &[ScriptValue::Number(1.5)]).is_err());
        assert!(ops::invoke_method(&global, &key, &[ScriptValue::string("x")]).is_err());
    }

    #[test]
    fn test_function_constructor_uses_known_sources() {
        let sources = SourceTable::default();
        let global = ObjectRef::plain();
        install(&global, sources.clone());
        sources.borrow_mut().insert(
            "return 7".to_owned(),
            Rc::new(|_: &ScriptValue, _: &[ScriptValue]| {
                Ok::<_, ScriptError>(ScriptValue::Number(7.0))
            }),
        );

        let ctor = global.own_property(&PropertyKey::from("Function")).unwrap_or_default();
        let f = ops::construct(&ctor, &[ScriptValue::string("return 7")]).unwrap();
        let result = ops::call_function(&f, &ScriptValue::Undefined, &[]).unwrap();
        assert_eq!(result.as_number(), Some(7.0));
        assert!(ops::construct(&ctor, &[ScriptValue::string("return 8")]).is_err());
    }
}

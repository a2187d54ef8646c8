//! Core script semantics: conversions, property access, calls
//!
//! Only the subset of the engine's semantics the boundary exercises.

use std::rc::Rc;

use crate::error::ScriptError;
use crate::tag::TypeTag;

use super::value::{ObjectKind, ObjectRef, PropertyKey, ScriptValue};

/// Classify a value by the tag it travels under.
pub fn type_tag_of(value: &ScriptValue) -> TypeTag {
    match value {
        ScriptValue::Undefined => TypeTag::Undefined,
        ScriptValue::Null => TypeTag::Null,
        ScriptValue::Bool(_) => TypeTag::Bool,
        ScriptValue::Number(_) => TypeTag::Number,
        ScriptValue::BigInt(_) => TypeTag::BigInt,
        ScriptValue::String(_) => TypeTag::String,
        ScriptValue::Symbol(_) => TypeTag::Symbol,
        ScriptValue::Object(object) => object_tag(object),
    }
}

fn object_tag(object: &ObjectRef) -> TypeTag {
    let is_thenable = {
        let borrowed = object.borrow();
        match &borrowed.kind {
            ObjectKind::Function(_) => return TypeTag::Function,
            ObjectKind::Array(_) => return TypeTag::Array,
            ObjectKind::TypedArray(_) => return TypeTag::TypedArray,
            ObjectKind::Plain => borrowed
                .properties
                .get(&PropertyKey::string("then"))
                .and_then(ScriptValue::as_object)
                .is_some_and(ObjectRef::is_function),
        }
    };
    if is_thenable {
        TypeTag::Promise
    } else {
        TypeTag::Object
    }
}

// ═══════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════

/// `Number(value)`
pub fn to_number(value: &ScriptValue) -> Result<f64, ScriptError> {
    Ok(match value {
        ScriptValue::Undefined => f64::NAN,
        ScriptValue::Null => 0.0,
        ScriptValue::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        ScriptValue::Number(n) => *n,
        ScriptValue::BigInt(n) => *n as f64,
        ScriptValue::String(s) => string_to_number(s),
        ScriptValue::Symbol(_) => {
            return Err(ScriptError::type_error(
                "Cannot convert a Symbol value to a number",
            ))
        }
        ScriptValue::Object(object) => match object.array_items() {
            Some(items) if items.is_empty() => 0.0,
            Some(items) if items.len() == 1 => to_number(&items[0])?,
            _ => f64::NAN,
        },
    })
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    // reject forms Rust accepts but the engine does not
    if trimmed.contains(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// Render a number the way the engine does.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if n == 0.0 {
        return "0".to_owned();
    }
    let magnitude = n.abs();
    if (1e-7..1e21).contains(&magnitude) {
        return format!("{}", n);
    }
    // exponent form: 1e+21, 1.5e-7
    let formatted = format!("{:e}", n);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{}e+{}", mantissa, exponent)
        }
        _ => formatted,
    }
}

/// `String(value)`
pub fn to_display_string(value: &ScriptValue) -> String {
    match value {
        ScriptValue::Undefined => "undefined".to_owned(),
        ScriptValue::Null => "null".to_owned(),
        ScriptValue::Bool(b) => b.to_string(),
        ScriptValue::Number(n) => number_to_string(*n),
        ScriptValue::BigInt(n) => n.to_string(),
        ScriptValue::String(s) => s.to_string(),
        ScriptValue::Symbol(s) => format!("Symbol({})", s.description().unwrap_or("")),
        ScriptValue::Object(object) => object_to_string(object),
    }
}

fn object_to_string(object: &ObjectRef) -> String {
    if let Some(items) = object.array_items() {
        return items
            .iter()
            .map(|item| {
                if item.is_nullish() {
                    String::new()
                } else {
                    to_display_string(item)
                }
            })
            .collect::<Vec<_>>()
            .join(",");
    }
    if let Some(buffer) = object.typed_buffer() {
        let buffer = buffer.borrow();
        return buffer
            .as_slice()
            .iter()
            .map(|n| number_to_string(*n))
            .collect::<Vec<_>>()
            .join(",");
    }
    if let Some(function) = object.function_data() {
        return format!("function {}() {{ [native code] }}", function.name);
    }
    match object_tag(object) {
        TypeTag::Promise => "[object Promise]".to_owned(),
        _ => "[object Object]".to_owned(),
    }
}

/// Truthiness
pub fn to_boolean(value: &ScriptValue) -> bool {
    match value {
        ScriptValue::Undefined | ScriptValue::Null => false,
        ScriptValue::Bool(b) => *b,
        ScriptValue::Number(n) => !(n.is_nan() || *n == 0.0),
        ScriptValue::BigInt(n) => *n != 0,
        ScriptValue::String(s) => !s.is_empty(),
        ScriptValue::Symbol(_) | ScriptValue::Object(_) => true,
    }
}

/// Convert a value to a property key
pub fn to_property_key(value: &ScriptValue) -> PropertyKey {
    match value {
        ScriptValue::Symbol(s) => PropertyKey::Symbol(s.clone()),
        ScriptValue::String(s) => PropertyKey::String(s.clone()),
        other => PropertyKey::String(Rc::from(to_display_string(other))),
    }
}

/// Loose equality (`==`)
pub fn loose_equals(lhs: &ScriptValue, rhs: &ScriptValue) -> bool {
    use ScriptValue as V;

    match (lhs, rhs) {
        (V::Undefined | V::Null, V::Undefined | V::Null) => true,
        (V::Undefined | V::Null, _) | (_, V::Undefined | V::Null) => false,
        (V::Number(a), V::Number(b)) => a == b,
        (V::String(a), V::String(b)) => a == b,
        (V::Bool(a), V::Bool(b)) => a == b,
        (V::BigInt(a), V::BigInt(b)) => a == b,
        (V::Symbol(a), V::Symbol(b)) => Rc::ptr_eq(a, b),
        (V::Object(a), V::Object(b)) => a.ptr_eq(b),
        (V::Bool(b), other) | (other, V::Bool(b)) => {
            loose_equals(&V::Number(if *b { 1.0 } else { 0.0 }), other)
        }
        (V::Number(n), V::String(s)) | (V::String(s), V::Number(n)) => *n == string_to_number(s),
        (V::BigInt(i), V::Number(n)) | (V::Number(n), V::BigInt(i)) => *i as f64 == *n,
        (V::BigInt(i), V::String(s)) | (V::String(s), V::BigInt(i)) => {
            s.trim().parse::<i128>().is_ok_and(|parsed| parsed == *i)
        }
        (V::Object(o), primitive) | (primitive, V::Object(o)) => match primitive {
            V::Symbol(_) => false,
            _ => loose_equals(&V::string(&object_to_string(o)), primitive),
        },
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════════
// Property access
// ═══════════════════════════════════════════════════════════════════

/// `target[key]`
pub fn get_property(target: &ScriptValue, key: &PropertyKey) -> Result<ScriptValue, ScriptError> {
    match target {
        ScriptValue::Undefined | ScriptValue::Null => Err(ScriptError::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            to_display_string(target),
            key_name(key)
        ))),
        ScriptValue::String(s) => Ok(string_property(s, key)),
        ScriptValue::Object(object) => Ok(object_property(object, key)),
        _ => Ok(ScriptValue::Undefined),
    }
}

fn string_property(s: &str, key: &PropertyKey) -> ScriptValue {
    if let PropertyKey::String(name) = key {
        if name.as_ref() == "length" {
            return ScriptValue::Number(s.encode_utf16().count() as f64);
        }
    }
    // indices count UTF-16 code units, same as `length`
    match key.as_index().and_then(|index| s.encode_utf16().nth(index)) {
        Some(unit) => ScriptValue::string(&String::from_utf16_lossy(&[unit])),
        None => ScriptValue::Undefined,
    }
}

fn object_property(object: &ObjectRef, key: &PropertyKey) -> ScriptValue {
    let borrowed = object.borrow();
    let is_length = matches!(key, PropertyKey::String(name) if name.as_ref() == "length");
    match &borrowed.kind {
        ObjectKind::Array(items) => {
            if is_length {
                return ScriptValue::Number(items.len() as f64);
            }
            if let Some(item) = key.as_index().and_then(|index| items.get(index)) {
                return item.clone();
            }
        }
        ObjectKind::TypedArray(buffer) => {
            let buffer = buffer.borrow();
            if is_length {
                return ScriptValue::Number(buffer.len() as f64);
            }
            if let Some(index) = key.as_index() {
                return buffer
                    .get(index)
                    .map_or(ScriptValue::Undefined, ScriptValue::Number);
            }
        }
        ObjectKind::Function(function) => {
            if matches!(key, PropertyKey::String(name) if name.as_ref() == "name") {
                return ScriptValue::string(&function.name);
            }
        }
        ObjectKind::Plain => {}
    }
    borrowed.properties.get(key).cloned().unwrap_or_default()
}

/// Largest length an array may have (2^32 - 1).
const MAX_ARRAY_LENGTH: f64 = 4_294_967_295.0;

/// Arrays are stored densely; growth past this many elements is refused
/// rather than allocated.
pub const MAX_DENSE_LENGTH: usize = 1 << 24;

fn check_dense_length(length: usize) -> Result<(), ScriptError> {
    if length > MAX_DENSE_LENGTH {
        return Err(ScriptError::RangeError(format!(
            "Array length {} exceeds the dense storage limit of {}",
            length, MAX_DENSE_LENGTH
        )));
    }
    Ok(())
}

/// `target[key] = value`
pub fn set_property(
    target: &ScriptValue,
    key: PropertyKey,
    value: ScriptValue,
) -> Result<(), ScriptError> {
    let object = match target {
        ScriptValue::Undefined | ScriptValue::Null => {
            return Err(ScriptError::type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                to_display_string(target),
                key_name(&key)
            )))
        }
        ScriptValue::Object(object) => object,
        // writes to primitives are silently dropped
        _ => return Ok(()),
    };

    let mut borrowed = object.borrow_mut();
    let is_length = matches!(&key, PropertyKey::String(name) if name.as_ref() == "length");
    match &mut borrowed.kind {
        ObjectKind::Array(items) => {
            if is_length {
                let length = to_number(&value)?;
                let valid = (0.0..=MAX_ARRAY_LENGTH).contains(&length) && length.fract() == 0.0;
                if !valid {
                    return Err(ScriptError::RangeError("Invalid array length".into()));
                }
                let length = length as usize;
                if length > items.len() {
                    check_dense_length(length)?;
                }
                items.resize(length, ScriptValue::Undefined);
                return Ok(());
            }
            // indices at or past 2^32 - 1 are ordinary properties
            if let Some(index) = key.as_index().filter(|&i| (i as f64) < MAX_ARRAY_LENGTH) {
                if index >= items.len() {
                    check_dense_length(index + 1)?;
                    items.resize(index + 1, ScriptValue::Undefined);
                }
                items[index] = value;
                return Ok(());
            }
        }
        ObjectKind::TypedArray(buffer) => {
            if let Some(index) = key.as_index() {
                let number = to_number(&value)?;
                buffer.borrow_mut().set(index, number);
                return Ok(());
            }
            if is_length {
                return Ok(());
            }
        }
        ObjectKind::Function(_) | ObjectKind::Plain => {}
    }
    borrowed.properties.insert(key, value);
    Ok(())
}

fn key_name(key: &PropertyKey) -> String {
    match key {
        PropertyKey::String(s) => s.to_string(),
        PropertyKey::Symbol(s) => format!("Symbol({})", s.description().unwrap_or("")),
    }
}

// ═══════════════════════════════════════════════════════════════════
// Calls
// ═══════════════════════════════════════════════════════════════════

/// `callee.call(this, ...args)`
pub fn call_function(
    callee: &ScriptValue,
    this: &ScriptValue,
    args: &[ScriptValue],
) -> Result<ScriptValue, ScriptError> {
    let function = callee
        .as_object()
        .and_then(ObjectRef::function_data)
        .ok_or_else(|| {
            ScriptError::type_error(format!("{} is not a function", to_display_string(callee)))
        })?;
    // the borrow on the function object is released before running it
    (function.call)(this, args)
}

/// `new callee(...args)`
pub fn construct(callee: &ScriptValue, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
    let function = callee
        .as_object()
        .and_then(ObjectRef::function_data)
        .ok_or_else(|| {
            ScriptError::type_error(format!(
                "{} is not a constructor",
                to_display_string(callee)
            ))
        })?;
    if !function.constructible {
        return Err(ScriptError::type_error(format!(
            "{} is not a constructor",
            function.name
        )));
    }
    let this = ScriptValue::object();
    let result = (function.call)(&this, args)?;
    Ok(match result {
        ScriptValue::Object(_) => result,
        _ => this,
    })
}

/// `target[name](...args)`
pub fn invoke_method(
    target: &ScriptValue,
    name: &PropertyKey,
    args: &[ScriptValue],
) -> Result<ScriptValue, ScriptError> {
    let method = get_property(target, name)?;
    if !method.as_object().is_some_and(ObjectRef::is_function) {
        return Err(ScriptError::type_error(format!(
            "{} is not a function",
            key_name(name)
        )));
    }
    call_function(&method, target, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::TypedArrayData;
    use crate::tag::TypedArrayKind;

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(123456.0), "123456");
    }

    #[test]
    fn test_to_number() {
        assert!(to_number(&ScriptValue::Undefined).is_ok_and(f64::is_nan));
        assert_eq!(to_number(&ScriptValue::Null), Ok(0.0));
        assert_eq!(to_number(&ScriptValue::string(" 42 ")), Ok(42.0));
        assert_eq!(to_number(&ScriptValue::string("")), Ok(0.0));
        assert_eq!(to_number(&ScriptValue::string("0x10")), Ok(16.0));
        assert!(to_number(&ScriptValue::string("inf")).is_ok_and(f64::is_nan));
        assert_eq!(to_number(&ScriptValue::BigInt(7)), Ok(7.0));
        assert!(to_number(&ScriptValue::symbol(None)).is_err());
        assert_eq!(to_number(&ScriptValue::array(vec![])), Ok(0.0));
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_equals(&ScriptValue::Null, &ScriptValue::Undefined));
        assert!(loose_equals(&ScriptValue::Number(1.0), &ScriptValue::string("1")));
        assert!(loose_equals(&ScriptValue::Bool(true), &ScriptValue::Number(1.0)));
        assert!(loose_equals(&ScriptValue::BigInt(2), &ScriptValue::Number(2.0)));
        assert!(!loose_equals(&ScriptValue::Null, &ScriptValue::Number(0.0)));
        assert!(!loose_equals(&ScriptValue::object(), &ScriptValue::object()));
        assert!(loose_equals(
            &ScriptValue::array(vec![ScriptValue::Number(1.0), ScriptValue::Number(2.0)]),
            &ScriptValue::string("1,2")
        ));
    }

    #[test]
    fn test_array_properties() -> Result<(), ScriptError> {
        let array = ScriptValue::array(vec![]);
        set_property(&array, PropertyKey::from(2), ScriptValue::Number(9.0))?;
        assert_eq!(
            get_property(&array, &PropertyKey::from("length"))?.as_number(),
            Some(3.0)
        );
        assert!(get_property(&array, &PropertyKey::from(0))?.is_undefined());
        set_property(&array, PropertyKey::from("length"), ScriptValue::Number(1.0))?;
        assert_eq!(to_display_string(&array), "");
        Ok(())
    }

    #[test]
    fn test_array_length_out_of_range_is_refused() {
        let array = ScriptValue::array(vec![ScriptValue::Null]);
        let length = PropertyKey::from("length");
        assert_eq!(
            set_property(&array, length.clone(), ScriptValue::Number(1e15)),
            Err(ScriptError::RangeError("Invalid array length".into()))
        );
        assert!(set_property(&array, length.clone(), ScriptValue::Number(4_294_967_295.0)).is_err());
        assert!(set_property(&array, length.clone(), ScriptValue::Number(-1.0)).is_err());
        assert_eq!(
            get_property(&array, &length).ok().and_then(|v| v.as_number()),
            Some(1.0)
        );
    }

    #[test]
    fn test_sparse_array_writes_stay_bounded() -> Result<(), ScriptError> {
        let array = ScriptValue::array(vec![]);
        let far = set_property(&array, PropertyKey::from(2_147_483_647), ScriptValue::Bool(true));
        assert!(matches!(far, Err(ScriptError::RangeError(_))));

        // past the largest array index the key is an ordinary property
        set_property(&array, PropertyKey::string("4294967295"), ScriptValue::Number(1.0))?;
        assert_eq!(
            get_property(&array, &PropertyKey::string("4294967295"))?.as_number(),
            Some(1.0)
        );
        assert_eq!(
            get_property(&array, &PropertyKey::from("length"))?.as_number(),
            Some(0.0)
        );

        let grow = set_property(
            &array,
            PropertyKey::from("length"),
            ScriptValue::Number((MAX_DENSE_LENGTH + 1) as f64),
        );
        assert!(matches!(grow, Err(ScriptError::RangeError(ref m)) if m.contains("dense storage limit")));
        Ok(())
    }

    #[test]
    fn test_string_indices_count_utf16_units() -> Result<(), ScriptError> {
        let text = ScriptValue::string("a\u{1F600}b");
        assert_eq!(
            get_property(&text, &PropertyKey::from("length"))?.as_number(),
            Some(4.0)
        );
        assert_eq!(get_property(&text, &PropertyKey::from(0))?.as_str(), Some("a"));
        assert_eq!(get_property(&text, &PropertyKey::from(3))?.as_str(), Some("b"));
        assert!(get_property(&text, &PropertyKey::from(4))?.is_undefined());
        Ok(())
    }

    #[test]
    fn test_typed_array_properties() -> Result<(), ScriptError> {
        let typed = ScriptValue::typed_array(TypedArrayData::new(
            TypedArrayKind::Uint8,
            [1.0, 2.0],
        ));
        set_property(&typed, PropertyKey::from(1), ScriptValue::Number(258.0))?;
        assert_eq!(to_display_string(&typed), "1,2");
        assert_eq!(type_tag_of(&typed), TypeTag::TypedArray);
        Ok(())
    }

    #[test]
    fn test_thenable_is_promise() -> Result<(), ScriptError> {
        let object = ScriptValue::object();
        assert_eq!(type_tag_of(&object), TypeTag::Object);
        let then = ScriptValue::native_fn("then", |_, _| Ok(ScriptValue::Undefined));
        set_property(&object, PropertyKey::from("then"), then)?;
        assert_eq!(type_tag_of(&object), TypeTag::Promise);
        Ok(())
    }

    #[test]
    fn test_construct_requires_constructor() {
        let plain = ScriptValue::native_fn("f", |_, _| Ok(ScriptValue::Null));
        assert!(construct(&plain, &[]).is_err());

        let ctor = ScriptValue::native_constructor("Point", |this, args| {
            set_property(this, PropertyKey::from("x"), args[0].clone())?;
            Ok(ScriptValue::Undefined)
        });
        let point = construct(&ctor, &[ScriptValue::Number(3.0)]);
        let x = point.and_then(|p| get_property(&p, &PropertyKey::from("x")));
        assert_eq!(x.ok().and_then(|v| v.as_number()), Some(3.0));
    }

    #[test]
    fn test_invoke_missing_method() {
        let object = ScriptValue::object();
        let err = invoke_method(&object, &PropertyKey::from("nope"), &[]);
        assert_eq!(
            err.err(),
            Some(ScriptError::type_error("nope is not a function"))
        );
    }
}

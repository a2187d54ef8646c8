//! Tests for the wire protocol: identity, round trips, arity, exceptions

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use crossheap::script::ops;
use crossheap::*;
use pretty_assertions::assert_eq;

fn bridge() -> Bridge {
    Bridge::new().expect("bridge failed to initialize")
}

// ═══════════════════════════════════════════════════════════════════════
// Identity Stability
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_same_object_decodes_to_same_wrapper() -> Result<()> {
    let bridge = bridge();
    bridge.script().define_global("shared", ScriptValue::object());
    let host = bridge.host();

    let first = host.get_global("shared")?;
    let second = host.get_global("shared")?;
    assert_eq!(first.tag(), TypeTag::Object);
    assert!(first
        .as_host_ref()
        .zip(second.as_host_ref())
        .is_some_and(|(a, b)| a.ptr_eq(b)));
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_equal_strings_share_a_wrapper_without_host_cache() -> Result<()> {
    let bridge = Bridge::with_config(BridgeConfig::new().caching(false))?;
    let host = bridge.host();

    let a = host.create_string("literal")?;
    let b = host.create_string("literal")?;
    assert!(a.ptr_eq(&b));
    assert_eq!(a.id(), b.id());

    let c = host.create_string("other")?;
    assert!(!a.ptr_eq(&c));
    Ok(())
}

#[test]
fn test_distinct_objects_are_distinct() -> Result<()> {
    let bridge = bridge();
    let host = bridge.host();
    let a = JsValue::Ref(host.create_object()?);
    let b = JsValue::Ref(host.create_object()?);
    assert_ne!(a, b);
    assert!(!host.equals_js(&a, &b)?);
    assert!(host.equals_js(&a, &a)?);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Round Trips
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_value_kinds_round_trip() -> Result<()> {
    let bridge = bridge();
    let host = bridge.host();
    let object = JsValue::Ref(host.create_object()?);

    let values = [
        JsValue::Undefined,
        JsValue::Null,
        JsValue::Bool(true),
        JsValue::Bool(false),
        JsValue::Number(0.0),
        JsValue::Number(-0.0),
        JsValue::Number(f64::NAN),
        JsValue::Number(1.5e300),
    ];
    for value in values {
        host.set(&object, "slot", &value)?;
        assert_eq!(host.get(&object, "slot")?, value);
    }
    Ok(())
}

#[test]
fn test_negative_zero_keeps_its_sign() -> Result<()> {
    let bridge = bridge();
    let host = bridge.host();
    let object = JsValue::Ref(host.create_object()?);
    host.set(&object, "z", &JsValue::Number(-0.0))?;
    match host.get(&object, "z")? {
        JsValue::Number(n) => assert!(n == 0.0 && n.is_sign_negative()),
        other => panic!("expected a number, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_wire_encoding_of_value_kinds() {
    assert_eq!(JsValue::Undefined.to_wire(), WireValue::UNDEFINED);
    assert_eq!(JsValue::Null.to_wire(), WireValue::NULL);
    assert_eq!(JsValue::Bool(true).to_wire(), WireValue::new(1.0, TypeTag::Bool));
    assert_eq!(JsValue::Bool(false).to_wire(), WireValue::new(0.0, TypeTag::Bool));
}

// ═══════════════════════════════════════════════════════════════════════
// Arity
// ═══════════════════════════════════════════════════════════════════════

fn define_arity(bridge: &Bridge) {
    bridge.script().define_global(
        "arity",
        ScriptValue::native_fn("arity", |_, args| Ok(ScriptValue::Number(args.len() as f64))),
    );
}

#[test]
fn test_trailing_undefined_is_not_forwarded() -> Result<()> {
    let bridge = bridge();
    define_arity(&bridge);
    let host = bridge.host();
    let arity = host.get_global("arity")?;

    let a = JsValue::Number(1.0);
    let u = JsValue::Undefined;
    assert_eq!(host.call(&arity, &[a.clone(), u.clone(), u.clone()])?, JsValue::Number(1.0));
    assert_eq!(host.call(&arity, &[a.clone(), a.clone(), u.clone()])?, JsValue::Number(2.0));
    assert_eq!(host.call(&arity, &[u.clone(), u.clone(), u.clone()])?, JsValue::Number(0.0));
    // an undefined in the middle is kept
    assert_eq!(host.call(&arity, &[a.clone(), u.clone(), a.clone()])?, JsValue::Number(3.0));
    Ok(())
}

#[test]
fn test_long_argument_lists_use_the_array_path() -> Result<()> {
    let bridge = bridge();
    define_arity(&bridge);
    let host = bridge.host();
    let arity = host.get_global("arity")?;

    let args: Vec<JsValue> = (0..5).map(|n| JsValue::Number(f64::from(n))).collect();
    assert_eq!(host.call(&arity, &args)?, JsValue::Number(5.0));

    // the temporary argument array is collected once the call returns
    let before = bridge.script().registry_len();
    host.call(&arity, &args)?;
    assert_eq!(bridge.script().registry_len(), before);
    Ok(())
}

#[test]
fn test_invoke_and_construct() -> Result<()> {
    let bridge = bridge();
    let host = bridge.host();
    bridge.script().define_global(
        "Point",
        ScriptValue::native_constructor("Point", |this, args| {
            ops::set_property(this, PropertyKey::from("x"), args.first().cloned().unwrap_or_default())?;
            ops::set_property(this, PropertyKey::from("y"), args.get(1).cloned().unwrap_or_default())?;
            Ok(ScriptValue::Undefined)
        }),
    );

    let point = host.create_host_object("Point", &[JsValue::Number(3.0), JsValue::Number(4.0)])?;
    assert_eq!(point.tag(), TypeTag::Object);
    assert_eq!(host.get(&point, "y")?, JsValue::Number(4.0));

    let math = ScriptValue::object();
    ops::set_property(
        &math,
        PropertyKey::from("add"),
        ScriptValue::native_fn("add", |_, args| {
            let sum = args.iter().filter_map(ScriptValue::as_number).sum::<f64>();
            Ok(ScriptValue::Number(sum))
        }),
    )?;
    bridge.script().define_global("math", math);
    let math = host.get_global("math")?;
    let sum = host.invoke(&math, "add", &[JsValue::Number(2.0), JsValue::Number(3.0)])?;
    assert_eq!(sum, JsValue::Number(5.0));

    let many: Vec<JsValue> = (1..=4).map(|n| JsValue::Number(f64::from(n))).collect();
    assert_eq!(host.invoke(&math, "add", &many)?, JsValue::Number(10.0));
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Exceptions
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_thrown_error_reaches_the_host_with_its_message() -> Result<()> {
    let bridge = bridge();
    bridge.script().define_global(
        "fail",
        ScriptValue::native_fn("fail", |_, _| Err(ScriptError::new("boom"))),
    );
    let host = bridge.host();
    let fail = host.get_global("fail")?;

    let before = bridge.script().registry_len();
    let err = host.call(&fail, &[]).unwrap_err();
    assert_eq!(
        err,
        BridgeError::Script {
            message: "Error: boom".to_owned()
        }
    );
    assert!(!err.is_fatal());
    // the transient message string was collected
    assert_eq!(bridge.script().registry_len(), before);
    assert!(host.is_live());
    Ok(())
}

#[test]
fn test_type_errors_are_script_exceptions() -> Result<()> {
    let bridge = bridge();
    let host = bridge.host();
    let err = host.get(&JsValue::Null, "field").unwrap_err();
    assert!(matches!(err, BridgeError::Script { ref message } if message.starts_with("TypeError")));

    let object = JsValue::Ref(host.create_object()?);
    let err = host.invoke(&object, "missing", &[]).unwrap_err();
    assert_eq!(err.to_string(), "Script exception: TypeError: missing is not a function");
    Ok(())
}

#[test]
fn test_exception_message_shared_with_live_string_survives() -> Result<()> {
    let bridge = bridge();
    bridge.script().define_global(
        "throw_text",
        ScriptValue::native_fn("throw_text", |_, _| Err(ScriptError::new("same"))),
    );
    let host = bridge.host();
    // a wrapper the host holds for the exact message text
    let message = host.create_string("Error: same")?;
    let throw_text = host.get_global("throw_text")?;
    assert!(host.call(&throw_text, &[]).is_err());
    assert!(bridge.script().contains_reference(message.id()));
    assert_eq!(host.to_js_string(&JsValue::Ref(message))?, "Error: same");
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Stale Ids
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_dropped_wrapper_is_not_found() -> Result<()> {
    let bridge = bridge();
    let host = bridge.host();
    let object = host.create_object()?;
    let id = object.id();
    assert!(host.try_get_ref(id).is_some());
    assert!(bridge.script().contains_reference(id));

    drop(object);
    assert!(host.try_get_ref(id).is_none());
    assert!(!bridge.script().contains_reference(id));
    Ok(())
}

#[test]
fn test_script_rejects_collected_id() {
    let bridge = bridge();
    let script = bridge.script();
    let object = script.create_empty_object();
    script.garbage_collect(object);
    let reply = script.get_number(object);
    assert!(reply.is_exception());
    // collecting twice is harmless
    assert!(!script.garbage_collect(object).is_exception());
}

#[test]
fn test_equality_is_evaluated_by_the_script() -> Result<()> {
    let bridge = bridge();
    let host = bridge.host();
    let one = JsValue::Ref(host.create_string("1")?);
    assert!(host.equals_js(&one, &JsValue::Number(1.0))?);
    assert!(host.equals_js(&JsValue::Null, &JsValue::Undefined)?);
    assert!(!host.equals_js(&JsValue::Null, &JsValue::Number(0.0))?);
    assert_ne!(one, JsValue::Number(1.0));
    Ok(())
}

#[test]
fn test_no_callbacks_leak_between_bridges() {
    let calls = Rc::new(Cell::new(0));
    for _ in 0..2 {
        let bridge = bridge();
        let seen = calls.clone();
        let callback = bridge
            .host()
            .create_callback(&[], move |_, _| {
                seen.set(seen.get() + 1);
                Ok(JsValue::Undefined)
            })
            .expect("callback");
        bridge
            .host()
            .call(&JsValue::Ref(callback), &[])
            .expect("call");
    }
    assert_eq!(calls.get(), 2);
}

//! Tests for initialization checks and desynchronization

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use crossheap::*;
use pretty_assertions::assert_eq;

/// A script runtime that can misreport its version, forge replies or
/// swallow callback dispatches before they reach the host.
struct Skewed {
    inner: Rc<ScriptRuntime>,
    version: u32,
    forge_reads: Cell<bool>,
    mute_callbacks: Rc<Cell<bool>>,
}

impl Skewed {
    fn new(version: u32) -> Rc<Self> {
        Rc::new(Skewed {
            inner: ScriptRuntime::new(Rc::new(SharedMemory::new())),
            version,
            forge_reads: Cell::new(false),
            mute_callbacks: Rc::new(Cell::new(false)),
        })
    }
}

/// Host hooks that drop callback dispatches while muted.
struct Muted {
    inner: Rc<dyn HostHooks>,
    muted: Rc<Cell<bool>>,
}

impl HostHooks for Muted {
    fn on_callback(&self, callback_id: f64, response_id: f64, arg: WireValue, args_are_array: bool) {
        if !self.muted.get() {
            self.inner
                .on_callback(callback_id, response_id, arg, args_are_array);
        }
    }

    fn acquire_reference(&self, id: f64) -> bool {
        self.inner.acquire_reference(id)
    }

    fn release_reference(&self, id: f64) -> bool {
        self.inner.release_reference(id)
    }
}

impl ScriptBoundary for Skewed {
    fn protocol_version(&self) -> u32 {
        self.version
    }

    fn initialize_internal(&self, hooks: Rc<dyn HostHooks>) -> std::result::Result<(), ProtocolError> {
        let muted = Rc::new(Muted {
            inner: hooks,
            muted: self.mute_callbacks.clone(),
        });
        self.inner.initialize_internal(muted)
    }

    fn get_global_object(&self, identifier: WireValue) -> WireValue {
        self.inner.get_global_object(identifier)
    }

    fn create_empty_object(&self) -> WireValue {
        self.inner.create_empty_object()
    }

    fn create_string(&self, text: &str) -> WireValue {
        self.inner.create_string(text)
    }

    fn create_array(&self) -> WireValue {
        self.inner.create_array()
    }

    fn call_slow(&self, function: f64, params: f64) -> WireValue {
        self.inner.call_slow(function, params)
    }

    fn call(&self, function: f64, args: FixedArgs) -> WireValue {
        self.inner.call(function, args)
    }

    fn invoke_slow(&self, target: WireValue, name: WireValue, params: f64) -> WireValue {
        self.inner.invoke_slow(target, name, params)
    }

    fn invoke(&self, target: WireValue, name: WireValue, args: FixedArgs) -> WireValue {
        self.inner.invoke(target, name, args)
    }

    fn construct_slow(&self, function: f64, params: f64) -> WireValue {
        self.inner.construct_slow(function, params)
    }

    fn construct(&self, function: f64, args: FixedArgs) -> WireValue {
        self.inner.construct(function, args)
    }

    fn get_prop(&self, object: WireValue, key: WireValue) -> WireValue {
        if self.forge_reads.get() {
            // a callback id the host never issued
            let id = RefId::new(9_999).unwrap_or_else(|err| panic!("{}", err));
            return WireValue::reference(id, TypeTag::Callback);
        }
        self.inner.get_prop(object, key)
    }

    fn set_prop(&self, object: WireValue, key: WireValue, value: WireValue) -> WireValue {
        self.inner.set_prop(object, key, value)
    }

    fn get_array_element(&self, array: f64, index: i32) -> WireValue {
        self.inner.get_array_element(array, index)
    }

    fn set_array_element(&self, array: f64, index: i32, value: WireValue) -> WireValue {
        self.inner.set_array_element(array, index, value)
    }

    fn create_callback(&self, param_names: f64) -> WireValue {
        self.inner.create_callback(param_names)
    }

    fn create_shared_typed_array(&self, pointer: u32, type_code: i32, length: i32) -> WireValue {
        self.inner.create_shared_typed_array(pointer, type_code, length)
    }

    fn create_typed_array(&self, pointer: u32, type_code: i32, length: i32) -> WireValue {
        self.inner.create_typed_array(pointer, type_code, length)
    }

    fn create_empty_typed_array(&self, type_code: i32) -> WireValue {
        self.inner.create_empty_typed_array(type_code)
    }

    fn garbage_collect(&self, value: WireValue) -> WireValue {
        self.inner.garbage_collect(value)
    }

    fn equals(&self, lhs: WireValue, rhs: WireValue) -> WireValue {
        self.inner.equals(lhs, rhs)
    }

    fn get_number(&self, value: WireValue) -> WireValue {
        self.inner.get_number(value)
    }

    fn get_string(&self, value: WireValue) -> WireText {
        self.inner.get_string(value)
    }

    fn respond_to_callback(&self, response_id: f64, value: WireValue) -> WireValue {
        self.inner.respond_to_callback(response_id, value)
    }
}

fn initialize(script: &Rc<Skewed>) -> Result<Rc<HostRuntime>, BridgeError> {
    let boundary: Rc<dyn ScriptBoundary> = script.clone();
    HostRuntime::initialize(boundary, Rc::new(SharedMemory::new()), BridgeConfig::default())
}

// ═══════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_version_mismatch_is_refused() {
    let script = Skewed::new(PROTOCOL_VERSION + 1);
    let err = initialize(&script).err();
    assert_eq!(
        err,
        Some(BridgeError::PlatformMismatch {
            expected: PROTOCOL_VERSION,
            found: PROTOCOL_VERSION + 1,
        })
    );
    assert!(err.is_some_and(|e| e.is_fatal()));
    // the script side was never wired up
    assert!(!script.inner.is_initialized());
}

#[test]
fn test_matching_version_initializes_once() -> Result<()> {
    let script = Skewed::new(PROTOCOL_VERSION);
    let host = initialize(&script)?;
    assert!(host.is_live());
    assert!(script.inner.is_initialized());

    let err = initialize(&script).err();
    assert_eq!(
        err,
        Some(BridgeError::Protocol(ProtocolError::AlreadyInitialized))
    );
    Ok(())
}

#[test]
fn test_script_refuses_use_before_initialization() {
    let script = ScriptRuntime::new(Rc::new(SharedMemory::new()));
    assert!(script.create_empty_object().is_exception());
    assert_eq!(script.registry_len(), 0);
}

// ═══════════════════════════════════════════════════════════════════════
// Desynchronization
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_unknown_callback_id_desynchronizes_the_host() -> Result<()> {
    let script = Skewed::new(PROTOCOL_VERSION);
    let host = initialize(&script)?;
    let object = JsValue::Ref(host.create_object()?);

    script.forge_reads.set(true);
    let err = host.get(&object, "handler").unwrap_err();
    assert_eq!(
        err,
        BridgeError::Protocol(ProtocolError::SpecialReferenceCollected {
            tag: TypeTag::Callback,
            id: 9_999,
        })
    );
    assert!(err.is_fatal());
    assert!(!host.is_live());

    // every later operation is refused
    script.forge_reads.set(false);
    assert_eq!(
        host.create_object().unwrap_err(),
        BridgeError::Protocol(ProtocolError::Desynchronized)
    );
    Ok(())
}

#[test]
fn test_unanswered_callback_desynchronizes_the_host() -> Result<()> {
    let script = Skewed::new(PROTOCOL_VERSION);
    script.inner.define_global(
        "apply",
        ScriptValue::native_fn("apply", |_, args| {
            let callee = args.first().cloned().unwrap_or_default();
            crossheap::script::ops::call_function(&callee, &ScriptValue::Undefined, &[])
        }),
    );
    let host = initialize(&script)?;
    let apply = host.get_global("apply")?;
    let callback = host.create_callback(&[], |_, _| Ok(JsValue::Number(1.0)))?;
    assert_eq!(
        host.call(&apply, &[JsValue::Ref(callback.clone())])?,
        JsValue::Number(1.0)
    );

    script.mute_callbacks.set(true);
    let err = host.call(&apply, &[JsValue::Ref(callback)]).unwrap_err();
    assert_eq!(
        err,
        BridgeError::Protocol(ProtocolError::ScriptViolation(
            "callback response 2 was never delivered".to_owned()
        ))
    );
    assert!(err.is_fatal());
    assert!(!host.is_live());
    assert_eq!(
        host.create_object().unwrap_err(),
        BridgeError::Protocol(ProtocolError::Desynchronized)
    );
    Ok(())
}

#[test]
fn test_malformed_payload_is_rejected() {
    assert_eq!(
        RefId::from_payload(1.5),
        Err(ProtocolError::MalformedReference(1.5))
    );
    assert!(RefId::from_payload(0.0).is_err());
    assert!(RefId::from_payload(f64::NAN).is_err());
    assert_eq!(RefId::from_payload(3.0).map(RefId::get), Ok(3));
}

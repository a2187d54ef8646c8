//! The script-side boundary implementation
//!
//! [`ScriptRuntime`] owns the embedded heap's global object, the script
//! reference registry, the callback response table and the finalization
//! queue, and implements every [`ScriptBoundary`] operation on top of them.
//!
//! Boundary entry points never fail across the ABI: any thrown error is
//! turned into the Exception tag whose payload names a string holding the
//! error message.
//!
//! All registry access happens through short `RefCell` borrows. Native
//! code, including host callbacks that re-enter this runtime, only ever
//! runs while no borrow is held.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::boundary::{HostHooks, ScriptBoundary, PROTOCOL_VERSION};
use crate::error::{ProtocolError, ScriptError};
use crate::memory::{SharedMemory, TypedArrayData};
use crate::tag::{TypeTag, TypedArrayKind};
use crate::wire::{FixedArgs, RefId, WireText, WireValue};

use super::builtins::{self, SourceTable};
use super::finalize::FinalizationQueue;
use super::ops;
use super::promise::{self, PromiseResolver};
use super::registry::{Holder, ScriptRegistry, SpecialData, SpecialReference};
use super::value::{Function, ObjectRef, PropertyKey, ScriptValue};

type Completion = Result<ScriptValue, ScriptError>;

/// One-shot slots correlating a callback dispatch with its response.
#[derive(Default)]
struct ResponseTable {
    last: u64,
    slots: HashMap<u64, Option<Completion>>,
}

impl ResponseTable {
    fn open(&mut self) -> u64 {
        self.last += 1;
        self.slots.insert(self.last, None);
        self.last
    }

    fn check(&self, response_id: u64) -> Result<(), ProtocolError> {
        match self.slots.get(&response_id) {
            None => Err(ProtocolError::UnknownResponse { response_id }),
            Some(Some(_)) => Err(ProtocolError::DuplicateResponse { response_id }),
            Some(None) => Ok(()),
        }
    }

    fn fill(&mut self, response_id: u64, completion: Completion) -> Result<(), ProtocolError> {
        self.check(response_id)?;
        self.slots.insert(response_id, Some(completion));
        Ok(())
    }

    fn close(&mut self, response_id: u64) -> Option<Completion> {
        self.slots.remove(&response_id).flatten()
    }
}

/// The embedded script engine's half of the bridge.
pub struct ScriptRuntime {
    memory: Rc<SharedMemory>,
    global: ObjectRef,
    sources: SourceTable,
    registry: RefCell<ScriptRegistry>,
    responses: RefCell<ResponseTable>,
    finalizers: FinalizationQueue,
    hooks: RefCell<Option<Rc<dyn HostHooks>>>,
    self_ref: Weak<ScriptRuntime>,
}

impl ScriptRuntime {
    /// Create a runtime whose shared typed arrays resolve against `memory`.
    pub fn new(memory: Rc<SharedMemory>) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| {
            let global = ObjectRef::plain();
            let sources = SourceTable::default();
            builtins::install(&global, sources.clone());
            ScriptRuntime {
                memory,
                global,
                sources,
                registry: RefCell::new(ScriptRegistry::new()),
                responses: RefCell::new(ResponseTable::default()),
                finalizers: FinalizationQueue::new(),
                hooks: RefCell::new(None),
                self_ref: self_ref.clone(),
            }
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Embedding API
    // ═══════════════════════════════════════════════════════════════════

    /// The global object
    pub fn global(&self) -> &ObjectRef {
        &self.global
    }

    /// Bind `globalThis[name]`
    pub fn define_global(&self, name: &str, value: ScriptValue) {
        self.global
            .borrow_mut()
            .properties
            .insert(PropertyKey::string(name), value);
    }

    /// Teach `new Function(body)` what `body` does.
    pub fn define_source<F>(&self, body: &str, f: F)
    where
        F: Fn(&ScriptValue, &[ScriptValue]) -> Result<ScriptValue, ScriptError> + 'static,
    {
        self.sources.borrow_mut().insert(body.to_owned(), Rc::new(f));
    }

    /// New pending promise plus its resolver
    pub fn create_promise(&self) -> (ScriptValue, PromiseResolver) {
        promise::create_promise()
    }

    /// Whether `InitializeInternal` has run
    pub fn is_initialized(&self) -> bool {
        self.hooks.borrow().is_some()
    }

    /// Number of live registry entries
    pub fn registry_len(&self) -> usize {
        self.registry.borrow().len()
    }

    /// Whether `id` is registered
    pub fn contains_reference(&self, id: RefId) -> bool {
        self.registry.borrow().contains(id)
    }

    /// Collected materializations whose release has not been sent yet
    pub fn pending_finalizers(&self) -> usize {
        self.finalizers.len()
    }

    /// Send one `release` per collected materialized special reference.
    ///
    /// Returns how many releases were sent.
    pub fn run_finalizers(&self) -> usize {
        let hooks = self.hooks.borrow().clone();
        let mut released = 0;
        while let Some(id) = self.finalizers.pop() {
            if let Some(hooks) = &hooks {
                if !hooks.release_reference(id.to_payload()) {
                    warn!(%id, "release of collected reference was not acknowledged");
                }
                released += 1;
            }
        }
        self.registry.borrow_mut().prune();
        released
    }

    /// Decode a wire value against this registry.
    pub fn value_of(&self, wire: WireValue) -> Result<ScriptValue, ScriptError> {
        self.get_value(wire)
    }

    /// Encode a script value, registering it if it is a reference kind.
    pub fn to_wire(&self, value: &ScriptValue) -> Result<WireValue, ScriptError> {
        self.make_ref_from(value)
    }

    /// Forget every reference and the host hooks.
    pub fn shutdown(&self) {
        let holders = self.registry.borrow_mut().drain();
        for holder in &holders {
            if let Holder::Special(special) = holder {
                if let Some(registration) = special.registration.borrow().as_ref() {
                    FinalizationQueue::unregister(registration);
                }
            }
        }
        drop(holders);
        while self.finalizers.pop().is_some() {}
        let hooks = self.hooks.borrow_mut().take();
        drop(hooks);
        debug!("script runtime shut down");
    }

    // ═══════════════════════════════════════════════════════════════════
    // Encoding
    // ═══════════════════════════════════════════════════════════════════

    fn make_ref_from(&self, value: &ScriptValue) -> Result<WireValue, ScriptError> {
        let literal = match value {
            ScriptValue::Undefined => Some(WireValue::UNDEFINED),
            ScriptValue::Null => Some(WireValue::NULL),
            ScriptValue::Bool(b) => Some(WireValue::boolean(*b)),
            ScriptValue::Number(n) => Some(WireValue::number(*n)),
            _ => None,
        };
        if let Some(wire) = literal {
            return Ok(wire);
        }

        let existing = self.registry.borrow().lookup(value);
        if let Some((id, tag)) = existing {
            return Ok(WireValue::reference(id, tag));
        }

        let tag = ops::type_tag_of(value);
        let id = self.registry.borrow_mut().insert(value.clone(), tag)?;
        debug!(%id, %tag, "registered script value");
        Ok(WireValue::reference(id, tag))
    }

    fn get_value(&self, wire: WireValue) -> Result<ScriptValue, ScriptError> {
        let tag = wire.type_tag()?;
        match tag {
            TypeTag::Exception => Err(ProtocolError::ExceptionAsValue.into()),
            TypeTag::Undefined => Ok(ScriptValue::Undefined),
            TypeTag::Null => Ok(ScriptValue::Null),
            TypeTag::Bool => Ok(ScriptValue::Bool(wire.payload != 0.0)),
            TypeTag::Number => Ok(ScriptValue::Number(wire.payload)),
            _ => self.value_by_id(wire.payload),
        }
    }

    fn value_by_id(&self, payload: f64) -> Result<ScriptValue, ScriptError> {
        let id = RefId::from_payload(payload)?;
        let holder = self.registry.borrow().holder(id);
        match holder {
            Some(Holder::Value { value, .. }) => Ok(value),
            Some(Holder::Special(special)) => self.materialize(&special),
            None => Err(ScriptError::ReferenceError(format!(
                "reference {} is not registered",
                id
            ))),
        }
    }

    fn hooks(&self) -> Result<Rc<dyn HostHooks>, ScriptError> {
        self.hooks
            .borrow()
            .clone()
            .ok_or_else(|| ProtocolError::NotInitialized.into())
    }

    /// Object for a special reference: the cached one if it is still
    /// alive, otherwise a new one backed by a fresh keep-alive pin.
    fn materialize(&self, special: &Rc<SpecialReference>) -> Result<ScriptValue, ScriptError> {
        let cached = special.cached.borrow().as_ref().and_then(|weak| weak.upgrade());
        if let Some(object) = cached {
            return Ok(ScriptValue::Object(object));
        }

        let object = match &special.data {
            SpecialData::Callback { param_names } => {
                let runtime = self.self_ref.clone();
                let id = special.id;
                let param_count = param_names.len();
                ObjectRef::function(Function {
                    name: format!("callback{}", id),
                    call: Rc::new(move |_this: &ScriptValue, args: &[ScriptValue]| {
                        let runtime = runtime
                            .upgrade()
                            .ok_or_else(|| ScriptError::new("script runtime is gone"))?;
                        runtime.dispatch_callback(id, param_count, args)
                    }),
                    constructible: false,
                })
            }
            SpecialData::SharedArray {
                pointer, length, ..
            } => {
                let buffer = self.memory.resolve(*pointer).ok_or_else(|| {
                    ScriptError::RangeError(format!("no buffer pinned at {:#x}", pointer))
                })?;
                if buffer.borrow().len() != *length {
                    return Err(ScriptError::RangeError(format!(
                        "buffer at {:#x} no longer has {} elements",
                        pointer, length
                    )));
                }
                ObjectRef::typed_array(buffer)
            }
        };

        let hooks = self.hooks()?;
        if !hooks.acquire_reference(special.id.to_payload()) {
            return Err(ScriptError::new(format!(
                "Could not re-acquire reference {}",
                special.id
            )));
        }

        let (token, registration) = self.finalizers.register(special.id);
        object.attach_finalizer(token);
        *special.registration.borrow_mut() = Some(registration);
        *special.cached.borrow_mut() = Some(object.downgrade());
        self.registry.borrow_mut().map_object(&object, special.id);
        debug!(id = %special.id, tag = %special.tag, "materialized special reference");
        Ok(ScriptValue::Object(object))
    }

    fn array_by_id(&self, payload: f64) -> Result<Vec<ScriptValue>, ScriptError> {
        self.value_by_id(payload)?
            .as_object()
            .and_then(ObjectRef::array_items)
            .ok_or_else(|| ScriptError::type_error("argument list is not an array"))
    }

    fn fixed_args(&self, args: &FixedArgs) -> Result<Vec<ScriptValue>, ScriptError> {
        args.0[..args.arity()]
            .iter()
            .map(|wire| self.get_value(*wire))
            .collect()
    }

    fn property_key(&self, wire: WireValue) -> Result<PropertyKey, ScriptError> {
        Ok(ops::to_property_key(&self.get_value(wire)?))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Callbacks
    // ═══════════════════════════════════════════════════════════════════

    fn dispatch_callback(
        &self,
        id: RefId,
        param_count: usize,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        let hooks = self.hooks()?;
        let (arg, args_are_array) = match param_count {
            0 => (WireValue::UNDEFINED, false),
            1 => (self.make_ref_from(args.first().unwrap_or(&ScriptValue::Undefined))?, false),
            n => {
                let mut packed = args.to_vec();
                packed.resize(n, ScriptValue::Undefined);
                (self.make_ref_from(&ScriptValue::array(packed))?, true)
            }
        };

        let response_id = self.responses.borrow_mut().open();
        trace!(%id, response_id, args_are_array, "dispatching host callback");
        hooks.on_callback(id.to_payload(), response_id as f64, arg, args_are_array);

        let completion = self.responses.borrow_mut().close(response_id);
        completion.unwrap_or_else(|| Err(ProtocolError::UnansweredCallback { response_id }.into()))
    }

    fn response_completion(&self, value: WireValue) -> Completion {
        if !value.is_exception() {
            return self.get_value(value);
        }
        if value.payload == 0.0 {
            return Err(ScriptError::new("Unknown host exception"));
        }
        let message = self.value_by_id(value.payload)?;
        Err(ScriptError::new(ops::to_display_string(&message)))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Entry
    // ═══════════════════════════════════════════════════════════════════

    fn entry(
        &self,
        operation: &'static str,
        body: impl FnOnce() -> Result<WireValue, ScriptError>,
    ) -> WireValue {
        if !self.is_initialized() {
            // no host to read and collect a message string
            debug!(operation, "script runtime used before initialization");
            return WireValue::exception(None);
        }
        trace!(operation, "script boundary entry");
        body().unwrap_or_else(|err| self.throw(operation, err))
    }

    fn throw(&self, operation: &'static str, err: ScriptError) -> WireValue {
        debug!(operation, error = %err, "script operation threw");
        let message = ScriptValue::string(&err.to_string());
        match self.make_ref_from(&message).and_then(|wire| Ok(wire.ref_id()?)) {
            Ok(id) => WireValue::exception(Some(id)),
            Err(_) => WireValue::exception(None),
        }
    }

    fn register_special(&self, tag: TypeTag, data: SpecialData) -> Result<WireValue, ScriptError> {
        let special = self.registry.borrow_mut().insert_special(tag, data)?;
        debug!(id = %special.id, %tag, "registered special reference");
        Ok(WireValue::reference(special.id, tag))
    }
}

fn typed_array_kind(type_code: i32) -> Result<TypedArrayKind, ScriptError> {
    TypedArrayKind::from_code(type_code)
        .ok_or_else(|| ScriptError::RangeError(format!("unknown typed array type {}", type_code)))
}

fn length_of(length: i32) -> Result<usize, ScriptError> {
    usize::try_from(length)
        .map_err(|_| ScriptError::RangeError(format!("invalid typed array length {}", length)))
}

impl ScriptBoundary for ScriptRuntime {
    fn protocol_version(&self) -> u32 {
        PROTOCOL_VERSION
    }

    fn initialize_internal(&self, hooks: Rc<dyn HostHooks>) -> Result<(), ProtocolError> {
        let mut slot = self.hooks.borrow_mut();
        if slot.is_some() {
            return Err(ProtocolError::AlreadyInitialized);
        }
        *slot = Some(hooks);
        debug!(version = PROTOCOL_VERSION, "script runtime initialized");
        Ok(())
    }

    fn get_global_object(&self, identifier: WireValue) -> WireValue {
        self.entry("GetGlobalObject", || {
            let key = self.property_key(identifier)?;
            let value = ops::get_property(&ScriptValue::Object(self.global.clone()), &key)?;
            self.make_ref_from(&value)
        })
    }

    fn create_empty_object(&self) -> WireValue {
        self.entry("CreateEmptyObject", || self.make_ref_from(&ScriptValue::object()))
    }

    fn create_string(&self, text: &str) -> WireValue {
        self.entry("CreateString", || self.make_ref_from(&ScriptValue::string(text)))
    }

    fn create_array(&self) -> WireValue {
        self.entry("CreateArray", || self.make_ref_from(&ScriptValue::array(Vec::new())))
    }

    fn call_slow(&self, function: f64, params: f64) -> WireValue {
        self.entry("CallSlow", || {
            let callee = self.value_by_id(function)?;
            let args = self.array_by_id(params)?;
            let result = ops::call_function(&callee, &ScriptValue::Undefined, &args)?;
            self.make_ref_from(&result)
        })
    }

    fn call(&self, function: f64, args: FixedArgs) -> WireValue {
        self.entry("Call", || {
            let callee = self.value_by_id(function)?;
            let args = self.fixed_args(&args)?;
            let result = ops::call_function(&callee, &ScriptValue::Undefined, &args)?;
            self.make_ref_from(&result)
        })
    }

    fn invoke_slow(&self, target: WireValue, name: WireValue, params: f64) -> WireValue {
        self.entry("InvokeSlow", || {
            let target = self.get_value(target)?;
            let key = self.property_key(name)?;
            let args = self.array_by_id(params)?;
            let result = ops::invoke_method(&target, &key, &args)?;
            self.make_ref_from(&result)
        })
    }

    fn invoke(&self, target: WireValue, name: WireValue, args: FixedArgs) -> WireValue {
        self.entry("Invoke", || {
            let target = self.get_value(target)?;
            let key = self.property_key(name)?;
            let args = self.fixed_args(&args)?;
            let result = ops::invoke_method(&target, &key, &args)?;
            self.make_ref_from(&result)
        })
    }

    fn construct_slow(&self, function: f64, params: f64) -> WireValue {
        self.entry("ConstructSlow", || {
            let callee = self.value_by_id(function)?;
            let args = self.array_by_id(params)?;
            let result = ops::construct(&callee, &args)?;
            self.make_ref_from(&result)
        })
    }

    fn construct(&self, function: f64, args: FixedArgs) -> WireValue {
        self.entry("Construct", || {
            let callee = self.value_by_id(function)?;
            let args = self.fixed_args(&args)?;
            let result = ops::construct(&callee, &args)?;
            self.make_ref_from(&result)
        })
    }

    fn get_prop(&self, object: WireValue, key: WireValue) -> WireValue {
        self.entry("GetProp", || {
            let target = self.get_value(object)?;
            let key = self.property_key(key)?;
            let value = ops::get_property(&target, &key)?;
            self.make_ref_from(&value)
        })
    }

    fn set_prop(&self, object: WireValue, key: WireValue, value: WireValue) -> WireValue {
        self.entry("SetProp", || {
            let target = self.get_value(object)?;
            let key = self.property_key(key)?;
            let value = self.get_value(value)?;
            ops::set_property(&target, key, value)?;
            Ok(WireValue::UNDEFINED)
        })
    }

    fn get_array_element(&self, array: f64, index: i32) -> WireValue {
        self.entry("GetArrayElement", || {
            let target = self.value_by_id(array)?;
            let key = PropertyKey::string(&index.to_string());
            let value = ops::get_property(&target, &key)?;
            self.make_ref_from(&value)
        })
    }

    fn set_array_element(&self, array: f64, index: i32, value: WireValue) -> WireValue {
        self.entry("SetArrayElement", || {
            let target = self.value_by_id(array)?;
            let key = PropertyKey::string(&index.to_string());
            let value = self.get_value(value)?;
            ops::set_property(&target, key, value)?;
            Ok(WireValue::UNDEFINED)
        })
    }

    fn create_callback(&self, param_names: f64) -> WireValue {
        self.entry("CreateCallback", || {
            let param_names = self
                .array_by_id(param_names)?
                .iter()
                .map(ops::to_display_string)
                .collect();
            self.register_special(TypeTag::Callback, SpecialData::Callback { param_names })
        })
    }

    fn create_shared_typed_array(&self, pointer: u32, type_code: i32, length: i32) -> WireValue {
        self.entry("CreateSharedTypedArray", || {
            let kind = typed_array_kind(type_code)?;
            let length = length_of(length)?;
            let buffer = self.memory.resolve(pointer).ok_or_else(|| {
                ScriptError::RangeError(format!("no buffer pinned at {:#x}", pointer))
            })?;
            if buffer.borrow().len() != length || buffer.borrow().kind() != kind {
                return Err(ScriptError::RangeError(format!(
                    "buffer at {:#x} is not a {} of length {}",
                    pointer, kind, length
                )));
            }
            self.register_special(
                TypeTag::SharedTypedArray,
                SpecialData::SharedArray {
                    kind,
                    pointer,
                    length,
                },
            )
        })
    }

    fn create_typed_array(&self, pointer: u32, type_code: i32, length: i32) -> WireValue {
        self.entry("CreateTypedArray", || {
            let kind = typed_array_kind(type_code)?;
            let length = length_of(length)?;
            let buffer = self.memory.resolve(pointer).ok_or_else(|| {
                ScriptError::RangeError(format!("no buffer pinned at {:#x}", pointer))
            })?;
            let data = {
                let source = buffer.borrow();
                let elements = source.as_slice().get(..length).ok_or_else(|| {
                    ScriptError::RangeError(format!(
                        "buffer at {:#x} holds fewer than {} elements",
                        pointer, length
                    ))
                })?;
                TypedArrayData::new(kind, elements.iter().copied())
            };
            self.make_ref_from(&ScriptValue::typed_array(data))
        })
    }

    fn create_empty_typed_array(&self, type_code: i32) -> WireValue {
        self.entry("CreateEmptyTypedArray", || {
            let kind = typed_array_kind(type_code)?;
            self.make_ref_from(&ScriptValue::empty_typed_array(kind))
        })
    }

    fn garbage_collect(&self, value: WireValue) -> WireValue {
        self.entry("GarbageCollect", || {
            let tag = value.type_tag()?;
            if !tag.is_reference_kind() {
                return Ok(WireValue::UNDEFINED);
            }
            let id = value.ref_id()?;
            let removed = self.registry.borrow_mut().remove(id);
            if let Some(Holder::Special(special)) = &removed {
                if let Some(registration) = special.registration.borrow().as_ref() {
                    FinalizationQueue::unregister(registration);
                }
            }
            if removed.is_some() {
                debug!(%id, %tag, "host collected reference");
            }
            drop(removed);
            Ok(WireValue::UNDEFINED)
        })
    }

    fn equals(&self, lhs: WireValue, rhs: WireValue) -> WireValue {
        self.entry("Equals", || {
            let lhs = self.get_value(lhs)?;
            let rhs = self.get_value(rhs)?;
            Ok(WireValue::boolean(ops::loose_equals(&lhs, &rhs)))
        })
    }

    fn get_number(&self, value: WireValue) -> WireValue {
        self.entry("GetNumber", || {
            let value = self.get_value(value)?;
            Ok(WireValue::number(ops::to_number(&value)?))
        })
    }

    fn get_string(&self, value: WireValue) -> WireText {
        if !self.is_initialized() {
            return WireText::exception();
        }
        trace!(operation = "GetString", "script boundary entry");
        match self.get_value(value) {
            Ok(value) => WireText::ok(ops::to_display_string(&value)),
            Err(err) => {
                debug!(operation = "GetString", error = %err, "script operation threw");
                WireText::exception()
            }
        }
    }

    fn respond_to_callback(&self, response_id: f64, value: WireValue) -> WireValue {
        self.entry("RespondToCallback", || {
            let unknown = ProtocolError::UnknownResponse {
                response_id: response_id as u64,
            };
            if response_id < 1.0 || response_id.fract() != 0.0 {
                return Err(unknown.into());
            }
            let response_id = response_id as u64;
            // reject before decoding so a stray response has no side effects
            self.responses.borrow().check(response_id)?;
            let completion = self.response_completion(value);
            self.responses.borrow_mut().fill(response_id, completion)?;
            Ok(WireValue::UNDEFINED)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct RecordingHooks {
        acquired: Cell<usize>,
        released: Cell<usize>,
    }

    impl HostHooks for RecordingHooks {
        fn on_callback(&self, _: f64, _: f64, _: WireValue, _: bool) {}

        fn acquire_reference(&self, _: f64) -> bool {
            self.acquired.set(self.acquired.get() + 1);
            true
        }

        fn release_reference(&self, _: f64) -> bool {
            self.released.set(self.released.get() + 1);
            true
        }
    }

    fn runtime() -> (Rc<ScriptRuntime>, Rc<RecordingHooks>) {
        let runtime = ScriptRuntime::new(Rc::new(SharedMemory::new()));
        let hooks = Rc::new(RecordingHooks::default());
        runtime.initialize_internal(hooks.clone()).unwrap();
        (runtime, hooks)
    }

    fn message_of(runtime: &ScriptRuntime, wire: WireValue) -> String {
        assert!(wire.is_exception());
        runtime
            .get_string(WireValue::new(wire.payload, TypeTag::String))
            .text
    }

    #[test]
    fn test_operations_before_initialize_throw() {
        let runtime = ScriptRuntime::new(Rc::new(SharedMemory::new()));
        assert!(runtime.create_empty_object().is_exception());
        assert!(runtime.get_string(WireValue::NULL).tag == TypeTag::Exception.code());
    }

    #[test]
    fn test_initialize_twice_is_rejected() {
        let (runtime, hooks) = runtime();
        assert_eq!(
            runtime.initialize_internal(hooks),
            Err(ProtocolError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_strings_reuse_ids() {
        let (runtime, _) = runtime();
        let a = runtime.create_string("same");
        let b = runtime.create_string("same");
        assert_eq!(a, b);
        assert_eq!(a.type_tag(), Ok(TypeTag::String));
        assert_ne!(runtime.create_string("other"), a);
    }

    #[test]
    fn test_thrown_error_carries_message() {
        let (runtime, _) = runtime();
        let missing = runtime.create_string("missing");
        let undefined = runtime.get_global_object(missing);
        assert!(undefined.is_undefined());

        let wire = runtime.invoke(runtime.create_empty_object(), missing, FixedArgs::default());
        assert_eq!(message_of(&runtime, wire), "TypeError: missing is not a function");
    }

    #[test]
    fn test_stale_id_throws() {
        let (runtime, _) = runtime();
        let object = runtime.create_empty_object();
        runtime.garbage_collect(object);
        let wire = runtime.get_prop(object, runtime.create_string("x"));
        assert!(message_of(&runtime, wire).starts_with("ReferenceError"));
        // collecting again is a no-op
        assert!(runtime.garbage_collect(object).is_undefined());
    }

    #[test]
    fn test_materialized_callback_is_released_once() {
        let (runtime, hooks) = runtime();
        let names = runtime.create_array();
        let callback = runtime.create_callback(names.payload);
        assert_eq!(callback.type_tag(), Ok(TypeTag::Callback));

        let holder = runtime.create_empty_object();
        let key = runtime.create_string("listener");
        runtime.set_prop(holder, key, callback);
        assert_eq!(hooks.acquired.get(), 1);

        // reading it back yields the same id and no new acquire
        assert_eq!(runtime.get_prop(holder, key), callback);
        assert_eq!(hooks.acquired.get(), 1);

        runtime.set_prop(holder, key, WireValue::NULL);
        assert_eq!(runtime.pending_finalizers(), 1);
        assert_eq!(runtime.run_finalizers(), 1);
        assert_eq!(hooks.released.get(), 1);
        assert_eq!(runtime.run_finalizers(), 0);

        // using it again pins it again
        runtime.set_prop(holder, key, callback);
        assert_eq!(hooks.acquired.get(), 2);
    }

    #[test]
    fn test_unanswered_callback_is_a_protocol_error() {
        let (runtime, _) = runtime();
        let names = runtime.create_array();
        let callback = runtime.create_callback(names.payload);
        let wire = runtime.call(callback.payload, FixedArgs::default());
        assert_eq!(
            message_of(&runtime, wire),
            "ProtocolError: callback response 1 was never delivered"
        );
    }

    #[test]
    fn test_stray_response_is_rejected() {
        let (runtime, _) = runtime();
        assert!(runtime
            .respond_to_callback(5.0, WireValue::number(1.0))
            .is_exception());
        assert!(runtime
            .respond_to_callback(0.5, WireValue::number(1.0))
            .is_exception());
    }
}

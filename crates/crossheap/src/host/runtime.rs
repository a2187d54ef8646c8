//! The host-side runtime
//!
//! [`HostRuntime`] is the process-scoped context for the host half of the
//! bridge. Every host operation goes through it: it encodes arguments,
//! crosses into the script runtime, decodes the reply, and keeps the host
//! registry in step with the wrappers it hands out.
//!
//! A fatal protocol error poisons the runtime. From then on every
//! operation fails with `Desynchronized` instead of running against
//! registries that no longer agree.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace, warn};

use crate::boundary::{ScriptBoundary, PROTOCOL_VERSION};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, ProtocolError, Result, PROTOCOL_ERROR_PREFIX};
use crate::memory::SharedMemory;
use crate::tag::TypeTag;
use crate::wire::{RefId, WireValue};

use super::cache::IdentityCache;
use super::callback::HostEndpoint;
use super::convert::FromJs;
use super::reference::{HostRef, RefData};
use super::registry::HostRegistry;
use super::value::JsValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RuntimeState {
    Live,
    Desynchronized,
    ShutDown,
}

/// The host half of the bridge.
pub struct HostRuntime {
    pub(crate) script: Rc<dyn ScriptBoundary>,
    pub(crate) memory: Rc<SharedMemory>,
    pub(crate) config: BridgeConfig,
    pub(crate) registry: RefCell<HostRegistry>,
    strings: RefCell<IdentityCache>,
    functions: RefCell<IdentityCache>,
    state: Cell<RuntimeState>,
    pub(crate) callback_depth: Cell<usize>,
    pub(crate) self_ref: Weak<HostRuntime>,
}

impl HostRuntime {
    /// Check the script runtime's protocol version and register the host
    /// hooks with it. Must be called exactly once per script runtime.
    pub fn initialize(
        script: Rc<dyn ScriptBoundary>,
        memory: Rc<SharedMemory>,
        config: BridgeConfig,
    ) -> Result<Rc<Self>> {
        let found = script.protocol_version();
        if found != PROTOCOL_VERSION {
            return Err(BridgeError::PlatformMismatch {
                expected: PROTOCOL_VERSION,
                found,
            });
        }

        let runtime = Rc::new_cyclic(|self_ref| HostRuntime {
            script: script.clone(),
            memory,
            config,
            registry: RefCell::new(HostRegistry::new()),
            strings: RefCell::new(IdentityCache::new()),
            functions: RefCell::new(IdentityCache::new()),
            state: Cell::new(RuntimeState::Live),
            callback_depth: Cell::new(0),
            self_ref: self_ref.clone(),
        });
        let endpoint = Rc::new(HostEndpoint::new(Rc::downgrade(&runtime)));
        script.initialize_internal(endpoint)?;
        debug!(version = PROTOCOL_VERSION, "host runtime initialized");
        Ok(runtime)
    }

    /// The configuration this runtime was built with
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Whether the runtime can still be used
    pub fn is_live(&self) -> bool {
        self.state.get() == RuntimeState::Live
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        match self.state.get() {
            RuntimeState::Live => Ok(()),
            RuntimeState::Desynchronized => Err(ProtocolError::Desynchronized.into()),
            RuntimeState::ShutDown => Err(BridgeError::ShutDown),
        }
    }

    /// Stop accepting operations after an unrecoverable error.
    pub(crate) fn poison(&self, err: &BridgeError) {
        if self.state.get() == RuntimeState::Live {
            error!(error = %err, "bridge desynchronized");
            self.state.set(RuntimeState::Desynchronized);
        }
    }

    /// Run a host operation: refuse when not live, poison on fatal errors.
    pub(crate) fn guarded<T>(&self, operation: &'static str, body: impl FnOnce() -> Result<T>) -> Result<T> {
        self.ensure_live()?;
        if self.config.trace_boundary {
            trace!(operation, "host boundary call");
        }
        let result = body();
        if let Err(err) = &result {
            if err.is_fatal() {
                self.poison(err);
            }
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════
    // Decoding
    // ═══════════════════════════════════════════════════════════════════

    /// Decode a reply, turning the Exception tag into an error.
    pub(crate) fn receive(&self, operation: &'static str, wire: WireValue) -> Result<JsValue> {
        self.check_exception(operation, wire)?;
        self.adopt(wire)
    }

    /// Fetch the message behind an Exception reply.
    pub(crate) fn check_exception(&self, operation: &'static str, wire: WireValue) -> Result<()> {
        if !wire.is_exception() {
            return Ok(());
        }
        if wire.payload == 0.0 {
            return Err(BridgeError::UnknownScript { operation });
        }
        let id = wire.ref_id()?;
        let message = WireValue::reference(id, TypeTag::String);
        let text = self.script.get_string(message);
        // the message string is transient unless a live wrapper shares its id
        if !self.registry.borrow().contains_live(id) {
            self.script.garbage_collect(message);
        }
        if text.tag == TypeTag::Exception.code() {
            return Err(BridgeError::UnknownScript { operation });
        }
        if let Some(detail) = text.text.strip_prefix(PROTOCOL_ERROR_PREFIX) {
            error!(operation, detail, "script runtime reported a protocol violation");
            return Err(ProtocolError::ScriptViolation(detail.to_owned()).into());
        }
        debug!(operation, message = %text.text, "script exception");
        Err(BridgeError::Script { message: text.text })
    }

    /// Wrap a received value, reusing the existing wrapper for known ids.
    pub(crate) fn adopt(&self, wire: WireValue) -> Result<JsValue> {
        let tag = wire.type_tag()?;
        match tag {
            TypeTag::Exception => return Err(ProtocolError::ExceptionAsValue.into()),
            TypeTag::Undefined => return Ok(JsValue::Undefined),
            TypeTag::Null => return Ok(JsValue::Null),
            TypeTag::Bool => return Ok(JsValue::Bool(wire.payload != 0.0)),
            TypeTag::Number => return Ok(JsValue::Number(wire.payload)),
            _ => {}
        }

        let id = wire.ref_id()?;
        let existing = self.registry.borrow().try_get(id);
        if let Some(reference) = existing {
            return Ok(JsValue::Ref(reference));
        }
        if tag.is_special() {
            return Err(ProtocolError::SpecialReferenceCollected { tag, id: id.get() }.into());
        }
        Ok(JsValue::Ref(self.wrap(id, tag, RefData::for_tag(tag))))
    }

    /// Create and register a wrapper for an id the host has not seen.
    pub(crate) fn wrap(&self, id: RefId, tag: TypeTag, data: RefData) -> HostRef {
        let reference = HostRef::new(id, tag, data, self.self_ref.clone());
        self.registry.borrow_mut().insert(&reference);
        debug!(%id, %tag, "registered host wrapper");
        reference
    }

    /// Expect a reference-kind reply.
    pub(crate) fn receive_ref(&self, operation: &'static str, wire: WireValue) -> Result<HostRef> {
        match self.receive(operation, wire)? {
            JsValue::Ref(reference) => Ok(reference),
            other => Err(BridgeError::coercion(other.tag(), "HostRef")),
        }
    }

    /// Host finalizer for a wrapper whose last handle was dropped.
    pub(crate) fn finalize_reference(&self, id: RefId, tag: TypeTag, data: &RefData) {
        let registered = self.registry.borrow_mut().remove_dead(id);
        if let RefData::SharedTypedArray { pointer, .. } = data {
            self.memory.free(*pointer);
        }
        if !registered || self.state.get() != RuntimeState::Live {
            return;
        }
        let reply = self.script.garbage_collect(WireValue::reference(id, tag));
        if reply.is_exception() {
            warn!(%id, %tag, "script rejected collection notice");
        } else {
            debug!(%id, %tag, "host wrapper collected");
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Globals and builders
    // ═══════════════════════════════════════════════════════════════════

    /// `globalThis[identifier]`
    pub fn get_global(&self, identifier: &str) -> Result<JsValue> {
        self.guarded("GetGlobal", || {
            let name = self.create_string(identifier)?;
            let wire = self.script.get_global_object(name.to_wire());
            self.receive("GetGlobal", wire)
        })
    }

    /// `new globalThis[identifier](...args)`
    pub fn create_host_object(&self, identifier: &str, args: &[JsValue]) -> Result<JsValue> {
        let constructor = self.get_global(identifier)?;
        self.construct(&constructor, args)
    }

    /// `{}`
    pub fn create_object(&self) -> Result<HostRef> {
        self.guarded("CreateEmptyObject", || {
            let wire = self.script.create_empty_object();
            self.receive_ref("CreateEmptyObject", wire)
        })
    }

    /// A string value. Equal strings yield the same wrapper.
    pub fn create_string(&self, text: &str) -> Result<HostRef> {
        self.guarded("CreateString", || {
            if self.config.cache_strings {
                if let Some(cached) = self.strings.borrow().get(text) {
                    return Ok(cached);
                }
            }
            let wire = self.script.create_string(text);
            let reference = self.receive_ref("CreateString", wire)?;
            reference.cache_text(text);
            if self.config.cache_strings {
                self.strings.borrow_mut().insert(text, &reference);
            }
            Ok(reference)
        })
    }

    /// An array holding `values`
    pub fn create_array(&self, values: &[JsValue]) -> Result<HostRef> {
        let array = self.guarded("CreateArray", || {
            let wire = self.script.create_array();
            self.receive_ref("CreateArray", wire)
        })?;
        for (index, value) in values.iter().enumerate() {
            self.set_array_element(&array, array_index(index)?, value)?;
        }
        Ok(array)
    }

    /// A BigInt holding `value`, built by the script's `BigInt` global.
    pub fn create_bigint(&self, value: i128) -> Result<JsValue> {
        let constructor = self.get_global("BigInt")?;
        let text = self.create_string(&value.to_string())?;
        self.call(&constructor, &[JsValue::Ref(text)])
    }

    /// Integer value of a BigInt
    pub fn bigint_value(&self, value: &JsValue) -> Result<i128> {
        if value.tag() != TypeTag::BigInt {
            return Err(BridgeError::coercion(value.tag(), "i128"));
        }
        self.to_js_string(value)?
            .parse()
            .map_err(|_| BridgeError::coercion(TypeTag::BigInt, "i128"))
    }

    /// `new Function(body)`, optionally memoized by source text.
    pub fn create_function(&self, body: &str, cache: bool) -> Result<HostRef> {
        let cache = cache && self.config.cache_functions;
        if cache {
            if let Some(cached) = self.functions.borrow().get(body) {
                return Ok(cached);
            }
        }
        let constructor = self.get_global("Function")?;
        let source = self.create_string(body)?;
        let function = HostRef::from_js(self, &self.construct(&constructor, &[JsValue::Ref(source)])?)?;
        if cache {
            self.functions.borrow_mut().insert(body, &function);
        }
        Ok(function)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Properties
    // ═══════════════════════════════════════════════════════════════════

    /// `target[key]`
    pub fn get_property(&self, target: &JsValue, key: &JsValue) -> Result<JsValue> {
        self.guarded("GetProp", || {
            let wire = self.script.get_prop(target.to_wire(), key.to_wire());
            self.receive("GetProp", wire)
        })
    }

    /// `target[name]`
    pub fn get(&self, target: &JsValue, name: &str) -> Result<JsValue> {
        let key = self.create_string(name)?;
        self.get_property(target, &JsValue::Ref(key))
    }

    /// `target[key] = value`
    pub fn set_property(&self, target: &JsValue, key: &JsValue, value: &JsValue) -> Result<()> {
        self.guarded("SetProp", || {
            let wire = self
                .script
                .set_prop(target.to_wire(), key.to_wire(), value.to_wire());
            self.check_exception("SetProp", wire)
        })
    }

    /// `target[name] = value`
    pub fn set(&self, target: &JsValue, name: &str, value: &JsValue) -> Result<()> {
        let key = self.create_string(name)?;
        self.set_property(target, &JsValue::Ref(key), value)
    }

    /// `array[index]`
    pub fn get_array_element(&self, array: &HostRef, index: i32) -> Result<JsValue> {
        self.guarded("GetArrayElement", || {
            let wire = self
                .script
                .get_array_element(array.id().to_payload(), index);
            self.receive("GetArrayElement", wire)
        })
    }

    /// `array[index] = value`
    pub fn set_array_element(&self, array: &HostRef, index: i32, value: &JsValue) -> Result<()> {
        self.guarded("SetArrayElement", || {
            let wire = self
                .script
                .set_array_element(array.id().to_payload(), index, value.to_wire());
            self.check_exception("SetArrayElement", wire)
        })
    }

    /// `array.length`
    pub fn array_length(&self, array: &JsValue) -> Result<usize> {
        let length = f64::from_js(self, &self.get(array, "length")?)?;
        if length < 0.0 || length.fract() != 0.0 {
            return Err(BridgeError::coercion(TypeTag::Number, "usize"));
        }
        Ok(length as usize)
    }

    /// Every element of an array-like value
    pub fn array_to_vec(&self, array: &JsValue) -> Result<Vec<JsValue>> {
        let reference = HostRef::from_js(self, array)?;
        (0..self.array_length(array)?)
            .map(|index| self.get_array_element(&reference, array_index(index)?))
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Coercions
    // ═══════════════════════════════════════════════════════════════════

    /// `Number(value)`
    pub fn to_number(&self, value: &JsValue) -> Result<f64> {
        match value {
            JsValue::Undefined => Ok(f64::NAN),
            JsValue::Null => Ok(0.0),
            JsValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            JsValue::Number(n) => Ok(*n),
            JsValue::Ref(reference) => self.guarded("GetNumber", || {
                let wire = self.script.get_number(reference.to_wire());
                self.check_exception("GetNumber", wire)?;
                Ok(wire.payload)
            }),
        }
    }

    /// `String(value)`
    pub fn to_js_string(&self, value: &JsValue) -> Result<String> {
        if let Some(text) = value.as_host_ref().and_then(HostRef::cached_text) {
            return Ok(text.to_string());
        }
        self.guarded("GetString", || {
            let text = self.script.get_string(value.to_wire());
            if text.tag == TypeTag::Exception.code() {
                return Err(BridgeError::UnknownScript {
                    operation: "GetString",
                });
            }
            if let Some(reference) = value.as_host_ref() {
                reference.cache_text(&text.text);
            }
            Ok(text.text)
        })
    }

    /// Script truthiness
    pub fn truthy(&self, value: &JsValue) -> Result<bool> {
        Ok(match value {
            JsValue::Undefined | JsValue::Null => false,
            JsValue::Bool(b) => *b,
            JsValue::Number(n) => !(n.is_nan() || *n == 0.0),
            JsValue::Ref(reference) => match reference.tag() {
                TypeTag::String => !self.to_js_string(value)?.is_empty(),
                TypeTag::BigInt => self.to_js_string(value)? != "0",
                _ => true,
            },
        })
    }

    /// Loose equality `lhs == rhs`, evaluated by the script
    pub fn equals_js(&self, lhs: &JsValue, rhs: &JsValue) -> Result<bool> {
        self.guarded("Equals", || {
            let wire = self.script.equals(lhs.to_wire(), rhs.to_wire());
            self.check_exception("Equals", wire)?;
            Ok(wire.payload != 0.0)
        })
    }

    /// Convert with [`FromJs`]
    pub fn extract<T: FromJs>(&self, value: &JsValue) -> Result<T> {
        T::from_js(self, value)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Diagnostics and teardown
    // ═══════════════════════════════════════════════════════════════════

    /// Keep-alive count of a wrapper; zero when unpinned
    pub fn keep_alive_count(&self, reference: &HostRef) -> usize {
        self.registry.borrow().pin_count(reference.id())
    }

    /// Number of ids with a live wrapper
    pub fn registry_len(&self) -> usize {
        self.registry.borrow().live_count()
    }

    /// Weak lookup by id. Never returns a collected wrapper.
    pub fn try_get_ref(&self, id: RefId) -> Option<HostRef> {
        self.registry.borrow().try_get(id)
    }

    /// Release every pin, clear the registry and caches, and refuse all
    /// later operations.
    pub fn shutdown(&self) {
        if self.state.get() == RuntimeState::ShutDown {
            return;
        }
        self.state.set(RuntimeState::ShutDown);
        let pinned = self.registry.borrow_mut().drain();
        self.strings.borrow_mut().clear();
        self.functions.borrow_mut().clear();
        debug!(pinned = pinned.len(), "host runtime shut down");
        drop(pinned);
    }
}

pub(crate) fn array_index(index: usize) -> Result<i32> {
    i32::try_from(index)
        .map_err(|_| BridgeError::InvalidOperation(format!("array index {} out of range", index)))
}

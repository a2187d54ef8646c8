//! Script-to-host callbacks and the keep-alive hooks
//!
//! [`HostEndpoint`] is what the script runtime receives at initialization.
//! A callback dispatch must be answered with `RespondToCallback` before
//! `on_callback` returns; the script frame reads the answer as soon as the
//! call comes back.

use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::boundary::HostHooks;
use crate::error::{BridgeError, ProtocolError, Result};
use crate::tag::TypeTag;
use crate::wire::{RefId, WireValue};

use super::reference::{HostFn, HostRef, RefData};
use super::registry::Release;
use super::runtime::HostRuntime;
use super::value::JsValue;

/// Host entry points registered with the script runtime.
pub(crate) struct HostEndpoint {
    runtime: Weak<HostRuntime>,
}

impl HostEndpoint {
    pub(crate) fn new(runtime: Weak<HostRuntime>) -> Self {
        HostEndpoint { runtime }
    }
}

impl HostHooks for HostEndpoint {
    fn on_callback(&self, callback_id: f64, response_id: f64, arg: WireValue, args_are_array: bool) {
        match self.runtime.upgrade() {
            Some(runtime) => runtime.on_js_callback(callback_id, response_id, arg, args_are_array),
            None => warn!(callback_id, "callback dispatched after the host runtime was dropped"),
        }
    }

    fn acquire_reference(&self, id: f64) -> bool {
        self.runtime
            .upgrade()
            .is_some_and(|runtime| runtime.acquire_reference(id))
    }

    fn release_reference(&self, id: f64) -> bool {
        self.runtime
            .upgrade()
            .is_some_and(|runtime| runtime.release_reference(id))
    }
}

/// Limits how deeply script and host callbacks may nest.
struct DepthGuard<'a> {
    runtime: &'a HostRuntime,
}

impl<'a> DepthGuard<'a> {
    fn enter(runtime: &'a HostRuntime) -> Result<Self> {
        let depth = runtime.callback_depth.get();
        let max = runtime.config.max_callback_depth;
        if depth >= max {
            return Err(BridgeError::CallDepthExceeded { depth, max });
        }
        runtime.callback_depth.set(depth + 1);
        Ok(DepthGuard { runtime })
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        let depth = &self.runtime.callback_depth;
        depth.set(depth.get().saturating_sub(1));
    }
}

impl HostRuntime {
    /// Expose `handler` to the script as a function taking `param_names`.
    ///
    /// The declared parameter count decides how the script packs
    /// arguments, and the handler always receives exactly that many.
    pub fn create_callback<F>(&self, param_names: &[&str], handler: F) -> Result<HostRef>
    where
        F: Fn(&HostRuntime, &[JsValue]) -> Result<JsValue> + 'static,
    {
        let names = param_names
            .iter()
            .map(|name| self.create_string(name).map(JsValue::Ref))
            .collect::<Result<Vec<_>>>()?;
        let names = self.create_array(&names)?;
        let handler: HostFn = Rc::new(handler);

        self.guarded("CreateCallback", || {
            let wire = self.script.create_callback(names.id().to_payload());
            self.check_exception("CreateCallback", wire)?;
            let tag = wire.type_tag()?;
            if tag != TypeTag::Callback {
                return Err(BridgeError::coercion(tag, "Callback"));
            }
            let data = RefData::Callback {
                param_count: param_names.len(),
                handler,
            };
            Ok(self.wrap(wire.ref_id()?, tag, data))
        })
    }

    /// Run a callback's handler with its arguments fitted to the declared
    /// parameter count.
    pub(crate) fn run_callback(&self, callback: &HostRef, mut args: Vec<JsValue>) -> Result<JsValue> {
        let (param_count, handler) = match &callback.0.data {
            RefData::Callback {
                param_count,
                handler,
            } => (*param_count, handler.clone()),
            _ => return Err(BridgeError::coercion(callback.tag(), "Callback")),
        };
        let _guard = DepthGuard::enter(self)?;
        args.resize(param_count, JsValue::Undefined);
        handler(self, &args)
    }

    fn on_js_callback(&self, callback_id: f64, response_id: f64, arg: WireValue, args_are_array: bool) {
        if self.config.trace_boundary {
            trace!(callback_id, response_id, args_are_array, "callback from script");
        }
        let outcome = self.handle_js_callback(callback_id, arg, args_are_array);

        // both the result and the message must outlive the respond call
        let (reply, _keep) = match &outcome {
            Ok(value) => (value.to_wire(), None),
            Err(err) => {
                debug!(error = %err, "host callback failed");
                match self.create_string(&err.to_string()) {
                    Ok(message) => (WireValue::exception(Some(message.id())), Some(message)),
                    Err(_) => (WireValue::exception(None), None),
                }
            }
        };

        let ack = self.script.respond_to_callback(response_id, reply);
        if ack.is_exception() {
            let err = self
                .check_exception("RespondToCallback", ack)
                .err()
                .unwrap_or(BridgeError::UnknownScript {
                    operation: "RespondToCallback",
                });
            self.poison(&err);
        }
        if let Err(err) = &outcome {
            if err.is_fatal() {
                self.poison(err);
            }
        }
    }

    fn handle_js_callback(&self, callback_id: f64, arg: WireValue, args_are_array: bool) -> Result<JsValue> {
        self.ensure_live()?;
        let id = RefId::from_payload(callback_id)?;
        let callback = self.registry.borrow().try_get(id);
        let callback = callback.ok_or(ProtocolError::SpecialReferenceCollected {
            tag: TypeTag::Callback,
            id: id.get(),
        })?;

        let arg = self.adopt(arg)?;
        let args = if args_are_array {
            self.array_to_vec(&arg)?
        } else {
            vec![arg]
        };
        self.run_callback(&callback, args)
    }

    /// Add one keep-alive pin to the wrapper for `id`.
    ///
    /// This is the entry point the script calls when it materializes a
    /// special reference. It returns false, and logs, when no live wrapper
    /// exists; the two collectors race, so that is not treated as fatal.
    pub fn acquire_reference(&self, id: f64) -> bool {
        let Ok(id) = RefId::from_payload(id) else {
            warn!(id, "acquire of malformed reference id");
            return false;
        };
        let count = self.registry.borrow_mut().acquire(id);
        match count {
            Some(1) => {
                debug!(%id, "pinned host wrapper");
                true
            }
            Some(_) => true,
            None => {
                warn!(%id, "acquire of unknown reference");
                false
            }
        }
    }

    /// Remove one keep-alive pin from the wrapper for `id`. The last
    /// release unpins it. Returns false when there was nothing to release.
    pub fn release_reference(&self, id: f64) -> bool {
        let Ok(id) = RefId::from_payload(id) else {
            warn!(id, "release of malformed reference id");
            return false;
        };
        let outcome = self.registry.borrow_mut().release(id);
        match outcome {
            Release::Decremented(remaining) => {
                trace!(%id, remaining, "released keep-alive pin");
                true
            }
            Release::Unpinned(strong) => {
                debug!(%id, "unpinned host wrapper");
                drop(strong);
                true
            }
            Release::NotPinned => {
                warn!(%id, "release of reference that is not pinned");
                false
            }
            Release::NotFound => {
                warn!(%id, "release of unknown reference");
                false
            }
        }
    }
}

//! Awaiting script promises from the host
//!
//! Nothing suspends across the boundary. The host registers a pair of
//! callbacks through `then` and later polls the task for the outcome.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{BridgeError, Result};

use super::reference::HostRef;
use super::runtime::HostRuntime;
use super::value::JsValue;

type Outcome = Rc<RefCell<Option<Result<JsValue>>>>;

/// Host-side view of a pending script promise.
pub struct PromiseTask {
    outcome: Outcome,
    callbacks: RefCell<Option<(HostRef, HostRef)>>,
}

impl PromiseTask {
    /// Whether the promise has settled
    pub fn is_settled(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// The outcome once settled. The settle callbacks are released on the
    /// first successful poll.
    pub fn poll(&self) -> Option<Result<JsValue>> {
        let outcome = self.outcome.borrow().clone()?;
        let callbacks = self.callbacks.borrow_mut().take();
        drop(callbacks);
        Some(outcome)
    }
}

impl HostRuntime {
    /// Start observing `promise`.
    pub fn promise_task(&self, promise: &JsValue) -> Result<PromiseTask> {
        let outcome: Outcome = Rc::new(RefCell::new(None));

        let fulfilled = outcome.clone();
        let on_fulfilled = self.create_callback(&["value"], move |_, args| {
            let mut slot = fulfilled.borrow_mut();
            if slot.is_none() {
                *slot = Some(Ok(args[0].clone()));
            }
            Ok(JsValue::Undefined)
        })?;

        let rejected = outcome.clone();
        let on_rejected = self.create_callback(&["reason"], move |runtime, args| {
            let reason = runtime
                .to_js_string(&args[0])
                .unwrap_or_else(|err| err.to_string());
            let mut slot = rejected.borrow_mut();
            if slot.is_none() {
                *slot = Some(Err(BridgeError::Script {
                    message: format!("Promise rejected: {}", reason),
                }));
            }
            Ok(JsValue::Undefined)
        })?;

        self.invoke(
            promise,
            "then",
            &[JsValue::Ref(on_fulfilled.clone()), JsValue::Ref(on_rejected.clone())],
        )?;
        Ok(PromiseTask {
            outcome,
            callbacks: RefCell::new(Some((on_fulfilled, on_rejected))),
        })
    }
}

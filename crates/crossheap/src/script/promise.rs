//! Thenable objects
//!
//! A promise here is a plain object with a native `then`. Reactions run
//! synchronously: registering on a settled promise calls the reaction
//! right away, settling a pending one calls every queued reaction before
//! `resolve`/`reject` returns.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::ScriptError;

use super::ops;
use super::value::{PropertyKey, ScriptValue};

enum PromiseState {
    Pending(Vec<Reaction>),
    Fulfilled(ScriptValue),
    Rejected(ScriptValue),
}

struct Reaction {
    on_fulfilled: ScriptValue,
    on_rejected: ScriptValue,
}

impl Reaction {
    fn run(&self, outcome: &Outcome) -> Result<(), ScriptError> {
        let (handler, value) = match outcome {
            Outcome::Fulfilled(value) => (&self.on_fulfilled, value),
            Outcome::Rejected(reason) => (&self.on_rejected, reason),
        };
        if handler.as_object().is_some_and(|o| o.is_function()) {
            ops::call_function(handler, &ScriptValue::Undefined, std::slice::from_ref(value))?;
        }
        Ok(())
    }
}

enum Outcome {
    Fulfilled(ScriptValue),
    Rejected(ScriptValue),
}

/// Settles the promise it was created with. Only the first settlement
/// counts.
#[derive(Clone)]
pub struct PromiseResolver {
    state: Rc<RefCell<PromiseState>>,
}

impl PromiseResolver {
    /// Fulfill with `value`
    pub fn resolve(&self, value: ScriptValue) -> Result<(), ScriptError> {
        self.settle(Outcome::Fulfilled(value))
    }

    /// Reject with `reason`
    pub fn reject(&self, reason: ScriptValue) -> Result<(), ScriptError> {
        self.settle(Outcome::Rejected(reason))
    }

    /// Whether the promise has settled
    pub fn is_settled(&self) -> bool {
        !matches!(*self.state.borrow(), PromiseState::Pending(_))
    }

    fn settle(&self, outcome: Outcome) -> Result<(), ScriptError> {
        let settled = match &outcome {
            Outcome::Fulfilled(value) => PromiseState::Fulfilled(value.clone()),
            Outcome::Rejected(reason) => PromiseState::Rejected(reason.clone()),
        };
        let reactions = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                PromiseState::Pending(reactions) => std::mem::take(reactions),
                _ => return Ok(()),
            }
        };
        *self.state.borrow_mut() = settled;
        for reaction in &reactions {
            reaction.run(&outcome)?;
        }
        Ok(())
    }
}

/// Create a pending promise and the handle that settles it.
pub fn create_promise() -> (ScriptValue, PromiseResolver) {
    let state = Rc::new(RefCell::new(PromiseState::Pending(Vec::new())));
    let resolver = PromiseResolver {
        state: state.clone(),
    };

    let then = ScriptValue::native_fn("then", move |_this, args| {
        let reaction = Reaction {
            on_fulfilled: args.first().cloned().unwrap_or_default(),
            on_rejected: args.get(1).cloned().unwrap_or_default(),
        };
        let outcome = {
            let mut current = state.borrow_mut();
            match &mut *current {
                PromiseState::Pending(reactions) => {
                    reactions.push(reaction);
                    return Ok(ScriptValue::Undefined);
                }
                PromiseState::Fulfilled(value) => Outcome::Fulfilled(value.clone()),
                PromiseState::Rejected(reason) => Outcome::Rejected(reason.clone()),
            }
        };
        reaction.run(&outcome)?;
        Ok(ScriptValue::Undefined)
    });

    let promise = ScriptValue::object();
    if let Some(object) = promise.as_object() {
        object
            .borrow_mut()
            .properties
            .insert(PropertyKey::string("then"), then);
    }
    (promise, resolver)
}

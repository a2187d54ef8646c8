//! Post-collection notification for materialized special references
//!
//! A [`FinalizerToken`] rides inside a materialized object. When the object
//! is collected the token is dropped and, if still armed, queues the
//! reference id. The queue is drained later, so the keep-alive count on the
//! host may briefly exceed the script's live set; it converges once
//! [`FinalizationQueue::pop`] has been run to empty.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::wire::RefId;

/// Switch shared by a token and its registration; disarming it is the
/// equivalent of unregistering the finalizer.
pub(crate) type Registration = Rc<Cell<bool>>;

/// Pending ids of collected objects.
#[derive(Debug, Default)]
pub(crate) struct FinalizationQueue {
    pending: Rc<RefCell<VecDeque<RefId>>>,
}

impl FinalizationQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Create a token for `id`. Attach it to the object being watched.
    pub(crate) fn register(&self, id: RefId) -> (FinalizerToken, Registration) {
        let armed = Rc::new(Cell::new(true));
        let token = FinalizerToken {
            id,
            queue: Rc::downgrade(&self.pending),
            armed: armed.clone(),
        };
        (token, armed)
    }

    /// Cancel a registration; the token will not queue anything.
    pub(crate) fn unregister(registration: &Registration) {
        registration.set(false);
    }

    /// Take the oldest pending id
    pub(crate) fn pop(&self) -> Option<RefId> {
        self.pending.borrow_mut().pop_front()
    }

    /// Number of ids waiting to be released
    pub(crate) fn len(&self) -> usize {
        self.pending.borrow().len()
    }
}

/// Drop hook carried by a watched object.
pub(crate) struct FinalizerToken {
    id: RefId,
    queue: Weak<RefCell<VecDeque<RefId>>>,
    armed: Registration,
}

impl Drop for FinalizerToken {
    fn drop(&mut self) {
        if !self.armed.get() {
            return;
        }
        self.armed.set(false);
        if let Some(queue) = self.queue.upgrade() {
            queue.borrow_mut().push_back(self.id);
        }
    }
}

//! Host-side reference registry and keep-alive pins
//!
//! Ids map to weak handles, so the registry alone never keeps a wrapper
//! alive. A pin is the exception: while the script holds a materialized
//! callback or shared buffer, the pin owns a strong handle to its wrapper.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::wire::RefId;

use super::reference::{HostRef, RefInner};

struct Pin {
    count: usize,
    strong: Rc<RefInner>,
}

/// Outcome of a release
pub(crate) enum Release {
    /// No live wrapper for the id
    NotFound,
    /// The wrapper exists but holds no pin
    NotPinned,
    /// Count went down but is still positive
    Decremented(usize),
    /// Count reached zero. The strong handle is handed back so it can be
    /// dropped outside the registry borrow.
    Unpinned(Rc<RefInner>),
}

#[derive(Default)]
pub(crate) struct HostRegistry {
    refs: HashMap<RefId, Weak<RefInner>>,
    pins: HashMap<RefId, Pin>,
}

impl HostRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Weak lookup. A dead handle counts as absent and is never revived.
    pub(crate) fn try_get(&self, id: RefId) -> Option<HostRef> {
        self.refs.get(&id).and_then(Weak::upgrade).map(HostRef)
    }

    pub(crate) fn contains_live(&self, id: RefId) -> bool {
        self.refs
            .get(&id)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    pub(crate) fn insert(&mut self, reference: &HostRef) {
        self.refs.insert(reference.id(), reference.downgrade());
    }

    /// Remove `id` if its wrapper is gone. Returns whether it was removed.
    pub(crate) fn remove_dead(&mut self, id: RefId) -> bool {
        let dead = self
            .refs
            .get(&id)
            .is_some_and(|weak| weak.strong_count() == 0);
        if dead {
            self.refs.remove(&id);
        }
        dead
    }

    /// Increment the keep-alive count, pinning on the first acquire.
    /// Returns the new count, or `None` when there is no live wrapper.
    pub(crate) fn acquire(&mut self, id: RefId) -> Option<usize> {
        if let Some(pin) = self.pins.get_mut(&id) {
            pin.count += 1;
            return Some(pin.count);
        }
        let strong = self.refs.get(&id).and_then(Weak::upgrade)?;
        self.pins.insert(id, Pin { count: 1, strong });
        Some(1)
    }

    pub(crate) fn release(&mut self, id: RefId) -> Release {
        let live = self.contains_live(id);
        let Some(pin) = self.pins.get_mut(&id) else {
            return if live {
                Release::NotPinned
            } else {
                Release::NotFound
            };
        };
        if pin.count > 1 {
            pin.count -= 1;
            return Release::Decremented(pin.count);
        }
        match self.pins.remove(&id) {
            Some(pin) => Release::Unpinned(pin.strong),
            None => Release::NotFound,
        }
    }

    pub(crate) fn pin_count(&self, id: RefId) -> usize {
        self.pins.get(&id).map_or(0, |pin| pin.count)
    }

    /// Number of ids with a live wrapper
    pub(crate) fn live_count(&self) -> usize {
        self.refs
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Clear everything; pinned handles are returned for the caller to drop.
    pub(crate) fn drain(&mut self) -> Vec<Rc<RefInner>> {
        self.refs.clear();
        self.pins.drain().map(|(_, pin)| pin.strong).collect()
    }
}

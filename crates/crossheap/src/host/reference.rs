//! Host-side wrappers for script references
//!
//! A [`HostRef`] is the host's handle on one registry id. Clones share the
//! wrapper; when the last clone is dropped the wrapper is finalized: the id
//! leaves the host registry, the script is told to forget it, and a shared
//! buffer pin is freed.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::Result;
use crate::memory::SharedBuffer;
use crate::tag::TypeTag;
use crate::wire::{RefId, WireValue};

use super::runtime::HostRuntime;
use super::value::JsValue;

/// Host callback body: receives exactly the declared number of arguments.
pub type HostFn = Rc<dyn Fn(&HostRuntime, &[JsValue]) -> Result<JsValue>>;

/// Shared handle on a host wrapper.
#[derive(Clone)]
pub struct HostRef(pub(crate) Rc<RefInner>);

pub(crate) struct RefInner {
    pub(crate) id: RefId,
    pub(crate) tag: TypeTag,
    pub(crate) data: RefData,
    pub(crate) runtime: Weak<HostRuntime>,
}

/// Host-only state attached to a wrapper
pub(crate) enum RefData {
    Plain,
    String {
        /// Text, once known
        text: RefCell<Option<Rc<str>>>,
    },
    Callback {
        param_count: usize,
        handler: HostFn,
    },
    SharedTypedArray {
        pointer: u32,
        buffer: SharedBuffer,
    },
}

impl RefData {
    pub(crate) fn for_tag(tag: TypeTag) -> Self {
        match tag {
            TypeTag::String => RefData::String {
                text: RefCell::new(None),
            },
            _ => RefData::Plain,
        }
    }
}

impl HostRef {
    pub(crate) fn new(id: RefId, tag: TypeTag, data: RefData, runtime: Weak<HostRuntime>) -> Self {
        HostRef(Rc::new(RefInner {
            id,
            tag,
            data,
            runtime,
        }))
    }

    /// Registry id shared with the script side
    pub fn id(&self) -> RefId {
        self.0.id
    }

    /// Kind of the referenced value
    pub fn tag(&self) -> TypeTag {
        self.0.tag
    }

    /// Whether both handles are the same wrapper
    pub fn ptr_eq(&self, other: &HostRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Encode for the wire
    pub fn to_wire(&self) -> WireValue {
        WireValue::reference(self.0.id, self.0.tag)
    }

    /// Cached text of a string wrapper
    pub(crate) fn cached_text(&self) -> Option<Rc<str>> {
        match &self.0.data {
            RefData::String { text } => text.borrow().clone(),
            _ => None,
        }
    }

    pub(crate) fn cache_text(&self, value: &str) {
        if let RefData::String { text } = &self.0.data {
            *text.borrow_mut() = Some(Rc::from(value));
        }
    }

    /// Backing buffer of a shared typed array
    pub(crate) fn shared_buffer(&self) -> Option<SharedBuffer> {
        match &self.0.data {
            RefData::SharedTypedArray { buffer, .. } => Some(buffer.clone()),
            _ => None,
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<RefInner> {
        Rc::downgrade(&self.0)
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0.tag, self.0.id)
    }
}

impl Drop for RefInner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.finalize_reference(self.id, self.tag, &self.data);
        }
    }
}

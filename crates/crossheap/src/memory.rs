//! Pinned buffer arena visible to both runtimes
//!
//! Stands in for the linear memory a host and an embedded engine share.
//! The host pins a buffer and hands the script a numeric "pointer"; the
//! script resolves that pointer to the same buffer and builds a view that
//! aliases it. Nothing is copied for shared typed arrays.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::tag::TypedArrayKind;

/// Typed array contents: element kind plus values.
///
/// Elements are stored as doubles and coerced on write, so one
/// representation covers every element kind.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArrayData {
    kind: TypedArrayKind,
    elements: Vec<f64>,
}

impl TypedArrayData {
    /// Buffer of `kind` holding `values`, each coerced to the element type
    pub fn new(kind: TypedArrayKind, values: impl IntoIterator<Item = f64>) -> Self {
        TypedArrayData {
            kind,
            elements: values.into_iter().map(|v| kind.coerce(v)).collect(),
        }
    }

    /// Zero-filled buffer
    pub fn zeroed(kind: TypedArrayKind, length: usize) -> Self {
        TypedArrayData {
            kind,
            elements: vec![0.0; length],
        }
    }

    /// Element kind
    pub fn kind(&self) -> TypedArrayKind {
        self.kind
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether there are no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Read an element
    pub fn get(&self, index: usize) -> Option<f64> {
        self.elements.get(index).copied()
    }

    /// Write an element; out-of-bounds writes are ignored like the script
    /// engine does.
    pub fn set(&mut self, index: usize, value: f64) -> bool {
        match self.elements.get_mut(index) {
            Some(slot) => {
                *slot = self.kind.coerce(value);
                true
            }
            None => false,
        }
    }

    /// All elements
    pub fn as_slice(&self) -> &[f64] {
        &self.elements
    }
}

/// A buffer both sides can hold at once
pub type SharedBuffer = Rc<RefCell<TypedArrayData>>;

/// Arena of pinned host buffers addressed by pointer.
#[derive(Debug)]
pub struct SharedMemory {
    buffers: RefCell<HashMap<u32, SharedBuffer>>,
    next_pointer: Cell<u32>,
}

impl Default for SharedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedMemory {
    /// Empty arena. Pointer 0 is never handed out.
    pub fn new() -> Self {
        SharedMemory {
            buffers: RefCell::new(HashMap::new()),
            next_pointer: Cell::new(8),
        }
    }

    /// Pin a buffer and return its address.
    pub fn pin(&self, buffer: SharedBuffer) -> u32 {
        let pointer = self.next_pointer.get();
        // 8-aligned, 0 skipped on wrap
        self.next_pointer.set(pointer.wrapping_add(8).max(8));
        self.buffers.borrow_mut().insert(pointer, buffer);
        pointer
    }

    /// Resolve an address
    pub fn resolve(&self, pointer: u32) -> Option<SharedBuffer> {
        self.buffers.borrow().get(&pointer).cloned()
    }

    /// Unpin. Views that still hold the buffer keep it alive, but the
    /// address is no longer resolvable.
    pub fn free(&self, pointer: u32) -> Option<SharedBuffer> {
        self.buffers.borrow_mut().remove(&pointer)
    }

    /// Number of pinned buffers
    pub fn pinned_count(&self) -> usize {
        self.buffers.borrow().len()
    }
}

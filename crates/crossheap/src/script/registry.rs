//! Script-side reference registry
//!
//! Every value the host can name has exactly one id here. Objects are
//! indexed by identity, primitive reference kinds by value, so producing
//! the same object or the same string twice yields the same id. Entries
//! created by the host for callbacks and shared buffers are *special*:
//! they hold no script object until first use, and the materialized
//! object is only cached weakly.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::ProtocolError;
use crate::tag::{TypeTag, TypedArrayKind};
use crate::wire::{RefId, RefIdAllocator};

use super::finalize::Registration;
use super::value::{ObjectRef, ScriptValue, WeakObject};

/// Value-equality key for primitive reference kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PrimitiveKey {
    String(Rc<str>),
    /// Symbols are unique, so the address is the key
    Symbol(usize),
    BigInt(i128),
}

impl PrimitiveKey {
    fn of(value: &ScriptValue) -> Option<Self> {
        match value {
            ScriptValue::String(s) => Some(PrimitiveKey::String(s.clone())),
            ScriptValue::Symbol(s) => Some(PrimitiveKey::Symbol(Rc::as_ptr(s) as usize)),
            ScriptValue::BigInt(n) => Some(PrimitiveKey::BigInt(*n)),
            _ => None,
        }
    }
}

/// What a registry slot holds.
#[derive(Clone)]
pub(crate) enum Holder {
    /// A script value, kept alive until the host collects its wrapper
    Value { tag: TypeTag, value: ScriptValue },
    /// A host-originated reference
    Special(Rc<SpecialReference>),
}

impl Holder {
    pub(crate) fn tag(&self) -> TypeTag {
        match self {
            Holder::Value { tag, .. } => *tag,
            Holder::Special(special) => special.tag,
        }
    }
}

/// A callback or shared buffer registered by the host.
pub(crate) struct SpecialReference {
    pub(crate) id: RefId,
    pub(crate) tag: TypeTag,
    pub(crate) data: SpecialData,
    /// Materialized object, if one is alive
    pub(crate) cached: RefCell<Option<WeakObject>>,
    /// Finalizer switch of the current materialization
    pub(crate) registration: RefCell<Option<Registration>>,
}

/// Everything needed to rebuild a special reference's object
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SpecialData {
    Callback {
        param_names: Vec<String>,
    },
    SharedArray {
        kind: TypedArrayKind,
        pointer: u32,
        length: usize,
    },
}

/// Id map plus the two reverse indices.
#[derive(Default)]
pub(crate) struct ScriptRegistry {
    ids: RefIdAllocator,
    holders: HashMap<RefId, Holder>,
    objects: HashMap<usize, (WeakObject, RefId)>,
    primitives: HashMap<PrimitiveKey, RefId>,
}

impl ScriptRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Existing id and tag for `value`, if it was registered before.
    pub(crate) fn lookup(&self, value: &ScriptValue) -> Option<(RefId, TypeTag)> {
        let id = match value {
            ScriptValue::Object(object) => self
                .objects
                .get(&object.address())
                .filter(|(weak, _)| weak.upgrade().is_some_and(|live| live.ptr_eq(object)))
                .map(|(_, id)| *id)?,
            other => *self.primitives.get(&PrimitiveKey::of(other)?)?,
        };
        self.holders.get(&id).map(|holder| (id, holder.tag()))
    }

    /// Register a value under a fresh id.
    pub(crate) fn insert(&mut self, value: ScriptValue, tag: TypeTag) -> Result<RefId, ProtocolError> {
        let id = self.ids.allocate()?;
        match &value {
            ScriptValue::Object(object) => self.map_object(object, id),
            other => {
                if let Some(key) = PrimitiveKey::of(other) {
                    self.primitives.insert(key, id);
                }
            }
        }
        self.holders.insert(id, Holder::Value { tag, value });
        Ok(id)
    }

    /// Register a host-originated reference under a fresh id.
    pub(crate) fn insert_special(
        &mut self,
        tag: TypeTag,
        data: SpecialData,
    ) -> Result<Rc<SpecialReference>, ProtocolError> {
        let id = self.ids.allocate()?;
        let special = Rc::new(SpecialReference {
            id,
            tag,
            data,
            cached: RefCell::new(None),
            registration: RefCell::new(None),
        });
        self.holders.insert(id, Holder::Special(special.clone()));
        Ok(special)
    }

    pub(crate) fn holder(&self, id: RefId) -> Option<Holder> {
        self.holders.get(&id).cloned()
    }

    pub(crate) fn contains(&self, id: RefId) -> bool {
        self.holders.contains_key(&id)
    }

    /// Point the identity index for `object` at `id`.
    pub(crate) fn map_object(&mut self, object: &ObjectRef, id: RefId) {
        self.objects
            .insert(object.address(), (object.downgrade(), id));
    }

    /// Forget `id`. The removed holder is returned so the caller can drop
    /// it after releasing the registry borrow.
    pub(crate) fn remove(&mut self, id: RefId) -> Option<Holder> {
        let holder = self.holders.remove(&id)?;
        match &holder {
            Holder::Value { value, .. } => match value {
                ScriptValue::Object(object) => self.unmap_object(object.address(), id),
                other => {
                    if let Some(key) = PrimitiveKey::of(other) {
                        self.primitives.remove(&key);
                    }
                }
            },
            Holder::Special(special) => {
                let cached = special.cached.borrow().as_ref().and_then(WeakObject::upgrade);
                if let Some(object) = cached {
                    self.unmap_object(object.address(), id);
                }
            }
        }
        Some(holder)
    }

    fn unmap_object(&mut self, address: usize, id: RefId) {
        if self.objects.get(&address).is_some_and(|(_, mapped)| *mapped == id) {
            self.objects.remove(&address);
        }
    }

    /// Drop identity entries whose object has been collected.
    pub(crate) fn prune(&mut self) {
        self.objects.retain(|_, (weak, _)| weak.is_alive());
    }

    /// Take every holder out, leaving the registry empty.
    pub(crate) fn drain(&mut self) -> Vec<Holder> {
        self.objects.clear();
        self.primitives.clear();
        self.holders.drain().map(|(_, holder)| holder).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.holders.len()
    }
}

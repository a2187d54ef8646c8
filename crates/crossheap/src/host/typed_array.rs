//! Typed arrays: copied into the script heap, or shared through pinned memory

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{BridgeError, Result};
use crate::memory::{SharedBuffer, TypedArrayData};
use crate::tag::{TypeTag, TypedArrayKind};

use super::reference::{HostRef, RefData};
use super::runtime::HostRuntime;
use super::value::JsValue;

fn length_code(data: &TypedArrayData) -> Result<i32> {
    i32::try_from(data.len())
        .map_err(|_| BridgeError::InvalidOperation(format!("typed array of {} elements is too large", data.len())))
}

impl HostRuntime {
    /// A script typed array that aliases `data`.
    ///
    /// The buffer stays pinned while the returned wrapper is alive; writes
    /// on either side are visible to the other.
    pub fn create_shared_typed_array(&self, data: TypedArrayData) -> Result<HostRef> {
        let kind = data.kind();
        let length = length_code(&data)?;
        let buffer: SharedBuffer = Rc::new(RefCell::new(data));
        let pointer = self.memory.pin(buffer.clone());

        let created = self.guarded("CreateSharedTypedArray", || {
            let wire = self
                .script
                .create_shared_typed_array(pointer, kind.code(), length);
            self.check_exception("CreateSharedTypedArray", wire)?;
            let tag = wire.type_tag()?;
            if tag != TypeTag::SharedTypedArray {
                return Err(BridgeError::coercion(tag, "SharedTypedArray"));
            }
            Ok(wire.ref_id()?)
        });
        match created {
            Ok(id) => Ok(self.wrap(
                id,
                TypeTag::SharedTypedArray,
                RefData::SharedTypedArray { pointer, buffer },
            )),
            Err(err) => {
                self.memory.free(pointer);
                Err(err)
            }
        }
    }

    /// A script-owned typed array holding a copy of `data`.
    pub fn create_typed_array(&self, data: &TypedArrayData) -> Result<JsValue> {
        let length = length_code(data)?;
        let pointer = self.memory.pin(Rc::new(RefCell::new(data.clone())));
        let result = self.guarded("CreateTypedArray", || {
            let wire = self
                .script
                .create_typed_array(pointer, data.kind().code(), length);
            self.receive("CreateTypedArray", wire)
        });
        self.memory.free(pointer);
        result
    }

    /// An empty script-owned typed array of `kind`
    pub fn create_empty_typed_array(&self, kind: TypedArrayKind) -> Result<JsValue> {
        self.guarded("CreateEmptyTypedArray", || {
            let wire = self.script.create_empty_typed_array(kind.code());
            self.receive("CreateEmptyTypedArray", wire)
        })
    }

    /// The host buffer behind a shared typed array
    pub fn shared_buffer(&self, value: &JsValue) -> Option<SharedBuffer> {
        value.as_host_ref().and_then(HostRef::shared_buffer)
    }
}

//! Call, invoke and construct from the host
//!
//! Up to three arguments travel on the fixed-arity fast path. Longer lists
//! are first built into a script array and passed by reference.

use crate::error::{BridgeError, Result};
use crate::tag::TypeTag;
use crate::wire::{FixedArgs, WireValue};

use super::reference::HostRef;
use super::runtime::HostRuntime;
use super::value::JsValue;

/// Arguments packed for one of the two call shapes
enum Packed {
    Fixed(FixedArgs),
    /// Keeps the argument array alive for the duration of the call
    Array(HostRef),
}

impl HostRuntime {
    fn pack(&self, args: &[JsValue]) -> Result<Packed> {
        let wires: Vec<WireValue> = args.iter().map(JsValue::to_wire).collect();
        match FixedArgs::pack(&wires) {
            Some(fixed) => Ok(Packed::Fixed(fixed)),
            None => Ok(Packed::Array(self.create_array(args)?)),
        }
    }

    fn callee<'a>(&self, function: &'a JsValue) -> Result<&'a HostRef> {
        function
            .as_host_ref()
            .ok_or_else(|| BridgeError::coercion(function.tag(), "function"))
    }

    /// `function(...args)`
    ///
    /// Host callbacks are run directly without crossing the boundary.
    pub fn call(&self, function: &JsValue, args: &[JsValue]) -> Result<JsValue> {
        let callee = self.callee(function)?;
        if callee.tag() == TypeTag::Callback {
            self.ensure_live()?;
            return self.run_callback(callee, args.to_vec());
        }
        let packed = self.pack(args)?;
        self.guarded("Call", || {
            let id = callee.id().to_payload();
            let wire = match &packed {
                Packed::Fixed(fixed) => self.script.call(id, *fixed),
                Packed::Array(array) => self.script.call_slow(id, array.id().to_payload()),
            };
            self.receive("Call", wire)
        })
    }

    /// `target[name](...args)`
    pub fn invoke(&self, target: &JsValue, name: &str, args: &[JsValue]) -> Result<JsValue> {
        let name = JsValue::Ref(self.create_string(name)?);
        let packed = self.pack(args)?;
        self.guarded("Invoke", || {
            let wire = match &packed {
                Packed::Fixed(fixed) => self.script.invoke(target.to_wire(), name.to_wire(), *fixed),
                Packed::Array(array) => {
                    self.script
                        .invoke_slow(target.to_wire(), name.to_wire(), array.id().to_payload())
                }
            };
            self.receive("Invoke", wire)
        })
    }

    /// `new function(...args)`
    pub fn construct(&self, function: &JsValue, args: &[JsValue]) -> Result<JsValue> {
        let callee = self.callee(function)?;
        if callee.tag() == TypeTag::Callback {
            return Err(BridgeError::InvalidOperation(
                "host callbacks cannot be used as constructors".to_owned(),
            ));
        }
        let packed = self.pack(args)?;
        self.guarded("Construct", || {
            let id = callee.id().to_payload();
            let wire = match &packed {
                Packed::Fixed(fixed) => self.script.construct(id, *fixed),
                Packed::Array(array) => self.script.construct_slow(id, array.id().to_payload()),
            };
            self.receive("Construct", wire)
        })
    }
}

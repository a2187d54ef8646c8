//! The fixed numeric ABI between the two runtimes
//!
//! [`ScriptBoundary`] is what the host imports from the script side and
//! [`HostHooks`] is what the script side gets back at initialization.
//! Every signature uses doubles, `i32` codes, strings and booleans only;
//! structured data never crosses.

use std::rc::Rc;

use crate::error::ProtocolError;
use crate::wire::{FixedArgs, WireText, WireValue};

/// Version of the reference protocol implemented by this crate.
///
/// Checked once at initialization; a script runtime reporting another
/// version is the platform-mismatch case.
pub const PROTOCOL_VERSION: u32 = 1;

/// Operations the host invokes on the script runtime.
///
/// Every operation returns a [`WireValue`]; a failure inside the script is
/// reported with the Exception tag, never by panicking across the boundary.
pub trait ScriptBoundary {
    /// Protocol version spoken by this runtime
    fn protocol_version(&self) -> u32;

    /// One-time setup registering the host's entry points.
    fn initialize_internal(&self, hooks: Rc<dyn HostHooks>) -> Result<(), ProtocolError>;

    /// `globalThis[identifier]`
    fn get_global_object(&self, identifier: WireValue) -> WireValue;

    /// `{}`
    fn create_empty_object(&self) -> WireValue;

    /// String literal, deduplicated by content
    fn create_string(&self, text: &str) -> WireValue;

    /// `[]`
    fn create_array(&self) -> WireValue;

    /// `fn(...array)`
    fn call_slow(&self, function: f64, params: f64) -> WireValue;

    /// `fn(a, b, c)` with trailing `undefined` trimmed
    fn call(&self, function: f64, args: FixedArgs) -> WireValue;

    /// `target[name](...array)`
    fn invoke_slow(&self, target: WireValue, name: WireValue, params: f64) -> WireValue;

    /// `target[name](a, b, c)` with trailing `undefined` trimmed
    fn invoke(&self, target: WireValue, name: WireValue, args: FixedArgs) -> WireValue;

    /// `new fn(...array)`
    fn construct_slow(&self, function: f64, params: f64) -> WireValue;

    /// `new fn(a, b, c)` with trailing `undefined` trimmed
    fn construct(&self, function: f64, args: FixedArgs) -> WireValue;

    /// `object[key]`
    fn get_prop(&self, object: WireValue, key: WireValue) -> WireValue;

    /// `object[key] = value`
    fn set_prop(&self, object: WireValue, key: WireValue, value: WireValue) -> WireValue;

    /// `array[index]`
    fn get_array_element(&self, array: f64, index: i32) -> WireValue;

    /// `array[index] = value`
    fn set_array_element(&self, array: f64, index: i32, value: WireValue) -> WireValue;

    /// Register a host callback taking the parameters named in `param_names`
    fn create_callback(&self, param_names: f64) -> WireValue;

    /// Register a view over a pinned host buffer
    fn create_shared_typed_array(&self, pointer: u32, type_code: i32, length: i32) -> WireValue;

    /// Copy a host buffer into a new script-owned typed array
    fn create_typed_array(&self, pointer: u32, type_code: i32, length: i32) -> WireValue;

    /// New empty script-owned typed array
    fn create_empty_typed_array(&self, type_code: i32) -> WireValue;

    /// The host collected its wrapper; forget the id. Idempotent.
    fn garbage_collect(&self, value: WireValue) -> WireValue;

    /// Loose equality `lhs == rhs`
    fn equals(&self, lhs: WireValue, rhs: WireValue) -> WireValue;

    /// `Number(value)`
    fn get_number(&self, value: WireValue) -> WireValue;

    /// `String(value)`
    fn get_string(&self, value: WireValue) -> WireText;

    /// Deliver the host's answer to an outstanding callback dispatch.
    fn respond_to_callback(&self, response_id: f64, value: WireValue) -> WireValue;
}

/// Entry points the script runtime calls on the host.
pub trait HostHooks {
    /// A host callback was invoked. The host must call
    /// [`ScriptBoundary::respond_to_callback`] with `response_id` before
    /// returning.
    fn on_callback(&self, callback_id: f64, response_id: f64, arg: WireValue, args_are_array: bool);

    /// The script materialized a special reference; pin it.
    fn acquire_reference(&self, id: f64) -> bool;

    /// The script collected a materialized special reference; unpin it.
    fn release_reference(&self, id: f64) -> bool;
}

//! The embedded script engine's side of the bridge
//!
//! A small reference-counted object model stands in for the engine's heap.
//! [`ScriptRuntime`] answers every boundary operation against it and keeps
//! the script reference registry in step with what the host holds.

mod builtins;
mod finalize;
pub mod ops;
mod promise;
mod registry;
mod runtime;
mod value;

pub use promise::PromiseResolver;
pub use runtime::ScriptRuntime;
pub use value::{Function, NativeFn, ObjectKind, ObjectRef, PropertyKey, ScriptObject, ScriptValue, Symbol, WeakObject};

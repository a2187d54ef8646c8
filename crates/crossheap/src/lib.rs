//! # Crossheap
//!
//! A cross-heap reference protocol between a managed host runtime and an
//! embedded script engine.
//!
//! Only numbers and strings can cross the boundary, so every value travels
//! as a tagged double. Value kinds carry their literal; reference kinds
//! carry an id into a registry kept on each side. Callbacks and buffers
//! that the host lends to the script are pinned with keep-alive counts
//! while the script still uses them.
//!
//! ## Architecture
//!
//! - **Wire**: [`TypeTag`], [`WireValue`] and the fixed numeric ABI in
//!   [`boundary`]
//! - **Script side**: [`ScriptRuntime`], a small object model plus the
//!   script reference registry, response slots and finalization queue
//! - **Host side**: [`HostRuntime`], [`HostRef`] wrappers, the weak host
//!   registry and keep-alive pins
//! - **Bridge**: [`Bridge`] wires both sides to one [`SharedMemory`]
//!
//! Everything is single-threaded; a boundary crossing is an ordinary
//! nested function call.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod boundary;
pub mod bridge;
pub mod config;
pub mod error;
pub mod host;
pub mod memory;
pub mod script;
pub mod tag;
pub mod wire;

// Re-export main types
pub use boundary::{HostHooks, ScriptBoundary, PROTOCOL_VERSION};
pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::{BridgeError, ProtocolError, Result, ScriptError};
pub use host::{FromJs, HostFn, HostRef, HostRuntime, IntoJs, JsValue, PromiseTask};
pub use memory::{SharedBuffer, SharedMemory, TypedArrayData};
pub use script::{ObjectRef, PromiseResolver, PropertyKey, ScriptRuntime, ScriptValue};
pub use tag::{TypeTag, TypedArrayKind};
pub use wire::{FixedArgs, RefId, WireText, WireValue};

/// Crossheap version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

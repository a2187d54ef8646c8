//! The host runtime's side of the bridge
//!
//! Host code works with [`JsValue`] and [`HostRef`]; the encoding to wire
//! values, the registry bookkeeping and the keep-alive pins all happen
//! inside [`HostRuntime`].

mod cache;
mod callback;
mod convert;
mod dispatch;
mod promise;
mod reference;
mod registry;
mod runtime;
mod typed_array;
mod value;

pub use convert::{FromJs, IntoJs};
pub use promise::PromiseTask;
pub use reference::{HostFn, HostRef};
pub use runtime::HostRuntime;
pub use value::JsValue;

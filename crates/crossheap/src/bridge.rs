//! The process-scoped bridge context

use std::rc::Rc;

use tracing::debug;

use crate::boundary::ScriptBoundary;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::host::HostRuntime;
use crate::memory::SharedMemory;
use crate::script::ScriptRuntime;

/// Both runtimes plus the memory they share, wired together.
///
/// Construction performs the one-time initialization; dropping the bridge
/// (or calling [`Bridge::shutdown`]) tears both sides down.
///
/// # Example
///
/// ```
/// use crossheap::{Bridge, JsValue};
///
/// let bridge = Bridge::new().unwrap();
/// let host = bridge.host();
///
/// let object = JsValue::Ref(host.create_object().unwrap());
/// host.set(&object, "answer", &JsValue::Number(42.0)).unwrap();
/// assert_eq!(host.get(&object, "answer").unwrap(), JsValue::Number(42.0));
/// ```
pub struct Bridge {
    host: Rc<HostRuntime>,
    script: Rc<ScriptRuntime>,
    memory: Rc<SharedMemory>,
}

impl Bridge {
    /// Create a bridge with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(BridgeConfig::default())
    }

    /// Create a bridge with a custom configuration.
    pub fn with_config(config: BridgeConfig) -> Result<Self> {
        let memory = Rc::new(SharedMemory::new());
        let script = ScriptRuntime::new(memory.clone());
        let boundary: Rc<dyn ScriptBoundary> = script.clone();
        let host = HostRuntime::initialize(boundary, memory.clone(), config)?;
        Ok(Bridge {
            host,
            script,
            memory,
        })
    }

    /// The host runtime
    pub fn host(&self) -> &HostRuntime {
        &self.host
    }

    /// The script runtime
    pub fn script(&self) -> &ScriptRuntime {
        &self.script
    }

    /// Pinned buffer arena shared by both sides
    pub fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    /// Drain the script's finalization queue and release the pins it
    /// collected. Returns how many releases were sent.
    pub fn collect_garbage(&self) -> usize {
        self.script.run_finalizers()
    }

    /// Tear both runtimes down. Idempotent.
    pub fn shutdown(&self) {
        if !self.host.is_live() && !self.script.is_initialized() {
            return;
        }
        self.host.shutdown();
        self.script.shutdown();
        debug!("bridge shut down");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

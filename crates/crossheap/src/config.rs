//! Bridge configuration

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Configuration for the host side of the bridge.
///
/// Passed to [`crate::HostRuntime::initialize`] and fixed for the lifetime
/// of the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Reuse string wrappers for equal host strings
    pub cache_strings: bool,

    /// Reuse function wrappers created from the same source body
    pub cache_functions: bool,

    /// Maximum nesting of script-to-host callbacks
    pub max_callback_depth: usize,

    /// Log every boundary crossing at trace level
    pub trace_boundary: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            cache_strings: true,
            cache_functions: true,
            max_callback_depth: 64,
            trace_boundary: false,
        }
    }
}

impl BridgeConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config with a custom callback depth limit.
    pub fn with_max_callback_depth(max_depth: usize) -> Self {
        Self {
            max_callback_depth: max_depth,
            ..Default::default()
        }
    }

    /// Turn the identity caches on or off.
    pub fn caching(mut self, enabled: bool) -> Self {
        self.cache_strings = enabled;
        self.cache_functions = enabled;
        self
    }

    /// Turn per-crossing trace logging on or off.
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.trace_boundary = enabled;
        self
    }

    /// Parse a config from JSON. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::new();
        assert!(config.cache_strings);
        assert!(config.cache_functions);
        assert_eq!(config.max_callback_depth, 64);
        assert!(!config.trace_boundary);
    }

    #[test]
    fn test_from_json_partial() {
        let config = BridgeConfig::from_json(r#"{"max_callback_depth": 4}"#);
        assert_eq!(
            config,
            Ok(BridgeConfig {
                max_callback_depth: 4,
                ..BridgeConfig::default()
            })
        );
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(matches!(
            BridgeConfig::from_json("{"),
            Err(crate::BridgeError::Config(_))
        ));
    }
}

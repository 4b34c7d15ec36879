//! Runtime configuration.
//!
//! The configuration is installed per thread with
//! [`Runtime::configure`](crate::reactive::Runtime::configure) and can be
//! loaded from JSON:
//!
//! ```rust
//! use ripple_core::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_json(r#"{ "async_flush": false }"#).unwrap();
//! assert!(!config.async_flush);
//! assert_eq!(config.max_update_count, 100);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// When `false`, `notify()` sorts its subscriber snapshot by ascending
    /// computation id before firing so the order is deterministic without a
    /// scheduler doing the ordering.
    pub async_flush: bool,

    /// How many times a single job may run within one flush before the
    /// reference scheduler assumes an infinite update loop.
    pub max_update_count: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            async_flush: true,
            max_update_count: 100,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from a JSON document. Missing fields take their
    /// default values.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Configuration for synchronous, deterministically ordered notification.
    pub fn synchronous() -> Self {
        Self {
            async_flush: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_batched() {
        let config = RuntimeConfig::default();
        assert!(config.async_flush);
        assert_eq!(config.max_update_count, 100);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json(r#"{ "max_update_count": 5 }"#).unwrap();
        assert!(config.async_flush);
        assert_eq!(config.max_update_count, 5);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(RuntimeConfig::from_json("not json").is_err());
    }
}

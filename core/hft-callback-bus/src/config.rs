//! Bus configuration

use crate::error::{BusError, BusResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default per-type preallocation of listener storage
const DEFAULT_LISTENER_CAPACITY: usize = 16;

/// Default limit for nested publishes of one event type
const DEFAULT_MAX_DISPATCH_DEPTH: usize = 32;

/// Tunables for an [`EventBus`](crate::EventBus)
///
/// Loadable from TOML; missing keys fall back to the defaults:
///
/// ```toml
/// initial_listener_capacity = 64
/// max_dispatch_depth = 4
/// allow_nested_publish = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// Listener slots preallocated when an event type is first seen
    pub initial_listener_capacity: usize,

    /// Maximum nesting of publishes of the same type (1 = no nesting)
    pub max_dispatch_depth: usize,

    /// Whether a callback may publish the type it is handling
    pub allow_nested_publish: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            initial_listener_capacity: DEFAULT_LISTENER_CAPACITY,
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
            allow_nested_publish: true,
        }
    }
}

impl BusConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> BusResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| BusError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bus config {}", path.display()))?;
        let config = Self::from_toml_str(&source)
            .with_context(|| format!("Failed to load bus config {}", path.display()))?;
        Ok(config)
    }

    /// Reject settings that would make every publish fail
    pub fn validate(&self) -> BusResult<()> {
        if self.max_dispatch_depth == 0 {
            return Err(BusError::Config(
                "max_dispatch_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BusConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_dispatch_depth, 32);
        assert!(config.allow_nested_publish);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BusConfig::from_toml_str("max_dispatch_depth = 4").unwrap();
        assert_eq!(config.max_dispatch_depth, 4);
        assert_eq!(config.initial_listener_capacity, 16);
        assert!(config.allow_nested_publish);
    }

    #[test]
    fn test_full_toml() {
        let config = BusConfig::from_toml_str(
            r#"
            initial_listener_capacity = 128
            max_dispatch_depth = 1
            allow_nested_publish = false
            "#,
        )
        .unwrap();

        assert_eq!(
            config,
            BusConfig {
                initial_listener_capacity: 128,
                max_dispatch_depth: 1,
                allow_nested_publish: false,
            }
        );
    }

    #[test]
    fn test_zero_depth_rejected() {
        let result = BusConfig::from_toml_str("max_dispatch_depth = 0");
        assert!(matches!(result, Err(BusError::Config(_))));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = BusConfig::from_toml_str("queue_capacity = 10");
        assert!(matches!(result, Err(BusError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!(
            "hft-callback-bus-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "initial_listener_capacity = 2\n").unwrap();

        let config = BusConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.initial_listener_capacity, 2);
    }

    #[test]
    fn test_from_missing_file() {
        let err = BusConfig::from_file("/nonexistent/hft-callback-bus.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read bus config"));
    }
}

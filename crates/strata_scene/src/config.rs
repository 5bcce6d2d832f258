//! Scene configuration

use serde::{Deserialize, Serialize};

use crate::buffer::Usage;

/// Scene graph configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Spatial slots reserved up front
    pub initial_capacity: usize,

    /// Report refresh flags left after `update_geometric_state` as an error
    pub verify_refresh_flags: bool,

    /// Usage hint given to merged batch buffers
    pub batch_usage: Usage,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 256,
            verify_refresh_flags: false,
            batch_usage: Usage::Dynamic,
        }
    }
}

impl SceneConfig {
    /// Configuration that checks every update postcondition
    pub fn debug() -> Self {
        Self {
            verify_refresh_flags: true,
            ..Default::default()
        }
    }

    /// Configuration for scenes with many thousands of spatials
    pub fn large_scene() -> Self {
        Self {
            initial_capacity: 16 * 1024,
            ..Default::default()
        }
    }

    /// Set initial capacity
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Set batch buffer usage
    pub fn with_batch_usage(mut self, usage: Usage) -> Self {
        self.batch_usage = usage;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert!(!SceneConfig::default().verify_refresh_flags);
        assert!(SceneConfig::debug().verify_refresh_flags);
        assert!(SceneConfig::large_scene().initial_capacity > SceneConfig::default().initial_capacity);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SceneConfig = serde_json::from_str(r#"{"verify_refresh_flags": true}"#).unwrap();
        assert!(config.verify_refresh_flags);
        assert_eq!(config.initial_capacity, 256);
        assert_eq!(config.batch_usage, Usage::Dynamic);
    }

    #[test]
    fn test_bincode_round_trip() {
        let config = SceneConfig::large_scene().with_batch_usage(Usage::Static);
        let bytes = bincode::serialize(&config).unwrap();
        let back: SceneConfig = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, config);
    }
}

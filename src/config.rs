// SPDX-License-Identifier: GPL-3.0-only

//! Bridge configuration
//!
//! Loaded from a JSON file at startup; every field has a default so an
//! empty file (or none at all) brings the bridge up against whatever device
//! is found, adopting its current use case.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node name; prefixes every topic and the optical frame id
    pub node_name: String,
    /// Serial number of the camera to open. None opens the first camera
    /// found.
    pub serial: Option<String>,
    /// Use case to apply at startup. None adopts the device's current one.
    pub usecase: Option<String>,
    /// Initial auto-exposure mode per stream index. Streams beyond the
    /// list keep the device default (automatic).
    pub auto_exposure: Vec<bool>,
    /// Initial manual exposure times in microseconds per stream index.
    /// Ignored for streams in automatic mode.
    pub exposure_time: Vec<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: "tof_bridge".to_string(),
            serial: None,
            usecase: None,
            auto_exposure: Vec::new(),
            exposure_time: Vec::new(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> BridgeResult<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.node_name, "tof_bridge");
        assert!(config.usecase.is_none());
        assert!(config.auto_exposure.is_empty());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"usecase": "MODE_9_5FPS", "exposure_time": [150]}"#).unwrap();
        assert_eq!(config.usecase.as_deref(), Some("MODE_9_5FPS"));
        assert_eq!(config.exposure_time, vec![150]);
        assert_eq!(config.node_name, "tof_bridge");
    }

    #[test]
    fn test_round_trip() {
        let config = Config {
            node_name: "cam0".to_string(),
            serial: Some("SIM0001".to_string()),
            usecase: Some("MODE_MIXED_30_5".to_string()),
            auto_exposure: vec![true, false],
            exposure_time: vec![0, 200],
        };
        let text = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&text).unwrap();
        assert_eq!(back.node_name, config.node_name);
        assert_eq!(back.auto_exposure, config.auto_exposure);
    }
}

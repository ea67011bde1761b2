//! mqspec CLI configuration stored at `~/.mqspec/config.json`.
//!
//! The file is optional and only supplies fallbacks. Resolution order for
//! each setting (highest priority first):
//! 1. Command line flag
//! 2. Environment variable (`MQSPEC_CLUSTER`, `MQSPEC_REGION`, `AWS_PROFILE`,
//!    `MQSPEC_TEMPLATES_DIR`)
//! 3. This file
//! 4. Built-in default

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

const CONFIG_DIR_NAME: &str = ".mqspec";
const CONFIG_FILE_NAME: &str = "config.json";

/// Persistent CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct MqspecConfig {
    /// Target region.
    pub region: Option<String>,
    /// Credential profile.
    pub profile: Option<String>,
    /// Cluster name.
    pub cluster: Option<String>,
    /// Directory to read role and policy templates from.
    pub templates_dir: Option<PathBuf>,
    /// Leave created resources in place when a run fails.
    pub keep_on_failure: bool,
}

/// Path to `~/.mqspec/config.json`, if a home directory is known.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load config from `~/.mqspec/config.json`, returning default if missing.
pub fn load_config() -> Result<MqspecConfig> {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => Ok(MqspecConfig::default()),
    }
}

/// Load config from `path`, returning default if the file does not exist.
///
/// A file that exists but cannot be read or parsed is a configuration error.
pub fn load_config_from(path: &Path) -> Result<MqspecConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file");
        return Ok(MqspecConfig::default());
    }
    let data = std::fs::read_to_string(path).map_err(|e| {
        Error::configuration(format!("failed to read {}: {}", path.display(), e))
    })?;
    let config = serde_json::from_str(&data).map_err(|e| {
        Error::configuration(format!("failed to parse {}: {}", path.display(), e))
    })?;
    debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, MqspecConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"region": "eu-central-1", "keep_on_failure": true}"#).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-central-1"));
        assert!(config.keep_on_failure);
        assert!(config.cluster.is_none());
        assert!(config.templates_dir.is_none());
    }

    #[test]
    fn malformed_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn config_path_is_under_home() {
        if let Some(path) = config_path() {
            assert!(path.ends_with(".mqspec/config.json"));
        }
    }
}

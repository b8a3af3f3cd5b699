//! Host session configuration.
//!
//! A [`HostConfig`] can be built in code or loaded from a TOML file:
//!
//! ```toml
//! accept_expression = true
//! trace = 0
//! reject_unregistered_classes = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Per-session settings for the host layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Let `Expression` terms decode instead of failing. Needed for data
    /// filtering, where results may be constraints over unbound variables.
    #[serde(default)]
    pub accept_expression: bool,
    /// Trace level forwarded to engine queries.
    #[serde(default)]
    pub trace: u32,
    /// Refuse to send objects whose class was never registered.
    #[serde(default)]
    pub reject_unregistered_classes: bool,
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl HostConfig {
    /// Parse a config from TOML text. `origin` names the source in errors.
    pub fn from_toml_str(content: &str, origin: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Save to a TOML file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_strict() {
        let cfg = HostConfig::default();
        assert!(!cfg.accept_expression);
        assert_eq!(cfg.trace, 0);
        assert!(!cfg.reject_unregistered_classes);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let cfg = HostConfig::from_toml_str("accept_expression = true\n", "inline").unwrap();
        assert!(cfg.accept_expression);
        assert_eq!(cfg.trace, 0);
    }

    #[test]
    fn bad_toml_reports_origin() {
        let err = HostConfig::from_toml_str("trace = \"loud\"", "host.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == "host.toml"));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("host.toml");
        let cfg = HostConfig {
            accept_expression: true,
            trace: 2,
            reject_unregistered_classes: true,
        };
        cfg.save(&path).unwrap();
        assert_eq!(HostConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = HostConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

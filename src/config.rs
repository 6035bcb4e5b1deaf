//! Application configuration.
//!
//! Stored as JSON at `<config dir>/climalink/config.json`.  A missing
//! file means defaults; unknown fields are ignored.

use climalink_serial::link::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A UI control and the command token it sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlBinding {
    pub label: String,
    pub command: String,
}

impl ControlBinding {
    pub fn new(label: &str, command: &str) -> Self {
        Self {
            label: label.to_string(),
            command: command.to_string(),
        }
    }
}

fn default_controls() -> Vec<ControlBinding> {
    vec![
        ControlBinding::new("led-on", "LED_ON"),
        ControlBinding::new("led-off", "LED_OFF"),
        ControlBinding::new("fan-on", "FAN_ON"),
        ControlBinding::new("fan-off", "FAN_OFF"),
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default = "default_controls")]
    pub controls: Vec<ControlBinding>,
    /// `RUST_LOG` style filter.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            controls: default_controls(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("duplicate control label '{0}'")]
    DuplicateControl(String),
    #[error("control '{0}' has an empty command")]
    EmptyCommand(String),
}

impl From<ConfigError> for String {
    fn from(e: ConfigError) -> Self {
        e.to_string()
    }
}

impl AppConfig {
    /// `<config dir>/climalink/config.json`, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("climalink").join("config.json"))
    }

    /// Load `path`, or defaults when the file does not exist.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("[config] {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path or the default location.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for control in &self.controls {
            if !seen.insert(control.label.to_lowercase()) {
                return Err(ConfigError::DuplicateControl(control.label.clone()));
            }
            if control.command.trim().is_empty() {
                return Err(ConfigError::EmptyCommand(control.label.clone()));
            }
        }
        Ok(())
    }

    /// Command token bound to `label` (case-insensitive).
    pub fn control(&self, label: &str) -> Option<&ControlBinding> {
        self.controls
            .iter()
            .find(|c| c.label.eq_ignore_ascii_case(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use climalink_serial::link::LineEnding;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.controls.len(), 4);
        assert_eq!(cfg.control("LED-ON").unwrap().command, "LED_ON");
        assert!(cfg.control("heater").is_none());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load_from_file(&dir.path().join("nope.json")).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "serial": { "portName": "COM4", "lineEnding": "crLf", "writeTimeoutMs": 500 },
                "controls": [ { "label": "buzz", "command": "BUZZ" } ]
            }"#,
        )
        .unwrap();

        let cfg = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.serial.port_name.as_deref(), Some("COM4"));
        assert_eq!(cfg.serial.line_ending, LineEnding::CrLf);
        assert_eq!(cfg.serial.write_timeout_ms, Some(500));
        assert_eq!(cfg.controls, vec![ControlBinding::new("buzz", "BUZZ")]);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = AppConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_controls() {
        let mut cfg = AppConfig::default();
        cfg.controls.push(ControlBinding::new("LED-ON", "X"));
        assert!(matches!(cfg.validate(), Err(ConfigError::DuplicateControl(_))));

        let cfg = AppConfig {
            controls: vec![ControlBinding::new("empty", "  ")],
            ..Default::default()
        };
        let msg: String = cfg.validate().unwrap_err().into();
        assert_eq!(msg, "control 'empty' has an empty command");
    }
}

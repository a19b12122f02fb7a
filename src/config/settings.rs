//! Runner settings loaded from `quarky.toml`
//!
//! These settings describe where and how the runner works, independent of
//! any particular experiment: where datasets go, how often they are saved
//! during a run, how many events a run may buffer, and how logging is set up.
//!
//! # Example file
//!
//! ```toml
//! data_root = "/data/quarky"
//! dataset_prefix = "data"
//! save_every = 5
//!
//! [logging]
//! default_filter = "info,quarky_rs=debug"
//! log_file = "logs/quarky.log"
//! ```

use super::{app_data_dir, SETTINGS_FILE};
use crate::backend::DEFAULT_EVENT_CAPACITY;
use crate::error::{QuarkyError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,quarky_rs=debug";

/// Runner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory under which datasets are written
    pub data_root: PathBuf,

    /// Suffix appended to every dataset file name
    pub dataset_prefix: String,

    /// Save a dataset every N completed sets (0 = only when the run ends)
    pub save_every: u32,

    /// Capacity of the run event channel
    pub event_capacity: usize,

    /// Logging setup
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            dataset_prefix: "data".to_string(),
            save_every: 0,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            logging: LoggingSettings::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub default_filter: String,

    /// Optional log file, rotated daily
    pub log_file: Option<PathBuf>,

    /// Emit JSON lines on the console instead of human-readable text
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_LOG_FILTER.to_string(),
            log_file: None,
            json: false,
        }
    }
}

/// Data root used when the settings file does not name one
pub fn default_data_root() -> PathBuf {
    app_data_dir()
        .map(|dir| dir.join("data"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QuarkyError::Config(format!("Failed to read settings {:?}: {}", path, e))
        })?;
        toml::from_str(&content).map_err(|e| {
            QuarkyError::Config(format!("Failed to parse settings {:?}: {}", path, e))
        })
    }

    /// Load from `path`, or from `quarky.toml` in the working directory
    ///
    /// A missing default file yields the defaults; an explicitly named file
    /// must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(SETTINGS_FILE);
                if default.exists() {
                    Self::load(default)
                } else {
                    tracing::debug!("No {} found, using default settings", SETTINGS_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save settings as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| QuarkyError::Serialization(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.save_every, 0);
        assert_eq!(settings.dataset_prefix, "data");
        assert_eq!(settings.logging.default_filter, DEFAULT_LOG_FILTER);
        assert!(settings.logging.log_file.is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            save_every = 5

            [logging]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(settings.save_every, 5);
        assert!(settings.logging.json);
        assert_eq!(settings.logging.default_filter, DEFAULT_LOG_FILTER);
        assert_eq!(settings.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_settings_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quarky.toml");
        let settings = Settings {
            data_root: dir.path().join("datasets"),
            save_every: 2,
            ..Default::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(Settings::load_or_default(Some(Path::new("/nonexistent/quarky.toml"))).is_err());
    }
}

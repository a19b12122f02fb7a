//! Configuration module for Quarky
//!
//! This module handles two kinds of configuration:
//! - Run configuration ([`RunConfig`]), the parameter mapping handed to an
//!   experiment for one run, built from layered templates
//! - Runner settings ([`Settings`]), loaded from `quarky.toml`
//!
//! # Layering
//!
//! A run configuration is built as `base ⊕ experiment template ⊕ overrides`.
//! Later layers win, but a layer may not change the JSON kind of a key (a
//! number stays a number, a string stays a string). Integers and floats are
//! both numbers.
//!
//! # Example
//!
//! ```ignore
//! use quarky_rs::config::{base_config, RunConfigBuilder};
//!
//! let config = RunConfigBuilder::from_base()
//!     .layer("template", &template)?
//!     .sets(5)
//!     .build()?;
//! config.save("last_run.json")?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{QuarkyError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "quarky-rs";

/// Runner settings filename
pub const SETTINGS_FILE: &str = "quarky.toml";

/// Key holding the progress multiplier
pub const REPS_KEY: &str = "reps";

/// Key holding the iteration budget
pub const SETS_KEY: &str = "sets";

/// Ordered JSON mapping used for templates and overrides
pub type ConfigMap = Map<String, Value>;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Default base template applied under every experiment template
///
/// Channel assignments, averaging and pulse defaults of the RFSoC readout.
pub fn base_config() -> ConfigMap {
    let mut map = ConfigMap::new();
    let entries: [(&str, Value); 15] = [
        ("res_ch", 0.into()),
        ("qubit_ch", 1.into()),
        ("mixer_freq", 0.0.into()),
        ("ro_chs", Value::Array(vec![0.into()])),
        (REPS_KEY, 1000.into()),
        ("nqz", 2.into()),
        ("qubit_nqz", 1.into()),
        ("relax_delay", 10.into()),
        ("res_phase", 0.into()),
        ("pulse_style", "const".into()),
        ("read_length", 5.into()),
        ("pulse_gain", 30000.into()),
        ("pulse_freq", 0.0.into()),
        ("adc_trig_offset", 0.488.into()),
        ("cavity_LO", 0.0.into()),
    ];
    for (key, value) in entries {
        map.insert(key.to_string(), value);
    }
    map.insert(SETS_KEY.to_string(), 1.into());
    map
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn merge_into(target: &mut ConfigMap, layer: &ConfigMap, layer_name: &str) -> Result<()> {
    for (key, value) in layer {
        if let Some(existing) = target.get(key) {
            if !existing.is_null() && !value.is_null() && kind_name(existing) != kind_name(value) {
                return Err(QuarkyError::Config(format!(
                    "'{}' from {} is a {} but was a {}",
                    key,
                    layer_name,
                    kind_name(value),
                    kind_name(existing)
                )));
            }
        }
        target.insert(key.clone(), value.clone());
    }
    Ok(())
}

fn positive_u32(values: &ConfigMap, key: &str) -> Result<u32> {
    let value = values
        .get(key)
        .ok_or_else(|| QuarkyError::Config(format!("Missing required key '{}'", key)))?;
    value
        .as_u64()
        .filter(|v| *v >= 1)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| {
            QuarkyError::Config(format!(
                "'{}' must be a positive integer, got {}",
                key, value
            ))
        })
}

/// Parse `text` as the same kind of value as `existing`
fn parse_like(existing: Option<&Value>, key: &str, text: &str) -> Result<Value> {
    let text = text.trim();
    let bad = |kind: &str| {
        QuarkyError::Config(format!("Cannot parse '{}' as {} for '{}'", text, kind, key))
    };
    match existing {
        Some(Value::Bool(_)) => match text.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
            _ => Err(bad("a boolean")),
        },
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| bad("an integer")),
        Some(Value::Number(_)) => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| bad("a number")),
        Some(Value::String(_)) => Ok(Value::String(text.to_string())),
        Some(existing @ (Value::Array(_) | Value::Object(_))) => {
            let parsed: Value = serde_json::from_str(text).map_err(|_| bad("JSON"))?;
            if kind_name(&parsed) != kind_name(existing) {
                return Err(bad(&format!("an {}", kind_name(existing))));
            }
            Ok(parsed)
        }
        Some(Value::Null) | None => {
            Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
        }
    }
}

// ==================== Run Configuration ====================

/// Immutable parameter mapping for one run
///
/// Always holds positive integer `reps` and `sets`; every other key is passed
/// through to the experiment untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConfigMap", into = "ConfigMap")]
pub struct RunConfig {
    values: ConfigMap,
    reps: u32,
    sets: u32,
}

impl TryFrom<ConfigMap> for RunConfig {
    type Error = QuarkyError;

    fn try_from(values: ConfigMap) -> Result<Self> {
        let reps = positive_u32(&values, REPS_KEY)?;
        let sets = positive_u32(&values, SETS_KEY)?;
        Ok(Self { values, reps, sets })
    }
}

impl From<RunConfig> for ConfigMap {
    fn from(config: RunConfig) -> Self {
        config.values
    }
}

impl RunConfig {
    /// Minimal configuration holding only `reps` and `sets`
    ///
    /// Fails when either is zero.
    pub fn new(reps: u32, sets: u32) -> Result<Self> {
        let mut values = ConfigMap::new();
        values.insert(REPS_KEY.to_string(), reps.into());
        values.insert(SETS_KEY.to_string(), sets.into());
        Self::try_from(values)
    }

    /// Start an empty builder
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::new()
    }

    /// Builder seeded with this configuration, for edits before the next run
    pub fn to_builder(&self) -> RunConfigBuilder {
        RunConfigBuilder {
            values: self.values.clone(),
        }
    }

    /// Progress multiplier
    pub fn reps(&self) -> u32 {
        self.reps
    }

    /// Number of batches to acquire
    pub fn sets(&self) -> u32 {
        self.sets
    }

    /// `reps * sets`
    pub fn total_samples(&self) -> u64 {
        u64::from(self.reps) * u64::from(self.sets)
    }

    /// All parameters, including `reps` and `sets`
    pub fn values(&self) -> &ConfigMap {
        &self.values
    }

    /// Look up a parameter
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up a numeric parameter
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    /// Look up an integer parameter
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    /// Look up a string parameter
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QuarkyError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            QuarkyError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Save as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                QuarkyError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }
        let content = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(path, content).map_err(|e| {
            QuarkyError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

/// Layered construction of a [`RunConfig`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunConfigBuilder {
    values: ConfigMap,
}

impl RunConfigBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder seeded with [`base_config`]
    pub fn from_base() -> Self {
        Self {
            values: base_config(),
        }
    }

    /// Merge a layer on top; `name` identifies the layer in errors
    pub fn layer(mut self, name: &str, layer: &ConfigMap) -> Result<Self> {
        merge_into(&mut self.values, layer, name)?;
        Ok(self)
    }

    /// Merge a JSON config file on top
    pub fn layer_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QuarkyError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let layer: ConfigMap = serde_json::from_str(&content).map_err(|e| {
            QuarkyError::Config(format!("Config file {:?} is not a JSON object: {}", path, e))
        })?;
        self.layer(&path.display().to_string(), &layer)
    }

    /// Set a single value, keeping its JSON kind
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Result<Self> {
        let mut layer = ConfigMap::new();
        layer.insert(key.to_string(), value.into());
        merge_into(&mut self.values, &layer, "override")?;
        Ok(self)
    }

    /// Set the progress multiplier
    pub fn reps(mut self, reps: u32) -> Self {
        self.values.insert(REPS_KEY.to_string(), reps.into());
        self
    }

    /// Set the iteration budget
    pub fn sets(mut self, sets: u32) -> Self {
        self.values.insert(SETS_KEY.to_string(), sets.into());
        self
    }

    /// Edit a value from text, parsed as the kind the key already holds
    ///
    /// Unknown keys are parsed as JSON, falling back to a plain string.
    pub fn set_from_str(&mut self, key: &str, text: &str) -> Result<()> {
        let value = parse_like(self.values.get(key), key, text)?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Current value of a key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Validate and freeze
    pub fn build(self) -> Result<RunConfig> {
        RunConfig::try_from(self.values)
    }
}

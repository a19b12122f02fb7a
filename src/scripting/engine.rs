//! Rhai Script Engine Implementation
//!
//! This module provides the configured Rhai engine used by scripted
//! experiments, and the conversions between script values and Quarky types.
//!
//! ## Helper Functions
//!
//! - `linspace(start, stop, n)` - Array of `n` evenly spaced floats
//! - `noise(amplitude, seed)` - Deterministic uniform noise in `[-amplitude, amplitude]`
//! - `lorentzian(x, center, width)` - Unit-height Lorentzian of the given FWHM
//! - `pi()` / `e()` - Constants

use crate::backend::{linspace, HardwareFault, HardwareResult};
use crate::config::ConfigMap;
use crate::error::{QuarkyError, Result, ResultExt};
use crate::types::{ChannelData, Measurement, X_AXIS};
use rhai::{Array, Dynamic, Engine, Scope, AST};
use serde_json::Value;

/// Script entry point returning the experiment's config template
pub const TEMPLATE_FN: &str = "config_template";

/// Script entry point returning one measurement
pub const ACQUIRE_FN: &str = "acquire";

/// Optional script entry point returning a one-line description
pub const DESCRIPTION_FN: &str = "description";

/// Rhai engine with safety limits and experiment helpers registered
pub struct ScriptEngine {
    engine: Engine,
}

impl ScriptEngine {
    /// Create a new script engine with default configuration
    pub fn new() -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);
        Self { engine }
    }

    /// Configure the Rhai engine with helper functions and safety limits
    fn configure_engine(engine: &mut Engine) {
        // A sweep of a few thousand points must fit in one acquire() call
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(5_000_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(100_000);
        engine.set_max_map_size(1_000);

        engine.register_fn("linspace", |start: f64, stop: f64, n: i64| -> Array {
            linspace(start, stop, n.max(0) as usize)
                .into_iter()
                .map(Dynamic::from_float)
                .collect()
        });

        engine.register_fn("noise", |amplitude: f64, seed: i64| -> f64 {
            amplitude * (2.0 * unit_hash(seed as u64) - 1.0)
        });

        engine.register_fn("lorentzian", |x: f64, center: f64, width: f64| -> f64 {
            let half = width / 2.0;
            half * half / ((x - center).powi(2) + half * half)
        });

        engine.register_fn("pi", || std::f64::consts::PI);
        engine.register_fn("e", || std::f64::consts::E);
    }

    /// Compile a script
    pub fn compile(&self, source: &str) -> Result<AST> {
        self.engine
            .compile(source)
            .map_err(|e| QuarkyError::Script(format!("Compile error: {}", e)))
    }

    /// True when the script defines `name` with `arity` parameters
    pub fn has_fn(ast: &AST, name: &str, arity: usize) -> bool {
        ast.iter_functions()
            .any(|f| f.name == name && f.params.len() == arity)
    }

    /// Call `config_template()` and convert the result to a config map
    pub fn config_template(&self, ast: &AST) -> Result<ConfigMap> {
        let value: Dynamic = self
            .engine
            .call_fn(&mut Scope::new(), ast, TEMPLATE_FN, ())
            .context("config_template() failed")?;
        let json: Value = rhai::serde::from_dynamic(&value)
            .context("config_template() returned an unsupported value")?;
        match json {
            Value::Object(map) => Ok(map),
            other => Err(QuarkyError::Script(format!(
                "config_template() must return a map, got {}",
                other
            ))),
        }
    }

    /// Call `description()` if the script defines it
    ///
    /// A failing `description()` is logged and treated as absent.
    pub fn description(&self, ast: &AST) -> Option<String> {
        if !Self::has_fn(ast, DESCRIPTION_FN, 0) {
            return None;
        }
        match self
            .engine
            .call_fn::<String>(&mut Scope::new(), ast, DESCRIPTION_FN, ())
        {
            Ok(description) => Some(description),
            Err(e) => {
                tracing::warn!("{}() failed, using no description: {}", DESCRIPTION_FN, e);
                None
            }
        }
    }

    /// Call `acquire(set_index, config)` and convert the result
    pub fn acquire(&self, ast: &AST, set_index: usize, config: &Dynamic) -> HardwareResult<Measurement> {
        let value: Dynamic = self
            .engine
            .call_fn(
                &mut Scope::new(),
                ast,
                ACQUIRE_FN,
                (set_index as i64, config.clone()),
            )
            .map_err(|e| HardwareFault::Script(e.to_string()))?;
        measurement_from_dynamic(value).map_err(HardwareFault::Malformed)
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine").finish_non_exhaustive()
    }
}

/// Convert a run configuration into the map passed to `acquire`
pub fn config_to_dynamic(config: &ConfigMap) -> Result<Dynamic> {
    rhai::serde::to_dynamic(config).context("Config cannot be passed to a script")
}

/// splitmix64 of `seed`, scaled to `[0, 1]`
fn unit_hash(seed: u64) -> f64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z as f64) / (u64::MAX as f64)
}

fn as_number(value: &Dynamic) -> Option<f64> {
    value
        .as_float()
        .ok()
        .or_else(|| value.as_int().ok().map(|i| i as f64))
}

fn numbers(key: &str, items: Array) -> std::result::Result<Vec<f64>, String> {
    items
        .iter()
        .map(|v| {
            as_number(v).ok_or_else(|| {
                format!("'{}' contains a {} where a number was expected", key, v.type_name())
            })
        })
        .collect()
}

fn channel_from_dynamic(key: &str, value: Dynamic) -> std::result::Result<ChannelData, String> {
    if let Some(x) = as_number(&value) {
        return Ok(ChannelData::scalar(x));
    }
    let type_name = value.type_name();
    let items = value
        .try_cast::<Array>()
        .ok_or_else(|| format!("'{}' must be a number or an array, got {}", key, type_name))?;

    if !items.is_empty() && items.iter().all(Dynamic::is_array) {
        let rows = items
            .into_iter()
            .map(|row| numbers(key, row.try_cast::<Array>().unwrap_or_default()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ChannelData::from_rows(rows).map_err(|e| format!("'{}': {}", key, e))
    } else {
        numbers(key, items).map(ChannelData::from_vec)
    }
}

/// Convert the map returned by `acquire` into a measurement
///
/// Numbers become scalars, arrays traces and arrays of arrays images. The
/// `x_pts` key is taken as the sweep axis.
pub fn measurement_from_dynamic(value: Dynamic) -> std::result::Result<Measurement, String> {
    let type_name = value.type_name();
    let map = value
        .try_cast::<rhai::Map>()
        .ok_or_else(|| format!("acquire() must return a map, got {}", type_name))?;

    let mut measurement = Measurement::new();
    for (key, value) in map {
        let data = channel_from_dynamic(key.as_str(), value)?;
        if key.as_str() == X_AXIS {
            measurement = measurement.with_axis(key.to_string(), data);
        } else {
            measurement = measurement.with_channel(key.to_string(), data);
        }
    }
    Ok(measurement)
}

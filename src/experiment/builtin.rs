//! Built-in experiments running on simulated hardware
//!
//! - `Cos`: `avgi = alpha * sin(beta * x)`, `avgq` the quadrature
//! - `DampOsc`: `avgi = alpha * exp(-gamma * x) * sin(beta * x)`
//!
//! Both sweep `x` from `x_start` to `x_stop` over `points` values, add
//! `noise` and wait `interval` seconds per set.

use super::ExperimentDescriptor;
use crate::backend::{HardwareProxy, MockHardware, MockPattern};
use crate::config::{ConfigMap, RunConfig};
use crate::error::{QuarkyError, Result};
use serde_json::json;
use std::time::Duration;

fn template(extra: serde_json::Value) -> ConfigMap {
    let mut map = ConfigMap::new();
    let common = json!({
        "interval": 0.0,
        "x_start": 0.0,
        "x_stop": 10.0,
        "points": 101,
        "noise": 0.1,
        "seed": 1,
        "sets": 10,
    });
    for value in [common, extra] {
        if let serde_json::Value::Object(entries) = value {
            map.extend(entries);
        }
    }
    map
}

fn require_f64(config: &RunConfig, key: &str) -> Result<f64> {
    config
        .get_f64(key)
        .ok_or_else(|| QuarkyError::Experiment(format!("'{}' must be a number", key)))
}

/// Simulated readout with the sweep, noise and timing shared by all built-ins
fn sweep_hardware(name: &str, config: &RunConfig) -> Result<MockHardware> {
    let points = config
        .get_i64("points")
        .filter(|p| *p >= 1)
        .ok_or_else(|| QuarkyError::Experiment("'points' must be a positive integer".into()))?;
    let interval = require_f64(config, "interval")?;
    if !interval.is_finite() || interval < 0.0 {
        return Err(QuarkyError::Experiment(format!(
            "'interval' must be a non-negative number of seconds, got {}",
            interval
        )));
    }

    Ok(MockHardware::new(name)
        .with_sweep(
            require_f64(config, "x_start")?,
            require_f64(config, "x_stop")?,
            points as usize,
        )
        .with_latency(Duration::from_secs_f64(interval))
        .with_seed(config.get_i64("seed").unwrap_or(1) as u64))
}

/// `alpha * sin(beta * x)`
pub fn cos() -> ExperimentDescriptor {
    ExperimentDescriptor::new(
        "Cos",
        template(json!({ "alpha": 1.0, "beta": 1.0 })),
        |config: &RunConfig| {
            let alpha = require_f64(config, "alpha")?;
            let beta = require_f64(config, "beta")?;
            let noise = require_f64(config, "noise")?;
            let hardware = sweep_hardware("Cos", config)?
                .with_channel(
                    "avgi",
                    MockPattern::Sine {
                        amplitude: alpha,
                        frequency: beta,
                        phase: 0.0,
                    },
                )
                .with_channel(
                    "avgq",
                    MockPattern::Sine {
                        amplitude: alpha,
                        frequency: beta,
                        phase: std::f64::consts::FRAC_PI_2,
                    },
                )
                .with_noise(noise);
            Ok(Box::new(hardware) as Box<dyn HardwareProxy>)
        },
    )
    .with_description("Sinusoid over the sweep axis")
}

/// `alpha * exp(-gamma * x) * sin(beta * x)`
pub fn damp_osc() -> ExperimentDescriptor {
    ExperimentDescriptor::new(
        "DampOsc",
        template(json!({ "alpha": 1.0, "beta": 1.0, "gamma": 0.1 })),
        |config: &RunConfig| {
            let noise = require_f64(config, "noise")?;
            let hardware = sweep_hardware("DampOsc", config)?
                .with_channel(
                    "avgi",
                    MockPattern::DampedOscillation {
                        amplitude: require_f64(config, "alpha")?,
                        frequency: require_f64(config, "beta")?,
                        decay: require_f64(config, "gamma")?,
                    },
                )
                .with_channel("avgq", MockPattern::Constant(0.0))
                .with_noise(noise);
            Ok(Box::new(hardware) as Box<dyn HardwareProxy>)
        },
    )
    .with_description("Exponentially damped oscillation")
}

/// All built-in experiments
pub fn builtin_experiments() -> Vec<ExperimentDescriptor> {
    vec![cos(), damp_osc()]
}

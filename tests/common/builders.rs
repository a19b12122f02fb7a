//! Test data builders for measurements and run configurations

use quarky_rs::config::{ConfigMap, RunConfig, RunConfigBuilder};
use quarky_rs::types::{ChannelData, Measurement, X_AXIS};
use serde_json::Value;

/// Builder for creating test Measurements
#[derive(Default)]
pub struct MeasurementBuilder {
    measurement: Measurement,
}

impl MeasurementBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(mut self, name: &str, values: &[f64]) -> Self {
        self.measurement = self
            .measurement
            .with_channel(name, ChannelData::from_vec(values.to_vec()));
        self
    }

    pub fn scalar(mut self, name: &str, value: f64) -> Self {
        self.measurement = self.measurement.with_channel(name, ChannelData::scalar(value));
        self
    }

    pub fn sweep(mut self, values: &[f64]) -> Self {
        self.measurement = self
            .measurement
            .with_axis(X_AXIS, ChannelData::from_vec(values.to_vec()));
        self
    }

    pub fn build(self) -> Measurement {
        self.measurement
    }
}

/// Build a JSON object from a `json!` literal
pub fn config_map(value: Value) -> ConfigMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Base configuration with the given budget
pub fn run_config(reps: u32, sets: u32) -> RunConfig {
    RunConfigBuilder::from_base()
        .reps(reps)
        .sets(sets)
        .build()
        .expect("base config is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_builder() {
        let m = MeasurementBuilder::new()
            .trace("avgi", &[1.0, 2.0])
            .scalar("amp", 0.5)
            .sweep(&[0.0, 1.0])
            .build();

        assert_eq!(m.channels.len(), 2);
        assert_eq!(m.channels["avgi"].shape(), &[2]);
        assert_eq!(m.axes[X_AXIS].values(), &[0.0, 1.0]);
    }
}

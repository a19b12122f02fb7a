//! Mock Hardware Implementation for Testing
//!
//! This module provides a simulated RFSoC readout that can be used to run
//! experiments without an instrument. Every call to `acquire` evaluates the
//! configured pattern of each channel across the sweep axis and adds
//! deterministic noise, so repeated runs produce the same numbers.
//!
//! # Data Patterns
//!
//! - [`MockPattern::Constant`] - Fixed value
//! - [`MockPattern::Sequence`] - One value per acquisition, cycling
//! - [`MockPattern::Sine`] - `amplitude * sin(frequency * x + phase)`
//! - [`MockPattern::DampedOscillation`] - Ramsey/T2-style decaying oscillation
//! - [`MockPattern::Lorentzian`] - Resonator or qubit spectroscopy peak
//!
//! # Example
//!
//! ```ignore
//! use quarky_rs::backend::{MockHardware, MockPattern};
//!
//! let hardware = MockHardware::new("mock-rfsoc")
//!     .with_sweep(0.0, 10.0, 101)
//!     .with_channel("avgi", MockPattern::Sine { amplitude: 1.0, frequency: 2.0, phase: 0.0 })
//!     .with_noise(0.05);
//! ```

use super::hardware_trait::{HardwareFault, HardwareProxy, HardwareResult};
use crate::types::{ChannelData, Measurement, X_AXIS};
use std::time::Duration;

/// Pattern for generating mock data
#[derive(Debug, Clone, PartialEq)]
pub enum MockPattern {
    /// Constant value
    Constant(f64),
    /// Value taken from the list by acquisition number, wrapping around
    Sequence(Vec<f64>),
    /// Sine over the sweep axis
    Sine {
        amplitude: f64,
        frequency: f64,
        phase: f64,
    },
    /// `amplitude * exp(-decay * x) * sin(frequency * x)`
    DampedOscillation {
        amplitude: f64,
        frequency: f64,
        decay: f64,
    },
    /// Lorentzian peak of the given full width at half maximum
    Lorentzian {
        amplitude: f64,
        center: f64,
        width: f64,
        offset: f64,
    },
}

impl Default for MockPattern {
    fn default() -> Self {
        MockPattern::Sine {
            amplitude: 1.0,
            frequency: 1.0,
            phase: 0.0,
        }
    }
}

impl MockPattern {
    /// Evaluate the pattern at sweep point `x` for acquisition number `call`
    pub fn evaluate(&self, x: f64, call: usize) -> f64 {
        match self {
            MockPattern::Constant(v) => *v,
            MockPattern::Sequence(values) => {
                if values.is_empty() {
                    0.0
                } else {
                    values[call % values.len()]
                }
            }
            MockPattern::Sine {
                amplitude,
                frequency,
                phase,
            } => amplitude * (frequency * x + phase).sin(),
            MockPattern::DampedOscillation {
                amplitude,
                frequency,
                decay,
            } => amplitude * (-decay * x).exp() * (frequency * x).sin(),
            MockPattern::Lorentzian {
                amplitude,
                center,
                width,
                offset,
            } => {
                let half = width / 2.0;
                offset + amplitude * half * half / ((x - center).powi(2) + half * half)
            }
        }
    }
}

/// Configuration for one simulated readout channel
#[derive(Debug, Clone)]
pub struct MockChannelConfig {
    /// Channel name, e.g. `avgi`
    pub name: String,
    /// Data generation pattern
    pub pattern: MockPattern,
    /// Noise amplitude to add (0.0 = no noise)
    pub noise_amplitude: f64,
}

/// Simulated instrument implementing [`HardwareProxy`]
#[derive(Debug, Clone)]
pub struct MockHardware {
    name: String,
    sweep: Option<Vec<f64>>,
    channels: Vec<MockChannelConfig>,
    latency: Duration,
    fail_on_call: Option<(usize, HardwareFault)>,
    connected: bool,
    calls: usize,
    rng_state: u64,
}

impl MockHardware {
    /// Create a mock instrument with no channels
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sweep: None,
            channels: Vec::new(),
            latency: Duration::ZERO,
            fail_on_call: None,
            connected: true,
            calls: 0,
            rng_state: 0x9E37_79B9_7F4A_7C15,
        }
    }

    /// Sweep `points` evenly spaced values from `start` to `stop` inclusive
    ///
    /// The sweep is returned as the `x_pts` axis. Without a sweep every
    /// channel is a single-point trace.
    pub fn with_sweep(mut self, start: f64, stop: f64, points: usize) -> Self {
        self.sweep = Some(linspace(start, stop, points));
        self
    }

    /// Add a channel with the given pattern
    pub fn with_channel(mut self, name: impl Into<String>, pattern: MockPattern) -> Self {
        self.channels.push(MockChannelConfig {
            name: name.into(),
            pattern,
            noise_amplitude: 0.0,
        });
        self
    }

    /// Set the noise amplitude of every channel added so far
    pub fn with_noise(mut self, amplitude: f64) -> Self {
        for channel in &mut self.channels {
            channel.noise_amplitude = amplitude;
        }
        self
    }

    /// Seed the noise generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        // xorshift must not start from zero
        self.rng_state = seed.max(1);
        self
    }

    /// Block for `latency` inside every acquisition
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the `call`-th acquisition (1-based) with `fault`
    pub fn fail_on_call(mut self, call: usize, fault: HardwareFault) -> Self {
        self.fail_on_call = Some((call, fault));
        self
    }

    /// Simulate a dropped instrument link
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    /// Number of `acquire` calls made so far
    pub fn calls(&self) -> usize {
        self.calls
    }

    fn next_noise(&mut self) -> f64 {
        let mut s = self.rng_state;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.rng_state = s;
        (s as f64) / (u64::MAX as f64) - 0.5
    }
}

impl HardwareProxy for MockHardware {
    fn acquire(&mut self) -> HardwareResult<Measurement> {
        let call = self.calls;
        self.calls += 1;

        if !self.connected {
            return Err(HardwareFault::NotConnected);
        }
        if let Some((n, fault)) = &self.fail_on_call {
            if *n == self.calls {
                return Err(fault.clone());
            }
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let xs = self.sweep.clone().unwrap_or_else(|| vec![0.0]);
        let mut measurement = Measurement::new();
        for i in 0..self.channels.len() {
            let MockChannelConfig {
                name,
                pattern,
                noise_amplitude,
            } = self.channels[i].clone();
            let mut values = Vec::with_capacity(xs.len());
            for &x in &xs {
                let base = pattern.evaluate(x, call);
                if noise_amplitude > 0.0 {
                    values.push(base + 2.0 * noise_amplitude * self.next_noise());
                } else {
                    values.push(base);
                }
            }
            measurement = measurement.with_channel(name, ChannelData::from_vec(values));
        }
        if self.sweep.is_some() {
            measurement = measurement.with_axis(X_AXIS, ChannelData::from_vec(xs));
        }
        Ok(measurement)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// `points` evenly spaced values from `start` to `stop` inclusive
pub fn linspace(start: f64, stop: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![start],
        n => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

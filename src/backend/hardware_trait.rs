//! HardwareProxy trait for the instrument side of an acquisition run
//!
//! This module provides the one capability the acquisition loop needs from an
//! instrument: produce a measurement when asked. Real RFSoC connections, mock
//! hardware and scripted experiments all implement the same trait.

use crate::types::Measurement;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fault raised by a hardware proxy while acquiring
///
/// The core never retries; the fault terminates the run and is reported once.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareFault {
    /// The instrument link is down
    #[error("Instrument not connected")]
    NotConnected,

    /// The instrument did not answer in time (as judged by the proxy)
    #[error("Instrument timeout: {0}")]
    Timeout(String),

    /// The instrument reported an error
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// A scripted experiment failed while evaluating
    #[error("Experiment script error: {0}")]
    Script(String),

    /// The proxy returned data the core cannot interpret
    #[error("Malformed measurement: {0}")]
    Malformed(String),
}

/// Result type for hardware proxy operations
pub type HardwareResult<T> = std::result::Result<T, HardwareFault>;

/// Unified interface for anything that can produce measurement batches
///
/// Implementations must be `Send` so the proxy can move onto the worker
/// thread. `acquire` may block for as long as the instrument needs; timeout
/// and retry policy belong to the implementation, not to the caller.
///
/// # Example
///
/// ```ignore
/// fn take_one(proxy: &mut dyn HardwareProxy) -> HardwareResult<Measurement> {
///     proxy.acquire()
/// }
/// ```
pub trait HardwareProxy: Send {
    /// Acquire one measurement batch
    fn acquire(&mut self) -> HardwareResult<Measurement>;

    /// Human-readable name used in logs
    fn name(&self) -> &str {
        "hardware"
    }
}

impl<T: HardwareProxy + ?Sized> HardwareProxy for Box<T> {
    fn acquire(&mut self) -> HardwareResult<Measurement> {
        (**self).acquire()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Timing statistics for the acquisitions of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionStats {
    /// Number of acquisitions that returned a measurement
    pub successful: u64,
    /// Number of acquisitions that raised a fault
    pub failed: u64,
    /// Total time spent inside `acquire` in microseconds
    pub total_time_us: u64,
    /// Duration of the last successful acquisition in microseconds
    pub last_time_us: u64,
    /// Fastest successful acquisition in microseconds
    pub min_time_us: u64,
    /// Slowest successful acquisition in microseconds
    pub max_time_us: u64,
}

impl Default for AcquisitionStats {
    fn default() -> Self {
        Self {
            successful: 0,
            failed: 0,
            total_time_us: 0,
            last_time_us: 0,
            min_time_us: u64::MAX,
            max_time_us: 0,
        }
    }
}

impl AcquisitionStats {
    /// Record a successful acquisition
    pub fn record_success(&mut self, time_us: u64) {
        self.successful += 1;
        self.total_time_us += time_us;
        self.last_time_us = time_us;
        self.min_time_us = self.min_time_us.min(time_us);
        self.max_time_us = self.max_time_us.max(time_us);
    }

    /// Record a failed acquisition
    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Average acquisition time in microseconds
    pub fn avg_time_us(&self) -> f64 {
        if self.successful == 0 {
            0.0
        } else {
            self.total_time_us as f64 / self.successful as f64
        }
    }

    /// Success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.successful + self.failed;
        if total == 0 {
            100.0
        } else {
            (self.successful as f64 / total as f64) * 100.0
        }
    }

    /// Fastest acquisition, 0 when nothing succeeded yet
    pub fn min_time_us(&self) -> u64 {
        if self.successful == 0 {
            0
        } else {
            self.min_time_us
        }
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record() {
        let mut stats = AcquisitionStats::default();
        assert_eq!(stats.min_time_us(), 0);
        assert_eq!(stats.success_rate(), 100.0);

        stats.record_success(100);
        stats.record_success(300);
        stats.record_failure();

        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.avg_time_us(), 200.0);
        assert_eq!(stats.min_time_us(), 100);
        assert_eq!(stats.max_time_us, 300);
        assert!((stats.success_rate() - 66.666).abs() < 0.01);

        stats.reset();
        assert_eq!(stats, AcquisitionStats::default());
    }

    #[test]
    fn test_fault_display() {
        let fault = HardwareFault::Instrument("ADC overflow".to_string());
        assert_eq!(fault.to_string(), "Instrument error: ADC overflow");
    }
}

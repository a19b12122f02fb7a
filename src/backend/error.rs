//! Acquisition-run error types.

use crate::backend::hardware_trait::HardwareFault;
use thiserror::Error;

/// Errors that terminate (or prevent) an acquisition run.
///
/// Cloneable so that the same fault can be delivered to every event
/// subscriber.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    /// The hardware proxy raised while acquiring a set.
    #[error("Acquisition fault on set {set_index}: {fault}")]
    Fault {
        set_index: usize,
        fault: HardwareFault,
    },

    /// A batch channel disagrees with the shape established earlier in the run.
    #[error("Shape mismatch on channel '{channel}': expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        channel: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// A batch arrived with the wrong set index. Internal invariant violation.
    #[error("Out-of-order batch: expected set {expected}, got {got}")]
    OutOfOrderBatch { expected: usize, got: usize },

    /// A run was requested while the previous one is still active.
    #[error("A previous run is still active")]
    RunNotIdle,
}

impl AcquisitionError {
    /// True for invariant violations that indicate a bug rather than a bad instrument.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, AcquisitionError::OutOfOrderBatch { .. })
    }
}

pub type AcquisitionResult<T> = std::result::Result<T, AcquisitionError>;

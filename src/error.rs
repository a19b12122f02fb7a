//! Error handling for the Quarky application
//!
//! This module defines the crate-wide error type and a Result alias for use
//! throughout the application. Errors raised inside an acquisition run have
//! their own taxonomy in [`crate::backend::AcquisitionError`] and convert
//! into [`QuarkyError`] at the crate boundary.

use crate::backend::AcquisitionError;
use thiserror::Error;

/// Main error type for Quarky operations
#[derive(Error, Debug)]
pub enum QuarkyError {
    /// Errors raised by an acquisition run
    #[error("Acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// Errors related to run configuration building, loading or saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to experiment registration and lookup
    #[error("Experiment error: {0}")]
    Experiment(String),

    /// Errors related to Rhai script execution
    #[error("Script error: {0}")]
    Script(String),

    /// Errors related to dataset persistence
    #[error("Storage error: {0}")]
    Storage(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Malformed channel payloads
    #[error("Invalid channel data: {0}")]
    ChannelData(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<QuarkyError>,
    },
}

impl QuarkyError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        QuarkyError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a script error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        QuarkyError::Script(err.to_string())
    }
}

impl From<serde_json::Error> for QuarkyError {
    fn from(err: serde_json::Error) -> Self {
        QuarkyError::Serialization(err.to_string())
    }
}

/// Result type alias for Quarky operations
pub type Result<T> = std::result::Result<T, QuarkyError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| QuarkyError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| QuarkyError::from_rhai_error(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuarkyError::Config("sets must be positive".to_string());
        assert_eq!(err.to_string(), "Configuration error: sets must be positive");
    }

    #[test]
    fn test_error_with_context() {
        let err = QuarkyError::Storage("disk full".to_string());
        let with_ctx = err.with_context("Failed to save dataset");
        assert!(with_ctx.to_string().contains("Failed to save dataset"));
        assert!(with_ctx.to_string().contains("disk full"));
    }

    #[test]
    fn test_acquisition_error_converts() {
        let err: QuarkyError = AcquisitionError::RunNotIdle.into();
        assert!(matches!(err, QuarkyError::Acquisition(AcquisitionError::RunNotIdle)));
        assert!(err.to_string().starts_with("Acquisition error"));
    }

    #[test]
    fn test_result_ext_context() {
        let res: Result<()> = Err(QuarkyError::Experiment("unknown".to_string()));
        let err = res.context("lookup").unwrap_err();
        assert!(matches!(err, QuarkyError::WithContext { .. }));
    }
}

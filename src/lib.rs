//! # Quarky-RS: live acquisition for RFSoC qubit experiments
//!
//! Runs an experiment against an instrument set after set, keeps a running
//! average of everything it returns, and hands every new average to plot
//! renderers and dataset writers while the run is still going.
//!
//! ## Architecture
//!
//! - **Backend**: The acquisition worker runs in its own thread; a hardware
//!   proxy produces measurements, the aggregator averages them
//! - **Sinks**: Renderers and dataset persistence consume the worker's events
//! - **Experiments**: Built-in simulated experiments and Rhai-scripted ones
//! - **Communication**: Crossbeam channels for thread-safe event delivery
//!
//! ## Configuration
//!
//! Runner settings come from `quarky.toml`. Datasets default to the
//! platform data directory under `quarky-rs`:
//!
//! - **Linux**: `~/.local/share/quarky-rs/data/`
//! - **macOS**: `~/Library/Application Support/quarky-rs/data/`
//! - **Windows**: `%APPDATA%\quarky-rs\data\`
//!
//! ## Example
//!
//! ```ignore
//! use quarky_rs::{
//!     backend::ExperimentBackend,
//!     experiment::ExperimentRegistry,
//!     sinks::{DatasetWriter, SinkRunner, TraceRenderer},
//! };
//!
//! let registry = ExperimentRegistry::with_builtins();
//! let experiment = registry.get("DampOsc")?;
//! let config = experiment.run_config(&Default::default())?;
//!
//! let mut backend = ExperimentBackend::default();
//! let run = backend.start(experiment.instantiate(&config)?, config.clone())?;
//!
//! let report = SinkRunner::new(config)
//!     .with_renderer(Box::new(TraceRenderer::new()))
//!     .with_persistence(Box::new(DatasetWriter::new("data", "DampOsc", "data")))
//!     .run(run.events().clone());
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod experiment;
pub mod logging;
pub mod scripting;
pub mod sinks;
pub mod types;

// Re-export commonly used types
pub use backend::{
    AcquisitionError, AcquisitionWorker, ExperimentBackend, HardwareFault, HardwareProxy,
    RunEvent, RunHandle, RunOutcome, RunSummary,
};
pub use config::{RunConfig, RunConfigBuilder, Settings};
pub use error::{QuarkyError, Result};
pub use experiment::{ExperimentDescriptor, ExperimentRegistry};
pub use scripting::ScriptedExperiment;
pub use types::{AggregateSnapshot, Batch, ChannelData, Measurement, RunProgress};

//! Backend module for running acquisitions off the caller's thread
//!
//! This module runs every acquisition in a separate thread so the caller (a
//! CLI, a GUI event loop, a test) stays responsive. It uses crossbeam
//! channels for thread-safe delivery of run events.
//!
//! # Architecture
//!
//! - [`ExperimentBackend`] - Entry point that spawns one worker thread per run
//! - [`RunHandle`] - Caller-side handle for receiving events and stopping the run
//! - [`RunEvent`] - Messages sent from the worker to observers
//!
//! # Components
//!
//! - [`HardwareProxy`] - The instrument capability a run consumes
//! - [`MockHardware`] - Simulated instrument for tests and demos
//! - [`Aggregator`] - Running-mean accumulation of batches
//! - [`AcquisitionWorker`] - The acquisition loop itself
//!
//! # Example
//!
//! ```ignore
//! use quarky_rs::backend::{ExperimentBackend, MockHardware, MockPattern, RunEvent};
//! use quarky_rs::config::RunConfig;
//!
//! let mut backend = ExperimentBackend::new(1024);
//! let hardware = MockHardware::new("mock").with_channel("avgi", MockPattern::Constant(1.0));
//! let run = backend.start(Box::new(hardware), RunConfig::new(100, 5)?)?;
//!
//! for event in run.events().iter() {
//!     if let RunEvent::Finished(summary) = event {
//!         println!("{} sets", summary.sets_completed);
//!         break;
//!     }
//! }
//! ```

pub mod aggregator;
pub mod error;
pub mod hardware_trait;
pub mod mock_hardware;
pub mod worker;

pub use aggregator::Aggregator;
pub use error::{AcquisitionError, AcquisitionResult};
pub use hardware_trait::{AcquisitionStats, HardwareFault, HardwareProxy, HardwareResult};
pub use mock_hardware::{linspace, MockChannelConfig, MockHardware, MockPattern};
pub use worker::{
    AcquisitionWorker, RunEvent, RunOutcome, RunSummary, StopHandle, WorkerState,
};

use crate::config::RunConfig;
use crate::error::{QuarkyError, Result};
use crossbeam_channel::{never, unbounded, Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Default number of queued events before progress events are skipped
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Caller-side handle of a run started by [`ExperimentBackend::start`]
///
/// The worker never waits for this handle. While more than the backend's
/// event capacity is queued, `DataUpdated` and `Progress` are skipped;
/// `Error` and `Finished` always arrive.
#[derive(Debug)]
pub struct RunHandle {
    events: Receiver<RunEvent>,
    stop: StopHandle,
    thread: Option<JoinHandle<RunSummary>>,
}

impl RunHandle {
    /// Receiver of the run's events
    ///
    /// Crossbeam receivers are multi-consumer: a clone competes for events
    /// rather than duplicating them. Use [`crate::sinks::EventBus`] to fan out.
    pub fn events(&self) -> &Receiver<RunEvent> {
        &self.events
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<RunEvent> {
        self.events.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<RunEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Receive all pending events
    pub fn drain(&self) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Request cancellation after the set in flight
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Cloneable stop handle, e.g. for a signal handler
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Current worker state
    pub fn state(&self) -> WorkerState {
        self.stop.state()
    }

    /// True once the worker thread has returned
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker thread and return the run summary
    ///
    /// Events not yet received are discarded; use
    /// [`RunHandle::join_with_events`] to collect them. Clones of
    /// [`RunHandle::events`] keep receiving.
    pub fn join(mut self) -> Result<RunSummary> {
        let thread = self
            .thread
            .take()
            .ok_or_else(|| QuarkyError::Channel("Run already joined".to_string()))?;
        drop(std::mem::replace(&mut self.events, never()));
        thread
            .join()
            .map_err(|_| QuarkyError::Channel("Acquisition thread panicked".to_string()))
    }

    /// Wait for the run to end and return every event it emitted
    pub fn join_with_events(self) -> Result<(RunSummary, Vec<RunEvent>)> {
        let mut events = Vec::new();
        for event in self.events.iter() {
            let last = matches!(event, RunEvent::Finished(_));
            events.push(event);
            if last {
                break;
            }
        }
        let summary = self.join()?;
        Ok((summary, events))
    }
}

/// Spawns acquisition runs, one at a time
pub struct ExperimentBackend {
    event_capacity: usize,
    active: Option<StopHandle>,
}

impl Default for ExperimentBackend {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl ExperimentBackend {
    /// Create a backend whose runs queue up to `event_capacity` progress events
    pub fn new(event_capacity: usize) -> Self {
        Self {
            event_capacity: event_capacity.max(1),
            active: None,
        }
    }

    /// Start a run on a new worker thread
    ///
    /// Fails with [`AcquisitionError::RunNotIdle`] while the previous run is
    /// still `Running` or `Stopping`.
    pub fn start(&mut self, hardware: Box<dyn HardwareProxy>, config: RunConfig) -> Result<RunHandle> {
        if !self.is_idle() {
            tracing::warn!("Run requested while the previous run is still active");
            return Err(AcquisitionError::RunNotIdle.into());
        }

        let (event_tx, event_rx) = unbounded();
        let mut worker = AcquisitionWorker::new(hardware, config, event_tx)
            .with_event_capacity(self.event_capacity);
        // Enter Running before spawning so an immediate stop() is honored
        worker.begin()?;
        let stop = worker.stop_handle();

        let thread = std::thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || worker.execute())?;

        self.active = Some(stop.clone());
        Ok(RunHandle {
            events: event_rx,
            stop,
            thread: Some(thread),
        })
    }

    /// Stop the active run, if any
    pub fn stop(&self) {
        if let Some(stop) = &self.active {
            stop.stop();
        }
    }

    /// True when no run is `Running` or `Stopping`
    pub fn is_idle(&self) -> bool {
        self.active
            .as_ref()
            .map_or(true, |stop| !stop.state().is_active())
    }
}

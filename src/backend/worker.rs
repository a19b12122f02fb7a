//! Acquisition Worker Implementation
//!
//! This module contains the acquisition loop that runs in a separate thread
//! and drives one run from start to finish. It communicates with observers
//! through a crossbeam channel of [`RunEvent`]s.
//!
//! # Responsibilities
//!
//! For every scheduled set the worker:
//!
//! - **Acquires**: calls the hardware proxy once
//! - **Stamps**: turns the measurement into a [`Batch`] carrying its set index
//! - **Aggregates**: folds the batch into the running means
//! - **Publishes**: emits `DataUpdated` followed by `Progress`
//!
//! Exactly one `Finished` event closes every run, whatever the outcome.
//!
//! # Cancellation
//!
//! A [`StopHandle`] may be triggered from any thread. The flag is checked
//! between sets only: an acquisition already in flight always completes and
//! its batch is published before the worker honors the stop.
//!
//! # Faults
//!
//! The first error (hardware fault or aggregation error) ends the run. It is
//! published once as an `Error` event before `Finished`, and no `DataUpdated`
//! is emitted for the failed set.
//!
//! # Event delivery
//!
//! The loop never waits for observers. `DataUpdated` and `Progress` are
//! skipped while `event_capacity` events are still queued; every snapshot is
//! cumulative, so the next one delivered carries the skipped sets too.
//! `Error` and `Finished` are always queued. Use an unbounded channel (as
//! [`super::ExperimentBackend`] does) so they can never block.

use super::aggregator::Aggregator;
use super::error::{AcquisitionError, AcquisitionResult};
use super::hardware_trait::{AcquisitionStats, HardwareProxy};
use crate::config::RunConfig;
use crate::types::{AggregateSnapshot, Batch, RunProgress};
use super::DEFAULT_EVENT_CAPACITY;
use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle state of an acquisition worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum WorkerState {
    /// No run started yet
    Idle = 0,
    /// Acquiring sets
    Running = 1,
    /// Stop requested; the current set is being finished
    Stopping = 2,
    /// The last run ended (completed, stopped or failed)
    Finished = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            3 => WorkerState::Finished,
            _ => WorkerState::Idle,
        }
    }

    /// True while a run is in progress
    pub fn is_active(self) -> bool {
        matches!(self, WorkerState::Running | WorkerState::Stopping)
    }
}

/// Cloneable handle used to request cancellation of a running worker
///
/// Stopping is only meaningful while the worker is `Running`; in any other
/// state it does nothing.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    state: Arc<AtomicU8>,
}

impl StopHandle {
    /// Create a handle for a worker that has not started yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation after the set currently in flight
    pub fn stop(&self) {
        let _ = self.state.compare_exchange(
            WorkerState::Running as u8,
            WorkerState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Current worker state
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Atomically enter `Running` unless a run is already active
    fn begin(&self) -> AcquisitionResult<()> {
        let current = self.state.load(Ordering::SeqCst);
        if WorkerState::from_u8(current).is_active() {
            return Err(AcquisitionError::RunNotIdle);
        }
        self.state
            .compare_exchange(
                current,
                WorkerState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|_| AcquisitionError::RunNotIdle)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every scheduled set was acquired
    Completed,
    /// A stop request ended the run early
    Stopped,
    /// A fault ended the run
    Failed(AcquisitionError),
}

impl RunOutcome {
    /// Short label used in logs and CLI output
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Stopped => "stopped",
            RunOutcome::Failed(_) => "failed",
        }
    }
}

/// Final report carried by the `Finished` event
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// How the run ended
    pub outcome: RunOutcome,
    /// Sets successfully aggregated
    pub sets_completed: usize,
    /// Sets scheduled by the run configuration
    pub sets_scheduled: usize,
    /// Timing statistics of the hardware proxy
    pub stats: AcquisitionStats,
    /// Aggregate at the end of the run
    pub final_snapshot: AggregateSnapshot,
    /// `DataUpdated`/`Progress` events skipped because observers lagged
    pub events_skipped: usize,
}

/// Event emitted by the worker, in this order per set:
/// `DataUpdated`, `Progress`. A run ends with at most one `Error` followed by
/// exactly one `Finished`.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A new aggregate is available
    DataUpdated(AggregateSnapshot),
    /// A set was completed
    Progress(RunProgress),
    /// The run failed
    Error(AcquisitionError),
    /// The run ended
    Finished(RunSummary),
}

impl RunEvent {
    /// `Error` and `Finished` are never skipped
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Error(_) | RunEvent::Finished(_))
    }
}

/// Result of offering an event to one receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Sent,
    Skipped,
    Disconnected,
}

/// Queue `event` without waiting on a lagging receiver
///
/// Non-terminal events are skipped once `capacity` events are queued.
/// Terminal events are always sent.
pub(crate) fn deliver(sender: &Sender<RunEvent>, event: RunEvent, capacity: usize) -> Delivery {
    if event.is_terminal() {
        return match sender.send(event) {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::Disconnected,
        };
    }
    if sender.len() >= capacity {
        return Delivery::Skipped;
    }
    match sender.try_send(event) {
        Ok(()) => Delivery::Sent,
        Err(TrySendError::Full(_)) => Delivery::Skipped,
        Err(TrySendError::Disconnected(_)) => Delivery::Disconnected,
    }
}

/// The acquisition loop for one hardware proxy
pub struct AcquisitionWorker {
    hardware: Box<dyn HardwareProxy>,
    config: RunConfig,
    aggregator: Aggregator,
    stop: StopHandle,
    event_sender: Sender<RunEvent>,
    event_capacity: usize,
    events_skipped: usize,
    stats: AcquisitionStats,
    observers_gone: bool,
}

impl AcquisitionWorker {
    /// Create a new worker
    pub fn new(
        hardware: Box<dyn HardwareProxy>,
        config: RunConfig,
        event_sender: Sender<RunEvent>,
    ) -> Self {
        Self {
            hardware,
            config,
            aggregator: Aggregator::new(),
            stop: StopHandle::new(),
            event_sender,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            events_skipped: 0,
            stats: AcquisitionStats::default(),
            observers_gone: false,
        }
    }

    /// Queue at most `capacity` progress events for lagging observers
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Use an existing stop handle, e.g. one captured by the hardware proxy
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Get a handle to stop the run
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        self.stop.state()
    }

    /// Run configuration used by the next run
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Replace the configuration for the next run
    pub fn set_config(&mut self, config: RunConfig) -> AcquisitionResult<()> {
        if self.state().is_active() {
            return Err(AcquisitionError::RunNotIdle);
        }
        self.config = config;
        Ok(())
    }

    /// Copy of the current aggregate
    pub fn snapshot(&self) -> AggregateSnapshot {
        self.aggregator.snapshot()
    }

    /// Return to `Idle`, discarding the aggregate of the last run
    pub fn reset(&mut self) -> AcquisitionResult<()> {
        if self.state().is_active() {
            return Err(AcquisitionError::RunNotIdle);
        }
        self.aggregator.reset();
        self.stats.reset();
        self.stop.set(WorkerState::Idle);
        Ok(())
    }

    /// Execute a full run on the calling thread
    ///
    /// Fails with `RunNotIdle` without emitting anything if a run is already
    /// active. Otherwise blocks until the run ends and returns its summary,
    /// which is also delivered as the `Finished` event.
    pub fn run(&mut self) -> AcquisitionResult<RunSummary> {
        self.begin()?;
        Ok(self.execute())
    }

    /// Enter `Running` and clear the previous aggregate
    pub(crate) fn begin(&mut self) -> AcquisitionResult<()> {
        self.stop.begin()?;
        self.aggregator.reset();
        self.stats.reset();
        self.events_skipped = 0;
        self.observers_gone = false;
        Ok(())
    }

    /// The acquisition loop; `begin` must have succeeded
    pub(crate) fn execute(&mut self) -> RunSummary {
        let sets = self.config.sets() as usize;
        let reps = self.config.reps();
        tracing::info!(
            "Acquisition started on '{}' ({} sets x {} reps)",
            self.hardware.name(),
            sets,
            reps
        );

        let mut outcome = RunOutcome::Completed;
        let mut completed = 0usize;

        for set_index in 0..sets {
            if self.stop.state() == WorkerState::Stopping {
                tracing::info!("Stop requested, ending run after {} sets", completed);
                outcome = RunOutcome::Stopped;
                break;
            }

            match self.acquire_set(set_index) {
                Ok(snapshot) => {
                    completed = set_index + 1;
                    self.emit(RunEvent::DataUpdated(snapshot));
                    self.emit(RunEvent::Progress(RunProgress::new(
                        completed as u32,
                        reps,
                        sets as u32,
                    )));
                }
                Err(e) => {
                    if e.is_programming_error() {
                        tracing::error!("Aggregation invariant violated: {}", e);
                    } else {
                        tracing::error!("Run failed on set {}: {}", set_index, e);
                    }
                    self.emit(RunEvent::Error(e.clone()));
                    outcome = RunOutcome::Failed(e);
                    break;
                }
            }
        }

        self.stop.set(WorkerState::Finished);

        let summary = RunSummary {
            outcome,
            sets_completed: completed,
            sets_scheduled: sets,
            stats: self.stats.clone(),
            final_snapshot: self.aggregator.snapshot(),
            events_skipped: self.events_skipped,
        };
        if self.events_skipped > 0 {
            tracing::debug!("{} progress events skipped for lagging observers", self.events_skipped);
        }
        tracing::info!(
            "Acquisition {} after {}/{} sets (avg {:.1} us per set)",
            summary.outcome.label(),
            summary.sets_completed,
            summary.sets_scheduled,
            summary.stats.avg_time_us()
        );
        self.emit(RunEvent::Finished(summary.clone()));
        summary
    }

    fn acquire_set(&mut self, set_index: usize) -> AcquisitionResult<AggregateSnapshot> {
        let start = Instant::now();
        let measurement = match self.hardware.acquire() {
            Ok(m) => {
                self.stats
                    .record_success(start.elapsed().as_micros() as u64);
                m
            }
            Err(fault) => {
                self.stats.record_failure();
                return Err(AcquisitionError::Fault { set_index, fault });
            }
        };
        tracing::debug!(
            "Set {} acquired with {} channels",
            set_index,
            measurement.channels.len()
        );
        self.aggregator.update(Batch::new(set_index, measurement))
    }

    /// Deliver an event; a run without observers keeps going
    fn emit(&mut self, event: RunEvent) {
        match deliver(&self.event_sender, event, self.event_capacity) {
            Delivery::Sent => {}
            Delivery::Skipped => self.events_skipped += 1,
            Delivery::Disconnected => {
                if !self.observers_gone {
                    self.observers_gone = true;
                    tracing::debug!("No event subscribers left, events are dropped");
                }
            }
        }
    }
}

//! Consumers of run events
//!
//! The worker publishes [`RunEvent`]s on a single channel. This module turns
//! that channel into something useful:
//!
//! - [`EventBus`] - fans one event stream out to any number of subscribers
//! - [`SinkRunner`] - drives renderers and dataset persistence from events
//! - [`render`] - plot planning and renderer implementations
//! - [`dataset`] - JSON dataset files
//!
//! # Example
//!
//! ```ignore
//! let mut bus = EventBus::new(256);
//! let sink_events = bus.subscribe();
//! let progress = bus.subscribe();
//! bus.forward(run.events().clone())?;
//!
//! let sinks = SinkRunner::new(config)
//!     .with_renderer(Box::new(TraceRenderer::new()))
//!     .with_persistence(Box::new(DatasetWriter::new(root, "Cos", "data")))
//!     .spawn(sink_events)?;
//! ```

pub mod dataset;
pub mod render;

pub use dataset::{dataset_path, DatasetFile, DatasetWriter, PersistenceSink};
pub use render::{plan_plots, PlotBuffer, PlotFrame, PlotKind, PlotSpec, Renderer, TraceRenderer};

use crate::backend::worker::{deliver, Delivery};
use crate::backend::{AcquisitionError, RunEvent, RunSummary};
use crate::config::RunConfig;
use crate::error::Result;
use crate::types::AggregateSnapshot;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::PathBuf;
use std::thread::JoinHandle;

/// Broadcasts run events to every subscriber
///
/// Each subscriber gets its own queue. A subscriber holding `capacity`
/// unread events misses `DataUpdated` and `Progress` until it catches up,
/// so one stalled consumer never holds up the others. `Error` and `Finished`
/// reach every live subscriber. Subscribers whose receiver was dropped are
/// removed.
pub struct EventBus {
    subscribers: Vec<Sender<RunEvent>>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus whose subscribers queue up to `capacity` progress events
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Add a subscriber
    pub fn subscribe(&mut self) -> Receiver<RunEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver an event to every live subscriber; returns how many got it
    pub fn publish(&mut self, event: &RunEvent) -> usize {
        let capacity = self.capacity;
        let mut delivered = 0;
        self.subscribers.retain(|subscriber| {
            match deliver(subscriber, event.clone(), capacity) {
                Delivery::Sent => {
                    delivered += 1;
                    true
                }
                Delivery::Skipped => true,
                Delivery::Disconnected => false,
            }
        });
        delivered
    }

    /// Forward `source` on a new thread until `Finished` or disconnection
    ///
    /// The thread returns the number of events forwarded.
    pub fn forward(mut self, source: Receiver<RunEvent>) -> Result<JoinHandle<usize>> {
        let handle = std::thread::Builder::new()
            .name("event-bus".to_string())
            .spawn(move || {
                let mut forwarded = 0;
                for event in source.iter() {
                    let last = matches!(event, RunEvent::Finished(_));
                    self.publish(&event);
                    forwarded += 1;
                    if last {
                        break;
                    }
                }
                forwarded
            })?;
        Ok(handle)
    }
}

/// What a [`SinkRunner`] did during one run
#[derive(Debug, Clone, Default)]
pub struct SinkReport {
    /// Snapshots passed to the renderers
    pub snapshots_rendered: usize,
    /// Renderer calls that failed
    pub render_failures: usize,
    /// Paths written, one entry per successful save
    pub saved: Vec<PathBuf>,
    /// Saves that failed
    pub save_failures: usize,
    /// Errors reported by the run
    pub errors: Vec<AcquisitionError>,
    /// Final summary, if `Finished` was received
    pub summary: Option<RunSummary>,
}

impl SinkReport {
    /// Last dataset written
    pub fn last_saved(&self) -> Option<&PathBuf> {
        self.saved.last()
    }
}

/// Feeds renderers and persistence from a run's events
///
/// Every `DataUpdated` snapshot is rendered. With `save_every > 0` a dataset
/// is saved each time that many sets have been incorporated; a final save
/// happens on `Finished` whenever the last aggregate has not been saved yet
/// and at least one set was incorporated. The final aggregate is also
/// rendered if its `DataUpdated` was skipped.
pub struct SinkRunner {
    config: RunConfig,
    renderers: Vec<Box<dyn Renderer>>,
    persistence: Option<Box<dyn PersistenceSink>>,
    save_every: u32,
    last_saved_set: Option<usize>,
    last_rendered_set: Option<usize>,
    report: SinkReport,
}

impl SinkRunner {
    /// Runner for a run acquired under `config`
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            renderers: Vec::new(),
            persistence: None,
            save_every: 0,
            last_saved_set: None,
            last_rendered_set: None,
            report: SinkReport::default(),
        }
    }

    /// Add a renderer
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderers.push(renderer);
        self
    }

    /// Set the persistence sink
    pub fn with_persistence(mut self, sink: Box<dyn PersistenceSink>) -> Self {
        self.persistence = Some(sink);
        self
    }

    /// Save every `sets` incorporated sets (0 = only at the end)
    pub fn save_every(mut self, sets: u32) -> Self {
        self.save_every = sets;
        self
    }

    /// Handle one event; returns `true` once the run has finished
    pub fn handle(&mut self, event: &RunEvent) -> bool {
        match event {
            RunEvent::DataUpdated(snapshot) => {
                self.render(snapshot);
                let n = snapshot.sets_incorporated();
                if self.save_every > 0 && n > 0 && n % self.save_every as usize == 0 {
                    self.save(snapshot);
                }
                false
            }
            RunEvent::Progress(progress) => {
                tracing::debug!("Progress {}", progress);
                false
            }
            RunEvent::Error(error) => {
                self.report.errors.push(error.clone());
                false
            }
            RunEvent::Finished(summary) => {
                let snapshot = &summary.final_snapshot;
                if !snapshot.is_empty() && self.last_rendered_set != snapshot.set_index() {
                    self.render(snapshot);
                }
                if !snapshot.is_empty() && self.last_saved_set != snapshot.set_index() {
                    self.save(snapshot);
                }
                for renderer in &mut self.renderers {
                    if let Err(e) = renderer.finish(summary) {
                        tracing::warn!("Renderer failed to finish: {}", e);
                    }
                }
                self.report.summary = Some(summary.clone());
                true
            }
        }
    }

    /// Consume events on the calling thread until the run finishes
    pub fn run(mut self, events: Receiver<RunEvent>) -> SinkReport {
        for event in events.iter() {
            if self.handle(&event) {
                break;
            }
        }
        self.report
    }

    /// Consume events on a new thread
    pub fn spawn(self, events: Receiver<RunEvent>) -> Result<JoinHandle<SinkReport>> {
        let handle = std::thread::Builder::new()
            .name("sinks".to_string())
            .spawn(move || self.run(events))?;
        Ok(handle)
    }

    fn render(&mut self, snapshot: &AggregateSnapshot) {
        self.report.snapshots_rendered += 1;
        self.last_rendered_set = snapshot.set_index();
        for renderer in &mut self.renderers {
            if let Err(e) = renderer.render(snapshot) {
                self.report.render_failures += 1;
                tracing::warn!("Renderer failed: {}", e);
            }
        }
    }

    fn save(&mut self, snapshot: &AggregateSnapshot) {
        let Some(sink) = self.persistence.as_mut() else {
            return;
        };
        match sink.save(snapshot, &self.config) {
            Ok(path) => {
                self.last_saved_set = snapshot.set_index();
                self.report.saved.push(path);
            }
            Err(e) => {
                self.report.save_failures += 1;
                tracing::warn!("Failed to save dataset: {}", e);
            }
        }
    }
}

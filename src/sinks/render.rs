//! Plot planning and renderers
//!
//! [`plan_plots`] decides how each channel of a snapshot should be drawn:
//!
//! | channel shape          | plot                                  |
//! |------------------------|---------------------------------------|
//! | scalar                 | skipped                               |
//! | `[n]`                  | line over `x_pts` (or the index)      |
//! | `[n, 2]`               | I/Q scatter                           |
//! | `[rows, cols]`         | heatmap                               |
//!
//! A trace whose length differs from `x_pts` is skipped.

use crate::backend::RunSummary;
use crate::error::{QuarkyError, Result};
use crate::types::{AggregateSnapshot, ChannelData, X_AXIS};
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// Consumer of aggregate snapshots, typically a plot surface
///
/// Renderers run on the sink thread and must not block for long; a failed
/// render is logged and does not affect the run.
pub trait Renderer: Send {
    /// Draw the latest aggregate
    fn render(&mut self, snapshot: &AggregateSnapshot) -> Result<()>;

    /// Called once when the run ends
    fn finish(&mut self, _summary: &RunSummary) -> Result<()> {
        Ok(())
    }
}

/// How a channel is drawn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PlotKind {
    /// `y` against `x`
    Line { x: Vec<f64>, y: Vec<f64> },
    /// One point per row of an `[n, 2]` channel
    IqScatter { i: Vec<f64>, q: Vec<f64> },
    /// Row-major image
    Heatmap {
        rows: usize,
        cols: usize,
        values: Vec<f64>,
    },
}

/// One plot of one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSpec {
    /// Channel name, used as the plot title
    pub channel: String,
    /// What to draw
    pub kind: PlotKind,
}

impl PlotSpec {
    /// Number of plotted points (pixels for heatmaps)
    pub fn points(&self) -> usize {
        match &self.kind {
            PlotKind::Line { y, .. } => y.len(),
            PlotKind::IqScatter { i, .. } => i.len(),
            PlotKind::Heatmap { values, .. } => values.len(),
        }
    }
}

fn plan_channel(name: &str, data: &ChannelData, axis: Option<&ChannelData>) -> Option<PlotKind> {
    match data.shape() {
        [] => None,
        [n] => {
            let x = match axis {
                Some(axis) if axis.len() == *n => axis.values().to_vec(),
                Some(axis) => {
                    tracing::debug!(
                        "Not plotting '{}': {} points against {} on {}",
                        name,
                        n,
                        axis.len(),
                        X_AXIS
                    );
                    return None;
                }
                None => (0..*n).map(|i| i as f64).collect(),
            };
            Some(PlotKind::Line {
                x,
                y: data.values().to_vec(),
            })
        }
        [_, 2] => {
            let (i, q): (Vec<f64>, Vec<f64>) = data.rows()?.map(|row| (row[0], row[1])).unzip();
            Some(PlotKind::IqScatter { i, q })
        }
        [rows, cols] => Some(PlotKind::Heatmap {
            rows: *rows,
            cols: *cols,
            values: data.values().to_vec(),
        }),
        _ => None,
    }
}

/// Decide the plots for every channel of a snapshot, in channel order
pub fn plan_plots(snapshot: &AggregateSnapshot) -> Vec<PlotSpec> {
    let axis = snapshot.axis(X_AXIS);
    snapshot
        .means()
        .iter()
        .filter_map(|(name, data)| {
            plan_channel(name, data, axis).map(|kind| PlotSpec {
                channel: name.clone(),
                kind,
            })
        })
        .collect()
}

/// Renderer that reports every refresh through `tracing`
#[derive(Debug, Default)]
pub struct TraceRenderer {
    frames: usize,
}

impl TraceRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots rendered so far
    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl Renderer for TraceRenderer {
    fn render(&mut self, snapshot: &AggregateSnapshot) -> Result<()> {
        self.frames += 1;
        for plot in plan_plots(snapshot) {
            tracing::debug!(
                "Set {}: refreshed '{}' ({} points)",
                snapshot.sets_incorporated(),
                plot.channel,
                plot.points()
            );
        }
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<()> {
        tracing::info!(
            "Rendered {} refreshes, run {}",
            self.frames,
            summary.outcome.label()
        );
        Ok(())
    }
}

/// Latest plot plan, shared with whoever draws it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlotFrame {
    /// Sets folded into the plotted means
    pub sets_incorporated: usize,
    /// Plots in channel order
    pub plots: Vec<PlotSpec>,
}

/// Renderer that keeps the latest [`PlotFrame`] for another thread to poll
#[derive(Debug, Clone, Default)]
pub struct PlotBuffer {
    frame: Arc<RwLock<PlotFrame>>,
}

impl PlotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the latest frame
    pub fn latest(&self) -> Result<PlotFrame> {
        self.frame
            .read()
            .map(|frame| frame.clone())
            .map_err(|e| QuarkyError::Channel(format!("Plot buffer poisoned: {}", e)))
    }
}

impl Renderer for PlotBuffer {
    fn render(&mut self, snapshot: &AggregateSnapshot) -> Result<()> {
        let next = PlotFrame {
            sets_incorporated: snapshot.sets_incorporated(),
            plots: plan_plots(snapshot),
        };
        let mut frame = self
            .frame
            .write()
            .map_err(|e| QuarkyError::Channel(format!("Plot buffer poisoned: {}", e)))?;
        *frame = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn snapshot(means: Vec<(&str, ChannelData)>, axis: Option<Vec<f64>>) -> AggregateSnapshot {
        let means: BTreeMap<_, _> = means.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let mut axes = BTreeMap::new();
        if let Some(x) = axis {
            axes.insert(X_AXIS.to_string(), ChannelData::from_vec(x));
        }
        AggregateSnapshot::new(Some(0), means, axes)
    }

    #[test]
    fn test_trace_against_axis() {
        let snap = snapshot(
            vec![("avgi", ChannelData::from_vec(vec![1.0, 2.0]))],
            Some(vec![10.0, 20.0]),
        );
        let plots = plan_plots(&snap);
        assert_eq!(
            plots,
            vec![PlotSpec {
                channel: "avgi".into(),
                kind: PlotKind::Line {
                    x: vec![10.0, 20.0],
                    y: vec![1.0, 2.0]
                }
            }]
        );
    }

    #[test]
    fn test_mismatched_axis_and_scalars_skipped() {
        let snap = snapshot(
            vec![
                ("avgi", ChannelData::from_vec(vec![1.0, 2.0, 3.0])),
                ("amp", ChannelData::scalar(1.0)),
            ],
            Some(vec![10.0, 20.0]),
        );
        assert!(plan_plots(&snap).is_empty());
    }

    #[test]
    fn test_index_axis_when_no_sweep() {
        let snap = snapshot(vec![("avgi", ChannelData::from_vec(vec![5.0, 6.0]))], None);
        match &plan_plots(&snap)[0].kind {
            PlotKind::Line { x, .. } => assert_eq!(x, &vec![0.0, 1.0]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_iq_and_heatmap() {
        let iq = ChannelData::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let img = ChannelData::from_rows(vec![vec![1.0, 2.0, 3.0]]).unwrap();
        let plots = plan_plots(&snapshot(vec![("iq", iq), ("img", img)], None));

        // BTreeMap order: img, iq
        assert!(matches!(plots[0].kind, PlotKind::Heatmap { rows: 1, cols: 3, .. }));
        assert_eq!(
            plots[1].kind,
            PlotKind::IqScatter {
                i: vec![1.0, 3.0],
                q: vec![2.0, 4.0]
            }
        );
    }

    #[test]
    fn test_plot_buffer_keeps_latest() {
        let buffer = PlotBuffer::new();
        let mut renderer = buffer.clone();
        renderer
            .render(&snapshot(vec![("avgi", ChannelData::from_vec(vec![1.0]))], None))
            .unwrap();
        let frame = buffer.latest().unwrap();
        assert_eq!(frame.sets_incorporated, 1);
        assert_eq!(frame.plots.len(), 1);
    }
}

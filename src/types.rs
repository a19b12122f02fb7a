//! Core data types for Quarky
//!
//! This module contains the fundamental data structures that flow through an
//! acquisition run, from the hardware proxy to the renderer and the dataset
//! writer.
//!
//! # Main Types
//!
//! - [`ChannelData`] - An n-dimensional numeric payload (scalar, trace, image)
//! - [`Measurement`] - What a hardware proxy returns for one acquisition
//! - [`Batch`] - A measurement stamped with its position in the run
//! - [`AggregateSnapshot`] - Running means of every channel seen so far
//! - [`RunProgress`] - Progress counters reported after every set
//!
//! # Channels and Axes
//!
//! A measurement carries two maps. *Channels* (for example `avgi` and `avgq`)
//! are averaged across sets. *Axes* (for example `x_pts`, the swept parameter)
//! describe the shape of the sweep and are carried into the snapshot as-is,
//! the latest value winning.

use crate::error::{QuarkyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Conventional name of the sweep axis returned next to the I/Q channels
pub const X_AXIS: &str = "x_pts";

/// A numeric payload stored row-major with an explicit shape
///
/// An empty shape is a scalar, `[n]` a trace and `[rows, cols]` an image.
/// The number of values always equals the product of the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChannelData")]
pub struct ChannelData {
    shape: Vec<usize>,
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct RawChannelData {
    shape: Vec<usize>,
    values: Vec<f64>,
}

impl TryFrom<RawChannelData> for ChannelData {
    type Error = QuarkyError;

    fn try_from(raw: RawChannelData) -> Result<Self> {
        ChannelData::with_shape(raw.shape, raw.values)
    }
}

impl ChannelData {
    /// Create a scalar payload
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            values: vec![value],
        }
    }

    /// Create a one-dimensional payload
    pub fn from_vec(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    /// Create a two-dimensional payload from rows, rejecting ragged input
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(QuarkyError::ChannelData(format!(
                "row {} has {} values, expected {}",
                i,
                row.len(),
                cols
            )));
        }
        let shape = vec![rows.len(), cols];
        let values = rows.into_iter().flatten().collect();
        Ok(Self { shape, values })
    }

    /// Create a payload with an explicit shape
    pub fn with_shape(shape: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(QuarkyError::ChannelData(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    /// Shape of the payload (empty for scalars)
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Row-major values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the payload holds no values (a zero-length dimension)
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value of a scalar payload
    pub fn as_scalar(&self) -> Option<f64> {
        if self.shape.is_empty() {
            self.values.first().copied()
        } else {
            None
        }
    }

    /// Iterate over the rows of a two-dimensional payload
    pub fn rows(&self) -> Option<impl Iterator<Item = &[f64]>> {
        match self.shape.as_slice() {
            [_, cols] if *cols > 0 => Some(self.values.chunks(*cols)),
            _ => None,
        }
    }

    /// Mutable access for in-place arithmetic inside the crate
    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }
}

/// The result of one `acquire()` call on a hardware proxy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    /// Averaged channels, keyed by name
    pub channels: BTreeMap<String, ChannelData>,
    /// Sweep axes, carried through without averaging
    pub axes: BTreeMap<String, ChannelData>,
}

impl Measurement {
    /// Create an empty measurement
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an averaged channel
    pub fn with_channel(mut self, name: impl Into<String>, data: ChannelData) -> Self {
        self.channels.insert(name.into(), data);
        self
    }

    /// Add a sweep axis
    pub fn with_axis(mut self, name: impl Into<String>, data: ChannelData) -> Self {
        self.axes.insert(name.into(), data);
        self
    }
}

/// A measurement stamped with its index inside the run
///
/// Built by the acquisition worker; immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    set_index: usize,
    channels: BTreeMap<String, ChannelData>,
    axes: BTreeMap<String, ChannelData>,
}

impl Batch {
    /// Stamp a measurement with its set index
    pub fn new(set_index: usize, measurement: Measurement) -> Self {
        Self {
            set_index,
            channels: measurement.channels,
            axes: measurement.axes,
        }
    }

    /// Position of this batch in the run (0-based)
    pub fn set_index(&self) -> usize {
        self.set_index
    }

    /// Averaged channels
    pub fn channels(&self) -> &BTreeMap<String, ChannelData> {
        &self.channels
    }

    /// Sweep axes
    pub fn axes(&self) -> &BTreeMap<String, ChannelData> {
        &self.axes
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        BTreeMap<String, ChannelData>,
        BTreeMap<String, ChannelData>,
    ) {
        (self.channels, self.axes)
    }
}

/// Point-in-time copy of the aggregated state of a run
///
/// Owns its data: nothing done to a snapshot can reach back into the
/// aggregator that produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    set_index: Option<usize>,
    sets_incorporated: usize,
    means: BTreeMap<String, ChannelData>,
    axes: BTreeMap<String, ChannelData>,
}

impl AggregateSnapshot {
    pub(crate) fn new(
        set_index: Option<usize>,
        means: BTreeMap<String, ChannelData>,
        axes: BTreeMap<String, ChannelData>,
    ) -> Self {
        Self {
            set_index,
            sets_incorporated: set_index.map_or(0, |i| i + 1),
            means,
            axes,
        }
    }

    /// Index of the last incorporated batch, `None` before the first one
    pub fn set_index(&self) -> Option<usize> {
        self.set_index
    }

    /// Number of batches folded into the means
    pub fn sets_incorporated(&self) -> usize {
        self.sets_incorporated
    }

    /// Running means keyed by channel
    pub fn means(&self) -> &BTreeMap<String, ChannelData> {
        &self.means
    }

    /// Running mean of a single channel
    pub fn mean(&self, channel: &str) -> Option<&ChannelData> {
        self.means.get(channel)
    }

    /// Latest sweep axes
    pub fn axes(&self) -> &BTreeMap<String, ChannelData> {
        &self.axes
    }

    /// Latest value of a single axis
    pub fn axis(&self, name: &str) -> Option<&ChannelData> {
        self.axes.get(name)
    }

    /// True before any batch was incorporated
    pub fn is_empty(&self) -> bool {
        self.set_index.is_none()
    }
}

/// Progress of a run after a completed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProgress {
    /// Number of sets completed so far
    pub completed: u32,
    /// Repetitions averaged on the instrument per set
    pub reps: u32,
    /// Total number of sets in the run
    pub sets: u32,
}

impl RunProgress {
    /// Create a progress record
    pub fn new(completed: u32, reps: u32, sets: u32) -> Self {
        Self {
            completed,
            reps,
            sets,
        }
    }

    /// Completed percentage, rounded down
    pub fn percent(&self) -> u32 {
        if self.sets == 0 {
            return 0;
        }
        ((u64::from(self.completed) * 100) / u64::from(self.sets)) as u32
    }

    /// Samples taken over samples scheduled, e.g. `"20/30"`
    pub fn label(&self) -> String {
        format!(
            "{}/{}",
            u64::from(self.completed) * u64::from(self.reps),
            u64::from(self.sets) * u64::from(self.reps)
        )
    }

    /// True once every scheduled set has completed
    pub fn is_complete(&self) -> bool {
        self.completed >= self.sets
    }
}

impl std::fmt::Display for RunProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}%)", self.label(), self.percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_channel() {
        let data = ChannelData::scalar(2.5);
        assert_eq!(data.rank(), 0);
        assert_eq!(data.as_scalar(), Some(2.5));
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        let err = ChannelData::from_rows(vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(err.is_err());

        let ok = ChannelData::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(ok.shape(), &[2, 2]);
        let rows: Vec<_> = ok.rows().unwrap().collect();
        assert_eq!(rows[1], &[3.0, 4.0]);
    }

    #[test]
    fn test_with_shape_validates_length() {
        assert!(ChannelData::with_shape(vec![2, 3], vec![0.0; 5]).is_err());
        assert!(ChannelData::with_shape(vec![2, 3], vec![0.0; 6]).is_ok());
    }

    #[test]
    fn test_deserialize_rejects_bad_shape() {
        let bad = r#"{"shape":[3],"values":[1.0,2.0]}"#;
        assert!(serde_json::from_str::<ChannelData>(bad).is_err());

        let good = r#"{"shape":[2],"values":[1.0,2.0]}"#;
        let data: ChannelData = serde_json::from_str(good).unwrap();
        assert_eq!(data.values(), &[1.0, 2.0]);
    }

    #[test]
    fn test_batch_keeps_measurement_parts() {
        let m = Measurement::new()
            .with_channel("avgi", ChannelData::from_vec(vec![1.0]))
            .with_axis(X_AXIS, ChannelData::from_vec(vec![0.0]));
        let batch = Batch::new(3, m);
        assert_eq!(batch.set_index(), 3);
        assert!(batch.channels().contains_key("avgi"));
        assert!(batch.axes().contains_key(X_AXIS));
    }

    #[test]
    fn test_progress_label_and_percent() {
        let p = RunProgress::new(2, 10, 3);
        assert_eq!(p.label(), "20/30");
        assert_eq!(p.percent(), 66);
        assert!(!p.is_complete());
        assert!(RunProgress::new(3, 10, 3).is_complete());
        assert_eq!(RunProgress::new(0, 1, 0).percent(), 0);
    }
}

//! Running-mean aggregation of measurement batches
//!
//! The aggregator folds batches into an element-wise running mean per
//! channel:
//!
//! ```text
//! mean_n = (mean_{n-1} * (n - 1) + value_n) / n
//! ```
//!
//! Batches must arrive with consecutive set indices starting at 0. A batch is
//! validated completely before any state changes, so a rejected batch leaves
//! the aggregate exactly as it was.

use super::error::{AcquisitionError, AcquisitionResult};
use crate::types::{AggregateSnapshot, Batch, ChannelData};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Running mean of one channel
#[derive(Debug, Clone)]
struct RunningMean {
    mean: ChannelData,
    /// Batches folded into `mean`
    count: u64,
}

impl RunningMean {
    fn push(&mut self, value: &ChannelData) {
        let n = self.count as f64;
        for (m, v) in self.mean.values_mut().iter_mut().zip(value.values()) {
            *m = (*m * n + v) / (n + 1.0);
        }
        self.count += 1;
    }
}

/// Element-wise running mean over the batches of one run
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    next_index: usize,
    last_index: Option<usize>,
    channels: BTreeMap<String, RunningMean>,
    axes: BTreeMap<String, ChannelData>,
}

impl Aggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all state; the next accepted batch must have set index 0
    pub fn reset(&mut self) {
        self.next_index = 0;
        self.last_index = None;
        self.channels.clear();
        self.axes.clear();
    }

    /// Set index the next batch must carry
    pub fn expected_index(&self) -> usize {
        self.next_index
    }

    /// Fold a batch into the running means and return the new snapshot
    ///
    /// Channels absent from the batch keep their previous mean. A channel seen
    /// for the first time is copied in as its own mean.
    pub fn update(&mut self, batch: Batch) -> AcquisitionResult<AggregateSnapshot> {
        if batch.set_index() != self.next_index {
            return Err(AcquisitionError::OutOfOrderBatch {
                expected: self.next_index,
                got: batch.set_index(),
            });
        }

        for (name, data) in batch.channels() {
            if let Some(current) = self.channels.get(name) {
                if current.mean.shape() != data.shape() {
                    return Err(AcquisitionError::ShapeMismatch {
                        channel: name.clone(),
                        expected: current.mean.shape().to_vec(),
                        got: data.shape().to_vec(),
                    });
                }
            }
        }

        let set_index = batch.set_index();
        let (channels, axes) = batch.into_parts();
        for (name, data) in channels {
            match self.channels.entry(name) {
                Entry::Vacant(slot) => {
                    slot.insert(RunningMean {
                        mean: data,
                        count: 1,
                    });
                }
                Entry::Occupied(mut slot) => slot.get_mut().push(&data),
            }
        }
        self.axes.extend(axes);

        self.last_index = Some(set_index);
        self.next_index = set_index + 1;
        Ok(self.snapshot())
    }

    /// Independent copy of the current aggregate
    pub fn snapshot(&self) -> AggregateSnapshot {
        let means = self
            .channels
            .iter()
            .map(|(name, rm)| (name.clone(), rm.mean.clone()))
            .collect();
        AggregateSnapshot::new(self.last_index, means, self.axes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Measurement, X_AXIS};
    use proptest::prelude::*;

    fn trace_batch(set_index: usize, avgi: Vec<f64>) -> Batch {
        Batch::new(
            set_index,
            Measurement::new().with_channel("avgi", ChannelData::from_vec(avgi)),
        )
    }

    #[test]
    fn test_first_batch_is_copied_exactly() {
        let mut agg = Aggregator::new();
        let values = vec![0.1, -3.7, 1e-12, 42.0];
        let snap = agg.update(trace_batch(0, values.clone())).unwrap();

        assert_eq!(snap.set_index(), Some(0));
        assert_eq!(snap.mean("avgi").unwrap().values(), values.as_slice());
    }

    #[test]
    fn test_three_set_mean() {
        let mut agg = Aggregator::new();
        let s0 = agg.update(trace_batch(0, vec![1.0])).unwrap();
        let s1 = agg.update(trace_batch(1, vec![3.0])).unwrap();
        let s2 = agg.update(trace_batch(2, vec![2.0])).unwrap();

        assert_eq!(s0.mean("avgi").unwrap().values(), &[1.0]);
        assert_eq!(s1.mean("avgi").unwrap().values(), &[2.0]);
        assert_eq!(s2.mean("avgi").unwrap().values(), &[2.0]);
        assert_eq!(s2.sets_incorporated(), 3);
    }

    #[test]
    fn test_out_of_order_rejected_without_side_effects() {
        let mut agg = Aggregator::new();
        agg.update(trace_batch(0, vec![1.0])).unwrap();

        let err = agg.update(trace_batch(2, vec![5.0])).unwrap_err();
        assert_eq!(
            err,
            AcquisitionError::OutOfOrderBatch {
                expected: 1,
                got: 2
            }
        );
        assert_eq!(agg.expected_index(), 1);
        assert_eq!(agg.snapshot().mean("avgi").unwrap().values(), &[1.0]);
    }

    #[test]
    fn test_first_batch_must_be_zero() {
        let mut agg = Aggregator::new();
        assert!(matches!(
            agg.update(trace_batch(1, vec![1.0])),
            Err(AcquisitionError::OutOfOrderBatch { expected: 0, got: 1 })
        ));
    }

    #[test]
    fn test_shape_mismatch_leaves_state_untouched() {
        let mut agg = Aggregator::new();
        let m0 = Measurement::new()
            .with_channel("avgi", ChannelData::from_vec(vec![1.0, 2.0]))
            .with_channel("avgq", ChannelData::from_vec(vec![0.0, 0.0]));
        agg.update(Batch::new(0, m0)).unwrap();
        let before = agg.snapshot();

        // avgq is fine but avgi changed length: nothing may be applied
        let m1 = Measurement::new()
            .with_channel("avgi", ChannelData::from_vec(vec![1.0, 2.0, 3.0]))
            .with_channel("avgq", ChannelData::from_vec(vec![4.0, 4.0]));
        let err = agg.update(Batch::new(1, m1)).unwrap_err();

        assert!(matches!(
            err,
            AcquisitionError::ShapeMismatch { ref channel, .. } if channel == "avgi"
        ));
        assert_eq!(agg.snapshot(), before);
        assert_eq!(agg.expected_index(), 1);
    }

    #[test]
    fn test_sparse_batches_keep_absent_channels() {
        let mut agg = Aggregator::new();
        agg.update(Batch::new(
            0,
            Measurement::new().with_channel("avgi", ChannelData::scalar(2.0)),
        ))
        .unwrap();
        let snap = agg
            .update(Batch::new(
                1,
                Measurement::new().with_channel("amp", ChannelData::scalar(5.0)),
            ))
            .unwrap();
        assert_eq!(snap.mean("avgi").unwrap().as_scalar(), Some(2.0));
        assert_eq!(snap.mean("amp").unwrap().as_scalar(), Some(5.0));

        // avgi has now seen two values, amp only one
        let snap = agg
            .update(Batch::new(
                2,
                Measurement::new()
                    .with_channel("avgi", ChannelData::scalar(4.0))
                    .with_channel("amp", ChannelData::scalar(7.0)),
            ))
            .unwrap();
        assert_eq!(snap.mean("avgi").unwrap().as_scalar(), Some(3.0));
        assert_eq!(snap.mean("amp").unwrap().as_scalar(), Some(6.0));
    }

    #[test]
    fn test_axes_are_latest_not_averaged() {
        let mut agg = Aggregator::new();
        let batch = |i: usize, x: f64| {
            Batch::new(
                i,
                Measurement::new()
                    .with_channel("avgi", ChannelData::scalar(1.0))
                    .with_axis(X_AXIS, ChannelData::from_vec(vec![x])),
            )
        };
        agg.update(batch(0, 10.0)).unwrap();
        let snap = agg.update(batch(1, 20.0)).unwrap();
        assert_eq!(snap.axis(X_AXIS).unwrap().values(), &[20.0]);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut agg = Aggregator::new();
        let first = agg.update(trace_batch(0, vec![1.0, 1.0])).unwrap();
        agg.update(trace_batch(1, vec![3.0, 3.0])).unwrap();
        assert_eq!(first.mean("avgi").unwrap().values(), &[1.0, 1.0]);
    }

    #[test]
    fn test_reset_restarts_at_zero() {
        let mut agg = Aggregator::new();
        agg.update(trace_batch(0, vec![9.0])).unwrap();
        agg.reset();
        assert!(agg.snapshot().is_empty());
        let snap = agg.update(trace_batch(0, vec![1.0])).unwrap();
        assert_eq!(snap.mean("avgi").unwrap().values(), &[1.0]);
    }

    proptest! {
        #[test]
        fn prop_matches_arithmetic_mean(
            rows in prop::collection::vec(
                prop::collection::vec(-1.0e6f64..1.0e6, 4),
                1..40,
            )
        ) {
            let mut agg = Aggregator::new();
            let mut snap = AggregateSnapshot::default();
            for (i, row) in rows.iter().enumerate() {
                snap = agg.update(trace_batch(i, row.clone())).unwrap();
            }

            let n = rows.len() as f64;
            let mean = snap.mean("avgi").unwrap().values();
            for col in 0..4 {
                let expected: f64 = rows.iter().map(|r| r[col]).sum::<f64>() / n;
                let tol = 1e-9 * expected.abs().max(1.0) * n;
                prop_assert!((mean[col] - expected).abs() <= tol,
                    "column {}: {} vs {}", col, mean[col], expected);
            }
        }

        #[test]
        fn prop_replay_is_bit_identical(
            rows in prop::collection::vec(
                prop::collection::vec(-1.0e3f64..1.0e3, 3),
                1..20,
            )
        ) {
            let run = || {
                let mut agg = Aggregator::new();
                for (i, row) in rows.iter().enumerate() {
                    agg.update(trace_batch(i, row.clone())).unwrap();
                }
                agg.snapshot()
            };
            let a = run();
            let b = run();
            let bits = |s: &AggregateSnapshot| -> Vec<u64> {
                s.mean("avgi").unwrap().values().iter().map(|v| v.to_bits()).collect()
            };
            prop_assert_eq!(bits(&a), bits(&b));
        }
    }
}

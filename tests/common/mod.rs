//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use quarky_rs::backend::{RunEvent, RunSummary};
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Assert two slices are element-wise approximately equal
pub fn assert_slice_eq(a: &[f64], b: &[f64], epsilon: f64) {
    assert_eq!(a.len(), b.len(), "length mismatch: {:?} vs {:?}", a, b);
    for (x, y) in a.iter().zip(b) {
        assert_float_eq(*x, *y, epsilon);
    }
}

/// Short event names, for asserting on order
pub fn event_kinds(events: &[RunEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|event| match event {
            RunEvent::DataUpdated(_) => "data",
            RunEvent::Progress(_) => "progress",
            RunEvent::Error(_) => "error",
            RunEvent::Finished(_) => "finished",
        })
        .collect()
}

/// Summary carried by the last `Finished` event
pub fn finished_summary(events: &[RunEvent]) -> Option<&RunSummary> {
    events.iter().rev().find_map(|event| match event {
        RunEvent::Finished(summary) => Some(summary),
        _ => None,
    })
}

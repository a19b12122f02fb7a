//! Integration tests for the acquisition pipeline
//!
//! These tests validate complete runs end to end:
//! - Running means and progress across a full run
//! - Stopping a run between sets
//! - Hardware faults mid-run
//! - Backend lifecycle across consecutive runs

mod common;

use common::builders::{run_config, MeasurementBuilder};
use common::mock_helpers::{create_test_channel, create_test_mock_hardware, ScriptedHardware};
use common::{assert_float_eq, event_kinds, finished_summary, test_timeout};
use quarky_rs::backend::{
    AcquisitionError, AcquisitionWorker, ExperimentBackend, HardwareFault, RunEvent, RunOutcome,
    StopHandle, WorkerState,
};
use quarky_rs::types::RunProgress;
use std::time::Duration;

fn avgi(value: f64) -> quarky_rs::types::Measurement {
    MeasurementBuilder::new().trace("avgi", &[value]).build()
}

#[test]
fn test_running_mean_over_full_run() {
    let hardware = ScriptedHardware::new(vec![Ok(avgi(1.0)), Ok(avgi(3.0)), Ok(avgi(2.0))]);
    let (tx, rx) = create_test_channel();
    let mut worker = AcquisitionWorker::new(Box::new(hardware), run_config(10, 3), tx);

    let summary = worker.run().unwrap();
    let events: Vec<_> = rx.try_iter().collect();

    assert_eq!(
        event_kinds(&events),
        vec!["data", "progress", "data", "progress", "data", "progress", "finished"]
    );

    let means: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::DataUpdated(s) => s.mean("avgi").map(|m| m.values()[0]),
            _ => None,
        })
        .collect();
    assert_eq!(means, vec![1.0, 2.0, 2.0]);

    let progress: Vec<RunProgress> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(
        progress,
        vec![
            RunProgress::new(1, 10, 3),
            RunProgress::new(2, 10, 3),
            RunProgress::new(3, 10, 3)
        ]
    );
    assert!(progress[2].is_complete());

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(finished_summary(&events), Some(&summary));
    assert_eq!(summary.final_snapshot.sets_incorporated(), 3);
}

#[test]
fn test_stop_after_second_set() {
    let stop = StopHandle::new();
    let hardware = ScriptedHardware::new((0..5).map(|i| Ok(avgi(i as f64))).collect())
        .stop_during(stop.clone(), 2);
    let (tx, rx) = create_test_channel();
    let mut worker =
        AcquisitionWorker::new(Box::new(hardware), run_config(1, 5), tx).with_stop_handle(stop);

    let summary = worker.run().unwrap();
    let events: Vec<_> = rx.try_iter().collect();

    assert_eq!(
        event_kinds(&events),
        vec!["data", "progress", "data", "progress", "finished"]
    );
    assert_eq!(summary.outcome, RunOutcome::Stopped);
    assert_eq!(summary.sets_completed, 2);
    // Only two acquisitions were attempted
    assert_eq!(summary.stats.successful + summary.stats.failed, 2);
    assert_eq!(worker.state(), WorkerState::Finished);
}

#[test]
fn test_fault_on_third_call_keeps_second_aggregate() {
    let fault = HardwareFault::Instrument("ADC overflow".into());
    let hardware = ScriptedHardware::new(vec![
        Ok(avgi(1.0)),
        Ok(avgi(3.0)),
        Err(fault.clone()),
        Ok(avgi(100.0)),
    ]);
    let (tx, rx) = create_test_channel();
    let mut worker = AcquisitionWorker::new(Box::new(hardware), run_config(1, 4), tx);

    let summary = worker.run().unwrap();
    let events: Vec<_> = rx.try_iter().collect();

    assert_eq!(
        event_kinds(&events),
        vec!["data", "progress", "data", "progress", "error", "finished"]
    );
    let expected = AcquisitionError::Fault {
        set_index: 2,
        fault,
    };
    assert_eq!(events[4], RunEvent::Error(expected.clone()));
    assert_eq!(summary.outcome, RunOutcome::Failed(expected));

    let snapshot = worker.snapshot();
    assert_eq!(snapshot.set_index(), Some(1));
    assert_eq!(snapshot.sets_incorporated(), 2);
    assert_eq!(snapshot.mean("avgi").unwrap().values(), &[2.0]);
}

#[test]
fn test_backend_run_with_simulated_hardware() {
    let mut backend = ExperimentBackend::default();
    let run = backend
        .start(Box::new(create_test_mock_hardware(51)), run_config(100, 5))
        .unwrap();

    let (summary, events) = run.join_with_events().unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(events.len(), 11);

    let last = &summary.final_snapshot;
    assert_eq!(last.mean("avgi").unwrap().shape(), &[51]);
    assert_eq!(last.axis("x_pts").unwrap().len(), 51);
    for value in last.mean("avgq").unwrap().values() {
        assert_float_eq(*value, 0.5, 1e-12);
    }
    assert!(backend.is_idle());
}

#[test]
fn test_backend_stop_mid_run_then_restart() {
    let mut backend = ExperimentBackend::default();
    let slow = create_test_mock_hardware(11).with_latency(Duration::from_millis(20));
    let run = backend.start(Box::new(slow), run_config(1, 50)).unwrap();

    // Wait for the second set before stopping
    let mut seen = 0;
    while seen < 2 {
        match run.recv_timeout(test_timeout()) {
            Some(RunEvent::Progress(_)) => seen += 1,
            Some(_) => {}
            None => panic!("no progress within timeout"),
        }
    }
    backend.stop();

    let summary = run.join().unwrap();
    assert_eq!(summary.outcome, RunOutcome::Stopped);
    assert!(summary.sets_completed >= 2 && summary.sets_completed < 50);

    let run = backend
        .start(Box::new(create_test_mock_hardware(11)), run_config(1, 2))
        .unwrap();
    let summary = run.join().unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    // The new run starts from an empty aggregate
    assert_eq!(summary.final_snapshot.sets_incorporated(), 2);
}

#[test]
fn test_backend_rejects_overlapping_runs() {
    let mut backend = ExperimentBackend::default();
    let slow = create_test_mock_hardware(3).with_latency(Duration::from_millis(20));
    let run = backend.start(Box::new(slow), run_config(1, 100)).unwrap();

    let err = backend
        .start(Box::new(create_test_mock_hardware(3)), run_config(1, 1))
        .unwrap_err();
    assert!(err.to_string().contains("still active"), "unexpected error: {}", err);

    run.stop();
    assert_eq!(run.join().unwrap().outcome, RunOutcome::Stopped);
}

#[test]
fn test_long_run_joined_without_reading_events() {
    let mut backend = ExperimentBackend::default();
    let run = backend
        .start(Box::new(create_test_mock_hardware(5)), run_config(1, 1500))
        .unwrap();

    let (tx, rx) = create_test_channel();
    std::thread::spawn(move || {
        let _ = tx.send(run.join());
    });
    let summary = rx
        .recv_timeout(test_timeout())
        .expect("join did not return")
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.sets_completed, 1500);
    assert_eq!(summary.final_snapshot.sets_incorporated(), 1500);
}

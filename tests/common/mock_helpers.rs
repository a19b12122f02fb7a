//! Mock construction helpers

use crossbeam_channel::{bounded, Receiver, Sender};
use quarky_rs::backend::{
    HardwareFault, HardwareProxy, HardwareResult, MockHardware, MockPattern, StopHandle,
};
use quarky_rs::types::Measurement;
use std::collections::VecDeque;

/// Create a test channel with default size
pub fn create_test_channel<T>() -> (Sender<T>, Receiver<T>) {
    bounded(64)
}

/// Simulated resonator sweep with light noise
pub fn create_test_mock_hardware(points: usize) -> MockHardware {
    MockHardware::new("test-rfsoc")
        .with_sweep(0.0, 10.0, points)
        .with_channel(
            "avgi",
            MockPattern::Sine {
                amplitude: 1.0,
                frequency: 1.0,
                phase: 0.0,
            },
        )
        .with_channel("avgq", MockPattern::Constant(0.5))
        .with_seed(7)
}

/// Hardware that replays a fixed list of responses
///
/// Once the list is exhausted every call times out. If a stop handle is
/// attached, the stop is requested during call number `stop_on_call`
/// (1-based), before that call returns.
pub struct ScriptedHardware {
    responses: VecDeque<HardwareResult<Measurement>>,
    calls: usize,
    stop: Option<(StopHandle, usize)>,
}

impl ScriptedHardware {
    pub fn new(responses: Vec<HardwareResult<Measurement>>) -> Self {
        Self {
            responses: responses.into(),
            calls: 0,
            stop: None,
        }
    }

    pub fn stop_during(mut self, handle: StopHandle, call: usize) -> Self {
        self.stop = Some((handle, call));
        self
    }
}

impl HardwareProxy for ScriptedHardware {
    fn acquire(&mut self) -> HardwareResult<Measurement> {
        self.calls += 1;
        if let Some((handle, call)) = &self.stop {
            if *call == self.calls {
                handle.stop();
            }
        }
        self.responses
            .pop_front()
            .unwrap_or_else(|| Err(HardwareFault::Timeout("no scripted response left".into())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

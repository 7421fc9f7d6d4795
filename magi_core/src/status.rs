//! Control loop state reported to callers.

/// Lifecycle of the temperature control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

/// Snapshot of the controller for status queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopStatus {
    pub state: LoopState,
    pub desired_c: f64,
    pub measured_c: f64,
    pub heater_faults: u64,
}

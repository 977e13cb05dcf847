// core/src/flow/control.rs

//! Signals for controlling flow execution and the outcome of a flow run.

/// Signal from a step handler: keep going, or halt the flow here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
  Continue,
  /// Halt without error. Compensations are NOT run: stopping is a decision,
  /// not a failure.
  Stop,
}

/// Outcome of a flow run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowResult {
  Completed,
  Stopped,
}

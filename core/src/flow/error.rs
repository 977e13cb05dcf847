// core/src/flow/error.rs
use thiserror::Error;

/// Misconfiguration of a [`Flow`](super::Flow). These are programming errors
/// surfaced as values rather than panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
  #[error("Step not found: {step_name}")]
  StepNotFound { step_name: String },

  #[error("Step already defined: {step_name}")]
  DuplicateStep { step_name: String },

  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },
}

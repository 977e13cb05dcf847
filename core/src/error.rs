// core/src/error.rs
use crate::flow::FlowError;
use thiserror::Error;

/// Outcome taxonomy for every core operation.
///
/// The HTTP boundary maps each variant to a status code; nothing inside the
/// core depends on that mapping.
#[derive(Debug, Error)]
pub enum Error {
  #[error("Validation failed: {0}")]
  Validation(String),

  #[error("Not found: {0}")]
  NotFound(String),

  #[error("Not authorized: {0}")]
  Authorization(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Coupon inactive: {0}")]
  CouponInactive(String),

  #[error("Coupon already used: {0}")]
  CouponAlreadyUsed(String),

  #[error("Payment provider error: {0}")]
  Upstream(String),

  #[error("Signature verification failed: {0}")]
  Signature(String),

  #[error("Storage failure: {0:#}")]
  Storage(#[from] anyhow::Error),

  #[error("Flow misconfigured: {0}")]
  Flow(#[from] FlowError),

  #[error("Internal error: {0}")]
  Internal(String),
}

impl Error {
  /// True for failures the client may retry unchanged (nothing was persisted).
  pub fn is_retryable(&self) -> bool {
    matches!(self, Error::Upstream(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

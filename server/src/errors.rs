// server/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use paysettle::Error as CoreError;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("{source}")]
  Core {
    #[from]
    source: CoreError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    AppError::Core {
      source: CoreError::Storage(err),
    }
  }
}

impl AppError {
  /// Short machine-readable label placed in the `error` field of the body.
  fn label(&self) -> &'static str {
    match self {
      AppError::Auth(_) => "unauthenticated",
      AppError::Forbidden(_) => "forbidden",
      AppError::Config(_) => "configuration",
      AppError::Sqlx(_) => "database",
      AppError::Internal(_) => "internal",
      AppError::Core { source } => match source {
        CoreError::Validation(_) => "validation",
        CoreError::NotFound(_) => "not_found",
        CoreError::Authorization(_) => "forbidden",
        CoreError::Conflict(_) => "conflict",
        CoreError::CouponInactive(_) => "coupon_inactive",
        CoreError::CouponAlreadyUsed(_) => "coupon_already_used",
        CoreError::Upstream(_) => "payment_provider",
        CoreError::Signature(_) => "signature",
        CoreError::Storage(_) | CoreError::Flow(_) | CoreError::Internal(_) => "internal",
      },
    }
  }

  /// Detail safe to hand to the client. Storage and configuration failures
  /// stay in the logs.
  fn detail(&self) -> Option<String> {
    match self {
      AppError::Sqlx(_) | AppError::Config(_) | AppError::Internal(_) => None,
      AppError::Core { source } => match source {
        CoreError::Storage(_) | CoreError::Flow(_) | CoreError::Internal(_) => None,
        other => Some(other.to_string()),
      },
      other => Some(other.to_string()),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      AppError::Core { source } => match source {
        CoreError::Validation(_) | CoreError::CouponAlreadyUsed(_) | CoreError::Signature(_) => StatusCode::BAD_REQUEST,
        CoreError::NotFound(_) | CoreError::CouponInactive(_) => StatusCode::NOT_FOUND,
        CoreError::Authorization(_) => StatusCode::FORBIDDEN,
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::Upstream(_) => StatusCode::BAD_GATEWAY,
        CoreError::Storage(_) | CoreError::Flow(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, status = status.as_u16(), "Request rejected");
    }
    let body = match self.detail() {
      Some(detail) => json!({ "error": self.label(), "detail": detail }),
      None => json!({ "error": self.label() }),
    };
    HttpResponse::build(status).json(body)
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

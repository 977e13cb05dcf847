// core/src/providers/mod.rs

//! The payment provider capability and its two implementations.
//!
//! The reconciliation engine only talks to [`PaymentProvider`]; every
//! provider-specific detail (wire format, signature scheme) stays behind it.

pub mod cashfree;
pub mod razorpay;
pub mod signature;

use crate::domain::{OrderId, PaymentSession, ProviderKind};
use crate::error::Error;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cashfree::{CashfreeConfig, CashfreeProvider};
pub use razorpay::{RazorpayConfig, RazorpayProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("transport failure: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("provider responded with HTTP {status}: {body}")]
  Http { status: u16, body: String },

  #[error("unexpected provider response: {0}")]
  Protocol(String),

  #[error("{0}")]
  Signature(String),

  #[error("malformed payload: {0}")]
  Malformed(String),

  #[error("{0} is not supported by this provider")]
  Unsupported(&'static str),
}

impl From<ProviderError> for Error {
  fn from(err: ProviderError) -> Self {
    match err {
      ProviderError::Signature(msg) => Error::Signature(msg),
      ProviderError::Malformed(msg) => Error::Validation(msg),
      ProviderError::Unsupported(what) => Error::Validation(format!("{what} is not supported by this provider")),
      other => Error::Upstream(other.to_string()),
    }
  }
}

/// Customer details forwarded to the provider at session creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerContact {
  #[serde(default)]
  pub customer_id: String,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
  pub order_id: OrderId,
  /// The order's server-computed total.
  pub amount: Decimal,
  pub currency: String,
  pub customer: CustomerContact,
  pub return_url: Option<String>,
}

/// What a provider hands back when a payment order is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
  pub provider_order_id: String,
  pub session_token: String,
  pub status: String,
}

/// Latest payment status as reported by a polling call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
  Success {
    provider_payment_id: Option<String>,
    status: String,
    payer_email: Option<String>,
  },
  Pending {
    status: String,
  },
  Failed {
    status: String,
  },
}

/// Client-relayed proof of payment for the signed-callback model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackClaim {
  pub provider_order_id: String,
  pub payment_id: String,
  pub signature: String,
}

/// An inbound webhook exactly as received: raw body plus signature headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookDelivery {
  pub body: Vec<u8>,
  pub signature: Option<String>,
  pub timestamp: Option<String>,
}

/// An authenticated webhook notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
  pub order_id: OrderId,
  pub status: String,
  pub success: bool,
  pub provider_payment_id: Option<String>,
  pub payer_email: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
  fn kind(&self) -> ProviderKind;

  /// Publishable key for a client-side checkout widget, if the provider has one.
  fn public_key(&self) -> Option<&str> {
    None
  }

  async fn create_session(&self, request: &SessionRequest) -> Result<ProviderSession, ProviderError>;

  async fn check_status(&self, _order_id: OrderId, _session: &PaymentSession) -> Result<PaymentStatus, ProviderError> {
    Err(ProviderError::Unsupported("status polling"))
  }

  /// Succeeds only if the claim's signature was produced with our secret.
  fn verify_callback(&self, _claim: &CallbackClaim) -> Result<(), ProviderError> {
    Err(ProviderError::Unsupported("signed callback verification"))
  }

  /// Authenticates and parses a webhook. No field is trusted before the
  /// signature checks out.
  fn verify_webhook(&self, _delivery: &WebhookDelivery) -> Result<WebhookEvent, ProviderError> {
    Err(ProviderError::Unsupported("webhooks"))
  }
}

/// Turns a non-success response into `ProviderError::Http`, keeping its body text.
pub(crate) async fn error_body(response: reqwest::Response) -> ProviderError {
  let status = response.status().as_u16();
  let body = response.text().await.unwrap_or_default();
  ProviderError::Http { status, body }
}

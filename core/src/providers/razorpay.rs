// core/src/providers/razorpay.rs

//! Razorpay: signed-callback model. The checkout widget hands the client a
//! `(order_id, payment_id, signature)` triple which we re-derive with our key.

use crate::domain::ProviderKind;
use crate::providers::signature;
use crate::providers::{error_body, CallbackClaim, PaymentProvider, ProviderError, ProviderSession, SessionRequest};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
  pub base_url: String,
  pub key_id: String,
  pub key_secret: String,
  pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RazorpayProvider {
  config: RazorpayConfig,
  http: Client,
}

#[derive(Debug, Deserialize)]
struct CreatedOrder {
  id: String,
  #[serde(default)]
  status: Option<String>,
}

/// Converts a two-place amount to paise.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
  (amount * Decimal::ONE_HUNDRED).round().to_i64()
}

/// Checks `hex(HMAC-SHA256(key_secret, "{order_id}|{payment_id}"))`.
pub fn verify_payment_signature(key_secret: &str, claim: &CallbackClaim) -> Result<(), ProviderError> {
  if claim.payment_id.trim().is_empty() || claim.signature.trim().is_empty() {
    return Err(ProviderError::Signature("payment id and signature are required".to_string()));
  }
  signature::verify_hex(
    key_secret,
    &[claim.provider_order_id.as_bytes(), b"|", claim.payment_id.as_bytes()],
    &claim.signature,
  )
}

impl RazorpayProvider {
  pub fn new(config: RazorpayConfig) -> Result<Self, ProviderError> {
    let http = Client::builder().timeout(config.timeout).build()?;
    Ok(Self { config, http })
  }
}

#[async_trait]
impl PaymentProvider for RazorpayProvider {
  fn kind(&self) -> ProviderKind {
    ProviderKind::Razorpay
  }

  fn public_key(&self) -> Option<&str> {
    Some(&self.config.key_id)
  }

  #[instrument(name = "Razorpay::create_session", skip(self, request), fields(order_id = %request.order_id), err(Display))]
  async fn create_session(&self, request: &SessionRequest) -> Result<ProviderSession, ProviderError> {
    let amount = to_minor_units(request.amount)
      .ok_or_else(|| ProviderError::Protocol(format!("amount {} is not representable", request.amount)))?;
    let body = json!({
      "amount": amount,
      "currency": request.currency,
      "receipt": format!("order_{}", request.order_id),
      "notes": {
        "orderId": request.order_id.to_string(),
        "userId": request.customer.customer_id,
        "customerEmail": request.customer.email,
      },
    });

    let url = format!("{}/v1/orders", self.config.base_url.trim_end_matches('/'));
    let response = self
      .http
      .post(url)
      .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
      .json(&body)
      .send()
      .await?;
    if !response.status().is_success() {
      return Err(error_body(response).await);
    }
    let created: CreatedOrder = response
      .json()
      .await
      .map_err(|e| ProviderError::Protocol(format!("create order response: {e}")))?;
    debug!(provider_order_id = %created.id, "Razorpay order created.");

    Ok(ProviderSession {
      session_token: created.id.clone(),
      provider_order_id: created.id,
      status: created.status.unwrap_or_else(|| "created".to_string()),
    })
  }

  fn verify_callback(&self, claim: &CallbackClaim) -> Result<(), ProviderError> {
    verify_payment_signature(&self.config.key_secret, claim)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  fn claim(secret: &str, order: &str, payment: &str) -> CallbackClaim {
    let sig = signature::sign_hex(secret, &[format!("{order}|{payment}").as_bytes()]).unwrap();
    CallbackClaim {
      provider_order_id: order.to_string(),
      payment_id: payment.to_string(),
      signature: sig,
    }
  }

  #[test]
  fn genuine_signature_verifies() {
    assert!(verify_payment_signature("key_secret", &claim("key_secret", "order_A1", "pay_B2")).is_ok());
  }

  #[test]
  fn forged_or_swapped_claims_fail() {
    let forged = claim("wrong_secret", "order_A1", "pay_B2");
    assert!(matches!(
      verify_payment_signature("key_secret", &forged),
      Err(ProviderError::Signature(_))
    ));

    let mut swapped = claim("key_secret", "order_A1", "pay_B2");
    swapped.payment_id = "pay_other".to_string();
    assert!(verify_payment_signature("key_secret", &swapped).is_err());
  }

  #[test]
  fn amounts_are_sent_in_paise() {
    assert_eq!(to_minor_units(dec!(118.00)), Some(11800));
    assert_eq!(to_minor_units(dec!(57.18)), Some(5718));
  }
}

// core/src/providers/cashfree.rs

//! Cashfree PG: session + webhook model.
//!
//! Our order id doubles as the Cashfree `order_id`, so the provider order id
//! stored on the session is always the order's own id. Cashfree refuses a
//! second create for the same id with HTTP 409; the order it already holds is
//! fetched and its session returned instead.

use crate::domain::{OrderId, PaymentSession, ProviderKind};
use crate::providers::signature;
use crate::providers::{
  error_body, PaymentProvider, PaymentStatus, ProviderError, ProviderSession, SessionRequest, WebhookDelivery, WebhookEvent,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub const DEFAULT_API_VERSION: &str = "2022-09-01";

/// Status a Cashfree webhook reports once the order is paid.
const WEBHOOK_PAID: &str = "PAID";
/// Status of a successful payment attempt in the payments listing.
const PAYMENT_SUCCESS: &str = "SUCCESS";

#[derive(Debug, Clone)]
pub struct CashfreeConfig {
  pub base_url: String,
  pub app_id: String,
  pub secret_key: String,
  pub api_version: String,
  pub notify_url: Option<String>,
  pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CashfreeProvider {
  config: CashfreeConfig,
  http: Client,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
  #[serde(default)]
  order_id: Option<String>,
  payment_session_id: String,
  #[serde(default)]
  order_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderPayment {
  #[serde(default)]
  cf_payment_id: Value,
  payment_status: String,
  #[serde(default)]
  payment_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
  order_id: String,
  order_status: String,
  #[serde(default)]
  cf_payment_id: Value,
  #[serde(default)]
  customer_email: Option<String>,
}

fn id_to_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// Authenticates a Cashfree webhook and parses it into an event.
///
/// The signature is `base64(HMAC-SHA256(secret, timestamp || raw_body))`; an
/// absent timestamp header contributes nothing.
pub fn verify_webhook_payload(secret_key: &str, delivery: &WebhookDelivery) -> Result<WebhookEvent, ProviderError> {
  let signature = delivery
    .signature
    .as_deref()
    .filter(|s| !s.trim().is_empty())
    .ok_or_else(|| ProviderError::Signature("webhook signature header missing".to_string()))?;
  let timestamp = delivery.timestamp.as_deref().unwrap_or_default();
  signature::verify_base64(secret_key, &[timestamp.as_bytes(), &delivery.body], signature)?;

  let body: WebhookBody =
    serde_json::from_slice(&delivery.body).map_err(|e| ProviderError::Malformed(format!("webhook body: {e}")))?;
  let order_id = Uuid::parse_str(body.order_id.trim())
    .map_err(|_| ProviderError::Malformed(format!("webhook order_id '{}' is not an order id", body.order_id)))?;

  Ok(WebhookEvent {
    order_id,
    success: body.order_status == WEBHOOK_PAID,
    status: body.order_status,
    provider_payment_id: id_to_string(&body.cf_payment_id),
    payer_email: body.customer_email,
  })
}

/// Reduces the payment attempts of one order to a single status. Any
/// successful attempt wins; otherwise the most recent attempt decides.
fn summarize_payments(mut payments: Vec<OrderPayment>) -> PaymentStatus {
  if let Some(paid) = payments.iter().find(|p| p.payment_status == PAYMENT_SUCCESS) {
    return PaymentStatus::Success {
      provider_payment_id: id_to_string(&paid.cf_payment_id),
      status: paid.payment_status.clone(),
      payer_email: None,
    };
  }
  payments.sort_by(|a, b| a.payment_time.cmp(&b.payment_time));
  match payments.pop() {
    None => PaymentStatus::Pending {
      status: "ACTIVE".to_string(),
    },
    Some(latest) => match latest.payment_status.as_str() {
      "FAILED" | "USER_DROPPED" | "CANCELLED" | "VOID" => PaymentStatus::Failed {
        status: latest.payment_status,
      },
      _ => PaymentStatus::Pending {
        status: latest.payment_status,
      },
    },
  }
}

impl CashfreeProvider {
  pub fn new(config: CashfreeConfig) -> Result<Self, ProviderError> {
    let http = Client::builder().timeout(config.timeout).build()?;
    Ok(Self { config, http })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    builder
      .header("x-client-id", &self.config.app_id)
      .header("x-client-secret", &self.config.secret_key)
      .header("x-api-version", &self.config.api_version)
  }

  /// Loads an order Cashfree already holds, e.g. one created by a request
  /// whose response never reached us.
  async fn fetch_order(&self, order_id: &str) -> Result<CreateOrderResponse, ProviderError> {
    let response = self
      .authed(self.http.get(self.url(&format!("/pg/orders/{order_id}"))))
      .send()
      .await?;
    if !response.status().is_success() {
      return Err(error_body(response).await);
    }
    response
      .json()
      .await
      .map_err(|e| ProviderError::Protocol(format!("order lookup response: {e}")))
  }
}

#[async_trait]
impl PaymentProvider for CashfreeProvider {
  fn kind(&self) -> ProviderKind {
    ProviderKind::Cashfree
  }

  #[instrument(name = "Cashfree::create_session", skip(self, request), fields(order_id = %request.order_id), err(Display))]
  async fn create_session(&self, request: &SessionRequest) -> Result<ProviderSession, ProviderError> {
    let order_id = request.order_id.to_string();
    let amount = request
      .amount
      .to_f64()
      .ok_or_else(|| ProviderError::Protocol(format!("amount {} is not representable", request.amount)))?;
    let mut order_meta = serde_json::Map::new();
    if let Some(return_url) = &request.return_url {
      order_meta.insert("return_url".to_string(), json!(return_url));
    }
    if let Some(notify_url) = &self.config.notify_url {
      order_meta.insert("notify_url".to_string(), json!(notify_url));
    }
    let body = json!({
      "order_id": order_id,
      "order_amount": amount,
      "order_currency": request.currency,
      "customer_details": {
        "customer_id": request.customer.customer_id,
        "customer_name": request.customer.name,
        "customer_email": request.customer.email,
        "customer_phone": request.customer.phone,
      },
      "order_meta": order_meta,
    });

    let response = self.authed(self.http.post(self.url("/pg/orders"))).json(&body).send().await?;
    let created: CreateOrderResponse = if response.status() == StatusCode::CONFLICT {
      info!("Cashfree order already exists; reusing its session.");
      self.fetch_order(&order_id).await?
    } else if !response.status().is_success() {
      return Err(error_body(response).await);
    } else {
      let created: CreateOrderResponse = response
        .json()
        .await
        .map_err(|e| ProviderError::Protocol(format!("create order response: {e}")))?;
      debug!(status = ?created.order_status, "Cashfree order created.");
      created
    };

    Ok(ProviderSession {
      provider_order_id: created.order_id.unwrap_or(order_id),
      session_token: created.payment_session_id,
      status: created.order_status.unwrap_or_else(|| "ACTIVE".to_string()),
    })
  }

  #[instrument(name = "Cashfree::check_status", skip(self, session), err(Display))]
  async fn check_status(&self, order_id: OrderId, session: &PaymentSession) -> Result<PaymentStatus, ProviderError> {
    let path = format!("/pg/orders/{}/payments", session.provider_order_id);
    let response = self.authed(self.http.get(self.url(&path))).send().await?;
    if !response.status().is_success() {
      return Err(error_body(response).await);
    }
    let payments: Vec<OrderPayment> = response
      .json()
      .await
      .map_err(|e| ProviderError::Protocol(format!("payments response: {e}")))?;
    Ok(summarize_payments(payments))
  }

  fn verify_webhook(&self, delivery: &WebhookDelivery) -> Result<WebhookEvent, ProviderError> {
    verify_webhook_payload(&self.config.secret_key, delivery)
  }
}

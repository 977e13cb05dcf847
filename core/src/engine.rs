// core/src/engine.rs

//! Payment Reconciliation Engine.
//!
//! Bridges the ledger and the payment providers. Every confirmation path
//! (status poll, signed callback, webhook) ends in the ledger's single paid
//! compare-and-set, so racing or repeated signals converge on one transition.

use crate::domain::{
  Order, OrderId, PaymentReceipt, PaymentSession, ProviderKind, UserId, VerificationChannel,
};
use crate::error::{Error, Result};
use crate::flow::{ContextData, Flow, FlowControl};
use crate::ledger::OrderLedger;
use crate::providers::{
  CallbackClaim, CustomerContact, PaymentProvider, PaymentStatus, ProviderError, SessionRequest, WebhookDelivery,
  WebhookEvent,
};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
  pub currency: String,
  /// Upper bound on every outbound provider call.
  pub provider_timeout: Duration,
  /// Largest accepted difference between a client-requested amount and the order total.
  pub amount_tolerance: Decimal,
  /// Base of the URL the provider redirects the customer to after payment.
  pub return_url_base: Option<String>,
}

impl Default for EngineSettings {
  fn default() -> Self {
    Self {
      currency: "INR".to_string(),
      provider_timeout: Duration::from_secs(10),
      amount_tolerance: dec!(0.01),
      return_url_base: None,
    }
  }
}

/// What the client needs to launch the provider's checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
  pub order_id: OrderId,
  pub provider: ProviderKind,
  pub provider_order_id: String,
  pub session_token: String,
  pub return_url: Option<String>,
  pub amount: Decimal,
  pub currency: String,
  /// True when an existing session was returned instead of opening a new one.
  pub reused: bool,
}

impl SessionHandle {
  fn from_session(order: &Order, session: &PaymentSession, currency: &str, reused: bool) -> Self {
    Self {
      order_id: order.id,
      provider: session.provider,
      provider_order_id: session.provider_order_id.clone(),
      session_token: session.session_token.clone(),
      return_url: session.return_url.clone(),
      amount: order.prices.total_price,
      currency: currency.to_string(),
      reused,
    }
  }
}

/// Result of a client-initiated verification. Only `Paid` reflects a stored
/// state; the other two are reported and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum PaymentOutcome {
  #[serde(rename_all = "camelCase")]
  Paid { order: Box<Order>, newly_paid: bool },
  #[serde(rename_all = "camelCase")]
  VerificationPending { provider_status: String },
  #[serde(rename_all = "camelCase")]
  VerificationFailed { provider_status: String },
}

/// What a webhook delivery amounted to. Every variant is acknowledged with a
/// success status so the provider stops retrying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum WebhookAck {
  #[serde(rename_all = "camelCase")]
  Applied { order_id: OrderId },
  #[serde(rename_all = "camelCase")]
  AlreadyPaid { order_id: OrderId },
  #[serde(rename_all = "camelCase")]
  Ignored { order_id: OrderId, status: String },
}

/// Configuration the client checkout widget of the signed-callback provider needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderClientConfig {
  pub key: String,
  pub currency: String,
}

/// Per-delivery state of the webhook flow.
struct WebhookData {
  provider: Arc<dyn PaymentProvider>,
  delivery: WebhookDelivery,
  event: Option<WebhookEvent>,
  ack: Option<WebhookAck>,
}

const WEBHOOK_STEPS: &[(&str, bool)] = &[("verify_signature", false), ("apply_event", false)];

fn build_webhook_flow(ledger: Arc<OrderLedger>) -> Result<Flow<WebhookData, Error>> {
  let mut flow = Flow::<WebhookData, Error>::new("provider_webhook", WEBHOOK_STEPS)?;

  flow.on_step("verify_signature", |ctx: ContextData<WebhookData>| async move {
    let verified = ctx.with(|d| d.provider.verify_webhook(&d.delivery));
    let event = match verified {
      Ok(event) => event,
      Err(e) => {
        warn!(error = %e, "Webhook rejected.");
        return Err(Error::from(e));
      }
    };
    ctx.write().event = Some(event);
    Ok::<_, Error>(FlowControl::Continue)
  })?;

  flow.on_step("apply_event", move |ctx: ContextData<WebhookData>| {
    let ledger = ledger.clone();
    async move {
      let event = ctx
        .with(|d| d.event.clone())
        .ok_or_else(|| Error::Internal("webhook event missing after verification".to_string()))?;

      if !event.success {
        info!(order_id = %event.order_id, status = %event.status, "Non-success webhook acknowledged without change.");
        ctx.write().ack = Some(WebhookAck::Ignored {
          order_id: event.order_id,
          status: event.status,
        });
        return Ok(FlowControl::Continue);
      }

      let receipt = PaymentReceipt {
        provider_payment_id: event.provider_payment_id,
        status: event.status,
        payer_email: event.payer_email,
      };
      let result = ledger.mark_paid(event.order_id, receipt, VerificationChannel::Webhook).await?;
      let ack = if result.newly_paid {
        WebhookAck::Applied {
          order_id: event.order_id,
        }
      } else {
        WebhookAck::AlreadyPaid {
          order_id: event.order_id,
        }
      };
      ctx.write().ack = Some(ack);
      Ok::<_, Error>(FlowControl::Continue)
    }
  })?;

  Ok(flow)
}

pub struct ReconciliationEngine {
  ledger: Arc<OrderLedger>,
  providers: HashMap<ProviderKind, Arc<dyn PaymentProvider>>,
  settings: EngineSettings,
  webhook_flow: Flow<WebhookData, Error>,
}

impl ReconciliationEngine {
  pub fn new(
    ledger: Arc<OrderLedger>,
    providers: impl IntoIterator<Item = Arc<dyn PaymentProvider>>,
    settings: EngineSettings,
  ) -> Result<Self> {
    let providers = providers.into_iter().map(|p| (p.kind(), p)).collect();
    let webhook_flow = build_webhook_flow(ledger.clone())?;
    Ok(Self {
      ledger,
      providers,
      settings,
      webhook_flow,
    })
  }

  pub fn ledger(&self) -> &Arc<OrderLedger> {
    &self.ledger
  }

  pub fn settings(&self) -> &EngineSettings {
    &self.settings
  }

  fn provider(&self, kind: ProviderKind) -> Result<&Arc<dyn PaymentProvider>> {
    self
      .providers
      .get(&kind)
      .ok_or_else(|| Error::Validation(format!("payment provider '{kind}' is not configured")))
  }

  /// Awaits a provider call under the configured timeout.
  async fn bounded<T>(
    &self,
    operation: &'static str,
    call: impl Future<Output = std::result::Result<T, ProviderError>>,
  ) -> Result<T> {
    match tokio::time::timeout(self.settings.provider_timeout, call).await {
      Ok(result) => result.map_err(Error::from),
      Err(_) => {
        warn!(operation, timeout_ms = self.settings.provider_timeout.as_millis() as u64, "Provider call timed out.");
        Err(Error::Upstream(format!(
          "{operation} timed out after {} ms",
          self.settings.provider_timeout.as_millis()
        )))
      }
    }
  }

  fn return_url(&self, order_id: OrderId) -> Option<String> {
    self
      .settings
      .return_url_base
      .as_ref()
      .map(|base| format!("{}/order/{order_id}", base.trim_end_matches('/')))
  }

  /// Opens a payment session with `kind` for an order owned by `user_id`.
  ///
  /// Nothing is written unless the provider answered in time; an unpaid order
  /// that already holds a session with the same provider gets that session back.
  #[instrument(name = "Engine::create_payment_session", skip(self, customer), fields(provider = %kind), err(Display))]
  pub async fn create_payment_session(
    &self,
    kind: ProviderKind,
    order_id: OrderId,
    user_id: UserId,
    requested_amount: Decimal,
    customer: CustomerContact,
  ) -> Result<SessionHandle> {
    let provider = self.provider(kind)?.clone();
    let order = self.ledger.load_owned(order_id, user_id).await?;
    if order.is_paid {
      return Err(Error::Conflict(format!("order {order_id} is already paid")));
    }

    let total = order.prices.total_price;
    if (requested_amount - total).abs() > self.settings.amount_tolerance {
      warn!(requested = %requested_amount, %total, "Requested amount does not match order total.");
      return Err(Error::Validation(format!(
        "requested amount {requested_amount} does not match order total {total}"
      )));
    }
    if total <= Decimal::ZERO {
      return Err(Error::Validation("order total is zero; nothing to collect".to_string()));
    }

    if let Some(existing) = order.payment_session.as_ref().filter(|s| s.provider == kind) {
      info!(provider_order_id = %existing.provider_order_id, "Reusing existing payment session.");
      return Ok(SessionHandle::from_session(&order, existing, &self.settings.currency, true));
    }

    let customer = CustomerContact {
      customer_id: if customer.customer_id.is_empty() {
        user_id.to_string()
      } else {
        customer.customer_id
      },
      ..customer
    };
    let request = SessionRequest {
      order_id,
      amount: total,
      currency: self.settings.currency.clone(),
      customer,
      return_url: self.return_url(order_id),
    };
    let opened = self.bounded("create_session", provider.create_session(&request)).await?;

    let session = PaymentSession {
      provider: kind,
      provider_order_id: opened.provider_order_id,
      session_token: opened.session_token,
      provider_status: opened.status,
      channel: VerificationChannel::None,
      return_url: request.return_url,
      created_at: Utc::now(),
    };
    let expected = order.payment_session.as_ref().map(|s| s.provider_order_id.as_str());
    if let Some(updated) = self.ledger.attach_session(order_id, expected, &session).await? {
      info!(provider_order_id = %session.provider_order_id, "Payment session stored.");
      return Ok(SessionHandle::from_session(&updated, &session, &self.settings.currency, false));
    }

    // Lost a race: another request paid the order or stored a session first.
    let current = self.ledger.load_owned(order_id, user_id).await?;
    if current.is_paid {
      return Err(Error::Conflict(format!("order {order_id} is already paid")));
    }
    match current.payment_session.as_ref().filter(|s| s.provider == kind) {
      Some(winner) => Ok(SessionHandle::from_session(&current, winner, &self.settings.currency, true)),
      None => Err(Error::Conflict(format!(
        "payment session for order {order_id} changed concurrently"
      ))),
    }
  }

  /// Polling verification: asks the provider for the latest status of the
  /// stored session and marks the order paid on success.
  #[instrument(name = "Engine::verify_polled_payment", skip(self), err(Display))]
  pub async fn verify_polled_payment(&self, order_id: OrderId, user_id: UserId) -> Result<PaymentOutcome> {
    let order = self.ledger.load_owned(order_id, user_id).await?;
    if order.is_paid {
      return Ok(PaymentOutcome::Paid {
        order: Box::new(order),
        newly_paid: false,
      });
    }
    let session = order
      .payment_session
      .clone()
      .ok_or_else(|| Error::Conflict(format!("order {order_id} has no payment session")))?;
    let provider = self.provider(session.provider)?.clone();

    match self.bounded("check_status", provider.check_status(order_id, &session)).await? {
      PaymentStatus::Success {
        provider_payment_id,
        status,
        payer_email,
      } => {
        let receipt = PaymentReceipt {
          provider_payment_id,
          status,
          payer_email,
        };
        let result = self.ledger.mark_paid(order_id, receipt, VerificationChannel::ClientVerify).await?;
        Ok(PaymentOutcome::Paid {
          order: Box::new(result.order),
          newly_paid: result.newly_paid,
        })
      }
      PaymentStatus::Pending { status } => {
        info!(provider_status = %status, "Payment not yet complete.");
        Ok(PaymentOutcome::VerificationPending { provider_status: status })
      }
      PaymentStatus::Failed { status } => {
        info!(provider_status = %status, "Payment attempt failed; order left unpaid.");
        Ok(PaymentOutcome::VerificationFailed { provider_status: status })
      }
    }
  }

  /// Signed-callback verification. The claim must name the session stored on
  /// the order and carry a signature made with our secret.
  #[instrument(name = "Engine::verify_signed_callback", skip(self, claim), err(Display))]
  pub async fn verify_signed_callback(&self, order_id: OrderId, user_id: UserId, claim: CallbackClaim) -> Result<PaymentOutcome> {
    let order = self.ledger.load_owned(order_id, user_id).await?;
    let session = order
      .payment_session
      .as_ref()
      .ok_or_else(|| Error::Conflict(format!("order {order_id} has no payment session")))?;
    if session.provider_order_id != claim.provider_order_id {
      warn!("Callback names a provider order that is not stored on this order.");
      return Err(Error::Signature(
        "callback does not match the order's payment session".to_string(),
      ));
    }
    let provider = self.provider(session.provider)?;
    if let Err(e) = provider.verify_callback(&claim) {
      warn!(error = %e, "Signed callback rejected.");
      return Err(e.into());
    }

    let receipt = PaymentReceipt {
      provider_payment_id: Some(claim.payment_id),
      status: "SUCCESS".to_string(),
      payer_email: None,
    };
    let result = self.ledger.mark_paid(order_id, receipt, VerificationChannel::ClientVerify).await?;
    Ok(PaymentOutcome::Paid {
      order: Box::new(result.order),
      newly_paid: result.newly_paid,
    })
  }

  /// Authenticates and applies one webhook delivery. Duplicate deliveries for
  /// a paid order and non-success notifications are acknowledged no-ops.
  #[instrument(name = "Engine::handle_provider_webhook", skip(self, delivery), fields(provider = %kind, bytes = delivery.body.len()), err(Display))]
  pub async fn handle_provider_webhook(&self, kind: ProviderKind, delivery: WebhookDelivery) -> Result<WebhookAck> {
    let provider = self.provider(kind)?.clone();
    let ctx = ContextData::new(WebhookData {
      provider,
      delivery,
      event: None,
      ack: None,
    });
    self.webhook_flow.run(ctx.clone()).await?;
    let ack = ctx.write().ack.take();
    ack.ok_or_else(|| Error::Internal("webhook flow finished without an acknowledgement".to_string()))
  }

  /// Key and currency for the signed-callback provider's checkout widget.
  pub fn provider_b_client_config(&self) -> Result<ProviderClientConfig> {
    let key = self
      .providers
      .get(&ProviderKind::Razorpay)
      .and_then(|p| p.public_key())
      .ok_or_else(|| Error::NotFound("razorpay is not configured".to_string()))?;
    Ok(ProviderClientConfig {
      key: key.to_string(),
      currency: self.settings.currency.clone(),
    })
  }
}

impl std::fmt::Debug for ReconciliationEngine {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ReconciliationEngine")
      .field("providers", &self.providers.keys().collect::<Vec<_>>())
      .field("settings", &self.settings)
      .finish_non_exhaustive()
  }
}

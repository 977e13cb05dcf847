// core/src/domain/order.rs

//! The order record and its monotonic transitions.
//!
//! The `apply_*` methods are the single definition of each transition. Storage
//! adapters must execute them (or an equivalent conditional update) atomically
//! with respect to other writers of the same order.

use crate::domain::coupon::CouponId;
use crate::domain::pricing::PriceBreakdown;
use crate::domain::product::ProductId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type OrderId = Uuid;
pub type UserId = Uuid;

/// Authenticated caller, as supplied by the identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
  pub user_id: UserId,
  pub is_admin: bool,
}

impl Requester {
  pub fn user(user_id: UserId) -> Self {
    Self {
      user_id,
      is_admin: false,
    }
  }

  pub fn admin(user_id: UserId) -> Self {
    Self { user_id, is_admin: true }
  }
}

/// Immutable line-item snapshot. `unit_price` is captured from the catalog at
/// creation and never re-read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
  pub product_id: ProductId,
  pub name: String,
  pub quantity: u32,
  pub unit_price: Decimal,
}

impl OrderLine {
  pub fn line_total(&self) -> Decimal {
    self.unit_price * Decimal::from(self.quantity)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
  pub full_name: String,
  pub address: String,
  pub city: String,
  pub postal_code: String,
  pub country: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
}

/// Which external gateway a payment session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
  /// Session + webhook model, confirmed by status polling or webhook.
  Cashfree,
  /// Signed-callback model, confirmed by an HMAC relayed by the client.
  Razorpay,
}

impl ProviderKind {
  pub fn as_str(self) -> &'static str {
    match self {
      ProviderKind::Cashfree => "cashfree",
      ProviderKind::Razorpay => "razorpay",
    }
  }
}

impl fmt::Display for ProviderKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ProviderKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "cashfree" => Ok(ProviderKind::Cashfree),
      "razorpay" => Ok(ProviderKind::Razorpay),
      other => Err(format!("unknown payment provider '{other}'")),
    }
  }
}

/// Which path last updated the payment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationChannel {
  #[default]
  None,
  ClientVerify,
  Webhook,
  /// Admin confirmation through the ledger.
  Manual,
}

impl VerificationChannel {
  pub fn as_str(self) -> &'static str {
    match self {
      VerificationChannel::None => "none",
      VerificationChannel::ClientVerify => "client-verify",
      VerificationChannel::Webhook => "webhook",
      VerificationChannel::Manual => "manual",
    }
  }
}

impl FromStr for VerificationChannel {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "none" => Ok(VerificationChannel::None),
      "client-verify" => Ok(VerificationChannel::ClientVerify),
      "webhook" => Ok(VerificationChannel::Webhook),
      "manual" => Ok(VerificationChannel::Manual),
      other => Err(format!("unknown verification channel '{other}'")),
    }
  }
}

/// Provider correlation data embedded in the order. At most one per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
  pub provider: ProviderKind,
  pub provider_order_id: String,
  /// Client-facing token: the payment session id for Cashfree, the provider
  /// order id for Razorpay.
  pub session_token: String,
  pub provider_status: String,
  pub channel: VerificationChannel,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub return_url: Option<String>,
  pub created_at: DateTime<Utc>,
}

/// Evidence of payment as reported by a confirmation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
  #[serde(default)]
  pub provider_payment_id: Option<String>,
  pub status: String,
  #[serde(default)]
  pub payer_email: Option<String>,
}

/// The payment result stored once the order is paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
  pub provider_payment_id: Option<String>,
  pub status: String,
  pub payer_email: Option<String>,
  pub channel: VerificationChannel,
  pub confirmed_at: DateTime<Utc>,
}

impl PaymentConfirmation {
  pub fn new(receipt: PaymentReceipt, channel: VerificationChannel, confirmed_at: DateTime<Utc>) -> Self {
    Self {
      provider_payment_id: receipt.provider_payment_id,
      status: receipt.status,
      payer_email: receipt.payer_email,
      channel,
      confirmed_at,
    }
  }
}

/// Per-order payment sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentState {
  NoSession,
  SessionCreated,
  Paid,
}

/// Base lifecycle as seen from outside. Paid/Shipped/Delivered are reported
/// from the independent flags, most advanced first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderLifecycle {
  /// Checkout accepted but not yet stored. A persisted order never reports
  /// this; `Order::lifecycle` starts at `AwaitingPaymentSession`.
  Created,
  AwaitingPaymentSession,
  PaymentSessionIssued,
  Paid,
  Shipped,
  Delivered,
}

/// Client request to create an order. Prices are never accepted from the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
  pub items: Vec<NewOrderLine>,
  pub shipping_address: ShippingAddress,
  pub payment_method: String,
  #[serde(default)]
  pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderLine {
  pub product_id: ProductId,
  pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: OrderId,
  pub user_id: UserId,
  pub lines: Vec<OrderLine>,
  pub shipping_address: ShippingAddress,
  pub payment_method: String,
  #[serde(flatten)]
  pub prices: PriceBreakdown,
  pub coupon_id: Option<CouponId>,
  pub payment_session: Option<PaymentSession>,
  pub payment_result: Option<PaymentConfirmation>,
  pub is_paid: bool,
  pub paid_at: Option<DateTime<Utc>>,
  pub is_shipped: bool,
  pub shipped_at: Option<DateTime<Utc>>,
  pub is_delivered: bool,
  pub delivered_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  pub fn is_owned_by(&self, user_id: UserId) -> bool {
    self.user_id == user_id
  }

  pub fn payment_state(&self) -> PaymentState {
    if self.is_paid {
      PaymentState::Paid
    } else if self.payment_session.is_some() {
      PaymentState::SessionCreated
    } else {
      PaymentState::NoSession
    }
  }

  pub fn lifecycle(&self) -> OrderLifecycle {
    if self.is_delivered {
      OrderLifecycle::Delivered
    } else if self.is_shipped {
      OrderLifecycle::Shipped
    } else if self.is_paid {
      OrderLifecycle::Paid
    } else if self.payment_session.is_some() {
      OrderLifecycle::PaymentSessionIssued
    } else {
      OrderLifecycle::AwaitingPaymentSession
    }
  }

  /// Replaces the payment session if the order is unpaid and the current
  /// session's provider order id equals `expected_provider_order_id`.
  pub fn apply_session(&mut self, expected_provider_order_id: Option<&str>, session: PaymentSession) -> bool {
    let current = self.payment_session.as_ref().map(|s| s.provider_order_id.as_str());
    if self.is_paid || current != expected_provider_order_id {
      return false;
    }
    self.updated_at = session.created_at;
    self.payment_session = Some(session);
    true
  }

  /// Sets the paid flag if it is not already set. Returns false (and changes
  /// nothing) for an order that is already paid.
  pub fn apply_paid(&mut self, confirmation: PaymentConfirmation) -> bool {
    if self.is_paid {
      return false;
    }
    let at = confirmation.confirmed_at;
    if let Some(session) = self.payment_session.as_mut() {
      session.provider_status = confirmation.status.clone();
      session.channel = confirmation.channel;
    }
    self.is_paid = true;
    self.paid_at = Some(at);
    self.payment_result = Some(confirmation);
    self.updated_at = at;
    true
  }

  pub fn apply_shipped(&mut self, at: DateTime<Utc>) -> bool {
    if self.is_shipped {
      return false;
    }
    self.is_shipped = true;
    self.shipped_at = Some(at);
    self.updated_at = at;
    true
  }

  pub fn apply_delivered(&mut self, at: DateTime<Utc>) -> bool {
    if self.is_delivered {
      return false;
    }
    self.is_delivered = true;
    self.delivered_at = Some(at);
    self.updated_at = at;
    true
  }
}

// core/src/lib.rs

//! Paysettle: order ledger and payment reconciliation core.
//!
//! Paysettle keeps an order's payment state consistent while confirmations
//! arrive from several directions:
//!  - An order ledger that snapshots catalog prices at creation and exposes
//!    monotonic paid / shipped / delivered transitions.
//!  - A coupon guard enforcing single use of a coupon per user, tied to order
//!    creation through a compensating flow.
//!  - A reconciliation engine that opens provider payment sessions and accepts
//!    status polls, signed client callbacks and webhooks, all converging on one
//!    compare-and-set paid transition.
//!  - A payment provider capability with Cashfree (session + webhook) and
//!    Razorpay (signed callback) implementations.
//!
//! Storage is abstracted behind async ports in [`store`]; in-memory adapters
//! ship with the crate.

pub mod coupons;
pub mod domain;
pub mod engine;
pub mod error;
pub mod flow;
pub mod ledger;
pub mod providers;
pub mod store;

// --- Re-exports for the Public API ---

pub use crate::coupons::CouponGuard;
pub use crate::domain::{
  Coupon, CouponId, CouponValidation, NewOrder, NewOrderLine, Order, OrderId, OrderLifecycle, OrderLine,
  PaymentConfirmation, PaymentReceipt, PaymentSession, PaymentState, PriceBreakdown, PricingPolicy, Product, ProductId,
  ProviderKind, Requester, ShippingAddress, UserId, VerificationChannel,
};
pub use crate::engine::{EngineSettings, PaymentOutcome, ProviderClientConfig, ReconciliationEngine, SessionHandle, WebhookAck};
pub use crate::error::{Error, Result};
pub use crate::ledger::{MarkPaid, OrderLedger};
pub use crate::providers::{CallbackClaim, CustomerContact, PaymentProvider, ProviderError, WebhookDelivery};

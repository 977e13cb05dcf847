// core/src/store/mod.rs

//! Storage ports consumed by the ledger, coupon guard and reconciliation engine.
//!
//! Every state-changing method is a single conditional write: implementations
//! must decide and apply under one atomic operation (one lock acquisition, one
//! `UPDATE ... WHERE ...` statement, one unique-constraint-backed insert). No
//! caller performs its own read-then-write on the same record.

pub mod memory;

use crate::domain::{Coupon, CouponId, Order, OrderId, PaymentConfirmation, PaymentSession, Product, ProductId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Adapters report driver failures as `anyhow::Error`; the core wraps them
/// into `Error::Storage`.
pub type StoreResult<T> = Result<T, anyhow::Error>;

/// Result of the paid compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaidTransition {
  /// This call flipped `is_paid` from false to true.
  Applied(Order),
  /// The order was already paid; nothing was written.
  AlreadyPaid(Order),
}

impl PaidTransition {
  pub fn into_order(self) -> Order {
    match self {
      PaidTransition::Applied(order) | PaidTransition::AlreadyPaid(order) => order,
    }
  }

  pub fn was_applied(&self) -> bool {
    matches!(self, PaidTransition::Applied(_))
  }
}

/// Result of a monotonic flag update (shipped / delivered).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagTransition {
  Applied(Order),
  Unchanged(Order),
}

impl FlagTransition {
  pub fn into_order(self) -> Order {
    match self {
      FlagTransition::Applied(order) | FlagTransition::Unchanged(order) => order,
    }
  }
}

/// Authoritative product prices.
#[async_trait]
pub trait Catalog: Send + Sync {
  /// Returns the products found among `ids`. Missing ids are simply absent.
  async fn products(&self, ids: &[ProductId]) -> StoreResult<Vec<Product>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
  async fn insert(&self, order: &Order) -> StoreResult<()>;

  async fn get(&self, id: OrderId) -> StoreResult<Option<Order>>;

  /// Orders owned by `user_id`, newest first.
  async fn list_for_user(&self, user_id: UserId) -> StoreResult<Vec<Order>>;

  /// All orders, newest first.
  async fn list_all(&self) -> StoreResult<Vec<Order>>;

  /// Stores `session` iff the order is unpaid and its current session's
  /// provider order id equals `expected_provider_order_id` (`None` meaning no
  /// session yet). Returns the updated order, or `None` when the condition did
  /// not hold or the order does not exist.
  async fn attach_session(
    &self,
    id: OrderId,
    expected_provider_order_id: Option<&str>,
    session: &PaymentSession,
  ) -> StoreResult<Option<Order>>;

  /// Compare-and-set on `is_paid = false`. `None` if the order does not exist.
  async fn set_paid_if_unpaid(&self, id: OrderId, confirmation: &PaymentConfirmation) -> StoreResult<Option<PaidTransition>>;

  async fn set_shipped(&self, id: OrderId, at: DateTime<Utc>) -> StoreResult<Option<FlagTransition>>;

  async fn set_delivered(&self, id: OrderId, at: DateTime<Utc>) -> StoreResult<Option<FlagTransition>>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
  /// Inserts a coupon. Returns false if the code is already taken.
  async fn insert(&self, coupon: &Coupon) -> StoreResult<bool>;

  async fn find_by_code(&self, code: &str) -> StoreResult<Option<Coupon>>;

  async fn list(&self) -> StoreResult<Vec<Coupon>>;

  /// Returns the updated coupon, `None` if it does not exist.
  async fn set_active(&self, id: CouponId, active: bool) -> StoreResult<Option<Coupon>>;

  async fn has_consumed(&self, user_id: UserId, coupon_id: CouponId) -> StoreResult<bool>;

  /// Adds `coupon_id` to the user's consumed set. Returns false if it was
  /// already present.
  async fn consume(&self, user_id: UserId, coupon_id: CouponId) -> StoreResult<bool>;

  /// Removes `coupon_id` from the user's consumed set.
  async fn release(&self, user_id: UserId, coupon_id: CouponId) -> StoreResult<()>;
}

pub type SharedCatalog = Arc<dyn Catalog>;
pub type SharedOrderStore = Arc<dyn OrderStore>;
pub type SharedCouponStore = Arc<dyn CouponStore>;

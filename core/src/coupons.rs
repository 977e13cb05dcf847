// core/src/coupons.rs

//! Coupon Consumption Guard: single-use-per-user coupons.

use crate::domain::{round_money, Coupon, CouponId, CouponValidation, ReservedCoupon, UserId};
use crate::error::{Error, Result};
use crate::store::SharedCouponStore;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Normalizes a client-supplied code. Codes are stored upper-cased.
pub fn normalize_code(code: &str) -> String {
  code.trim().to_uppercase()
}

#[derive(Clone)]
pub struct CouponGuard {
  store: SharedCouponStore,
}

impl CouponGuard {
  pub fn new(store: SharedCouponStore) -> Self {
    Self { store }
  }

  async fn active_coupon(&self, code: &str) -> Result<Coupon> {
    let code = normalize_code(code);
    if code.is_empty() {
      return Err(Error::Validation("coupon code must not be empty".to_string()));
    }
    let coupon = self
      .store
      .find_by_code(&code)
      .await?
      .ok_or_else(|| Error::NotFound(format!("coupon '{code}'")))?;
    if !coupon.is_active {
      return Err(Error::CouponInactive(code));
    }
    Ok(coupon)
  }

  /// Atomically records the coupon as consumed by `user_id` and returns its
  /// discount. Concurrent reservations of the same coupon by the same user
  /// yield exactly one success.
  #[instrument(name = "CouponGuard::reserve", skip(self), err(Display))]
  pub async fn reserve(&self, user_id: UserId, code: &str) -> Result<ReservedCoupon> {
    let coupon = self.active_coupon(code).await?;
    if !self.store.consume(user_id, coupon.id).await? {
      warn!(coupon = %coupon.code, "Coupon reuse rejected.");
      return Err(Error::CouponAlreadyUsed(coupon.code));
    }
    info!(coupon = %coupon.code, discount = %coupon.discount, "Coupon reserved.");
    Ok(ReservedCoupon {
      coupon_id: coupon.id,
      code: coupon.code,
      discount: coupon.discount,
    })
  }

  /// Undoes a reservation. Used when the order the coupon was reserved for
  /// could not be persisted.
  #[instrument(name = "CouponGuard::release", skip(self), err(Display))]
  pub async fn release(&self, user_id: UserId, coupon_id: CouponId) -> Result<()> {
    self.store.release(user_id, coupon_id).await?;
    info!("Coupon reservation released.");
    Ok(())
  }

  /// Read-only check. With a user, also reports prior consumption by that user.
  #[instrument(name = "CouponGuard::validate", skip(self), err(Display))]
  pub async fn validate(&self, code: &str, user_id: Option<UserId>) -> Result<CouponValidation> {
    let coupon = self.active_coupon(code).await?;
    if let Some(user_id) = user_id {
      if self.store.has_consumed(user_id, coupon.id).await? {
        return Err(Error::CouponAlreadyUsed(coupon.code));
      }
    }
    Ok(CouponValidation {
      valid: true,
      discount: coupon.discount,
    })
  }

  #[instrument(name = "CouponGuard::create_coupon", skip(self), err(Display))]
  pub async fn create_coupon(&self, code: &str, discount: Decimal) -> Result<Coupon> {
    let code = normalize_code(code);
    if code.is_empty() {
      return Err(Error::Validation("coupon code must not be empty".to_string()));
    }
    if discount <= Decimal::ZERO {
      return Err(Error::Validation("coupon discount must be positive".to_string()));
    }
    let coupon = Coupon {
      id: Uuid::new_v4(),
      code,
      discount: round_money(discount),
      is_active: true,
      created_at: Utc::now(),
    };
    if !self.store.insert(&coupon).await? {
      return Err(Error::Conflict(format!("coupon code '{}' already exists", coupon.code)));
    }
    info!(coupon = %coupon.code, "Coupon created.");
    Ok(coupon)
  }

  pub async fn list_coupons(&self) -> Result<Vec<Coupon>> {
    Ok(self.store.list().await?)
  }

  /// Deactivation does not touch past consumption records.
  #[instrument(name = "CouponGuard::set_coupon_active", skip(self), err(Display))]
  pub async fn set_coupon_active(&self, coupon_id: CouponId, active: bool) -> Result<Coupon> {
    self
      .store
      .set_active(coupon_id, active)
      .await?
      .ok_or_else(|| Error::NotFound(format!("coupon {coupon_id}")))
  }
}

impl std::fmt::Debug for CouponGuard {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CouponGuard").finish_non_exhaustive()
  }
}

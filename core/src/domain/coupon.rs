// core/src/domain/coupon.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CouponId = Uuid;

/// A flat-amount coupon. Only `is_active` ever changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
  pub id: CouponId,
  pub code: String,
  pub discount: Decimal,
  pub is_active: bool,
  pub created_at: DateTime<Utc>,
}

/// A coupon already recorded as consumed by one user, pending the order it pays for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedCoupon {
  pub coupon_id: CouponId,
  pub code: String,
  pub discount: Decimal,
}

/// Result of a read-only coupon check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponValidation {
  pub valid: bool,
  pub discount: Decimal,
}

// core/src/domain/pricing.rs

//! Order price computation. All amounts are `Decimal` rounded to two places.

use crate::domain::order::OrderLine;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub fn round_money(value: Decimal) -> Decimal {
  value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Tax and shipping rules applied at order creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingPolicy {
  /// Fraction, e.g. `0.18` for 18%.
  pub tax_rate: Decimal,
  /// Items subtotal at or above which shipping is free.
  pub free_shipping_threshold: Decimal,
  pub flat_shipping_fee: Decimal,
}

impl Default for PricingPolicy {
  fn default() -> Self {
    Self {
      tax_rate: dec!(0.18),
      free_shipping_threshold: dec!(100),
      flat_shipping_fee: dec!(10),
    }
  }
}

/// Computed prices stored on an order.
///
/// Invariant: `total_price == items_price + tax_price + shipping_price - coupon_discount`
/// and `total_price >= 0`. A coupon worth more than the order is capped at
/// the pre-discount total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
  pub items_price: Decimal,
  pub tax_price: Decimal,
  pub shipping_price: Decimal,
  pub coupon_discount: Decimal,
  pub total_price: Decimal,
}

impl PriceBreakdown {
  /// Total before the coupon was applied.
  pub fn gross_total(&self) -> Decimal {
    self.items_price + self.tax_price + self.shipping_price
  }
}

impl PricingPolicy {
  pub fn price(&self, lines: &[OrderLine], coupon_discount: Decimal) -> PriceBreakdown {
    let items_price = round_money(lines.iter().map(OrderLine::line_total).sum());
    let shipping_price = if items_price >= self.free_shipping_threshold {
      Decimal::ZERO
    } else {
      round_money(self.flat_shipping_fee)
    };
    let tax_price = round_money(items_price * self.tax_rate);
    let gross = items_price + tax_price + shipping_price;
    let coupon_discount = round_money(coupon_discount.max(Decimal::ZERO)).min(gross);
    let total_price = gross - coupon_discount;

    PriceBreakdown {
      items_price,
      tax_price,
      shipping_price,
      coupon_discount,
      total_price,
    }
  }
}

// core/src/domain/mod.rs

//! Domain entities and the pure rules that govern them.

pub mod coupon;
pub mod order;
pub mod pricing;
pub mod product;

pub use coupon::{Coupon, CouponId, CouponValidation, ReservedCoupon};
pub use order::{
  NewOrder, NewOrderLine, Order, OrderId, OrderLifecycle, OrderLine, PaymentConfirmation, PaymentReceipt, PaymentSession,
  PaymentState, ProviderKind, Requester, ShippingAddress, UserId, VerificationChannel,
};
pub use pricing::{round_money, PriceBreakdown, PricingPolicy};
pub use product::{Product, ProductId};

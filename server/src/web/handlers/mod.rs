// server/src/web/handlers/mod.rs

pub mod coupon_handlers;
pub mod order_handlers;
pub mod payment_handlers;
pub mod webhook_handlers;

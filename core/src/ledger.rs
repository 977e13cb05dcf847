// core/src/ledger.rs

//! Order Ledger: owns the canonical order record and its transitions.
//!
//! Order creation runs as a four-step flow. The coupon reservation step
//! carries a compensation, so a failure to persist the order hands the coupon
//! back to the user.

use crate::coupons::CouponGuard;
use crate::domain::{
  NewOrder, NewOrderLine, Order, OrderId, OrderLine, PaymentConfirmation, PaymentReceipt, PaymentSession, PricingPolicy,
  Requester, ReservedCoupon, UserId, VerificationChannel,
};
use crate::error::{Error, Result};
use crate::flow::{ContextData, Flow, FlowControl, FlowResult};
use crate::store::{FlagTransition, PaidTransition, SharedCatalog, SharedOrderStore};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Per-run state of the checkout flow.
#[derive(Debug)]
pub struct CheckoutData {
  pub user_id: UserId,
  pub request: NewOrder,
  pub merged_items: Vec<NewOrderLine>,
  pub lines: Vec<OrderLine>,
  pub reserved_coupon: Option<ReservedCoupon>,
  pub order: Option<Order>,
}

impl CheckoutData {
  fn new(user_id: UserId, request: NewOrder) -> Self {
    Self {
      user_id,
      request,
      merged_items: Vec::new(),
      lines: Vec::new(),
      reserved_coupon: None,
      order: None,
    }
  }
}

/// Result of [`OrderLedger::mark_paid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkPaid {
  pub order: Order,
  /// False when the order had already been paid by an earlier signal.
  pub newly_paid: bool,
}

pub struct OrderLedger {
  orders: SharedOrderStore,
  coupons: CouponGuard,
  checkout: Arc<Flow<CheckoutData, Error>>,
}

const CHECKOUT_STEPS: &[(&str, bool)] = &[
  ("validate_request", false),
  ("price_lines", false),
  ("reserve_coupon", false),
  ("persist_order", false),
];

/// Merges duplicate product ids, keeping first-seen order.
fn merge_items(items: &[NewOrderLine]) -> Vec<NewOrderLine> {
  let mut merged: Vec<NewOrderLine> = Vec::with_capacity(items.len());
  for item in items {
    match merged.iter_mut().find(|m| m.product_id == item.product_id) {
      Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
      None => merged.push(*item),
    }
  }
  merged
}

fn validate_request(request: &NewOrder) -> Result<Vec<NewOrderLine>> {
  if request.items.is_empty() {
    return Err(Error::Validation("order must contain at least one item".to_string()));
  }
  if let Some(item) = request.items.iter().find(|i| i.quantity == 0) {
    return Err(Error::Validation(format!(
      "quantity for product {} must be at least 1",
      item.product_id
    )));
  }
  if request.payment_method.trim().is_empty() {
    return Err(Error::Validation("payment method is required".to_string()));
  }
  let address = &request.shipping_address;
  for (field, value) in [
    ("fullName", &address.full_name),
    ("address", &address.address),
    ("city", &address.city),
    ("postalCode", &address.postal_code),
    ("country", &address.country),
  ] {
    if value.trim().is_empty() {
      return Err(Error::Validation(format!("shipping address field '{field}' is required")));
    }
  }
  Ok(merge_items(&request.items))
}

fn build_checkout_flow(
  orders: SharedOrderStore,
  catalog: SharedCatalog,
  coupons: CouponGuard,
  pricing: PricingPolicy,
) -> Result<Flow<CheckoutData, Error>> {
  let mut flow = Flow::<CheckoutData, Error>::new("checkout", CHECKOUT_STEPS)?;

  flow.on_step("validate_request", |ctx: ContextData<CheckoutData>| async move {
    let merged = ctx.with(|d| validate_request(&d.request))?;
    ctx.write().merged_items = merged;
    Ok::<_, Error>(FlowControl::Continue)
  })?;

  flow.on_step("price_lines", move |ctx: ContextData<CheckoutData>| {
    let catalog = catalog.clone();
    async move {
      let items = ctx.with(|d| d.merged_items.clone());
      let ids: Vec<_> = items.iter().map(|i| i.product_id).collect();
      let products: HashMap<_, _> = catalog.products(&ids).await?.into_iter().map(|p| (p.id, p)).collect();

      let mut lines = Vec::with_capacity(items.len());
      for item in &items {
        let product = products
          .get(&item.product_id)
          .ok_or_else(|| Error::Validation(format!("product {} does not exist", item.product_id)))?;
        lines.push(OrderLine {
          product_id: product.id,
          name: product.name.clone(),
          quantity: item.quantity,
          unit_price: product.price,
        });
      }
      debug!(lines = lines.len(), "Order lines priced from catalog.");
      ctx.write().lines = lines;
      Ok::<_, Error>(FlowControl::Continue)
    }
  })?;

  let reserve_guard = coupons.clone();
  flow.on_step("reserve_coupon", move |ctx: ContextData<CheckoutData>| {
    let guard = reserve_guard.clone();
    async move {
      let (user_id, code) = ctx.with(|d| (d.user_id, d.request.coupon_code.clone()));
      let Some(code) = code.filter(|c| !c.trim().is_empty()) else {
        return Ok::<_, Error>(FlowControl::Continue);
      };
      let reserved = guard.reserve(user_id, &code).await?;
      ctx.write().reserved_coupon = Some(reserved);
      Ok(FlowControl::Continue)
    }
  })?;
  flow.compensate_step("reserve_coupon", move |ctx: ContextData<CheckoutData>| {
    let guard = coupons.clone();
    async move {
      let (user_id, reserved) = {
        let mut d = ctx.write();
        (d.user_id, d.reserved_coupon.take())
      };
      if let Some(reserved) = reserved {
        guard.release(user_id, reserved.coupon_id).await?;
      }
      Ok::<_, Error>(())
    }
  })?;

  flow.on_step("persist_order", move |ctx: ContextData<CheckoutData>| {
    let orders = orders.clone();
    let pricing = pricing.clone();
    async move {
      let order = ctx.with(|d| {
        let discount = d.reserved_coupon.as_ref().map_or(Decimal::ZERO, |c| c.discount);
        let now = Utc::now();
        Order {
          id: Uuid::new_v4(),
          user_id: d.user_id,
          lines: d.lines.clone(),
          shipping_address: d.request.shipping_address.clone(),
          payment_method: d.request.payment_method.trim().to_string(),
          prices: pricing.price(&d.lines, discount),
          coupon_id: d.reserved_coupon.as_ref().map(|c| c.coupon_id),
          payment_session: None,
          payment_result: None,
          is_paid: false,
          paid_at: None,
          is_shipped: false,
          shipped_at: None,
          is_delivered: false,
          delivered_at: None,
          created_at: now,
          updated_at: now,
        }
      });
      orders.insert(&order).await?;
      ctx.write().order = Some(order);
      Ok::<_, Error>(FlowControl::Continue)
    }
  })?;

  Ok(flow)
}

impl OrderLedger {
  pub fn new(orders: SharedOrderStore, catalog: SharedCatalog, coupons: CouponGuard, pricing: PricingPolicy) -> Result<Self> {
    let checkout = build_checkout_flow(orders.clone(), catalog, coupons.clone(), pricing)?;
    Ok(Self {
      orders,
      coupons,
      checkout: Arc::new(checkout),
    })
  }

  pub fn coupons(&self) -> &CouponGuard {
    &self.coupons
  }

  /// Creates an order priced from the catalog. Either the order is persisted
  /// together with its coupon reservation, or neither is.
  #[instrument(name = "OrderLedger::create_order", skip(self, request), fields(items = request.items.len()), err(Display))]
  pub async fn create_order(&self, user_id: UserId, request: NewOrder) -> Result<Order> {
    let ctx = ContextData::new(CheckoutData::new(user_id, request));
    match self.checkout.run(ctx.clone()).await? {
      FlowResult::Completed => {}
      FlowResult::Stopped => return Err(Error::Internal("checkout flow stopped before persisting".to_string())),
    }
    let order = ctx
      .write()
      .order
      .take()
      .ok_or_else(|| Error::Internal("checkout flow completed without an order".to_string()))?;
    info!(order_id = %order.id, total = %order.prices.total_price, "Order created.");
    Ok(order)
  }

  async fn load(&self, order_id: OrderId) -> Result<Order> {
    self
      .orders
      .get(order_id)
      .await?
      .ok_or_else(|| Error::NotFound(format!("order {order_id}")))
  }

  /// Fetches an order visible to `requester` (its owner or an admin).
  pub async fn get_order(&self, order_id: OrderId, requester: Requester) -> Result<Order> {
    let order = self.load(order_id).await?;
    if !requester.is_admin && !order.is_owned_by(requester.user_id) {
      return Err(Error::Authorization(format!("order {order_id} belongs to another user")));
    }
    Ok(order)
  }

  /// Fetches an order that must belong to `user_id`, admin or not.
  pub async fn load_owned(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
    let order = self.load(order_id).await?;
    if !order.is_owned_by(user_id) {
      return Err(Error::Authorization(format!("order {order_id} belongs to another user")));
    }
    Ok(order)
  }

  pub async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
    Ok(self.orders.list_for_user(user_id).await?)
  }

  pub async fn list_all_orders(&self) -> Result<Vec<Order>> {
    Ok(self.orders.list_all().await?)
  }

  /// Conditionally stores a payment session; see [`OrderStore::attach_session`](crate::store::OrderStore::attach_session).
  pub async fn attach_session(
    &self,
    order_id: OrderId,
    expected_provider_order_id: Option<&str>,
    session: &PaymentSession,
  ) -> Result<Option<Order>> {
    Ok(
      self
        .orders
        .attach_session(order_id, expected_provider_order_id, session)
        .await?,
    )
  }

  /// The single paid transition shared by every confirmation path. Repeated
  /// calls return the current order with `newly_paid == false`.
  #[instrument(name = "OrderLedger::mark_paid", skip(self, receipt), fields(channel = channel.as_str()), err(Display))]
  pub async fn mark_paid(&self, order_id: OrderId, receipt: PaymentReceipt, channel: VerificationChannel) -> Result<MarkPaid> {
    let confirmation = PaymentConfirmation::new(receipt, channel, Utc::now());
    let transition = self
      .orders
      .set_paid_if_unpaid(order_id, &confirmation)
      .await?
      .ok_or_else(|| Error::NotFound(format!("order {order_id}")))?;

    let result = MarkPaid::from(transition);
    if result.newly_paid {
      info!(target: "audit", order_id = %order_id, channel = channel.as_str(), "Order marked paid.");
    } else {
      debug!("Order already paid; confirmation ignored.");
    }
    Ok(result)
  }

  #[instrument(name = "OrderLedger::mark_shipped", skip(self), err(Display))]
  pub async fn mark_shipped(&self, order_id: OrderId) -> Result<Order> {
    let transition = self
      .orders
      .set_shipped(order_id, Utc::now())
      .await?
      .ok_or_else(|| Error::NotFound(format!("order {order_id}")))?;
    if let FlagTransition::Applied(order) = &transition {
      if !order.is_paid {
        warn!(target: "audit", order_id = %order_id, "Order marked shipped while unpaid.");
      }
    }
    Ok(transition.into_order())
  }

  #[instrument(name = "OrderLedger::mark_delivered", skip(self), err(Display))]
  pub async fn mark_delivered(&self, order_id: OrderId) -> Result<Order> {
    let transition = self
      .orders
      .set_delivered(order_id, Utc::now())
      .await?
      .ok_or_else(|| Error::NotFound(format!("order {order_id}")))?;
    if let FlagTransition::Applied(order) = &transition {
      if !order.is_paid {
        warn!(target: "audit", order_id = %order_id, "Order marked delivered while unpaid.");
      }
    }
    Ok(transition.into_order())
  }
}

impl From<PaidTransition> for MarkPaid {
  fn from(transition: PaidTransition) -> Self {
    let newly_paid = transition.was_applied();
    MarkPaid {
      order: transition.into_order(),
      newly_paid,
    }
  }
}

impl std::fmt::Debug for OrderLedger {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OrderLedger")
      .field("checkout", &self.checkout)
      .finish_non_exhaustive()
  }
}

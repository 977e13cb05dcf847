// server/src/db/orders.rs

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paysettle::domain::{OrderLine, PaymentConfirmation, PaymentSession, PriceBreakdown};
use paysettle::store::{FlagTransition, OrderStore, PaidTransition, StoreResult};
use paysettle::{Order, OrderId, ShippingAddress, UserId};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, user_id, lines, shipping_address, payment_method, items_price, tax_price, \
   shipping_price, coupon_discount, total_price, coupon_id, payment_session, payment_result, is_paid, paid_at, \
   is_shipped, shipped_at, is_delivered, delivered_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
  id: Uuid,
  user_id: Uuid,
  lines: Json<Vec<OrderLine>>,
  shipping_address: Json<ShippingAddress>,
  payment_method: String,
  items_price: Decimal,
  tax_price: Decimal,
  shipping_price: Decimal,
  coupon_discount: Decimal,
  total_price: Decimal,
  coupon_id: Option<Uuid>,
  payment_session: Option<Json<PaymentSession>>,
  payment_result: Option<Json<PaymentConfirmation>>,
  is_paid: bool,
  paid_at: Option<DateTime<Utc>>,
  is_shipped: bool,
  shipped_at: Option<DateTime<Utc>>,
  is_delivered: bool,
  delivered_at: Option<DateTime<Utc>>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
  fn from(row: OrderRow) -> Self {
    Order {
      id: row.id,
      user_id: row.user_id,
      lines: row.lines.0,
      shipping_address: row.shipping_address.0,
      payment_method: row.payment_method,
      prices: PriceBreakdown {
        items_price: row.items_price,
        tax_price: row.tax_price,
        shipping_price: row.shipping_price,
        coupon_discount: row.coupon_discount,
        total_price: row.total_price,
      },
      coupon_id: row.coupon_id,
      payment_session: row.payment_session.map(|s| s.0),
      payment_result: row.payment_result.map(|r| r.0),
      is_paid: row.is_paid,
      paid_at: row.paid_at,
      is_shipped: row.is_shipped,
      shipped_at: row.shipped_at,
      is_delivered: row.is_delivered,
      delivered_at: row.delivered_at,
      created_at: row.created_at,
      updated_at: row.updated_at,
    }
  }
}

/// `OrderStore` over the `orders` table. Each transition is one conditional
/// `UPDATE ... RETURNING`; a follow-up `SELECT` only tells "unchanged" apart
/// from "missing".
#[derive(Debug, Clone)]
pub struct PgOrderStore {
  pool: PgPool,
}

impl PgOrderStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  async fn fetch(&self, id: OrderId) -> StoreResult<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
    let row = sqlx::query_as::<_, OrderRow>(&sql)
      .bind(id)
      .fetch_optional(&self.pool)
      .await
      .with_context(|| format!("loading order {id}"))?;
    Ok(row.map(Order::from))
  }

  async fn set_flag(&self, id: OrderId, flag: &str, stamp: &str, at: DateTime<Utc>) -> StoreResult<Option<FlagTransition>> {
    let sql = format!(
      "UPDATE orders SET {flag} = TRUE, {stamp} = $2, updated_at = $2 WHERE id = $1 AND {flag} = FALSE \
       RETURNING {ORDER_COLUMNS}"
    );
    let updated = sqlx::query_as::<_, OrderRow>(&sql)
      .bind(id)
      .bind(at)
      .fetch_optional(&self.pool)
      .await
      .with_context(|| format!("setting {flag} on order {id}"))?;
    match updated {
      Some(row) => Ok(Some(FlagTransition::Applied(row.into()))),
      None => Ok(self.fetch(id).await?.map(FlagTransition::Unchanged)),
    }
  }
}

#[async_trait]
impl OrderStore for PgOrderStore {
  async fn insert(&self, order: &Order) -> StoreResult<()> {
    sqlx::query(
      "INSERT INTO orders (id, user_id, lines, shipping_address, payment_method, items_price, tax_price, \
       shipping_price, coupon_discount, total_price, coupon_id, payment_session, payment_result, is_paid, paid_at, \
       is_shipped, shipped_at, is_delivered, delivered_at, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)",
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(Json(&order.lines))
    .bind(Json(&order.shipping_address))
    .bind(&order.payment_method)
    .bind(order.prices.items_price)
    .bind(order.prices.tax_price)
    .bind(order.prices.shipping_price)
    .bind(order.prices.coupon_discount)
    .bind(order.prices.total_price)
    .bind(order.coupon_id)
    .bind(order.payment_session.as_ref().map(Json))
    .bind(order.payment_result.as_ref().map(Json))
    .bind(order.is_paid)
    .bind(order.paid_at)
    .bind(order.is_shipped)
    .bind(order.shipped_at)
    .bind(order.is_delivered)
    .bind(order.delivered_at)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&self.pool)
    .await
    .with_context(|| format!("inserting order {}", order.id))?;
    Ok(())
  }

  async fn get(&self, id: OrderId) -> StoreResult<Option<Order>> {
    self.fetch(id).await
  }

  async fn list_for_user(&self, user_id: UserId) -> StoreResult<Vec<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC");
    let rows = sqlx::query_as::<_, OrderRow>(&sql)
      .bind(user_id)
      .fetch_all(&self.pool)
      .await
      .with_context(|| format!("listing orders of user {user_id}"))?;
    Ok(rows.into_iter().map(Order::from).collect())
  }

  async fn list_all(&self) -> StoreResult<Vec<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC");
    let rows = sqlx::query_as::<_, OrderRow>(&sql)
      .fetch_all(&self.pool)
      .await
      .context("listing all orders")?;
    Ok(rows.into_iter().map(Order::from).collect())
  }

  async fn attach_session(
    &self,
    id: OrderId,
    expected_provider_order_id: Option<&str>,
    session: &PaymentSession,
  ) -> StoreResult<Option<Order>> {
    let sql = format!(
      "UPDATE orders SET payment_session = $2, updated_at = $3 \
       WHERE id = $1 AND is_paid = FALSE \
         AND (payment_session ->> 'providerOrderId') IS NOT DISTINCT FROM $4 \
       RETURNING {ORDER_COLUMNS}"
    );
    let row = sqlx::query_as::<_, OrderRow>(&sql)
      .bind(id)
      .bind(Json(session))
      .bind(session.created_at)
      .bind(expected_provider_order_id)
      .fetch_optional(&self.pool)
      .await
      .with_context(|| format!("attaching payment session to order {id}"))?;
    Ok(row.map(Order::from))
  }

  async fn set_paid_if_unpaid(&self, id: OrderId, confirmation: &PaymentConfirmation) -> StoreResult<Option<PaidTransition>> {
    let sql = format!(
      "UPDATE orders SET is_paid = TRUE, paid_at = $2, updated_at = $2, payment_result = $3, \
         payment_session = CASE WHEN payment_session IS NULL THEN NULL \
           ELSE payment_session || jsonb_build_object('providerStatus', $4::text, 'channel', $5::text) END \
       WHERE id = $1 AND is_paid = FALSE \
       RETURNING {ORDER_COLUMNS}"
    );
    let updated = sqlx::query_as::<_, OrderRow>(&sql)
      .bind(id)
      .bind(confirmation.confirmed_at)
      .bind(Json(confirmation))
      .bind(&confirmation.status)
      .bind(confirmation.channel.as_str())
      .fetch_optional(&self.pool)
      .await
      .with_context(|| format!("marking order {id} paid"))?;
    match updated {
      Some(row) => Ok(Some(PaidTransition::Applied(row.into()))),
      None => Ok(self.fetch(id).await?.map(PaidTransition::AlreadyPaid)),
    }
  }

  async fn set_shipped(&self, id: OrderId, at: DateTime<Utc>) -> StoreResult<Option<FlagTransition>> {
    self.set_flag(id, "is_shipped", "shipped_at", at).await
  }

  async fn set_delivered(&self, id: OrderId, at: DateTime<Utc>) -> StoreResult<Option<FlagTransition>> {
    self.set_flag(id, "is_delivered", "delivered_at", at).await
  }
}

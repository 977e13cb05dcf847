// server/src/db/coupons.rs

use anyhow::Context;
use async_trait::async_trait;
use paysettle::store::{CouponStore, StoreResult};
use paysettle::{Coupon, UserId};
use paysettle::domain::CouponId;
use sqlx::PgPool;

const COUPON_COLUMNS: &str = "id, code, discount, is_active, created_at";

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
  id: uuid::Uuid,
  code: String,
  discount: rust_decimal::Decimal,
  is_active: bool,
  created_at: chrono::DateTime<chrono::Utc>,
}

impl From<CouponRow> for Coupon {
  fn from(row: CouponRow) -> Self {
    Coupon {
      id: row.id,
      code: row.code,
      discount: row.discount,
      is_active: row.is_active,
      created_at: row.created_at,
    }
  }
}

/// Coupons plus the `(user_id, coupon_id)` consumption table. Reservation is
/// a single insert against that primary key.
#[derive(Debug, Clone)]
pub struct PgCouponStore {
  pool: PgPool,
}

impl PgCouponStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl CouponStore for PgCouponStore {
  async fn insert(&self, coupon: &Coupon) -> StoreResult<bool> {
    let result = sqlx::query(
      "INSERT INTO coupons (id, code, discount, is_active, created_at) VALUES ($1, $2, $3, $4, $5) \
       ON CONFLICT (code) DO NOTHING",
    )
    .bind(coupon.id)
    .bind(&coupon.code)
    .bind(coupon.discount)
    .bind(coupon.is_active)
    .bind(coupon.created_at)
    .execute(&self.pool)
    .await
    .with_context(|| format!("inserting coupon {}", coupon.code))?;
    Ok(result.rows_affected() == 1)
  }

  async fn find_by_code(&self, code: &str) -> StoreResult<Option<Coupon>> {
    let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1");
    let row = sqlx::query_as::<_, CouponRow>(&sql)
      .bind(code)
      .fetch_optional(&self.pool)
      .await
      .with_context(|| format!("looking up coupon {code}"))?;
    Ok(row.map(Coupon::from))
  }

  async fn list(&self) -> StoreResult<Vec<Coupon>> {
    let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC");
    let rows = sqlx::query_as::<_, CouponRow>(&sql)
      .fetch_all(&self.pool)
      .await
      .context("listing coupons")?;
    Ok(rows.into_iter().map(Coupon::from).collect())
  }

  async fn set_active(&self, id: CouponId, active: bool) -> StoreResult<Option<Coupon>> {
    let sql = format!("UPDATE coupons SET is_active = $2 WHERE id = $1 RETURNING {COUPON_COLUMNS}");
    let row = sqlx::query_as::<_, CouponRow>(&sql)
      .bind(id)
      .bind(active)
      .fetch_optional(&self.pool)
      .await
      .with_context(|| format!("updating coupon {id}"))?;
    Ok(row.map(Coupon::from))
  }

  async fn has_consumed(&self, user_id: UserId, coupon_id: CouponId) -> StoreResult<bool> {
    let found: Option<i32> =
      sqlx::query_scalar("SELECT 1 FROM coupon_consumptions WHERE user_id = $1 AND coupon_id = $2")
        .bind(user_id)
        .bind(coupon_id)
        .fetch_optional(&self.pool)
        .await
        .context("checking coupon consumption")?;
    Ok(found.is_some())
  }

  async fn consume(&self, user_id: UserId, coupon_id: CouponId) -> StoreResult<bool> {
    let result = sqlx::query(
      "INSERT INTO coupon_consumptions (user_id, coupon_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(coupon_id)
    .execute(&self.pool)
    .await
    .context("recording coupon consumption")?;
    Ok(result.rows_affected() == 1)
  }

  async fn release(&self, user_id: UserId, coupon_id: CouponId) -> StoreResult<()> {
    sqlx::query("DELETE FROM coupon_consumptions WHERE user_id = $1 AND coupon_id = $2")
      .bind(user_id)
      .bind(coupon_id)
      .execute(&self.pool)
      .await
      .context("releasing coupon consumption")?;
    Ok(())
  }
}

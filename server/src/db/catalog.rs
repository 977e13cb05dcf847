// server/src/db/catalog.rs
use anyhow::Context;
use async_trait::async_trait;
use paysettle::store::{Catalog, StoreResult};
use paysettle::{Product, ProductId};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct PgCatalog {
  pool: PgPool,
}

impl PgCatalog {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn upsert(&self, product: &Product) -> StoreResult<()> {
    sqlx::query(
      "INSERT INTO products (id, name, price) VALUES ($1, $2, $3) \
       ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, price = EXCLUDED.price",
    )
    .bind(product.id)
    .bind(&product.name)
    .bind(product.price)
    .execute(&self.pool)
    .await
    .with_context(|| format!("upserting product {}", product.id))?;
    Ok(())
  }
}

#[async_trait]
impl Catalog for PgCatalog {
  async fn products(&self, ids: &[ProductId]) -> StoreResult<Vec<Product>> {
    let rows: Vec<(uuid::Uuid, String, rust_decimal::Decimal)> =
      sqlx::query_as("SELECT id, name, price FROM products WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .context("loading catalog prices")?;
    Ok(rows.into_iter().map(|(id, name, price)| Product { id, name, price }).collect())
  }
}

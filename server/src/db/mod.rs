// server/src/db/mod.rs

//! Storage wiring: PostgreSQL adapters for the core's ports, or the core's
//! in-memory adapters when `STORAGE_BACKEND=memory`.

pub mod catalog;
pub mod coupons;
pub mod orders;

pub use catalog::PgCatalog;
pub use coupons::PgCouponStore;
pub use orders::PgOrderStore;

use crate::config::{AppConfig, StorageBackend};
use crate::errors::{AppError, Result};
use paysettle::store::memory::{MemoryCatalog, MemoryCouponStore, MemoryOrderStore};
use paysettle::store::{SharedCatalog, SharedCouponStore, SharedOrderStore};
use paysettle::Product;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct Stores {
  pub orders: SharedOrderStore,
  pub coupons: SharedCouponStore,
  pub catalog: SharedCatalog,
}

impl Stores {
  pub fn in_memory(products: Vec<Product>) -> Self {
    Self {
      orders: Arc::new(MemoryOrderStore::new()),
      coupons: Arc::new(MemoryCouponStore::new()),
      catalog: Arc::new(MemoryCatalog::with_products(products)),
    }
  }

  pub fn postgres(pool: PgPool) -> Self {
    Self {
      orders: Arc::new(PgOrderStore::new(pool.clone())),
      coupons: Arc::new(PgCouponStore::new(pool.clone())),
      catalog: Arc::new(PgCatalog::new(pool)),
    }
  }
}

async fn load_seed_products(path: Option<&str>) -> Result<Vec<Product>> {
  let Some(path) = path else {
    return Ok(Vec::new());
  };
  let raw = tokio::fs::read_to_string(path)
    .await
    .map_err(|e| AppError::Config(format!("Cannot read CATALOG_SEED_PATH '{}': {}", path, e)))?;
  let products: Vec<Product> =
    serde_json::from_str(&raw).map_err(|e| AppError::Config(format!("Invalid catalog seed '{}': {}", path, e)))?;
  tracing::info!(count = products.len(), path, "Loaded catalog seed.");
  Ok(products)
}

/// Builds the configured backend, running migrations and the catalog seed when asked to.
pub async fn connect(config: &AppConfig) -> Result<Stores> {
  let seed = load_seed_products(config.catalog_seed_path.as_deref()).await?;

  match config.storage_backend {
    StorageBackend::Memory => {
      tracing::warn!("Using in-memory storage; all state is lost on restart.");
      Ok(Stores::in_memory(seed))
    }
    StorageBackend::Postgres => {
      let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| AppError::Config("DATABASE_URL is required for the postgres backend".to_string()))?;
      let pool = PgPool::connect(url).await?;
      tracing::info!("Successfully connected to the database.");

      if config.run_migrations {
        sqlx::migrate!("./migrations")
          .run(&pool)
          .await
          .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))?;
        tracing::info!("Database migrations applied.");
      }

      let catalog = PgCatalog::new(pool.clone());
      for product in &seed {
        catalog.upsert(product).await?;
      }
      Ok(Stores::postgres(pool))
    }
  }
}

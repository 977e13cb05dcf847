// server/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use paysettle::providers::cashfree::{CashfreeConfig, DEFAULT_API_VERSION};
use paysettle::providers::razorpay::RazorpayConfig;
use paysettle::{EngineSettings, PricingPolicy};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
  Postgres,
  Memory,
}

impl StorageBackend {
  pub fn as_str(self) -> &'static str {
    match self {
      StorageBackend::Postgres => "postgres",
      StorageBackend::Memory => "memory",
    }
  }
}

impl FromStr for StorageBackend {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "postgres" => Ok(StorageBackend::Postgres),
      "memory" => Ok(StorageBackend::Memory),
      other => Err(AppError::Config(format!("Invalid STORAGE_BACKEND: '{}'", other))),
    }
  }
}

#[derive(Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub storage_backend: StorageBackend,
  pub database_url: Option<String>,
  pub run_migrations: bool,
  pub public_base_url: String,
  pub catalog_seed_path: Option<String>,

  pub pricing: PricingPolicy,
  pub engine: EngineSettings,

  pub cashfree: Option<CashfreeConfig>,
  pub razorpay: Option<RazorpayConfig>,
}

impl std::fmt::Debug for AppConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AppConfig")
      .field("server_host", &self.server_host)
      .field("server_port", &self.server_port)
      .field("storage_backend", &self.storage_backend)
      .field("run_migrations", &self.run_migrations)
      .field("public_base_url", &self.public_base_url)
      .field("pricing", &self.pricing)
      .field("engine", &self.engine)
      .field("cashfree", &self.cashfree.is_some())
      .field("razorpay", &self.razorpay.is_some())
      .finish_non_exhaustive()
  }
}

fn parse_decimal(var_name: &str, raw: &str) -> Result<Decimal> {
  Decimal::from_str(raw.trim()).map_err(|e| AppError::Config(format!("Invalid {}: {}", var_name, e)))
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };
    let opt_env = |var_name: &str| env::var(var_name).ok().filter(|v| !v.trim().is_empty());

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = get_env("SERVER_PORT")
      .unwrap_or_else(|_| "8080".to_string())
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;

    let storage_backend = get_env("STORAGE_BACKEND")
      .unwrap_or_else(|_| "postgres".to_string())
      .parse::<StorageBackend>()?;
    let database_url = match storage_backend {
      StorageBackend::Postgres => Some(get_env("DATABASE_URL")?),
      StorageBackend::Memory => opt_env("DATABASE_URL"),
    };
    let run_migrations = get_env("RUN_MIGRATIONS")
      .unwrap_or_else(|_| "false".to_string())
      .parse::<bool>()
      .map_err(|e| AppError::Config(format!("Invalid RUN_MIGRATIONS value: {}", e)))?;
    let public_base_url =
      get_env("PUBLIC_BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", server_host, server_port));
    let catalog_seed_path = opt_env("CATALOG_SEED_PATH");

    let tax_rate_percent = parse_decimal("TAX_RATE_PERCENT", &get_env("TAX_RATE_PERCENT").unwrap_or_else(|_| "18".into()))?;
    let free_shipping_threshold = parse_decimal(
      "FREE_SHIPPING_THRESHOLD",
      &get_env("FREE_SHIPPING_THRESHOLD").unwrap_or_else(|_| "100".into()),
    )?;
    let flat_shipping_fee =
      parse_decimal("FLAT_SHIPPING_FEE", &get_env("FLAT_SHIPPING_FEE").unwrap_or_else(|_| "10".into()))?;
    if tax_rate_percent.is_sign_negative() || free_shipping_threshold.is_sign_negative() || flat_shipping_fee.is_sign_negative() {
      return Err(AppError::Config("Pricing values must not be negative".to_string()));
    }
    let pricing = PricingPolicy {
      tax_rate: tax_rate_percent / Decimal::ONE_HUNDRED,
      free_shipping_threshold,
      flat_shipping_fee,
    };

    let provider_timeout = Duration::from_millis(
      get_env("PROVIDER_TIMEOUT_MS")
        .unwrap_or_else(|_| "10000".to_string())
        .parse::<u64>()
        .map_err(|e| AppError::Config(format!("Invalid PROVIDER_TIMEOUT_MS: {}", e)))?,
    );
    let engine = EngineSettings {
      currency: get_env("PAYMENT_CURRENCY").unwrap_or_else(|_| "INR".to_string()),
      provider_timeout,
      return_url_base: Some(public_base_url.clone()),
      ..EngineSettings::default()
    };

    let cashfree = match (opt_env("CASHFREE_APP_ID"), opt_env("CASHFREE_SECRET_KEY")) {
      (Some(app_id), Some(secret_key)) => Some(CashfreeConfig {
        base_url: get_env("CASHFREE_BASE_URL").unwrap_or_else(|_| "https://sandbox.cashfree.com".to_string()),
        app_id,
        secret_key,
        api_version: get_env("CASHFREE_API_VERSION").unwrap_or_else(|_| DEFAULT_API_VERSION.to_string()),
        notify_url: opt_env("CASHFREE_NOTIFY_URL"),
        timeout: provider_timeout,
      }),
      (None, None) => None,
      _ => {
        return Err(AppError::Config(
          "CASHFREE_APP_ID and CASHFREE_SECRET_KEY must be set together".to_string(),
        ))
      }
    };

    let razorpay = match (opt_env("RAZORPAY_KEY_ID"), opt_env("RAZORPAY_KEY_SECRET")) {
      (Some(key_id), Some(key_secret)) => Some(RazorpayConfig {
        base_url: get_env("RAZORPAY_BASE_URL").unwrap_or_else(|_| "https://api.razorpay.com".to_string()),
        key_id,
        key_secret,
        timeout: provider_timeout,
      }),
      (None, None) => None,
      _ => {
        return Err(AppError::Config(
          "RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET must be set together".to_string(),
        ))
      }
    };

    tracing::info!("Application configuration loaded successfully.");

    Ok(Self {
      server_host,
      server_port,
      storage_backend,
      database_url,
      run_migrations,
      public_base_url,
      catalog_seed_path,
      pricing,
      engine,
      cashfree,
      razorpay,
    })
  }
}

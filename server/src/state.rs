// server/src/state.rs
use crate::config::AppConfig;
use crate::db::Stores;
use crate::errors::Result;
use paysettle::providers::cashfree::CashfreeProvider;
use paysettle::providers::razorpay::RazorpayProvider;
use paysettle::{CouponGuard, OrderLedger, PaymentProvider, ReconciliationEngine};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub ledger: Arc<OrderLedger>,
  pub engine: Arc<ReconciliationEngine>,
  pub config: Arc<AppConfig>, // Share loaded config
}

impl AppState {
  /// Wires the ledger, the coupon guard and the engine over `stores`,
  /// registering each provider whose credentials are configured.
  pub fn build(config: Arc<AppConfig>, stores: Stores) -> Result<Self> {
    let guard = CouponGuard::new(stores.coupons);
    let ledger = Arc::new(OrderLedger::new(stores.orders, stores.catalog, guard, config.pricing.clone())?);

    let mut providers: Vec<Arc<dyn PaymentProvider>> = Vec::new();
    if let Some(cashfree) = &config.cashfree {
      providers.push(Arc::new(CashfreeProvider::new(cashfree.clone()).map_err(paysettle::Error::from)?));
      tracing::info!("Cashfree provider registered.");
    }
    if let Some(razorpay) = &config.razorpay {
      providers.push(Arc::new(RazorpayProvider::new(razorpay.clone()).map_err(paysettle::Error::from)?));
      tracing::info!("Razorpay provider registered.");
    }
    if providers.is_empty() {
      tracing::warn!("No payment provider configured; payment routes will reject every request.");
    }

    let engine = Arc::new(ReconciliationEngine::new(ledger.clone(), providers, config.engine.clone())?);
    Ok(Self { ledger, engine, config })
  }
}

// tests/common/mod.rs
#![allow(dead_code)] // Each test binary uses a different subset.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use paysettle::domain::{PaymentConfirmation, PaymentSession};
use paysettle::providers::{
  cashfree, razorpay, signature, CallbackClaim, PaymentProvider, PaymentStatus, ProviderError, ProviderSession,
  SessionRequest, WebhookDelivery, WebhookEvent,
};
use paysettle::store::memory::{MemoryCatalog, MemoryCouponStore, MemoryOrderStore};
use paysettle::store::{FlagTransition, OrderStore, PaidTransition, StoreResult};
use paysettle::{
  CouponGuard, EngineSettings, NewOrder, NewOrderLine, Order, OrderId, OrderLedger, PricingPolicy, Product, ProviderKind,
  ReconciliationEngine, ShippingAddress, UserId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use uuid::Uuid;

pub const CASHFREE_SECRET: &str = "cf_test_secret";
pub const RAZORPAY_SECRET: &str = "rzp_test_secret";
pub const RAZORPAY_KEY_ID: &str = "rzp_test_key";

// --- Helper for Tracing Setup ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Fake providers ---

/// Session + webhook provider double. Real webhook signature checking, scripted
/// status and optional slow session creation.
pub struct FakeCashfree {
  pub create_calls: AtomicUsize,
  pub status_calls: AtomicUsize,
  slow_creates_left: AtomicUsize,
  slow_by: Duration,
  status: Mutex<PaymentStatus>,
}

impl FakeCashfree {
  pub fn new() -> Self {
    Self {
      create_calls: AtomicUsize::new(0),
      status_calls: AtomicUsize::new(0),
      slow_creates_left: AtomicUsize::new(0),
      slow_by: Duration::from_millis(500),
      status: Mutex::new(PaymentStatus::Pending {
        status: "ACTIVE".to_string(),
      }),
    }
  }

  /// The next `n` session creations take longer than the engine timeout.
  pub fn stall_next_creates(&self, n: usize) {
    self.slow_creates_left.store(n, Ordering::SeqCst);
  }

  pub fn set_status(&self, status: PaymentStatus) {
    *self.status.lock() = status;
  }

  pub fn creates(&self) -> usize {
    self.create_calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl PaymentProvider for FakeCashfree {
  fn kind(&self) -> ProviderKind {
    ProviderKind::Cashfree
  }

  async fn create_session(&self, request: &SessionRequest) -> Result<ProviderSession, ProviderError> {
    let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let stall = self
      .slow_creates_left
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
      .is_ok();
    if stall {
      tokio::time::sleep(self.slow_by).await;
    }
    Ok(ProviderSession {
      provider_order_id: request.order_id.to_string(),
      session_token: format!("session_{n}"),
      status: "ACTIVE".to_string(),
    })
  }

  async fn check_status(&self, _order_id: OrderId, _session: &PaymentSession) -> Result<PaymentStatus, ProviderError> {
    self.status_calls.fetch_add(1, Ordering::SeqCst);
    Ok(self.status.lock().clone())
  }

  fn verify_webhook(&self, delivery: &WebhookDelivery) -> Result<WebhookEvent, ProviderError> {
    cashfree::verify_webhook_payload(CASHFREE_SECRET, delivery)
  }
}

/// Signed-callback provider double with the real signature check.
pub struct FakeRazorpay {
  pub create_calls: AtomicUsize,
}

impl FakeRazorpay {
  pub fn new() -> Self {
    Self {
      create_calls: AtomicUsize::new(0),
    }
  }
}

#[async_trait]
impl PaymentProvider for FakeRazorpay {
  fn kind(&self) -> ProviderKind {
    ProviderKind::Razorpay
  }

  fn public_key(&self) -> Option<&str> {
    Some(RAZORPAY_KEY_ID)
  }

  async fn create_session(&self, _request: &SessionRequest) -> Result<ProviderSession, ProviderError> {
    let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let id = format!("order_rzp_{n}");
    Ok(ProviderSession {
      provider_order_id: id.clone(),
      session_token: id,
      status: "created".to_string(),
    })
  }

  fn verify_callback(&self, claim: &CallbackClaim) -> Result<(), ProviderError> {
    razorpay::verify_payment_signature(RAZORPAY_SECRET, claim)
  }
}

/// Order store whose inserts always fail; everything else delegates.
pub struct FailingOrderStore {
  inner: MemoryOrderStore,
}

impl FailingOrderStore {
  pub fn new() -> Self {
    Self {
      inner: MemoryOrderStore::new(),
    }
  }
}

#[async_trait]
impl OrderStore for FailingOrderStore {
  async fn insert(&self, _order: &Order) -> StoreResult<()> {
    anyhow::bail!("disk full")
  }

  async fn get(&self, id: OrderId) -> StoreResult<Option<Order>> {
    self.inner.get(id).await
  }

  async fn list_for_user(&self, user_id: UserId) -> StoreResult<Vec<Order>> {
    self.inner.list_for_user(user_id).await
  }

  async fn list_all(&self) -> StoreResult<Vec<Order>> {
    self.inner.list_all().await
  }

  async fn attach_session(
    &self,
    id: OrderId,
    expected_provider_order_id: Option<&str>,
    session: &PaymentSession,
  ) -> StoreResult<Option<Order>> {
    self.inner.attach_session(id, expected_provider_order_id, session).await
  }

  async fn set_paid_if_unpaid(&self, id: OrderId, confirmation: &PaymentConfirmation) -> StoreResult<Option<PaidTransition>> {
    self.inner.set_paid_if_unpaid(id, confirmation).await
  }

  async fn set_shipped(&self, id: OrderId, at: DateTime<Utc>) -> StoreResult<Option<FlagTransition>> {
    self.inner.set_shipped(id, at).await
  }

  async fn set_delivered(&self, id: OrderId, at: DateTime<Utc>) -> StoreResult<Option<FlagTransition>> {
    self.inner.set_delivered(id, at).await
  }
}

// --- Harness ---

pub struct Products {
  pub forty: Product,
  pub thirty: Product,
  pub cheap: Product,
}

pub struct Harness {
  pub catalog: Arc<MemoryCatalog>,
  pub coupon_store: Arc<MemoryCouponStore>,
  pub guard: CouponGuard,
  pub ledger: Arc<OrderLedger>,
  pub engine: ReconciliationEngine,
  pub cashfree: Arc<FakeCashfree>,
  pub razorpay: Arc<FakeRazorpay>,
  pub products: Products,
}

fn product(name: &str, price: Decimal) -> Product {
  Product {
    id: Uuid::new_v4(),
    name: name.to_string(),
    price,
  }
}

pub fn engine_settings() -> EngineSettings {
  EngineSettings {
    currency: "INR".to_string(),
    provider_timeout: Duration::from_millis(100),
    amount_tolerance: dec!(0.01),
    return_url_base: Some("https://shop.test".to_string()),
  }
}

impl Harness {
  pub fn new() -> Self {
    Self::with_order_store(Arc::new(MemoryOrderStore::new()))
  }

  pub fn with_order_store(orders: Arc<dyn OrderStore>) -> Self {
    setup_tracing();
    let products = Products {
      forty: product("Teapot", dec!(40)),
      thirty: product("Cup", dec!(30)),
      cheap: product("Spoon", dec!(19.99)),
    };
    let catalog = Arc::new(MemoryCatalog::with_products([
      products.forty.clone(),
      products.thirty.clone(),
      products.cheap.clone(),
    ]));
    let coupon_store = Arc::new(MemoryCouponStore::new());
    let guard = CouponGuard::new(coupon_store.clone());
    let ledger = Arc::new(
      OrderLedger::new(orders, catalog.clone(), guard.clone(), PricingPolicy::default()).expect("ledger builds"),
    );
    let cashfree = Arc::new(FakeCashfree::new());
    let razorpay = Arc::new(FakeRazorpay::new());
    let providers: Vec<Arc<dyn PaymentProvider>> = vec![cashfree.clone(), razorpay.clone()];
    let engine = ReconciliationEngine::new(ledger.clone(), providers, engine_settings()).expect("engine builds");

    Self {
      catalog,
      coupon_store,
      guard,
      ledger,
      engine,
      cashfree,
      razorpay,
      products,
    }
  }

  /// 40 + 2 x 30 = 100 in items.
  pub fn hundred_request(&self, coupon: Option<&str>) -> NewOrder {
    new_order(
      vec![
        NewOrderLine {
          product_id: self.products.forty.id,
          quantity: 1,
        },
        NewOrderLine {
          product_id: self.products.thirty.id,
          quantity: 2,
        },
      ],
      coupon,
    )
  }

  pub async fn hundred_order(&self, user: UserId) -> Order {
    self.ledger.create_order(user, self.hundred_request(None)).await.expect("order created")
  }
}

pub fn address() -> ShippingAddress {
  ShippingAddress {
    full_name: "Asha Rao".to_string(),
    address: "12 MG Road".to_string(),
    city: "Bengaluru".to_string(),
    postal_code: "560001".to_string(),
    country: "IN".to_string(),
    phone: Some("9999999999".to_string()),
  }
}

pub fn new_order(items: Vec<NewOrderLine>, coupon: Option<&str>) -> NewOrder {
  NewOrder {
    items,
    shipping_address: address(),
    payment_method: "cashfree".to_string(),
    coupon_code: coupon.map(str::to_string),
  }
}

pub fn signed_webhook(order_id: OrderId, status: &str) -> WebhookDelivery {
  let body = format!(r#"{{"order_id":"{order_id}","order_status":"{status}","cf_payment_id":7001}}"#);
  let timestamp = "1718000000";
  let sig = signature::sign_base64(CASHFREE_SECRET, &[timestamp.as_bytes(), body.as_bytes()]).expect("sign");
  WebhookDelivery {
    body: body.into_bytes(),
    signature: Some(sig),
    timestamp: Some(timestamp.to_string()),
  }
}

pub fn signed_claim(secret: &str, provider_order_id: &str, payment_id: &str) -> CallbackClaim {
  let sig = signature::sign_hex(secret, &[provider_order_id.as_bytes(), b"|", payment_id.as_bytes()]).expect("sign");
  CallbackClaim {
    provider_order_id: provider_order_id.to_string(),
    payment_id: payment_id.to_string(),
    signature: sig,
  }
}

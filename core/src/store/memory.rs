// core/src/store/memory.rs

//! In-process adapters. Each conditional write happens under a single write
//! lock acquisition, which makes it atomic against every other caller.

use crate::domain::{Coupon, CouponId, Order, OrderId, PaymentConfirmation, PaymentSession, Product, ProductId, UserId};
use crate::store::{Catalog, CouponStore, FlagTransition, OrderStore, PaidTransition, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct MemoryCatalog {
  products: RwLock<HashMap<ProductId, Product>>,
}

impl MemoryCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
    let catalog = Self::new();
    for product in products {
      catalog.upsert(product);
    }
    catalog
  }

  pub fn upsert(&self, product: Product) {
    self.products.write().insert(product.id, product);
  }
}

#[async_trait]
impl Catalog for MemoryCatalog {
  async fn products(&self, ids: &[ProductId]) -> StoreResult<Vec<Product>> {
    let guard = self.products.read();
    Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
  }
}

#[derive(Debug, Default)]
pub struct MemoryOrderStore {
  orders: RwLock<HashMap<OrderId, Order>>,
}

impl MemoryOrderStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn sorted_newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    orders
  }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
  async fn insert(&self, order: &Order) -> StoreResult<()> {
    let mut guard = self.orders.write();
    if guard.contains_key(&order.id) {
      anyhow::bail!("order {} already exists", order.id);
    }
    guard.insert(order.id, order.clone());
    Ok(())
  }

  async fn get(&self, id: OrderId) -> StoreResult<Option<Order>> {
    Ok(self.orders.read().get(&id).cloned())
  }

  async fn list_for_user(&self, user_id: UserId) -> StoreResult<Vec<Order>> {
    let owned = self
      .orders
      .read()
      .values()
      .filter(|o| o.user_id == user_id)
      .cloned()
      .collect();
    Ok(Self::sorted_newest_first(owned))
  }

  async fn list_all(&self) -> StoreResult<Vec<Order>> {
    let all = self.orders.read().values().cloned().collect();
    Ok(Self::sorted_newest_first(all))
  }

  async fn attach_session(
    &self,
    id: OrderId,
    expected_provider_order_id: Option<&str>,
    session: &PaymentSession,
  ) -> StoreResult<Option<Order>> {
    let mut guard = self.orders.write();
    let Some(order) = guard.get_mut(&id) else {
      return Ok(None);
    };
    if order.apply_session(expected_provider_order_id, session.clone()) {
      Ok(Some(order.clone()))
    } else {
      Ok(None)
    }
  }

  async fn set_paid_if_unpaid(&self, id: OrderId, confirmation: &PaymentConfirmation) -> StoreResult<Option<PaidTransition>> {
    let mut guard = self.orders.write();
    let Some(order) = guard.get_mut(&id) else {
      return Ok(None);
    };
    if order.apply_paid(confirmation.clone()) {
      Ok(Some(PaidTransition::Applied(order.clone())))
    } else {
      Ok(Some(PaidTransition::AlreadyPaid(order.clone())))
    }
  }

  async fn set_shipped(&self, id: OrderId, at: DateTime<Utc>) -> StoreResult<Option<FlagTransition>> {
    let mut guard = self.orders.write();
    Ok(guard.get_mut(&id).map(|order| {
      if order.apply_shipped(at) {
        FlagTransition::Applied(order.clone())
      } else {
        FlagTransition::Unchanged(order.clone())
      }
    }))
  }

  async fn set_delivered(&self, id: OrderId, at: DateTime<Utc>) -> StoreResult<Option<FlagTransition>> {
    let mut guard = self.orders.write();
    Ok(guard.get_mut(&id).map(|order| {
      if order.apply_delivered(at) {
        FlagTransition::Applied(order.clone())
      } else {
        FlagTransition::Unchanged(order.clone())
      }
    }))
  }
}

#[derive(Debug, Default)]
struct CouponTables {
  by_id: HashMap<CouponId, Coupon>,
  consumed: HashSet<(UserId, CouponId)>,
}

#[derive(Debug, Default)]
pub struct MemoryCouponStore {
  tables: RwLock<CouponTables>,
}

impl MemoryCouponStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl CouponStore for MemoryCouponStore {
  async fn insert(&self, coupon: &Coupon) -> StoreResult<bool> {
    let mut tables = self.tables.write();
    if tables.by_id.values().any(|c| c.code == coupon.code) || tables.by_id.contains_key(&coupon.id) {
      return Ok(false);
    }
    tables.by_id.insert(coupon.id, coupon.clone());
    Ok(true)
  }

  async fn find_by_code(&self, code: &str) -> StoreResult<Option<Coupon>> {
    Ok(self.tables.read().by_id.values().find(|c| c.code == code).cloned())
  }

  async fn list(&self) -> StoreResult<Vec<Coupon>> {
    let mut coupons: Vec<Coupon> = self.tables.read().by_id.values().cloned().collect();
    coupons.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(coupons)
  }

  async fn set_active(&self, id: CouponId, active: bool) -> StoreResult<Option<Coupon>> {
    let mut tables = self.tables.write();
    Ok(tables.by_id.get_mut(&id).map(|coupon| {
      coupon.is_active = active;
      coupon.clone()
    }))
  }

  async fn has_consumed(&self, user_id: UserId, coupon_id: CouponId) -> StoreResult<bool> {
    Ok(self.tables.read().consumed.contains(&(user_id, coupon_id)))
  }

  async fn consume(&self, user_id: UserId, coupon_id: CouponId) -> StoreResult<bool> {
    Ok(self.tables.write().consumed.insert((user_id, coupon_id)))
  }

  async fn release(&self, user_id: UserId, coupon_id: CouponId) -> StoreResult<()> {
    self.tables.write().consumed.remove(&(user_id, coupon_id));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;
  use uuid::Uuid;

  fn coupon(code: &str) -> Coupon {
    Coupon {
      id: Uuid::new_v4(),
      code: code.to_string(),
      discount: dec!(10),
      is_active: true,
      created_at: Utc::now(),
    }
  }

  #[tokio::test]
  async fn coupon_codes_are_unique() {
    let store = MemoryCouponStore::new();
    assert!(store.insert(&coupon("SAVE10")).await.unwrap());
    assert!(!store.insert(&coupon("SAVE10")).await.unwrap());
    assert_eq!(store.list().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn consume_is_at_most_once_until_released() {
    let store = MemoryCouponStore::new();
    let user = Uuid::new_v4();
    let c = coupon("ONCE");
    store.insert(&c).await.unwrap();

    assert!(store.consume(user, c.id).await.unwrap());
    assert!(!store.consume(user, c.id).await.unwrap());
    assert!(store.has_consumed(user, c.id).await.unwrap());

    store.release(user, c.id).await.unwrap();
    assert!(!store.has_consumed(user, c.id).await.unwrap());
    assert!(store.consume(user, c.id).await.unwrap());
  }

  #[tokio::test]
  async fn catalog_omits_unknown_ids() {
    let known = Product {
      id: Uuid::new_v4(),
      name: "Mug".into(),
      price: dec!(12.50),
    };
    let catalog = MemoryCatalog::with_products([known.clone()]);
    let found = catalog.products(&[known.id, Uuid::new_v4()]).await.unwrap();
    assert_eq!(found, vec![known]);
  }

  #[tokio::test]
  async fn flag_updates_on_missing_order_return_none() {
    let store = MemoryOrderStore::new();
    assert!(store.set_shipped(Uuid::new_v4(), Utc::now()).await.unwrap().is_none());
    assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
  }
}

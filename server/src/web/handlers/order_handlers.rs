// server/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use paysettle::{NewOrder, PaymentReceipt, VerificationChannel};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::{AdminUser, AuthenticatedUser};

#[instrument(
    name = "handler::create_order",
    skip(app_state, payload, auth_user),
    fields(user_id = %auth_user.user_id, items = payload.items.len())
)]
pub async fn create_order_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<NewOrder>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order = app_state.ledger.create_order(auth_user.user_id, payload.into_inner()).await?;
  info!(order_id = %order.id, total = %order.prices.total_price, "Order created.");
  Ok(HttpResponse::Created().json(order))
}

#[instrument(name = "handler::list_all_orders", skip(app_state, _admin))]
pub async fn list_all_orders_handler(
  app_state: web::Data<AppState>,
  _admin: AdminUser,
) -> Result<HttpResponse, AppError> {
  let orders = app_state.ledger.list_all_orders().await?;
  Ok(HttpResponse::Ok().json(orders))
}

#[instrument(name = "handler::list_my_orders", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn list_my_orders_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let orders = app_state.ledger.list_orders_for_user(auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(orders))
}

#[instrument(name = "handler::get_order", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .ledger
    .get_order(order_id.into_inner(), auth_user.requester())
    .await?;
  Ok(HttpResponse::Ok().json(order))
}

/// Manual confirmation by an admin. Goes through the same compare-and-set as
/// the provider paths, so a second confirmation reports the first one.
#[instrument(name = "handler::mark_paid", skip(app_state, admin, receipt), fields(admin_id = %admin.0.user_id))]
pub async fn mark_paid_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  receipt: web::Json<PaymentReceipt>,
  admin: AdminUser,
) -> Result<HttpResponse, AppError> {
  let result = app_state
    .ledger
    .mark_paid(order_id.into_inner(), receipt.into_inner(), VerificationChannel::Manual)
    .await?;
  Ok(HttpResponse::Ok().json(json!({
    "order": result.order,
    "newlyPaid": result.newly_paid,
  })))
}

#[instrument(name = "handler::mark_shipped", skip(app_state, _admin))]
pub async fn mark_shipped_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  _admin: AdminUser,
) -> Result<HttpResponse, AppError> {
  let order = app_state.ledger.mark_shipped(order_id.into_inner()).await?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::mark_delivered", skip(app_state, _admin))]
pub async fn mark_delivered_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  _admin: AdminUser,
) -> Result<HttpResponse, AppError> {
  let order = app_state.ledger.mark_delivered(order_id.into_inner()).await?;
  Ok(HttpResponse::Ok().json(order))
}

// server/src/web/handlers/coupon_handlers.rs

use actix_web::{web, HttpResponse};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::{AdminUser, USER_ID_HEADER};

#[derive(Deserialize, Debug)]
pub struct CreateCouponPayload {
  pub code: String,
  pub discount: Decimal,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SetActivePayload {
  pub is_active: bool,
}

#[derive(Deserialize, Debug)]
pub struct ValidateCouponPayload {
  pub code: String,
}

#[instrument(name = "handler::create_coupon", skip(app_state, _admin))]
pub async fn create_coupon_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<CreateCouponPayload>,
  _admin: AdminUser,
) -> Result<HttpResponse, AppError> {
  let coupon = app_state
    .ledger
    .coupons()
    .create_coupon(&payload.code, payload.discount)
    .await?;
  Ok(HttpResponse::Created().json(coupon))
}

#[instrument(name = "handler::list_coupons", skip(app_state, _admin))]
pub async fn list_coupons_handler(app_state: web::Data<AppState>, _admin: AdminUser) -> Result<HttpResponse, AppError> {
  let coupons = app_state.ledger.coupons().list_coupons().await?;
  Ok(HttpResponse::Ok().json(coupons))
}

#[instrument(name = "handler::set_coupon_active", skip(app_state, _admin))]
pub async fn set_coupon_active_handler(
  app_state: web::Data<AppState>,
  coupon_id: web::Path<Uuid>,
  payload: web::Json<SetActivePayload>,
  _admin: AdminUser,
) -> Result<HttpResponse, AppError> {
  let coupon = app_state
    .ledger
    .coupons()
    .set_coupon_active(coupon_id.into_inner(), payload.is_active)
    .await?;
  Ok(HttpResponse::Ok().json(coupon))
}

/// Read-only check. Anonymous callers get the coupon's general validity; with
/// an `X-User-ID` header the user's own consumption is taken into account.
#[instrument(name = "handler::validate_coupon", skip(app_state, req))]
pub async fn validate_coupon_handler(
  app_state: web::Data<AppState>,
  req: actix_web::HttpRequest,
  payload: web::Json<ValidateCouponPayload>,
) -> Result<HttpResponse, AppError> {
  let user_id = req
    .headers()
    .get(USER_ID_HEADER)
    .and_then(|h| h.to_str().ok())
    .and_then(|s| Uuid::parse_str(s.trim()).ok());
  let validation = app_state.ledger.coupons().validate(&payload.code, user_id).await?;
  Ok(HttpResponse::Ok().json(validation))
}

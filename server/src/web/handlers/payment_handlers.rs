// server/src/web/handlers/payment_handlers.rs

use actix_web::{web, HttpResponse};
use paysettle::{CallbackClaim, CustomerContact, PaymentOutcome, ProviderKind};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

// --- Request DTO ---
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequestPayload {
  /// The amount the client believes it is paying; checked against the order total.
  pub amount: Decimal,
  #[serde(default)]
  pub customer: CustomerContact,
}

/// Paid is 200, still pending is 202, a failed attempt is 402. The order is
/// untouched in the last two cases and the client may verify again.
fn outcome_response(outcome: PaymentOutcome) -> HttpResponse {
  match &outcome {
    PaymentOutcome::Paid { .. } => HttpResponse::Ok().json(outcome),
    PaymentOutcome::VerificationPending { .. } => HttpResponse::Accepted().json(outcome),
    PaymentOutcome::VerificationFailed { .. } => HttpResponse::PaymentRequired().json(outcome),
  }
}

#[instrument(
    name = "handler::create_payment_session",
    skip(app_state, payload, auth_user),
    fields(user_id = %auth_user.user_id)
)]
pub async fn create_session_handler(
  app_state: web::Data<AppState>,
  path: web::Path<(Uuid, ProviderKind)>,
  payload: web::Json<SessionRequestPayload>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let (order_id, provider) = path.into_inner();
  let SessionRequestPayload { amount, customer } = payload.into_inner();
  let handle = app_state
    .engine
    .create_payment_session(provider, order_id, auth_user.user_id, amount, customer)
    .await?;
  info!(%order_id, %provider, reused = handle.reused, "Payment session ready.");
  Ok(HttpResponse::Ok().json(handle))
}

/// Status poll against the provider holding the order's session.
#[instrument(name = "handler::verify_polled_payment", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn verify_polled_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let outcome = app_state
    .engine
    .verify_polled_payment(order_id.into_inner(), auth_user.user_id)
    .await?;
  Ok(outcome_response(outcome))
}

#[instrument(
    name = "handler::verify_signed_callback",
    skip(app_state, claim, auth_user),
    fields(user_id = %auth_user.user_id)
)]
pub async fn verify_callback_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  claim: web::Json<CallbackClaim>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let outcome = app_state
    .engine
    .verify_signed_callback(order_id.into_inner(), auth_user.user_id, claim.into_inner())
    .await?;
  Ok(outcome_response(outcome))
}

pub async fn razorpay_config_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  let config = app_state.engine.provider_b_client_config()?;
  Ok(HttpResponse::Ok().json(config))
}

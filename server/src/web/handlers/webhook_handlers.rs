// server/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use paysettle::{ProviderKind, WebhookDelivery};
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

fn header(req: &HttpRequest, name: &str) -> Option<String> {
  req
    .headers()
    .get(name)
    .and_then(|value| value.to_str().ok())
    .map(String::from)
}

/// The raw body is handed over untouched: the signature covers its exact bytes.
#[instrument(
    name = "handler::provider_webhook",
    skip(app_state, req, body),
    fields(provider = %provider, bytes = body.len())
)]
pub async fn provider_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  provider: web::Path<ProviderKind>,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let delivery = WebhookDelivery {
    body: body.to_vec(),
    signature: header(&req, SIGNATURE_HEADER),
    timestamp: header(&req, TIMESTAMP_HEADER),
  };
  let ack = app_state
    .engine
    .handle_provider_webhook(provider.into_inner(), delivery)
    .await?;
  info!(?ack, "Webhook acknowledged.");
  Ok(HttpResponse::Ok().json(ack))
}

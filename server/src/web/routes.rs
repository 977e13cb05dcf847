// server/src/web/routes.rs

use actix_web::web;

use crate::state::AppState;
use crate::web::handlers::{coupon_handlers, order_handlers, payment_handlers, webhook_handlers};

async fn health_check_handler(app_state: web::Data<AppState>) -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({
    "status": "ok",
    "storage": app_state.config.storage_backend.as_str(),
  }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg
    .route("/health", web::get().to(health_check_handler))
    .service(
      web::scope("/orders")
        .route("", web::post().to(order_handlers::create_order_handler))
        .route("", web::get().to(order_handlers::list_all_orders_handler))
        // Registered before "/{id}" so "mine" is never parsed as an order id.
        .route("/mine", web::get().to(order_handlers::list_my_orders_handler))
        .route("/{id}", web::get().to(order_handlers::get_order_handler))
        .route("/{id}/pay", web::put().to(order_handlers::mark_paid_handler))
        .route("/{id}/ship", web::put().to(order_handlers::mark_shipped_handler))
        .route("/{id}/deliver", web::put().to(order_handlers::mark_delivered_handler))
        .route(
          "/{id}/payments/cashfree/verify",
          web::post().to(payment_handlers::verify_polled_handler),
        )
        .route(
          "/{id}/payments/razorpay/verify",
          web::post().to(payment_handlers::verify_callback_handler),
        )
        .route(
          "/{id}/payments/{provider}/session",
          web::post().to(payment_handlers::create_session_handler),
        ),
    )
    .route(
      "/webhooks/{provider}",
      web::post().to(webhook_handlers::provider_webhook_handler),
    )
    .route(
      "/payments/razorpay/config",
      web::get().to(payment_handlers::razorpay_config_handler),
    )
    .service(
      web::scope("/coupons")
        .route("", web::post().to(coupon_handlers::create_coupon_handler))
        .route("", web::get().to(coupon_handlers::list_coupons_handler))
        .route("/validate", web::post().to(coupon_handlers::validate_coupon_handler))
        .route("/{id}/active", web::put().to(coupon_handlers::set_coupon_active_handler)),
    );
}

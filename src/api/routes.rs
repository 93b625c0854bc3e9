use super::handlers::*;
use crate::ports::{CartServicePort, OrderServicePort, PendingOrderStorePort};
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router<C, O, S>(state: AppState<C, O, S>) -> Router
where
    C: CartServicePort + 'static,
    O: OrderServicePort + 'static,
    S: PendingOrderStorePort + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/api/checkout", get(get_checkout))
        .route("/api/checkout/start", post(start_checkout))
        .route("/api/checkout/fulfillment", put(update_fulfillment))
        .route("/api/checkout/payment", put(select_payment))
        .route("/api/checkout/phone", put(set_contact_phone))
        .route(
            "/api/checkout/coupon",
            post(apply_coupon).delete(remove_coupon),
        )
        .route("/api/checkout/submit", post(submit_order))
        .route("/api/checkout/otp", post(submit_otp))
        .route("/api/checkout/otp/cancel", post(cancel_otp))
        .route("/payment/success", get(payment_success))
        .route("/payment/failure", get(payment_failure))
        .route("/payment/callback", get(payment_callback))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

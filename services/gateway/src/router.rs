use crate::handlers::{book, quantity};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(book::root))
        .route("/status", get(book::get_status))
        .route("/orderbook", get(book::get_orderbook))
        .route("/history", get(book::get_history))
        .route("/metrics", get(book::get_metrics))
        .route("/quantity", post(quantity::get_quantity))
        .route("/nearest-level/{price}", get(quantity::get_nearest_level))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

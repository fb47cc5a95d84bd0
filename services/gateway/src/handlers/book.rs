use crate::models::{OrderBookResponse, RootResponse};
use crate::state::AppState;
use axum::{Json, extract::State};
use depth_mirror::query::{HistoryInfo, MirrorStatus};
use std::collections::BTreeMap;

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Order Book API is running".to_string(),
    })
}

pub async fn get_status(State(state): State<AppState>) -> Json<MirrorStatus> {
    Json(state.query.status())
}

pub async fn get_orderbook(State(state): State<AppState>) -> Json<OrderBookResponse> {
    let book = state.query.current_book();
    Json(OrderBookResponse::from(&book))
}

pub async fn get_history(State(state): State<AppState>) -> Json<HistoryInfo> {
    Json(state.query.history_info())
}

pub async fn get_metrics(State(state): State<AppState>) -> Json<BTreeMap<String, u64>> {
    Json(state.query.metrics())
}

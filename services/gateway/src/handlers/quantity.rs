use crate::error::AppError;
use crate::models::{NearestLevelResponse, QuantityRequest, QuantityResponse};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
};
use chrono::Utc;
use rust_decimal::Decimal;

/// Quantity at a price, live or at a point in time.
///
/// Without a timestamp the nearest live level is returned. With one, the
/// exact historical quantity and its change over the preceding second.
pub async fn get_quantity(
    State(state): State<AppState>,
    payload: Result<Json<QuantityRequest>, JsonRejection>,
) -> Result<Json<QuantityResponse>, AppError> {
    let Json(request) = payload?;

    let result = state
        .query
        .quantity_difference(request.price, request.timestamp)?;

    Ok(Json(QuantityResponse {
        target_price: request.price,
        actual_price: result.actual_price,
        timestamp: request.timestamp.unwrap_or_else(|| Utc::now().timestamp()),
        quantity: result.quantity,
        difference: result.difference,
        is_nearest_level: result.is_nearest_level,
    }))
}

pub async fn get_nearest_level(
    State(state): State<AppState>,
    price: Result<Path<Decimal>, PathRejection>,
) -> Result<Json<NearestLevelResponse>, AppError> {
    let Path(price) = price?;
    let nearest = state.query.nearest_level(price)?;

    Ok(Json(NearestLevelResponse {
        target_price: price,
        nearest_price: nearest.price,
        quantity: nearest.quantity,
        timestamp: Utc::now().timestamp(),
        price_difference: nearest.price_difference,
    }))
}

use depth_mirror::order_book::OrderBookState;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::depth::PriceLevel;

#[derive(Debug, Clone, Serialize)]
pub struct RootResponse {
    pub message: String,
}

/// `[price, quantity]` pair.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LevelRow(
    #[serde(with = "rust_decimal::serde::float")] pub Decimal,
    #[serde(with = "rust_decimal::serde::float")] pub Decimal,
);

impl From<&PriceLevel> for LevelRow {
    fn from(level: &PriceLevel) -> Self {
        LevelRow(level.price.as_decimal(), level.quantity.as_decimal())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderBookResponse {
    pub symbol: String,
    /// Unix seconds (fractional) of the last book mutation.
    pub timestamp: f64,
    pub last_update_id: u64,
    /// Best bid first.
    pub bids: Vec<LevelRow>,
    /// Best ask first.
    pub asks: Vec<LevelRow>,
}

impl From<&OrderBookState> for OrderBookResponse {
    fn from(book: &OrderBookState) -> Self {
        let captured_at = book.captured_at();
        Self {
            symbol: book.symbol.to_string(),
            timestamp: captured_at.timestamp_millis() as f64 / 1000.0,
            last_update_id: book.last_update_id(),
            bids: book.bid_levels().iter().map(LevelRow::from).collect(),
            asks: book.ask_levels().iter().map(LevelRow::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuantityRequest {
    pub price: Decimal,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuantityResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub target_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub actual_price: Decimal,
    pub timestamp: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub difference: Decimal,
    pub is_nearest_level: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearestLevelResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub target_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub nearest_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    pub timestamp: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_difference: Decimal,
}

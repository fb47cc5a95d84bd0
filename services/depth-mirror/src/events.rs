//! Wire formats for the exchange depth feed
//!
//! Decodes the REST depth snapshot and the WebSocket diff messages into the
//! validated `types::depth` forms. Prices and quantities arrive as decimal
//! strings and are parsed without going through floating point.
//!
//! Diff messages come either wrapped in a combined-stream envelope
//! (`{"stream": "...", "data": {...}}`) or as a bare event object.

use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use types::depth::{DepthSnapshot, DiffEvent, PriceLevel};
use types::errors::DecodeError;
use types::numeric::{Price, Quantity};

/// Event type tag carried by depth diff payloads.
pub const DEPTH_UPDATE_EVENT: &str = "depthUpdate";

/// Keys that mark a payload as a depth diff even without its tag.
const DEPTH_FIELDS: [&str; 5] = ["U", "u", "pu", "b", "a"];

/// Raw depth snapshot as returned by the REST endpoint.
#[derive(Debug, Deserialize)]
pub struct DepthSnapshotRaw {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
}

impl TryFrom<DepthSnapshotRaw> for DepthSnapshot {
    type Error = DecodeError;

    fn try_from(raw: DepthSnapshotRaw) -> Result<Self, Self::Error> {
        Ok(DepthSnapshot {
            last_update_id: raw.last_update_id,
            bids: parse_levels(&raw.bids)?,
            asks: parse_levels(&raw.asks)?,
        })
    }
}

/// Raw depth diff event.
#[derive(Debug, Deserialize)]
pub struct DepthUpdateRaw {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub final_update_id: u64,
    #[serde(rename = "pu", default)]
    pub prev_final_update_id: Option<u64>,
    #[serde(rename = "b", default)]
    pub bids: Vec<(String, String)>,
    #[serde(rename = "a", default)]
    pub asks: Vec<(String, String)>,
}

impl TryFrom<DepthUpdateRaw> for DiffEvent {
    type Error = DecodeError;

    fn try_from(raw: DepthUpdateRaw) -> Result<Self, Self::Error> {
        if raw.first_update_id > raw.final_update_id {
            return Err(DecodeError::InvertedRange {
                first_update_id: raw.first_update_id,
                final_update_id: raw.final_update_id,
            });
        }

        Ok(DiffEvent {
            first_update_id: raw.first_update_id,
            final_update_id: raw.final_update_id,
            prev_final_update_id: raw.prev_final_update_id,
            event_time_ms: raw.event_time,
            bid_changes: parse_levels(&raw.bids)?,
            ask_changes: parse_levels(&raw.asks)?,
        })
    }
}

/// Parse string price/qty pairs. A single bad pair rejects the whole list.
pub fn parse_levels(levels: &[(String, String)]) -> Result<Vec<PriceLevel>, DecodeError> {
    levels
        .iter()
        .map(|(price, qty)| -> Result<PriceLevel, DecodeError> {
            Ok(PriceLevel::new(
                Price::from_str(price)?,
                Quantity::from_str(qty)?,
            ))
        })
        .collect()
}

/// Decode one text frame from the diff stream.
///
/// Returns `Ok(None)` for well-formed frames that carry no depth update
/// (subscription acknowledgements, other event types). A payload that is not
/// an object, or carries depth fields without the `depthUpdate` tag, is an
/// error.
pub fn decode_stream_message(text: &str) -> Result<Option<DiffEvent>, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;

    let payload = match value {
        Value::Object(mut map) if map.contains_key("stream") => match map.remove("data") {
            Some(data) => data,
            None => return Err(DecodeError::Json("combined frame without data".to_string())),
        },
        other => other,
    };

    let Value::Object(fields) = &payload else {
        return Err(DecodeError::Json("payload is not an object".to_string()));
    };
    match fields.get("e").and_then(Value::as_str) {
        Some(DEPTH_UPDATE_EVENT) => {}
        Some(_) => return Ok(None),
        None if DEPTH_FIELDS.iter().any(|key| fields.contains_key(*key)) => {
            return Err(DecodeError::Json("depth payload without event type".to_string()));
        }
        None => return Ok(None),
    }

    let raw: DepthUpdateRaw =
        serde_json::from_value(payload).map_err(|e| DecodeError::Json(e.to_string()))?;
    DiffEvent::try_from(raw).map(Some)
}

//! Inbound payload parsing.
//!
//! The upstream publisher emits one JSON object per trade. Payloads arrive
//! from a shared topic and may be malformed (truncated writes, foreign
//! producers, schema drift), so parsing returns a tagged result the
//! ingestion loop can route on: a typed `TradeEvent` or a `ParseError`
//! naming the reason. This module is stateless and pure; it never touches
//! transport or per-instrument state.

use thiserror::Error;

use crate::models::TradeEvent;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid trade json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("non-positive price {price} for token {token}")]
    NonPositivePrice { token: String, price: f64 },
}

/// Decode and validate one inbound trade payload.
///
/// Invariant enforced here: `price_in_sol > 0`. Everything else the engine
/// needs is structural and covered by serde.
pub fn parse_trade(payload: &[u8]) -> Result<TradeEvent, ParseError> {
    let trade: TradeEvent = serde_json::from_slice(payload)?;

    if !(trade.price_in_sol > 0.0) {
        return Err(ParseError::NonPositivePrice {
            token: trade.token_address,
            price: trade.price_in_sol,
        });
    }

    Ok(trade)
}

use serde::{Deserialize, Serialize};

/// One executed trade as delivered on the inbound log topic.
///
/// Only `token_address` and `price_in_sol` feed the indicator; the other
/// fields are transport metadata carried by the upstream publisher and are
/// accepted so a richer payload never fails to parse.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeEvent {
    pub token_address: String,
    pub price_in_sol: f64,
    pub block_time: String,

    /// Source-provided ordinal; opaque to the engine.
    #[serde(default)]
    pub transaction_signature: String,

    #[serde(default)]
    pub is_buy: bool,

    #[serde(default)]
    pub amount_in_sol: f64,
}

/// Qualitative reading of an RSI value against the configured bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Oversold,
    Neutral,
    Overbought,
}

/// One computed RSI value as published on the outbound log topic.
///
/// Derived from the smoothed per-instrument state at publish time and
/// immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEvent {
    pub token_address: String,
    pub rsi_value: f64,
    pub current_price: f64,
    pub timestamp: String,
    pub period: usize,
    pub signal: Signal,
}

impl ResultEvent {
    /// Stamp a result with the current wall-clock time (RFC 3339).
    pub fn now(
        token_address: String,
        rsi_value: f64,
        current_price: f64,
        period: usize,
        signal: Signal,
    ) -> Self {
        Self {
            token_address,
            rsi_value,
            current_price,
            timestamp: chrono::Utc::now().to_rfc3339(),
            period,
            signal,
        }
    }
}

//! Coinbase exchange WebSocket feed models.

use serde::{Deserialize, Serialize};

/// Exchange name stamped on every candlestick built from the Coinbase feed.
pub const EXCHANGE_COINBASE: &str = "COINBASE";

/// Message `type` of a ticker update.
pub const TICKER_TYPE: &str = "ticker";

/// Delimiter between base and quote asset in a product id (`BTC-USD`).
pub const PRODUCT_DELIMITER: char = '-';

/// Channels offered by the Coinbase feed that this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Ticker,
    Heartbeat,
}

impl Channel {
    /// Returns the wire-format channel name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Ticker => "ticker",
            Channel::Heartbeat => "heartbeat",
        }
    }
}

/// A `subscribe` request.
#[derive(Debug, Serialize)]
pub struct SubscribeRequest {
    #[serde(rename = "type")]
    pub tpe: String,
    pub product_ids: Vec<String>,
    pub channels: Vec<String>,
}

impl SubscribeRequest {
    /// Builds a subscribe request for the given channel and product ids.
    pub fn new(channel: Channel, product_ids: &[String]) -> Self {
        Self {
            tpe: "subscribe".to_string(),
            product_ids: product_ids.to_vec(),
            channels: vec![channel.as_str().to_string()],
        }
    }
}

/// A ticker update. Prices and sizes arrive as decimal strings.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerMessage {
    #[serde(rename = "type")]
    pub tpe: String,
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub price: String,
    pub sequence: Option<i64>,
    pub trade_id: Option<i64>,
    pub time: Option<String>,
    pub side: Option<String>,
    pub last_size: Option<String>,
    pub best_bid: Option<String>,
    pub best_ask: Option<String>,
}

impl TickerMessage {
    /// Base asset of the product id, upper-cased (`"btc-usd"` → `"BTC"`).
    pub fn base_asset(&self) -> Option<String> {
        self.product_id
            .split(PRODUCT_DELIMITER)
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase)
    }
}

/// Server acknowledgement listing the active subscriptions.
#[derive(Debug, Deserialize)]
pub struct SubscriptionsResponse {
    #[serde(rename = "type")]
    pub tpe: String,
    pub channels: Vec<SubscribedChannel>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribedChannel {
    pub name: String,
    #[serde(default)]
    pub product_ids: Vec<String>,
}

/// An error reported by the feed, e.g. for an unknown product id.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub tpe: String,
    pub message: String,
    #[serde(default)]
    pub reason: Option<String>,
}

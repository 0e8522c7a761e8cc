//! Decoding of inbound feed messages.

use tracing::{debug, info, warn};

use crate::Result;
use crate::error::CandlewickError;
use crate::models::coinbase::{
    Channel, ErrorResponse, SubscriptionsResponse, TICKER_TYPE, TickerMessage,
};

/// One price update for one ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// Base asset, upper-cased (`BTC` for product `BTC-USD`).
    pub ticker: String,
    pub price: f64,
}

/// Decodes a text frame.
///
/// Returns `Ok(None)` for well-formed messages that are not ticker updates
/// (subscription acks, heartbeats, feed errors), which are logged and
/// otherwise ignored.
///
/// # Errors
///
/// [`CandlewickError::MalformedMessage`] for invalid JSON or a ticker update
/// without a usable product id, [`CandlewickError::InvalidPrice`] when the
/// price is not a finite, non-negative number.
pub fn decode_tick(text: &str) -> Result<Option<Tick>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| CandlewickError::MalformedMessage(e.to_string()))?;

    let msg_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string();

    if msg_type != TICKER_TYPE {
        log_control_message(&msg_type, value);
        return Ok(None);
    }

    let message: TickerMessage = serde_json::from_value(value)
        .map_err(|e| CandlewickError::MalformedMessage(e.to_string()))?;

    let ticker = message.base_asset().ok_or_else(|| {
        CandlewickError::MalformedMessage(format!(
            "ticker update with product id {:?}",
            message.product_id
        ))
    })?;
    let price = parse_price(&message.price)?;

    debug!(
        product_id = message.product_id,
        sequence = message.sequence,
        time = message.time,
        price,
        "Ticker update"
    );

    Ok(Some(Tick { ticker, price }))
}

/// Parses a decimal-as-string price.
fn parse_price(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.0)
        .ok_or_else(|| CandlewickError::InvalidPrice(raw.to_string()))
}

fn log_control_message(msg_type: &str, value: serde_json::Value) {
    match msg_type {
        "subscriptions" => match serde_json::from_value::<SubscriptionsResponse>(value) {
            Ok(response) => {
                for channel in &response.channels {
                    info!(
                        msg_type = response.tpe,
                        channel = channel.name,
                        product_ids = ?channel.product_ids,
                        "Subscription confirmed"
                    );
                }
            }
            Err(e) => debug!("Unreadable subscriptions message: {e}"),
        },
        "error" => match serde_json::from_value::<ErrorResponse>(value) {
            Ok(response) => warn!(
                msg_type = response.tpe,
                message = response.message,
                reason = response.reason,
                "Feed reported an error"
            ),
            Err(e) => debug!("Unreadable error message: {e}"),
        },
        t if t == Channel::Heartbeat.as_str() => debug!("Received heartbeat"),
        other => debug!(msg_type = other, "Skipping non-ticker message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ticker_update() {
        let tick = decode_tick(
            r#"{"type":"ticker","product_id":"btc-usd","price":"42152.30","sequence":1}"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(tick.ticker, "BTC");
        assert_eq!(tick.price, 42152.30);
    }

    #[test]
    fn skips_other_message_types() {
        for text in [
            r#"{"type":"subscriptions","channels":[{"name":"ticker","product_ids":["BTC-USD"]}]}"#,
            r#"{"type":"heartbeat","sequence":90,"last_trade_id":20,"product_id":"BTC-USD"}"#,
            r#"{"type":"error","message":"Failed to subscribe","reason":"ABC-USD is invalid"}"#,
            r#"{"type":"l2update","product_id":"BTC-USD","changes":[]}"#,
            r#"{"product_id":"BTC-USD","price":"1.0"}"#,
        ] {
            assert_eq!(decode_tick(text).unwrap(), None, "{text}");
        }
    }

    #[test]
    fn rejects_invalid_json() {
        let err = decode_tick("{not json").unwrap_err();
        assert!(matches!(err, CandlewickError::MalformedMessage(_)));
    }

    #[test]
    fn rejects_non_numeric_prices() {
        for price in ["", "abc", "NaN", "inf", "-1.5"] {
            let text = format!(r#"{{"type":"ticker","product_id":"BTC-USD","price":"{price}"}}"#);
            let err = decode_tick(&text).unwrap_err();
            assert!(matches!(err, CandlewickError::InvalidPrice(_)), "{price}");
        }
    }

    #[test]
    fn rejects_missing_product() {
        let err = decode_tick(r#"{"type":"ticker","price":"1.0"}"#).unwrap_err();
        assert!(matches!(err, CandlewickError::MalformedMessage(_)));
    }
}

//! Shared domain models.
//!
//! Contains the [`Candlestick`] aggregate, the security identifiers used as
//! keys throughout the crate, and the Coinbase wire messages.

pub mod candlestick;
pub mod coinbase;

use std::fmt;

use serde::Deserialize;

pub use candlestick::Candlestick;

/// Reference currency used when a security does not name one.
pub const DEFAULT_REFERENCE_CURRENCY: &str = "USD";

/// Normalized `(exchange, ticker)` pair. Both parts are upper-cased so
/// lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecurityKey {
    exchange: String,
    ticker: String,
}

impl SecurityKey {
    pub fn new(exchange: &str, ticker: &str) -> Self {
        Self {
            exchange: exchange.trim().to_uppercase(),
            ticker: ticker.trim().to_uppercase(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }
}

impl fmt::Display for SecurityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.exchange, self.ticker)
    }
}

/// A security a feed subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Security {
    pub exchange: String,
    pub ticker: String,
    #[serde(default = "default_reference_currency")]
    pub reference_currency: String,
}

fn default_reference_currency() -> String {
    DEFAULT_REFERENCE_CURRENCY.to_string()
}

impl Security {
    pub fn new(exchange: &str, ticker: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            ticker: ticker.to_string(),
            reference_currency: default_reference_currency(),
        }
    }

    pub fn key(&self) -> SecurityKey {
        SecurityKey::new(&self.exchange, &self.ticker)
    }

    /// Exchange product id, e.g. `BTC-USD`.
    pub fn product_id(&self) -> String {
        format!(
            "{}{}{}",
            self.ticker.trim().to_uppercase(),
            coinbase::PRODUCT_DELIMITER,
            self.reference_currency.trim().to_uppercase()
        )
    }
}

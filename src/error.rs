//! Crate-level error types.
//!
//! [`CandlewickError`] unifies every error source (configuration, WebSocket,
//! JSON, storage) behind a single enum so callers can match on the variant
//! they care about while still using the `?` operator for easy propagation.
//!
//! [`CandlewickError::NoPriceData`] and [`CandlewickError::TickerNotFound`]
//! are the two conditions surfaced to API consumers of `check`/`commit`; they
//! never carry connectivity detail.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CandlewickError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum CandlewickError {
    /// Configuration could not be read, parsed, or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// A filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Dialing and subscribing did not finish in time.
    #[error("connecting to {url} timed out after {after:?}")]
    ConnectTimeout {
        url: String,
        after: std::time::Duration,
    },

    /// An inbound message could not be decoded.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A price field was not a finite, non-negative number.
    #[error("invalid price: {0:?}")]
    InvalidPrice(String),

    /// The current interval has no ticks yet.
    #[error("no price data for this interval")]
    NoPriceData,

    /// The exchange/ticker pair is not tracked by the feed.
    #[error("ticker not found: {exchange}-{ticker}")]
    TickerNotFound { exchange: String, ticker: String },

    /// The candlestick store rejected a read or write.
    #[error("store error: {0}")]
    Store(String),

    /// A security was added to a feed serving a different exchange.
    #[error("feed {feed} does not serve exchange {exchange}")]
    UnsupportedExchange { feed: String, exchange: String },

    /// The feed has been closed and no longer accepts requests.
    #[error("feed closed")]
    FeedClosed,
}

//! Real-time candlestick aggregation from exchange market-data feeds.
//!
//! A [`Feed`](feed::Feed) holds a reconnecting WebSocket connection to one
//! exchange, folds every ticker update into an OHLCV candlestick per
//! security, and seals the candlestick once its interval elapses. Sealed
//! candlesticks are persisted through a [`CandlestickStore`](store::CandlestickStore)
//! and published to subscribers. Feeds are owned by a
//! [`FeedRegistry`](registry::FeedRegistry) keyed by platform name.

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod registry;
pub mod shutdown;
pub mod store;
pub mod subscribers;
pub mod websocket;

pub use error::{CandlewickError, Result};

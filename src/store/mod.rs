//! Durable storage for sealed candlesticks.
//!
//! The aggregator only depends on the [`CandlestickStore`] trait:
//! - [`MemoryStore`] keeps everything in process memory
//! - [`FileStore`] appends JSON lines to a file and replays it on open

mod file;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::models::Candlestick;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Which candlesticks a range query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    /// Every sealed candlestick.
    #[default]
    All,
    /// Only candlesticks that open a new hour.
    Hourly,
    /// Only candlesticks that open a new day.
    Daily,
}

impl Resolution {
    fn admits(self, candlestick: &Candlestick) -> bool {
        match self {
            Resolution::All => true,
            Resolution::Hourly => candlestick.opens_hour,
            Resolution::Daily => candlestick.opens_day,
        }
    }
}

/// Persistence for sealed candlesticks.
///
/// Exchange and ticker arguments are matched case-insensitively.
#[async_trait]
pub trait CandlestickStore: Send + Sync {
    /// Persists one sealed candlestick.
    async fn save_candlestick(&self, candlestick: &Candlestick) -> Result<()>;

    /// The most recently saved candlestick for the pair, if any.
    async fn last_by_ticker(&self, exchange: &str, ticker: &str) -> Result<Option<Candlestick>>;

    /// Candlesticks whose interval start lies strictly between `start` and
    /// `end`, in insertion order.
    async fn list_by_ticker(
        &self,
        exchange: &str,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<Vec<Candlestick>>;

    /// Every exchange with at least one stored candlestick.
    async fn list_exchanges(&self) -> Result<Vec<String>>;

    /// Every ticker with at least one stored candlestick on `exchange`.
    async fn list_tickers(&self, exchange: &str) -> Result<Vec<String>>;
}

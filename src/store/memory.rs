use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CandlestickStore, Resolution};
use crate::Result;
use crate::models::{Candlestick, SecurityKey};

/// In-process candlestick store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Vec<Candlestick>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored candlesticks.
    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub(super) fn insert(&self, candlestick: Candlestick) {
        self.items().push(candlestick);
    }

    fn items(&self) -> MutexGuard<'_, Vec<Candlestick>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(super) fn last(&self, key: &SecurityKey) -> Option<Candlestick> {
        self.items().iter().rev().find(|c| &c.key() == key).cloned()
    }

    pub(super) fn range(
        &self,
        key: &SecurityKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> Vec<Candlestick> {
        self.items()
            .iter()
            .filter(|c| &c.key() == key)
            .filter(|c| c.interval_start > start && c.interval_start < end)
            .filter(|c| resolution.admits(c))
            .cloned()
            .collect()
    }

    pub(super) fn exchanges(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .items()
            .iter()
            .map(|c| c.key().exchange().to_string())
            .collect();
        set.into_iter().collect()
    }

    pub(super) fn tickers(&self, exchange: &str) -> Vec<String> {
        let exchange = exchange.trim().to_uppercase();
        let set: BTreeSet<String> = self
            .items()
            .iter()
            .map(Candlestick::key)
            .filter(|k| k.exchange() == exchange)
            .map(|k| k.ticker().to_string())
            .collect();
        set.into_iter().collect()
    }
}

#[async_trait]
impl CandlestickStore for MemoryStore {
    async fn save_candlestick(&self, candlestick: &Candlestick) -> Result<()> {
        self.insert(candlestick.clone());
        Ok(())
    }

    async fn last_by_ticker(&self, exchange: &str, ticker: &str) -> Result<Option<Candlestick>> {
        Ok(self.last(&SecurityKey::new(exchange, ticker)))
    }

    async fn list_by_ticker(
        &self,
        exchange: &str,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<Vec<Candlestick>> {
        Ok(self.range(&SecurityKey::new(exchange, ticker), start, end, resolution))
    }

    async fn list_exchanges(&self) -> Result<Vec<String>> {
        Ok(self.exchanges())
    }

    async fn list_tickers(&self, exchange: &str) -> Result<Vec<String>> {
        Ok(self.tickers(exchange))
    }
}

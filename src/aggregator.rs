//! Tick-to-candlestick aggregation for one feed.
//!
//! The [`Aggregator`] owns the in-progress candlestick of every tracked
//! security behind a single lock. Ticks are folded in with
//! [`Aggregator::aggregate`]; once an interval has elapsed the caller seals
//! it with [`Aggregator::commit`], which tags hour/day boundaries, persists
//! the candlestick, starts a fresh interval and publishes the sealed result.
//!
//! The lock is held for the whole of `commit`, including the publish step,
//! so a concurrent [`Aggregator::check`] never observes a half-committed
//! state. A subscriber that is not reading therefore blocks every other
//! ticker of the same feed until it catches up or the feed closes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::Result;
use crate::clock::Clock;
use crate::error::CandlewickError;
use crate::models::{Candlestick, SecurityKey};
use crate::shutdown::ShutdownSignal;
use crate::store::CandlestickStore;
use crate::subscribers::SubscriberRegistry;

/// Working set for one security: the candlestick being built.
#[derive(Debug, Clone)]
struct AggregationState {
    candlestick: Candlestick,
}

impl AggregationState {
    fn new(key: &SecurityKey, interval_start: DateTime<Utc>) -> Self {
        Self {
            candlestick: Candlestick::empty(key, interval_start),
        }
    }

    fn interval_start(&self) -> DateTime<Utc> {
        self.candlestick.interval_start
    }
}

/// Per-feed aggregation state and commit pipeline.
pub struct Aggregator {
    interval: Duration,
    clock: Arc<dyn Clock>,
    store: Arc<dyn CandlestickStore>,
    subscribers: Arc<SubscriberRegistry>,
    closed: ShutdownSignal,
    states: Mutex<HashMap<SecurityKey, AggregationState>>,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("interval", &self.interval)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Aggregator {
    /// Creates an aggregator that seals candlesticks every `interval`.
    #[must_use]
    pub fn new(
        interval: std::time::Duration,
        clock: Arc<dyn Clock>,
        store: Arc<dyn CandlestickStore>,
        subscribers: Arc<SubscriberRegistry>,
        closed: ShutdownSignal,
    ) -> Self {
        Self {
            interval: Duration::from_std(interval).unwrap_or(Duration::MAX),
            clock,
            store,
            subscribers,
            closed,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Starts tracking `key` with an empty interval. Tracking an already
    /// tracked key leaves its state untouched.
    pub async fn track(&self, key: &SecurityKey) {
        let now = self.clock.now();
        self.states
            .lock()
            .await
            .entry(key.clone())
            .or_insert_with(|| AggregationState::new(key, now));
    }

    /// Folds one tick into the candlestick for `key`.
    ///
    /// Returns `true` when the current interval has elapsed and the caller
    /// should [`commit`](Self::commit).
    pub async fn aggregate(&self, key: &SecurityKey, price: f64) -> bool {
        let mut states = self.states.lock().await;
        let now = self.clock.now();

        let state = states
            .entry(key.clone())
            .or_insert_with(|| AggregationState::new(key, now));
        state.candlestick.apply(price);

        state
            .interval_start()
            .checked_add_signed(self.interval)
            .is_some_and(|end| now >= end)
    }

    /// Returns a copy of the in-progress candlestick without sealing it.
    ///
    /// # Errors
    ///
    /// [`CandlewickError::TickerNotFound`] for an untracked key,
    /// [`CandlewickError::NoPriceData`] when the interval has no ticks.
    pub async fn check(&self, key: &SecurityKey) -> Result<Candlestick> {
        let states = self.states.lock().await;
        let state = states.get(key).ok_or_else(|| not_found(key))?;

        if !state.candlestick.has_data() {
            return Err(CandlewickError::NoPriceData);
        }
        Ok(state.candlestick.clone())
    }

    /// Seals the in-progress candlestick for `key`.
    ///
    /// Persistence failures are logged and do not stop the pipeline: the
    /// state is reset and the candlestick is still published.
    ///
    /// # Errors
    ///
    /// [`CandlewickError::TickerNotFound`] for an untracked key,
    /// [`CandlewickError::NoPriceData`] when the interval has no ticks. In
    /// both cases nothing is persisted and the state is left as is.
    pub async fn commit(&self, key: &SecurityKey) -> Result<Candlestick> {
        let mut states = self.states.lock().await;
        let state = states.get_mut(key).ok_or_else(|| not_found(key))?;

        if !state.candlestick.has_data() {
            return Err(CandlewickError::NoPriceData);
        }

        let mut sealed = state.candlestick.clone();

        match self
            .store
            .last_by_ticker(key.exchange(), key.ticker())
            .await
        {
            Ok(Some(previous)) => sealed.tag_boundaries(&previous),
            Ok(None) => {}
            Err(e) => warn!(%key, "Failed to load previous candlestick: {e}"),
        }

        match self.store.save_candlestick(&sealed).await {
            Ok(()) => debug!(%key, candlestick = %sealed, "Saved candlestick"),
            Err(e) => warn!(%key, "Failed to save candlestick: {e}"),
        }

        *state = AggregationState::new(key, self.clock.now());

        let mut closed = self.closed.clone();
        let delivered = self.subscribers.publish(key, &sealed, &mut closed).await;

        info!(
            %key,
            open = sealed.open,
            high = sealed.high,
            low = sealed.low,
            close = sealed.close,
            volume = sealed.volume,
            opens_hour = sealed.opens_hour,
            opens_day = sealed.opens_day,
            delivered,
            "Committed candlestick"
        );

        drop(states);
        Ok(sealed)
    }
}

fn not_found(key: &SecurityKey) -> CandlewickError {
    CandlewickError::TickerNotFound {
        exchange: key.exchange().to_string(),
        ticker: key.ticker().to_string(),
    }
}

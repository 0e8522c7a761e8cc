//! A live, reconnecting connection to one exchange together with its
//! per-ticker aggregation state.
//!
//! [`Feed::connect`] dials the exchange and sends the subscribe handshake;
//! a failure there is returned to the caller. After that a background task
//! owns the socket and handles disconnects itself by redialing after a
//! fixed backoff.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::Result;
use crate::aggregator::Aggregator;
use crate::clock::Clock;
use crate::config::PlatformConfig;
use crate::error::CandlewickError;
use crate::models::coinbase::Channel;
use crate::models::{Candlestick, Security, SecurityKey};
use crate::shutdown::{self, ShutdownSignal, ShutdownTrigger};
use crate::store::CandlestickStore;
use crate::subscribers::{SubscriberRegistry, Subscription};
use crate::websocket::connection::{ConnectionManager, dial};
use crate::websocket::{WsWriter, subscribe};

/// Connection state of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// State shared between a [`Feed`] handle and its connection task.
pub(crate) struct FeedInner {
    pub(crate) name: String,
    pub(crate) exchange: &'static str,
    pub(crate) url: String,
    pub(crate) backoff: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) aggregator: Aggregator,
    pub(crate) subscribers: Arc<SubscriberRegistry>,
    pub(crate) writer: tokio::sync::Mutex<Option<WsWriter>>,
    pub(crate) closed: ShutdownSignal,
    securities: Mutex<Vec<Security>>,
    state: watch::Sender<FeedState>,
    shutdown: ShutdownTrigger,
}

impl FeedInner {
    /// Product ids for every tracked security.
    pub(crate) fn product_ids(&self) -> Vec<String> {
        self.securities
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(Security::product_id)
            .collect()
    }

    /// Moves to `next` unless the feed is already closed.
    pub(crate) fn set_state(&self, next: FeedState) {
        self.state.send_if_modified(|state| {
            if *state == FeedState::Closed || *state == next {
                return false;
            }
            debug!(feed = %self.name, from = ?*state, to = ?next, "Feed state change");
            *state = next;
            true
        });
    }

    /// Tracks `security`. Returns `false` if it was already tracked.
    fn track(&self, security: Security) -> bool {
        let mut securities = self.securities.lock().unwrap_or_else(|e| e.into_inner());
        let key = security.key();
        if securities.iter().any(|s| s.key() == key) {
            return false;
        }
        securities.push(security);
        true
    }
}

/// Handle to one exchange feed.
///
/// Dropping the handle closes the feed without waiting for its task.
pub struct Feed {
    inner: Arc<FeedInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("name", &self.inner.name)
            .field("exchange", &self.inner.exchange)
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Feed {
    /// Connects to the platform, subscribes to its configured securities and
    /// starts the read loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or if the initial
    /// dial or subscribe handshake fails or outlasts the connect timeout
    /// ([`CandlewickError::ConnectTimeout`]). Later connectivity problems are
    /// handled by reconnecting and never surface here.
    pub async fn connect(
        platform: &PlatformConfig,
        store: Arc<dyn CandlestickStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        platform.validate()?;

        let (trigger, signal) = shutdown::channel();
        let (state, _) = watch::channel(FeedState::Connecting);
        let subscribers = Arc::new(SubscriberRegistry::new(platform.channel_capacity));
        let aggregator = Aggregator::new(
            platform.interval(),
            clock,
            store,
            subscribers.clone(),
            signal.clone(),
        );

        let inner = Arc::new(FeedInner {
            name: platform.name.clone(),
            exchange: platform.platform.exchange(),
            url: platform.base_url.clone(),
            backoff: platform.reconnect_backoff(),
            connect_timeout: platform.connect_timeout(),
            aggregator,
            subscribers,
            writer: tokio::sync::Mutex::new(None),
            closed: signal,
            securities: Mutex::new(Vec::new()),
            state,
            shutdown: trigger,
        });

        for security in &platform.securities {
            inner.track(security.clone());
            inner.aggregator.track(&security.key()).await;
        }

        info!(feed = %inner.name, url = %inner.url, "Connecting to feed");
        let read = dial(&inner).await?;
        inner.set_state(FeedState::Connected);
        info!(feed = %inner.name, "Feed connected and subscribed");

        let task = tokio::spawn(ConnectionManager::new(inner.clone()).run(read));

        Ok(Self {
            inner,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Exchange name stamped on this feed's candlesticks.
    pub fn exchange(&self) -> &str {
        self.inner.exchange
    }

    pub fn state(&self) -> FeedState {
        *self.inner.state.borrow()
    }

    /// Watches state transitions.
    pub fn watch_state(&self) -> watch::Receiver<FeedState> {
        self.inner.state.subscribe()
    }

    /// Securities the feed subscribes to on every (re)connect.
    pub fn securities(&self) -> Vec<Security> {
        self.inner
            .securities
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the in-progress candlestick without sealing it.
    ///
    /// # Errors
    ///
    /// [`CandlewickError::TickerNotFound`] or [`CandlewickError::NoPriceData`].
    pub async fn check(&self, exchange: &str, ticker: &str) -> Result<Candlestick> {
        self.inner
            .aggregator
            .check(&SecurityKey::new(exchange, ticker))
            .await
    }

    /// Seals the in-progress candlestick now instead of waiting for the
    /// interval to elapse.
    ///
    /// # Errors
    ///
    /// [`CandlewickError::TickerNotFound`] or [`CandlewickError::NoPriceData`].
    pub async fn commit(&self, exchange: &str, ticker: &str) -> Result<Candlestick> {
        self.inner
            .aggregator
            .commit(&SecurityKey::new(exchange, ticker))
            .await
    }

    /// Subscribes to sealed candlesticks for a security.
    ///
    /// # Errors
    ///
    /// [`CandlewickError::FeedClosed`] once the feed has been closed.
    pub fn get_channel(&self, exchange: &str, ticker: &str) -> Result<Subscription> {
        if self.inner.closed.is_closed() {
            return Err(CandlewickError::FeedClosed);
        }
        Ok(self
            .inner
            .subscribers
            .subscribe(SecurityKey::new(exchange, ticker)))
    }

    /// Starts tracking a new security and subscribes to its candlesticks.
    ///
    /// The subscribe handshake is sent on the live socket when connected; if
    /// that fails or the feed is reconnecting, the next redial carries it.
    ///
    /// # Errors
    ///
    /// [`CandlewickError::FeedClosed`] once the feed has been closed,
    /// [`CandlewickError::UnsupportedExchange`] when `exchange` is not the
    /// one this feed serves.
    pub async fn add_security(&self, exchange: &str, ticker: &str) -> Result<Subscription> {
        if self.inner.closed.is_closed() {
            return Err(CandlewickError::FeedClosed);
        }

        let security = Security::new(exchange, ticker);
        let key = security.key();
        if key.exchange() != self.inner.exchange {
            return Err(CandlewickError::UnsupportedExchange {
                feed: self.inner.name.clone(),
                exchange: key.exchange().to_string(),
            });
        }

        let subscription = self.inner.subscribers.subscribe(key.clone());
        self.inner.aggregator.track(&key).await;

        // A redial reads the tracked list under the writer lock. Tracking under
        // it too means the security is either sent on the installed socket or
        // carried by the redial's handshake.
        let product_id = security.product_id();
        let mut writer = self.inner.writer.lock().await;
        if self.inner.track(security) {
            if let Some(write) = writer.as_mut() {
                if let Err(e) = subscribe(write, Channel::Ticker, &[product_id]).await {
                    warn!(
                        feed = %self.inner.name,
                        %key,
                        "Subscribe failed, deferring to reconnect: {e}"
                    );
                }
            }
        }
        drop(writer);

        Ok(subscription)
    }

    /// Stops the read loop, closes the socket and ends every subscription.
    ///
    /// Safe to call more than once and while a reconnect is in progress.
    ///
    /// # Errors
    ///
    /// Currently infallible; socket close failures are logged.
    pub async fn close(&self) -> Result<()> {
        if !self.inner.shutdown.trigger() {
            return Ok(());
        }
        self.inner.state.send_replace(FeedState::Closed);

        let writer = self.inner.writer.lock().await.take();
        if let Some(mut write) = writer {
            if let Err(e) = write.close().await {
                debug!(feed = %self.inner.name, "Closing socket: {e}");
            }
        }

        self.inner.subscribers.clear();

        let task = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(feed = %self.inner.name, "Feed task ended abnormally: {e}");
            }
        }

        info!(feed = %self.inner.name, "Feed closed");
        Ok(())
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        if self.inner.shutdown.trigger() {
            self.inner.state.send_replace(FeedState::Closed);
            self.inner.subscribers.clear();
        }
    }
}

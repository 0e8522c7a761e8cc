//! Connection registry: the active [`Feed`] for each platform name.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::Result;
use crate::clock::Clock;
use crate::config::PlatformConfig;
use crate::feed::Feed;
use crate::store::CandlestickStore;

/// Owns every connected feed. Constructed once by the process and closed on
/// shutdown.
pub struct FeedRegistry {
    store: Arc<dyn CandlestickStore>,
    clock: Arc<dyn Clock>,
    feeds: Mutex<HashMap<String, Arc<Feed>>>,
}

impl std::fmt::Debug for FeedRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedRegistry")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl FeedRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn CandlestickStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            feeds: Mutex::new(HashMap::new()),
        }
    }

    /// Connects `platform` and registers the feed under its name.
    ///
    /// A feed already registered under that name is closed and replaced,
    /// never merged. The registry lock is held throughout, so concurrent
    /// connects for the same name are applied one after the other. Dialing
    /// is bounded by the platform's `connect_timeout_secs`, so a stalled
    /// exchange cannot hold the lock indefinitely.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial connection or subscribe handshake
    /// fails or times out. The previous feed, if any, has been closed by then.
    pub async fn connect(&self, platform: &PlatformConfig) -> Result<Arc<Feed>> {
        let mut feeds = self.feeds.lock().await;

        if let Some(previous) = feeds.remove(&platform.name) {
            info!(feed = %platform.name, "Replacing existing feed");
            if let Err(e) = previous.close().await {
                warn!(feed = %platform.name, "Closing replaced feed: {e}");
            }
        }

        let feed = Arc::new(Feed::connect(platform, self.store.clone(), self.clock.clone()).await?);
        feeds.insert(platform.name.clone(), feed.clone());

        Ok(feed)
    }

    /// The active feed for `name`.
    pub async fn get(&self, name: &str) -> Option<Arc<Feed>> {
        self.feeds.lock().await.get(name).cloned()
    }

    /// Registered platform names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.feeds.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Closes and unregisters the feed for `name`. Returns `false` if no
    /// such feed was registered.
    ///
    /// # Errors
    ///
    /// Propagates the error from [`Feed::close`].
    pub async fn close(&self, name: &str) -> Result<bool> {
        let feed = self.feeds.lock().await.remove(name);
        match feed {
            Some(feed) => {
                feed.close().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Closes every registered feed.
    pub async fn close_all(&self) {
        let feeds: Vec<(String, Arc<Feed>)> = self.feeds.lock().await.drain().collect();
        for (name, feed) in feeds {
            if let Err(e) = feed.close().await {
                warn!(feed = %name, "Closing feed: {e}");
            }
        }
    }
}

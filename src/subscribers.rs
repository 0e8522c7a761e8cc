//! Fan-out of sealed candlesticks to subscribers.
//!
//! Every call to [`SubscriberRegistry::subscribe`] creates an independent
//! [`Subscription`] backed by a bounded channel. Publishing awaits each
//! subscriber in turn, so a subscriber that stops reading stalls the publisher
//! once its buffer is full. That stall is the backpressure contract: a slow
//! consumer holds up candlestick sealing (and with it the feed's read loop)
//! until it catches up, drops its subscription, or the feed closes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use crate::models::{Candlestick, SecurityKey};
use crate::shutdown::ShutdownSignal;

/// Receiving end of a subscription to one security's sealed candlesticks.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    key: SecurityKey,
    rx: mpsc::Receiver<Candlestick>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &SecurityKey {
        &self.key
    }

    /// Waits for the next sealed candlestick. Returns `None` once the feed
    /// has closed.
    pub async fn recv(&mut self) -> Option<Candlestick> {
        self.rx.recv().await
    }

    /// Returns a sealed candlestick if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Candlestick> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Candlestick>,
}

/// Maps a security to the subscribers interested in it.
#[derive(Debug)]
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<SecurityKey, Vec<Subscriber>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl SubscriberRegistry {
    /// Creates a registry whose subscriptions buffer up to `capacity`
    /// candlesticks each. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Registers a new subscriber for `key`.
    ///
    /// Subscribers whose receiver was dropped are pruned first, so a key
    /// nobody publishes to does not accumulate dead senders.
    pub fn subscribe(&self, key: SecurityKey) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut map = self.lock();
        map.retain(|_, list| {
            list.retain(|s| !s.tx.is_closed());
            !list.is_empty()
        });
        map.entry(key.clone())
            .or_default()
            .push(Subscriber { id, tx });
        drop(map);
        debug!(%key, id, "Added subscriber");

        Subscription { id, key, rx }
    }

    /// Removes a subscriber by id. Returns `true` if it was registered.
    pub fn unsubscribe(&self, key: &SecurityKey, id: u64) -> bool {
        let mut map = self.lock();
        let Some(list) = map.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            map.remove(key);
        }
        removed
    }

    /// Number of live subscribers for `key`.
    pub fn count(&self, key: &SecurityKey) -> usize {
        self.lock().get(key).map_or(0, Vec::len)
    }

    /// Delivers `candlestick` to every subscriber of `key`.
    ///
    /// Waits for buffer space on each subscriber. Subscribers whose receiver
    /// has been dropped are removed. Delivery stops early once `closed`
    /// fires. Returns how many subscribers received the candlestick.
    pub async fn publish(
        &self,
        key: &SecurityKey,
        candlestick: &Candlestick,
        closed: &mut ShutdownSignal,
    ) -> usize {
        let targets: Vec<(u64, mpsc::Sender<Candlestick>)> = match self.lock().get(key) {
            Some(list) => list.iter().map(|s| (s.id, s.tx.clone())).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut gone = Vec::new();

        for (id, tx) in targets {
            tokio::select! {
                biased;
                () = closed.closed() => {
                    debug!(%key, "Feed closed during publish");
                    break;
                }
                sent = tx.send(candlestick.clone()) => match sent {
                    Ok(()) => delivered += 1,
                    Err(_) => gone.push(id),
                }
            }
        }

        for id in gone {
            debug!(%key, id, "Removing closed subscriber");
            self.unsubscribe(key, id);
        }

        delivered
    }

    /// Drops every subscriber so their receivers observe end-of-stream.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SecurityKey, Vec<Subscriber>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

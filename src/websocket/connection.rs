//! Feed connection lifecycle management.
//!
//! [`ConnectionManager`] drives one feed's socket: it reads frames, routes
//! ticks to the aggregator, and on any read failure drops the stale socket
//! and redials after a fixed backoff until it succeeds or the feed closes.
//! Every redial re-sends the subscribe handshake for all tracked securities.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use tungstenite::Message as WsMessage;

use super::{WsReader, connect, decode_tick, subscribe};
use crate::Result;
use crate::error::CandlewickError;
use crate::feed::{FeedInner, FeedState};
use crate::models::SecurityKey;
use crate::models::coinbase::Channel;
use crate::shutdown::ShutdownSignal;

/// Why the reader loop exited.
enum DisconnectReason {
    /// The connection was lost or errored.
    ConnectionError,
    /// The feed was closed.
    Shutdown,
}

/// Dials the feed endpoint, sends the subscribe handshake, and installs the
/// write half on the feed. Returns the read half.
///
/// The writer lock is held from reading the tracked securities until the
/// write half is installed, so a security added meanwhile is either in this
/// handshake or sent on the installed socket. The whole dial is bounded by
/// the feed's connect timeout.
///
/// If the feed is closed while dialing, the new socket is closed again and
/// [`CandlewickError::FeedClosed`] is returned.
///
/// # Errors
///
/// Returns an error if dialing or the handshake fails or takes longer than
/// the connect timeout.
pub(crate) async fn dial(inner: &FeedInner) -> Result<WsReader> {
    tokio::time::timeout(inner.connect_timeout, handshake(inner))
        .await
        .map_err(|_| CandlewickError::ConnectTimeout {
            url: inner.url.clone(),
            after: inner.connect_timeout,
        })?
}

async fn handshake(inner: &FeedInner) -> Result<WsReader> {
    let (mut write, read) = connect(&inner.url).await?;

    let mut guard = inner.writer.lock().await;
    if inner.closed.is_closed() {
        drop(guard);
        let _ = write.close().await;
        return Err(CandlewickError::FeedClosed);
    }

    let product_ids = inner.product_ids();
    if let Err(e) = subscribe(&mut write, Channel::Ticker, &product_ids).await {
        drop(guard);
        let _ = write.close().await;
        return Err(e);
    }
    *guard = Some(write);

    Ok(read)
}

/// Owns the read side of one feed until the feed closes.
pub(crate) struct ConnectionManager {
    inner: Arc<FeedInner>,
    closed: ShutdownSignal,
}

impl ConnectionManager {
    pub(crate) fn new(inner: Arc<FeedInner>) -> Self {
        let closed = inner.closed.clone();
        Self { inner, closed }
    }

    /// Runs the read loop, reconnecting on failure, until the feed closes.
    pub(crate) async fn run(mut self, mut read: WsReader) {
        loop {
            if let DisconnectReason::Shutdown = self.read_loop(read).await {
                break;
            }

            self.inner.set_state(FeedState::Reconnecting);
            self.drop_writer().await;

            match self.reconnect().await {
                Some(fresh) => read = fresh,
                None => break,
            }
        }

        info!(feed = %self.inner.name, "Feed read loop stopped");
    }

    /// Reads frames until the connection fails or the feed closes.
    async fn read_loop(&mut self, mut read: WsReader) -> DisconnectReason {
        loop {
            tokio::select! {
                biased;

                () = self.closed.closed() => {
                    return DisconnectReason::Shutdown;
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => self.handle_text(&text).await,
                        Some(Ok(WsMessage::Close(frame))) => {
                            warn!(feed = %self.inner.name, ?frame, "WebSocket closed by server");
                            return DisconnectReason::ConnectionError;
                        }
                        Some(Ok(_)) => {} // Binary/Ping/Pong frames
                        Some(Err(e)) => {
                            warn!(feed = %self.inner.name, "WebSocket error: {e}");
                            return DisconnectReason::ConnectionError;
                        }
                        None => {
                            warn!(feed = %self.inner.name, "WebSocket stream ended");
                            return DisconnectReason::ConnectionError;
                        }
                    }
                }
            }
        }
    }

    /// Decodes one text frame and feeds it to the aggregator, committing
    /// when the interval has elapsed. Bad frames are logged and dropped.
    async fn handle_text(&self, text: &str) {
        let tick = match decode_tick(text) {
            Ok(Some(tick)) => tick,
            Ok(None) => return,
            Err(e) => {
                warn!(feed = %self.inner.name, "Dropping message: {e}");
                return;
            }
        };

        let key = SecurityKey::new(self.inner.exchange, &tick.ticker);
        if !self.inner.aggregator.aggregate(&key, tick.price).await {
            return;
        }

        match self.inner.aggregator.commit(&key).await {
            Ok(_) | Err(CandlewickError::NoPriceData) => {}
            Err(e) => warn!(feed = %self.inner.name, %key, "Commit failed: {e}"),
        }
    }

    /// Closes and forgets the stale write half.
    async fn drop_writer(&self) {
        let stale = self.inner.writer.lock().await.take();
        if let Some(mut write) = stale {
            if let Err(e) = write.close().await {
                debug!(feed = %self.inner.name, "Closing stale socket: {e}");
            }
        }
    }

    /// Sleeps, then redials; repeats until connected or closed. Closing
    /// interrupts both the sleep and an in-flight dial.
    async fn reconnect(&mut self) -> Option<WsReader> {
        let backoff = self.inner.backoff;

        loop {
            info!(
                feed = %self.inner.name,
                backoff_secs = backoff.as_secs_f64(),
                "Connection lost, backing off"
            );

            tokio::select! {
                biased;
                () = self.closed.closed() => return None,
                () = tokio::time::sleep(backoff) => {}
            }

            if self.closed.is_closed() {
                return None;
            }

            info!(feed = %self.inner.name, url = %self.inner.url, "Reconnecting");
            let dialed = tokio::select! {
                biased;
                () = self.closed.closed() => return None,
                dialed = dial(&self.inner) => dialed,
            };

            match dialed {
                Ok(read) => {
                    self.inner.set_state(FeedState::Connected);
                    info!(feed = %self.inner.name, "Feed reconnected and subscribed");
                    return Some(read);
                }
                Err(CandlewickError::FeedClosed) => return None,
                Err(e) => error!(feed = %self.inner.name, "Reconnect failed: {e}"),
            }
        }
    }
}

//! Shared test utilities: a local WebSocket server standing in for the
//! exchange.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tungstenite::Message;

/// Coinbase public feed endpoint, used by the live tests.
pub const COINBASE_WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";

/// How long helpers wait before failing a test.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A WebSocket server on a random loopback port. Every accepted connection
/// is handed to the test through [`MockExchange::accept`].
///
/// While [`MockExchange::stall_upgrades`] is in effect, new TCP connections
/// are held open without ever answering the WebSocket upgrade.
pub struct MockExchange {
    url: String,
    connections: mpsc::UnboundedReceiver<MockConnection>,
    stalled: mpsc::UnboundedReceiver<()>,
    stall: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl MockExchange {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock exchange");
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (tx, connections) = mpsc::unbounded_channel();
        let (stalled_tx, stalled) = mpsc::unbounded_channel();
        let stall = Arc::new(AtomicBool::new(false));
        let stall_flag = stall.clone();

        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                if stall_flag.load(Ordering::SeqCst) {
                    held.push(stream);
                    let _ = stalled_tx.send(());
                    continue;
                }
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                if tx.send(MockConnection { ws }).is_err() {
                    break;
                }
            }
        });

        Self {
            url,
            connections,
            stalled,
            stall,
            task,
        }
    }

    /// Holds new connections open without answering their upgrade.
    pub fn stall_upgrades(&self) {
        self.stall.store(true, Ordering::SeqCst);
    }

    /// Answers upgrades again from the next connection on.
    pub fn resume_upgrades(&self) {
        self.stall.store(false, Ordering::SeqCst);
    }

    /// Waits until a client is stuck in a stalled upgrade.
    pub async fn wait_stalled(&mut self) {
        tokio::time::timeout(TIMEOUT, self.stalled.recv())
            .await
            .expect("Timed out waiting for a stalled connection")
            .expect("Mock exchange stopped");
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Waits for the next client connection.
    pub async fn accept(&mut self) -> MockConnection {
        tokio::time::timeout(TIMEOUT, self.connections.recv())
            .await
            .expect("Timed out waiting for a connection")
            .expect("Mock exchange stopped")
    }

    /// Returns `true` if a client connected within `wait`.
    pub async fn connected_within(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.connections.recv())
            .await
            .is_ok_and(|c| c.is_some())
    }
}

impl Drop for MockExchange {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Server side of one client connection.
pub struct MockConnection {
    ws: WebSocketStream<TcpStream>,
}

impl MockConnection {
    /// Reads the next text frame as JSON, skipping control frames.
    pub async fn next_json(&mut self) -> serde_json::Value {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return serde_json::from_str(text.as_str())
                            .expect("Client sent invalid JSON");
                    }
                    Some(Ok(_)) => continue,
                    other => panic!("Connection ended while waiting for a frame: {other:?}"),
                }
            }
        })
        .await
        .expect("Timed out waiting for a frame")
    }

    /// Reads the next frame and asserts it subscribes to `product_ids`.
    pub async fn expect_subscribe(&mut self, product_ids: &[&str]) {
        let value = self.next_json().await;
        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["channels"][0], "ticker");
        assert_eq!(value["product_ids"], serde_json::json!(product_ids));
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("Failed to send frame");
    }

    /// Sends a Coinbase ticker update.
    pub async fn send_tick(&mut self, product_id: &str, price: &str) {
        let text = serde_json::json!({
            "type": "ticker",
            "sequence": 1,
            "product_id": product_id,
            "price": price,
            "side": "buy",
            "time": "2026-01-01T00:00:00.000000Z",
            "trade_id": 1,
            "last_size": "0.01"
        })
        .to_string();
        self.send_text(&text).await;
    }

    /// Waits for the client to close its end.
    pub async fn expect_closed(&mut self) {
        tokio::time::timeout(TIMEOUT, async {
            while let Some(Ok(msg)) = self.ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        })
        .await
        .expect("Client did not close the connection");
    }

    /// Sends a close frame and drops the connection.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

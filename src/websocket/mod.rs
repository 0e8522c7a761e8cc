//! Async WebSocket plumbing for exchange feeds.
//!
//! This module is organized by concern:
//! - [`subscription`] - subscribe handshake sent after every dial
//! - [`handler`] - decoding of inbound frames into ticks
//! - [`connection`] - read loop with fixed-backoff reconnection

pub(crate) mod connection;
mod handler;
mod subscription;

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::info;
use tungstenite::Message;

use crate::Result;

pub use handler::{Tick, decode_tick};
pub use subscription::subscribe;

/// Write half of a feed connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a feed connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`CandlewickError`](crate::CandlewickError) if the connection or
/// TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    // `wss://` needs a process-wide rustls provider. Repeat installs fail and are ignored.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let (ws_stream, _) = connect_async(url).await?;
    info!(url, "WebSocket handshake completed");

    Ok(ws_stream.split())
}

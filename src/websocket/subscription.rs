//! Channel subscription handshake.

use futures_util::SinkExt;
use tracing::{debug, info};
use tungstenite::Message;

use super::WsWriter;
use crate::Result;
use crate::models::coinbase::{Channel, SubscribeRequest};

/// Subscribes to `channel` for the given product ids (e.g. `BTC-USD`).
///
/// An empty product list sends nothing.
///
/// # Errors
///
/// Returns a [`CandlewickError`](crate::CandlewickError) if sending the
/// subscription message fails.
pub async fn subscribe(
    write: &mut WsWriter,
    channel: Channel,
    product_ids: &[String],
) -> Result<()> {
    if product_ids.is_empty() {
        debug!(channel = channel.as_str(), "No products to subscribe");
        return Ok(());
    }

    let request = SubscribeRequest::new(channel, product_ids);
    let json = serde_json::to_string(&request)?;
    debug!("Sending subscribe request: {}", json);
    write.send(Message::Text(json.into())).await?;
    info!(
        channel = channel.as_str(),
        ?product_ids,
        "Subscribed to channel"
    );

    Ok(())
}

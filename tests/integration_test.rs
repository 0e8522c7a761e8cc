//! Live tests against the public Coinbase feed.
//!
//! These tests require network access.
//! Run with: `cargo test --features integration-tests`

#![cfg(feature = "integration-tests")]

mod common;

use std::sync::Arc;

use futures_util::StreamExt;
use candlewick::clock::SystemClock;
use candlewick::config::PlatformConfig;
use candlewick::feed::{Feed, FeedState};
use candlewick::models::coinbase::Channel;
use candlewick::store::{CandlestickStore, MemoryStore};
use candlewick::websocket::{connect, decode_tick, subscribe};

use common::COINBASE_WS_URL;

#[tokio::test]
async fn test_connect_to_coinbase_websocket() {
    let result = connect(COINBASE_WS_URL).await;
    assert!(result.is_ok(), "Failed to connect to Coinbase WebSocket");
}

#[tokio::test]
async fn test_subscribe_and_decode_ticker() {
    let (mut write, mut read) = connect(COINBASE_WS_URL)
        .await
        .expect("Failed to connect");

    subscribe(&mut write, Channel::Ticker, &["BTC-USD".to_string()])
        .await
        .expect("Failed to subscribe to ticker");

    let timeout = tokio::time::timeout(tokio::time::Duration::from_secs(15), async {
        while let Some(msg) = read.next().await {
            if let Ok(tungstenite::Message::Text(text)) = msg {
                if let Ok(Some(tick)) = decode_tick(&text) {
                    return Some(tick);
                }
            }
        }
        None
    });

    let tick = timeout
        .await
        .expect("Timeout waiting for ticker")
        .expect("Stream ended before a ticker arrived");
    assert_eq!(tick.ticker, "BTC");
    assert!(tick.price > 0.0);
}

#[tokio::test]
async fn test_feed_seals_live_candlestick() {
    let mut platform = PlatformConfig::coinbase("coinbase-live", &["BTC"]);
    platform.interval_secs = 1;
    let store = Arc::new(MemoryStore::new());

    let feed = Feed::connect(&platform, store.clone(), Arc::new(SystemClock))
        .await
        .expect("Failed to connect feed");
    assert_eq!(feed.state(), FeedState::Connected);
    let mut subscription = feed.get_channel("COINBASE", "BTC").unwrap();

    let candle = tokio::time::timeout(tokio::time::Duration::from_secs(30), subscription.recv())
        .await
        .expect("Timeout waiting for a candlestick")
        .expect("Subscription ended");

    assert_eq!(candle.exchange, "COINBASE");
    assert_eq!(candle.ticker, "BTC");
    assert!(candle.volume > 0);
    assert!(candle.low <= candle.open && candle.open <= candle.high);
    assert!(store.last_by_ticker("COINBASE", "BTC").await.unwrap().is_some());

    feed.close().await.expect("Failed to close feed");
}

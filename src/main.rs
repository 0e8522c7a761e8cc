use std::sync::Arc;

use candlewick::CandlewickError;
use candlewick::clock::SystemClock;
use candlewick::config::fetch_config;
use candlewick::registry::FeedRegistry;
use candlewick::store::{CandlestickStore, FileStore, MemoryStore};
use tracing::{Level, info};

#[tokio::main]
async fn main() -> Result<(), CandlewickError> {
    let app_config = fetch_config()?;

    let level = if app_config.debug_log {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let store: Arc<dyn CandlestickStore> = match &app_config.store_path {
        Some(path) => Arc::new(FileStore::open(path).await?),
        None => Arc::new(MemoryStore::new()),
    };
    let registry = FeedRegistry::new(store, Arc::new(SystemClock));

    for platform in app_config.enabled_platforms() {
        let feed = registry.connect(platform).await?;

        for security in &platform.securities {
            let mut subscription = feed.get_channel(&security.exchange, &security.ticker)?;
            tokio::spawn(async move {
                while let Some(candlestick) = subscription.recv().await {
                    info!(key = %subscription.key(), "{candlestick}");
                }
            });
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    registry.close_all().await;

    Ok(())
}

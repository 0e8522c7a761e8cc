//! Application configuration loaded from environment variables and an
//! optional JSON file of platform feeds.
//!
//! - `CANDLEWICK_FEEDS_FILE`: JSON array of [`PlatformConfig`]; when unset a
//!   single Coinbase feed for `BTC-USD` is used
//! - `CANDLEWICK_COINBASE_WEBSOCKET_URL`: overrides the base URL of every
//!   Coinbase feed
//! - `CANDLEWICK_STORE_PATH`: JSON-lines candlestick file; in-memory when unset
//! - `CANDLEWICK_ENABLE_DEBUG_LOG`: `true`/`1` enables debug logging

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::CandlewickError;
use crate::models::{Security, coinbase::EXCHANGE_COINBASE};

/// Default public Coinbase feed endpoint.
pub const DEFAULT_COINBASE_WEBSOCKET_URL: &str = "wss://ws-feed.exchange.coinbase.com";

const DEFAULT_INTERVAL_SECS: u64 = 60;
const DEFAULT_RECONNECT_BACKOFF_SECS: u64 = 60;
const DEFAULT_CHANNEL_CAPACITY: usize = 1;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub platforms: Vec<PlatformConfig>,
    pub store_path: Option<PathBuf>,
    pub debug_log: bool,
}

impl AppConfig {
    /// Platforms that should be connected at startup.
    pub fn enabled_platforms(&self) -> impl Iterator<Item = &PlatformConfig> {
        self.platforms.iter().filter(|p| p.enabled)
    }
}

/// Supported market-data platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Coinbase,
}

impl Platform {
    /// Exchange name stamped on candlesticks produced by this platform.
    pub fn exchange(&self) -> &'static str {
        match self {
            Platform::Coinbase => EXCHANGE_COINBASE,
        }
    }
}

/// Everything needed to connect one feed.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub name: String,
    pub platform: Platform,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Aggregation interval length in seconds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Fixed wait between redial attempts in seconds.
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,
    /// Upper bound on dialing and subscribing, in seconds. An attempt that
    /// runs over counts as failed.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Sealed candlesticks buffered per subscriber before publishing blocks.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub securities: Vec<Security>,
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    DEFAULT_COINBASE_WEBSOCKET_URL.to_string()
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_reconnect_backoff_secs() -> u64 {
    DEFAULT_RECONNECT_BACKOFF_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl PlatformConfig {
    /// A Coinbase feed with default settings for the given tickers.
    pub fn coinbase(name: &str, tickers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            platform: Platform::Coinbase,
            enabled: true,
            base_url: default_base_url(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            reconnect_backoff_secs: DEFAULT_RECONNECT_BACKOFF_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            securities: tickers
                .iter()
                .map(|t| Security::new(EXCHANGE_COINBASE, t))
                .collect(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Loads a JSON array of platform configs from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_all(path: &Path) -> crate::Result<Vec<Self>> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CandlewickError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let platforms: Vec<Self> = serde_json::from_str(&contents).map_err(|e| {
            CandlewickError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;

        let mut names = HashSet::new();
        for platform in &platforms {
            platform.validate()?;
            if !names.insert(platform.name.as_str()) {
                return Err(CandlewickError::Config(format!(
                    "duplicate platform name {:?}",
                    platform.name
                )));
            }
        }

        Ok(platforms)
    }

    /// Checks the values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`CandlewickError::Config`] describing the first problem found.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(CandlewickError::Config("platform name is empty".to_string()));
        }
        if self.base_url.trim().is_empty() {
            return Err(CandlewickError::Config(format!(
                "platform {:?} has an empty base_url",
                self.name
            )));
        }
        if self.interval_secs == 0 {
            return Err(CandlewickError::Config(format!(
                "platform {:?} interval_secs must be greater than zero",
                self.name
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(CandlewickError::Config(format!(
                "platform {:?} connect_timeout_secs must be greater than zero",
                self.name
            )));
        }
        if self.channel_capacity == 0 {
            return Err(CandlewickError::Config(format!(
                "platform {:?} channel_capacity must be greater than zero",
                self.name
            )));
        }
        if let Some(s) = self
            .securities
            .iter()
            .find(|s| s.exchange.trim().is_empty() || s.ticker.trim().is_empty())
        {
            return Err(CandlewickError::Config(format!(
                "platform {:?} has an incomplete security {s:?}",
                self.name
            )));
        }
        let exchange = self.platform.exchange();
        if let Some(s) = self
            .securities
            .iter()
            .find(|s| !s.exchange.trim().eq_ignore_ascii_case(exchange))
        {
            return Err(CandlewickError::Config(format!(
                "platform {:?} only serves {exchange}, not {:?}",
                self.name, s.exchange
            )));
        }
        Ok(())
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`CandlewickError::Config`] if the feeds file is unreadable or
/// invalid.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let mut platforms = match non_empty_var("CANDLEWICK_FEEDS_FILE") {
        Some(path) => PlatformConfig::load_all(Path::new(&path))?,
        None => vec![PlatformConfig::coinbase("coinbase", &["BTC"])],
    };

    if let Some(url) = non_empty_var("CANDLEWICK_COINBASE_WEBSOCKET_URL") {
        for platform in platforms
            .iter_mut()
            .filter(|p| p.platform == Platform::Coinbase)
        {
            platform.base_url = url.clone();
        }
    }

    let store_path = non_empty_var("CANDLEWICK_STORE_PATH").map(PathBuf::from);
    let debug_log = non_empty_var("CANDLEWICK_ENABLE_DEBUG_LOG")
        .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

    Ok(AppConfig {
        platforms,
        store_path,
        debug_log,
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

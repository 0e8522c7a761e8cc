use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{CandlestickStore, MemoryStore, Resolution};
use crate::Result;
use crate::models::{Candlestick, SecurityKey};

/// Candlestick store backed by a JSON-lines file.
///
/// Every saved candlestick is appended as one line. Opening the store
/// replays the file into memory so reads never touch disk.
#[derive(Debug)]
pub struct FileStore {
    log: Mutex<AppendLog<tokio::fs::File>>,
    index: MemoryStore,
}

/// Line-oriented writer that fences off a line left torn by a failed write.
#[derive(Debug)]
struct AppendLog<W> {
    writer: W,
    torn: bool,
}

impl<W: AsyncWrite + Unpin> AppendLog<W> {
    fn new(writer: W) -> Self {
        Self {
            writer,
            torn: false,
        }
    }

    /// Appends `json` as one line. After a failed append the next one starts
    /// on a fresh line, so replay skips only the torn fragment.
    async fn append(&mut self, json: &str) -> std::io::Result<()> {
        let mut line = String::with_capacity(json.len() + 2);
        if self.torn {
            line.push('\n');
        }
        line.push_str(json);
        line.push('\n');

        self.torn = true;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        self.torn = false;
        Ok(())
    }
}

impl FileStore {
    /// Opens (creating if needed) the store at `path`.
    ///
    /// Lines that fail to parse are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CandlewickError::Io`](crate::CandlewickError::Io) if the file
    /// cannot be read or opened for appending.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let index = MemoryStore::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for (n, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Candlestick>(line) {
                        Ok(c) => index.insert(c),
                        Err(e) => warn!(
                            path = %path.display(),
                            line = n + 1,
                            "Skipping malformed candlestick: {e}"
                        ),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(path = %path.display(), candlesticks = index.len(), "Opened candlestick store");

        Ok(Self {
            log: Mutex::new(AppendLog::new(file)),
            index,
        })
    }
}

#[async_trait]
impl CandlestickStore for FileStore {
    async fn save_candlestick(&self, candlestick: &Candlestick) -> Result<()> {
        let json = serde_json::to_string(candlestick)?;
        self.log.lock().await.append(&json).await?;

        self.index.insert(candlestick.clone());
        Ok(())
    }

    async fn last_by_ticker(&self, exchange: &str, ticker: &str) -> Result<Option<Candlestick>> {
        Ok(self.index.last(&SecurityKey::new(exchange, ticker)))
    }

    async fn list_by_ticker(
        &self,
        exchange: &str,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<Vec<Candlestick>> {
        Ok(self
            .index
            .range(&SecurityKey::new(exchange, ticker), start, end, resolution))
    }

    async fn list_exchanges(&self) -> Result<Vec<String>> {
        Ok(self.index.exchanges())
    }

    async fn list_tickers(&self, exchange: &str) -> Result<Vec<String>> {
        Ok(self.index.tickers(exchange))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn candle(ticker: &str, close: f64) -> Candlestick {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut c = Candlestick::empty(&SecurityKey::new("COINBASE", ticker), start);
        c.apply(close);
        c.opens_day = true;
        c
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.jsonl");

        {
            let store = FileStore::open(&path).await.unwrap();
            store.save_candlestick(&candle("BTC", 100.0)).await.unwrap();
            store.save_candlestick(&candle("BTC", 101.0)).await.unwrap();
        }

        let store = FileStore::open(&path).await.unwrap();
        let last = store.last_by_ticker("COINBASE", "BTC").await.unwrap().unwrap();
        assert_eq!(last.close, 101.0);
        assert!(last.opens_day);
        assert_eq!(store.list_tickers("COINBASE").await.unwrap(), vec!["BTC"]);
    }

    #[tokio::test]
    async fn skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.jsonl");
        let good = serde_json::to_string(&candle("ETH", 2.5)).unwrap();
        std::fs::write(&path, format!("not json\n{good}\n\n")).unwrap();

        let store = FileStore::open(&path).await.unwrap();
        let last = store.last_by_ticker("COINBASE", "ETH").await.unwrap().unwrap();
        assert_eq!(last.close, 2.5);
        assert_eq!(store.list_exchanges().await.unwrap(), vec!["COINBASE"]);
    }

    #[tokio::test]
    async fn failed_append_does_not_corrupt_the_next_line() {
        let writer = tokio_test::io::Builder::new()
            .write(b"{\"a\":1}\n")
            .write_error(std::io::Error::other("disk full"))
            .write(b"\n{\"b\":2}\n")
            .build();
        let mut log = AppendLog::new(writer);

        log.append(r#"{"a":1}"#).await.unwrap();
        assert!(log.append(r#"{"lost":0}"#).await.is_err());
        log.append(r#"{"b":2}"#).await.unwrap();
    }

    #[tokio::test]
    async fn torn_line_is_skipped_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.jsonl");
        let good = serde_json::to_string(&candle("SOL", 7.0)).unwrap();
        std::fs::write(&path, format!("{{\"exchange\":\"COIN\n{good}\n")).unwrap();

        let store = FileStore::open(&path).await.unwrap();
        let last = store.last_by_ticker("COINBASE", "SOL").await.unwrap().unwrap();
        assert_eq!(last.close, 7.0);
    }

    #[tokio::test]
    async fn open_fails_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileStore::open(dir.path()).await.is_err());
    }
}

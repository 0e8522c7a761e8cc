//! OHLCV candlestick model.

use std::fmt;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::SecurityKey;

/// Price data for one ticker over one aggregation interval.
///
/// While `volume == 0` the price fields carry no meaning. `volume` counts
/// ticks, not traded quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candlestick {
    pub exchange: String,
    pub ticker: String,
    /// When aggregation for this candlestick began.
    pub interval_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    /// First candlestick recorded in a new UTC hour.
    #[serde(default)]
    pub opens_hour: bool,
    /// First candlestick recorded in a new UTC day.
    #[serde(default)]
    pub opens_day: bool,
}

impl Candlestick {
    /// Creates an empty candlestick for `key` starting at `interval_start`.
    #[must_use]
    pub fn empty(key: &SecurityKey, interval_start: DateTime<Utc>) -> Self {
        Self {
            exchange: key.exchange().to_string(),
            ticker: key.ticker().to_string(),
            interval_start,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume: 0,
            opens_hour: false,
            opens_day: false,
        }
    }

    /// Returns `true` once at least one tick has been applied.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.volume > 0
    }

    /// Folds one tick into the candlestick.
    ///
    /// The first tick of the interval sets open, high and low outright, so a
    /// genuine price of `0.0` is not mistaken for an unset field.
    pub fn apply(&mut self, price: f64) {
        if self.has_data() {
            if price > self.high {
                self.high = price;
            }
            if price < self.low {
                self.low = price;
            }
        } else {
            self.open = price;
            self.high = price;
            self.low = price;
        }
        self.close = price;
        self.volume += 1;
    }

    /// The security this candlestick belongs to.
    #[must_use]
    pub fn key(&self) -> SecurityKey {
        SecurityKey::new(&self.exchange, &self.ticker)
    }

    /// Sets the boundary flags by comparing against the previously persisted
    /// candlestick for the same security.
    pub fn tag_boundaries(&mut self, previous: &Candlestick) {
        self.opens_hour =
            hour_bucket(previous.interval_start) != hour_bucket(self.interval_start);
        self.opens_day = previous.interval_start.date_naive() != self.interval_start.date_naive();
    }
}

/// Truncates a timestamp to the start of its UTC hour.
fn hour_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::hours(1)).unwrap_or(ts)
}

impl fmt::Display for Candlestick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} t: {}, o: {:.2}, h: {:.2}, l: {:.2}, c: {:.2}, v: {}",
            self.exchange,
            self.ticker,
            self.interval_start.to_rfc3339(),
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    fn fresh() -> Candlestick {
        Candlestick::empty(&SecurityKey::new("x", "btc"), at(12, 0))
    }

    #[test]
    fn empty_candlestick_has_no_data() {
        let c = fresh();
        assert!(!c.has_data());
        assert_eq!(c.exchange, "X");
        assert_eq!(c.ticker, "BTC");
    }

    #[test]
    fn applies_ticks_in_order() {
        let mut c = fresh();
        for price in [100.0, 105.0, 95.0, 102.0] {
            c.apply(price);
        }

        assert_eq!(c.open, 100.0);
        assert_eq!(c.high, 105.0);
        assert_eq!(c.low, 95.0);
        assert_eq!(c.close, 102.0);
        assert_eq!(c.volume, 4);
    }

    #[test]
    fn ohlc_bounds_hold_for_arbitrary_sequences() {
        let sequences: [&[f64]; 4] = [
            &[1.0],
            &[5.0, 4.0, 3.0, 2.0, 1.0],
            &[0.5, 9.75, 0.25, 3.0, 9.75, 0.25],
            &[42_000.5, 41_999.0, 42_100.25, 42_050.0],
        ];

        for prices in sequences {
            let mut c = fresh();
            for &p in prices {
                c.apply(p);
                assert_eq!(c.close, p);
            }
            assert_eq!(c.open, prices[0]);
            assert!(c.low <= c.open && c.open <= c.high);
            assert!(c.low <= c.close && c.close <= c.high);
            assert!(c.low <= c.high);
            assert_eq!(c.volume, prices.len() as u64);
        }
    }

    #[test]
    fn zero_price_is_real_data() {
        let mut c = fresh();
        c.apply(0.0);
        c.apply(3.0);

        assert_eq!(c.open, 0.0);
        assert_eq!(c.low, 0.0);
        assert_eq!(c.high, 3.0);
    }

    #[test]
    fn tags_new_hour_only() {
        let mut previous = fresh();
        previous.interval_start = at(12, 59);
        let mut c = fresh();
        c.interval_start = at(13, 0);

        c.tag_boundaries(&previous);
        assert!(c.opens_hour);
        assert!(!c.opens_day);
    }

    #[test]
    fn same_hour_is_not_tagged() {
        let mut previous = fresh();
        previous.interval_start = at(12, 1);
        let mut c = fresh();
        c.interval_start = at(12, 2);

        c.tag_boundaries(&previous);
        assert!(!c.opens_hour);
        assert!(!c.opens_day);
    }

    #[test]
    fn same_hour_on_a_different_day_is_tagged() {
        let mut previous = fresh();
        previous.interval_start = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 0).unwrap();
        let mut c = fresh();
        c.interval_start = at(12, 31);

        c.tag_boundaries(&previous);
        assert!(c.opens_hour);
        assert!(c.opens_day);
    }

    #[test]
    fn display_is_compact() {
        let mut c = fresh();
        c.apply(100.0);
        assert_eq!(
            c.to_string(),
            "X-BTC t: 2024-03-10T12:00:00+00:00, o: 100.00, h: 100.00, l: 100.00, c: 100.00, v: 1"
        );
    }
}

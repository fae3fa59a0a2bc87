use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLC candle observation for one time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Start of the candle, epoch milliseconds.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Tick {
    /// Candle start as a UTC timestamp, or `None` if `time` is out of range.
    pub fn open_time(&self) -> Option<DateTime<Utc>> {
        candle_time(self.time)
    }
}

/// Epoch milliseconds as a UTC timestamp, or `None` if out of range.
pub fn candle_time(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Ticks for one instrument, in arrival order.
pub type Series = Vec<Tick>;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChartError;

/// Tradable pair offered by the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    #[default]
    EthUsdt,
    BnbUsdt,
    DotUsdt,
}

impl Instrument {
    pub const ALL: [Instrument; 3] = [
        Instrument::EthUsdt,
        Instrument::BnbUsdt,
        Instrument::DotUsdt,
    ];

    /// Lowercase stream identifier, also used as the storage key suffix.
    pub fn id(&self) -> &'static str {
        match self {
            Instrument::EthUsdt => "ethusdt",
            Instrument::BnbUsdt => "bnbusdt",
            Instrument::DotUsdt => "dotusdt",
        }
    }

    /// Display label for the selector, e.g. `ETH/USDT`.
    pub fn label(&self) -> &'static str {
        match self {
            Instrument::EthUsdt => "ETH/USDT",
            Instrument::BnbUsdt => "BNB/USDT",
            Instrument::DotUsdt => "DOT/USDT",
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Instrument {
    type Err = ChartError;

    /// Accepts the id or the display label, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Instrument::ALL
            .into_iter()
            .find(|i| i.id().eq_ignore_ascii_case(needle) || i.label().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ChartError::UnknownInstrument(s.to_string()))
    }
}

/// Candle bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[default]
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
}

impl Interval {
    pub const ALL: [Interval; 3] = [
        Interval::OneMinute,
        Interval::ThreeMinutes,
        Interval::FiveMinutes,
    ];

    /// Stream suffix, as in `ethusdt@kline_1m`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ChartError::UnknownInterval(s.to_string()))
    }
}

/// The instrument and interval currently shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub instrument: Instrument,
    pub interval: Interval,
}

impl Selection {
    pub fn new(instrument: Instrument, interval: Interval) -> Self {
        Self {
            instrument,
            interval,
        }
    }
}

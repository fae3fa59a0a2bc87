use async_trait::async_trait;
use futures_util::StreamExt;
use kline_chart_core::instrument::{Instrument, Interval};
use kline_chart_core::tick::Tick;
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::feed::{CandleFeed, FrameStream};

/// Stream URL for an (instrument, interval) kline subscription.
pub fn stream_url(endpoint: &str, instrument: Instrument, interval: Interval) -> String {
    format!(
        "{}/{}@kline_{}",
        endpoint.trim_end_matches('/'),
        instrument.id(),
        interval
    )
}

#[derive(Debug, Deserialize)]
struct KlineEvent {
    k: Kline,
}

/// Candle payload. Prices arrive as exchange-formatted decimal strings.
#[derive(Debug, Deserialize)]
struct Kline {
    /// Candle start, epoch milliseconds
    t: i64,
    o: String,
    h: String,
    l: String,
    c: String,
}

fn parse_price(field: &str, raw: &str) -> Result<f64, FeedError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FeedError::Parse(format!("invalid {field} price '{raw}'")))
}

impl Kline {
    fn to_tick(&self) -> Result<Tick, FeedError> {
        Ok(Tick {
            time: self.t,
            open: parse_price("open", &self.o)?,
            high: parse_price("high", &self.h)?,
            low: parse_price("low", &self.l)?,
            close: parse_price("close", &self.c)?,
        })
    }
}

/// Parse one kline frame into a tick.
pub fn parse_frame(text: &str) -> Result<Tick, FeedError> {
    let event: KlineEvent = serde_json::from_str(text)?;
    event.k.to_tick()
}

/// Binance kline streams over WebSocket. No authentication required.
pub struct BinanceFeed {
    endpoint: String,
}

impl BinanceFeed {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
        }
    }
}

impl Default for BinanceFeed {
    fn default() -> Self {
        Self::new(&FeedConfig::default())
    }
}

#[async_trait]
impl CandleFeed for BinanceFeed {
    fn name(&self) -> &str {
        "binance"
    }

    async fn connect(
        &self,
        instrument: Instrument,
        interval: Interval,
    ) -> Result<FrameStream, FeedError> {
        let url = stream_url(&self.endpoint, instrument, interval);
        debug!("connecting to {url}");
        let (ws, response) = connect_async(url.as_str()).await?;
        info!("{instrument}@{interval}: connected ({})", response.status());

        let frames = ws.filter_map(move |message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        warn!("{instrument}@{interval}: ignoring non-UTF-8 binary frame");
                        None
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!("{instrument}@{interval}: server closed stream: {frame:?}");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(FeedError::from(e))),
            }
        });
        Ok(frames.boxed())
    }
}

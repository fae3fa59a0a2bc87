use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use kline_chart_core::instrument::{Instrument, Interval};

use crate::error::FeedError;

/// Raw text frames from one stream, in delivery order. Ends when the stream closes.
pub type FrameStream = BoxStream<'static, Result<String, FeedError>>;

/// Source of live candle frames for an (instrument, interval) pair.
#[async_trait]
pub trait CandleFeed: Send + Sync {
    /// Feed name (for logging/display).
    fn name(&self) -> &str;

    /// Open one stream for the pair.
    async fn connect(
        &self,
        instrument: Instrument,
        interval: Interval,
    ) -> Result<FrameStream, FeedError>;
}

/// Replays fixed frames per pair. Used for tests and offline runs.
#[derive(Default)]
pub struct ScriptedFeed {
    scripts: HashMap<(Instrument, Interval), Vec<String>>,
    hold_open: bool,
    connections: Mutex<Vec<(Instrument, Interval)>>,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames<I, S>(mut self, instrument: Instrument, interval: Interval, frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scripts
            .insert((instrument, interval), frames.into_iter().map(Into::into).collect());
        self
    }

    /// Keep streams open after the last frame instead of ending them.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Pairs connected so far, in order.
    pub fn connections(&self) -> Vec<(Instrument, Interval)> {
        self.connections
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CandleFeed for ScriptedFeed {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(
        &self,
        instrument: Instrument,
        interval: Interval,
    ) -> Result<FrameStream, FeedError> {
        if let Ok(mut connections) = self.connections.lock() {
            connections.push((instrument, interval));
        }
        let frames = self
            .scripts
            .get(&(instrument, interval))
            .cloned()
            .ok_or_else(|| FeedError::Connect(format!("no script for {instrument}@{interval}")))?;

        let replay = stream::iter(frames.into_iter().map(Ok));
        if self.hold_open {
            Ok(replay.chain(stream::pending()).boxed())
        } else {
            Ok(replay.boxed())
        }
    }
}

use std::sync::Arc;

use futures_util::StreamExt;
use kline_chart_core::controller::{Subscription, SubscriptionId};
use kline_chart_core::tick::Tick;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::binance::parse_frame;
use crate::feed::CandleFeed;

/// Event delivered from an ingestor task to the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Tick {
        subscription: SubscriptionId,
        tick: Tick,
    },
    /// The stream ended: closed by the server, failed, or never connected.
    Closed { subscription: SubscriptionId },
}

/// Handle to a running ingestor. Dropping it stops the task.
pub struct IngestorHandle {
    subscription: SubscriptionId,
    task: JoinHandle<()>,
}

impl IngestorHandle {
    /// Subscription this task streams for.
    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// Stop the stream. Frames already queued are left for the controller to discard.
    pub fn close(self) {
        self.task.abort();
    }
}

impl Drop for IngestorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn a task that streams `subscription` and forwards parsed ticks to `events`.
///
/// Malformed frames are logged and skipped. A `Closed` event is sent once the
/// stream ends on its own; no reconnection is attempted.
pub fn spawn(
    feed: Arc<dyn CandleFeed>,
    subscription: Subscription,
    events: mpsc::Sender<FeedEvent>,
) -> IngestorHandle {
    let id = subscription.id;
    let task = tokio::spawn(async move {
        stream_ticks(feed.as_ref(), subscription, &events).await;
        let _ = events.send(FeedEvent::Closed { subscription: id }).await;
    });
    IngestorHandle {
        subscription: id,
        task,
    }
}

async fn stream_ticks(
    feed: &dyn CandleFeed,
    subscription: Subscription,
    events: &mpsc::Sender<FeedEvent>,
) {
    let Subscription {
        id,
        instrument,
        interval,
    } = subscription;

    let mut frames = match feed.connect(instrument, interval).await {
        Ok(frames) => frames,
        Err(e) => {
            warn!("{instrument}@{interval}: {} connect failed: {e}", feed.name());
            return;
        }
    };

    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{instrument}@{interval}: stream {id} failed: {e}");
                return;
            }
        };

        match parse_frame(&frame) {
            Ok(tick) => {
                let event = FeedEvent::Tick {
                    subscription: id,
                    tick,
                };
                if events.send(event).await.is_err() {
                    debug!("{instrument}@{interval}: event loop gone, stopping stream {id}");
                    return;
                }
            }
            Err(e) => warn!("{instrument}@{interval}: discarding frame: {e}"),
        }
    }
    debug!("{instrument}@{interval}: stream {id} ended");
}

use std::sync::Arc;

use kline_chart_core::controller::{SelectionController, TickOutcome, Transition};
use kline_chart_core::instrument::{Instrument, Interval};
use kline_chart_core::projection::ChartData;
use kline_chart_core::store::KeyValueStore;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::FeedConfig;
use crate::feed::CandleFeed;
use crate::ingestor::{self, FeedEvent, IngestorHandle};

/// Selection changes coming from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEvent {
    SelectInstrument(Instrument),
    SelectInterval(Interval),
    Quit,
}

/// Single-threaded event loop tying user events and feed events to the controller.
pub struct Driver<K> {
    feed: Arc<dyn CandleFeed>,
    controller: SelectionController<K>,
    events_tx: mpsc::Sender<FeedEvent>,
    events_rx: mpsc::Receiver<FeedEvent>,
    active: Option<IngestorHandle>,
}

impl<K: KeyValueStore> Driver<K> {
    pub fn new(
        feed: Arc<dyn CandleFeed>,
        controller: SelectionController<K>,
        config: &FeedConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        Self {
            feed,
            controller,
            events_tx,
            events_rx,
            active: None,
        }
    }

    pub fn controller(&self) -> &SelectionController<K> {
        &self.controller
    }

    pub fn chart(&self) -> ChartData {
        ChartData::project(self.controller.series(), self.controller.selection())
    }

    fn execute(&mut self, transition: Transition) {
        if let Some(id) = transition.close
            && let Some(handle) = self.active.take()
        {
            debug!("stopping ingestor {} (closing {id})", handle.subscription());
            handle.close();
        }
        if let Some(subscription) = transition.open {
            self.active = Some(ingestor::spawn(
                Arc::clone(&self.feed),
                subscription,
                self.events_tx.clone(),
            ));
        }
    }

    /// Run until `Quit` or the user channel closes, rendering after every change.
    /// Returns the controller with all subscriptions closed.
    pub async fn run<R>(
        mut self,
        mut user: mpsc::Receiver<UserEvent>,
        mut render: R,
    ) -> SelectionController<K>
    where
        R: FnMut(&ChartData),
    {
        info!("starting with {} feed", self.feed.name());
        let transition = self.controller.start();
        self.execute(transition);
        render(&self.chart());

        loop {
            tokio::select! {
                event = user.recv() => {
                    let transition = match event {
                        Some(UserEvent::SelectInstrument(instrument)) => {
                            self.controller.select_instrument(instrument)
                        }
                        Some(UserEvent::SelectInterval(interval)) => {
                            self.controller.select_interval(interval)
                        }
                        Some(UserEvent::Quit) | None => break,
                    };
                    if !transition.is_empty() {
                        self.execute(transition);
                        render(&self.chart());
                    }
                }
                Some(event) = self.events_rx.recv() => match event {
                    FeedEvent::Tick { subscription, tick } => {
                        let outcome = self.controller.on_tick(subscription, tick);
                        if let TickOutcome::Appended { .. } = outcome {
                            render(&self.chart());
                        }
                    }
                    FeedEvent::Closed { subscription } => {
                        if self.controller.on_closed(subscription) {
                            self.active = None;
                        }
                    }
                },
            }
        }

        let transition = Transition {
            close: self.controller.shutdown(),
            open: None,
        };
        self.execute(transition);
        info!("stopped");
        self.controller
    }
}

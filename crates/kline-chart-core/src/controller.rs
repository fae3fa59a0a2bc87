use std::fmt;

use tracing::{debug, info, warn};

use crate::instrument::{Instrument, Interval, Selection};
use crate::series::SeriesState;
use crate::store::{KeyValueStore, SeriesStore};
use crate::tick::Tick;

/// Generation tag of a stream subscription. Strictly increasing per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One live stream for an (instrument, interval) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub instrument: Instrument,
    pub interval: Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Subscribed(Subscription),
}

/// Stream effects of a selection change, in execution order: close, then open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transition {
    pub close: Option<SubscriptionId>,
    pub open: Option<Subscription>,
}

impl Transition {
    pub fn is_empty(&self) -> bool {
        self.close.is_none() && self.open.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick was appended; `len` is the new series length.
    Appended { len: usize },
    /// The tick belongs to a subscription that is no longer live and was dropped.
    Stale,
}

/// Owns the selection, the in-memory series and the persisted snapshots.
///
/// All mutation goes through the selection handlers and [`on_tick`](Self::on_tick);
/// the caller executes the returned [`Transition`]s against the stream layer.
pub struct SelectionController<K> {
    selection: Selection,
    state: ControllerState,
    series: SeriesState,
    store: SeriesStore<K>,
    next_id: u64,
}

impl<K: KeyValueStore> SelectionController<K> {
    /// Idle controller with the default selection (`ethusdt`, `1m`).
    pub fn new(store: SeriesStore<K>) -> Self {
        Self::with_selection(store, Selection::default())
    }

    /// Idle controller starting from `selection`.
    pub fn with_selection(store: SeriesStore<K>, selection: Selection) -> Self {
        Self {
            selection,
            state: ControllerState::Idle,
            series: SeriesState::new(),
            store,
            next_id: 0,
        }
    }

    /// The instrument and interval currently shown.
    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// In-memory series for every instrument seen this session.
    pub fn series(&self) -> &SeriesState {
        &self.series
    }

    pub fn store(&self) -> &SeriesStore<K> {
        &self.store
    }

    /// The live subscription, if any.
    pub fn subscription(&self) -> Option<Subscription> {
        match self.state {
            ControllerState::Subscribed(sub) => Some(sub),
            ControllerState::Idle => None,
        }
    }

    /// Activate the current selection, as when the view is first shown.
    pub fn start(&mut self) -> Transition {
        self.activate()
    }

    /// Switch instrument, keeping the interval. Selecting the current instrument does nothing.
    pub fn select_instrument(&mut self, instrument: Instrument) -> Transition {
        if self.selection.instrument == instrument {
            return Transition::default();
        }
        self.selection.instrument = instrument;
        self.activate()
    }

    /// Switch interval, keeping the instrument. Selecting the current interval does nothing.
    pub fn select_interval(&mut self, interval: Interval) -> Transition {
        if self.selection.interval == interval {
            return Transition::default();
        }
        self.selection.interval = interval;
        self.activate()
    }

    /// Close whatever is live, then restore a snapshot or open a new subscription.
    fn activate(&mut self) -> Transition {
        let close = self.close_current();
        let Selection {
            instrument,
            interval,
        } = self.selection;

        let restored = match self.store.load(instrument) {
            Ok(series) => series,
            Err(e) => {
                warn!("{instrument}: failed to load saved series, starting empty: {e}");
                Vec::new()
            }
        };

        if !restored.is_empty() {
            info!(
                "{instrument}: restored {} tick(s) from storage, not subscribing",
                restored.len()
            );
            self.series.replace(instrument, restored);
            return Transition { close, open: None };
        }

        self.series.reset(instrument);
        self.next_id += 1;
        let subscription = Subscription {
            id: SubscriptionId(self.next_id),
            instrument,
            interval,
        };
        info!("{instrument}@{interval}: opening subscription {}", subscription.id);
        self.state = ControllerState::Subscribed(subscription);
        Transition {
            close,
            open: Some(subscription),
        }
    }

    fn close_current(&mut self) -> Option<SubscriptionId> {
        match std::mem::replace(&mut self.state, ControllerState::Idle) {
            ControllerState::Subscribed(sub) => {
                info!(
                    "{}@{}: closing subscription {}",
                    sub.instrument, sub.interval, sub.id
                );
                Some(sub.id)
            }
            ControllerState::Idle => None,
        }
    }

    /// Append a tick delivered by subscription `id` and mirror the series to storage.
    pub fn on_tick(&mut self, id: SubscriptionId, tick: Tick) -> TickOutcome {
        let instrument = match self.state {
            ControllerState::Subscribed(sub) if sub.id == id => sub.instrument,
            _ => {
                debug!("dropping tick at {} from closed subscription {id}", tick.time);
                return TickOutcome::Stale;
            }
        };

        let series = self.series.append(instrument, tick);
        let len = series.len();
        debug!("{instrument}: appended tick at {} (close {})", tick.time, tick.close);
        if let Err(e) = self.store.save(instrument, series) {
            warn!("{instrument}: failed to save series ({len} tick(s)): {e}");
        }
        TickOutcome::Appended { len }
    }

    /// The stream behind `id` ended on its own. Returns true if it was the live one.
    pub fn on_closed(&mut self, id: SubscriptionId) -> bool {
        match self.state {
            ControllerState::Subscribed(sub) if sub.id == id => {
                info!(
                    "{}@{}: subscription {id} ended, no further ticks",
                    sub.instrument, sub.interval
                );
                self.state = ControllerState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Close the live subscription, if any. The view is being discarded.
    pub fn shutdown(&mut self) -> Option<SubscriptionId> {
        self.close_current()
    }
}

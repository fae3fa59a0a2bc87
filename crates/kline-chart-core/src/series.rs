use std::collections::HashMap;

use crate::instrument::Instrument;
use crate::tick::{Series, Tick};

/// In-memory series per instrument. The single source of truth for rendering.
#[derive(Debug, Clone, Default)]
pub struct SeriesState {
    series: HashMap<Instrument, Series>,
}

impl SeriesState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tick and return the full series for the instrument.
    pub fn append(&mut self, instrument: Instrument, tick: Tick) -> &[Tick] {
        let series = self.series.entry(instrument).or_default();
        series.push(tick);
        series
    }

    /// Ticks for an instrument; empty if nothing has been received or restored.
    pub fn get(&self, instrument: Instrument) -> &[Tick] {
        self.series.get(&instrument).map_or(&[], Vec::as_slice)
    }

    /// Adopt a restored snapshot, discarding whatever was held in memory.
    pub fn replace(&mut self, instrument: Instrument, series: Series) {
        self.series.insert(instrument, series);
    }

    /// Start an empty series for the instrument.
    pub fn reset(&mut self, instrument: Instrument) {
        self.series.insert(instrument, Vec::new());
    }

    /// Number of ticks held for the instrument.
    pub fn len(&self, instrument: Instrument) -> usize {
        self.get(instrument).len()
    }

    pub fn is_empty(&self, instrument: Instrument) -> bool {
        self.get(instrument).is_empty()
    }
}

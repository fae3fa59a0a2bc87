use crate::instrument::Selection;
use crate::series::SeriesState;

/// Line-chart data for the selected instrument: candle start times against closes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartData {
    pub title: String,
    pub labels: Vec<i64>,
    pub values: Vec<f64>,
}

impl ChartData {
    pub fn project(state: &SeriesState, selection: Selection) -> Self {
        let series = state.get(selection.instrument);
        Self {
            title: format!(
                "{} - {}",
                selection.instrument.id().to_uppercase(),
                selection.interval
            ),
            labels: series.iter().map(|t| t.time).collect(),
            values: series.iter().map(|t| t.close).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Latest (label, value) pair.
    pub fn last(&self) -> Option<(i64, f64)> {
        self.labels.last().copied().zip(self.values.last().copied())
    }
}

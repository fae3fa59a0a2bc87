use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("unknown interval: {0}")]
    UnknownInterval(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Quota exceeded writing {key}: {needed} bytes over a {limit} byte limit")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },
}

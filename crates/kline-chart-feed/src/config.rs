/// Binance spot market stream base URL.
pub const DEFAULT_ENDPOINT: &str = "wss://stream.binance.com:9443/ws";

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Base WebSocket URL; the stream name is appended as a path segment.
    pub endpoint: String,
    /// Capacity of the channel carrying parsed ticks to the event loop.
    pub event_channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            event_channel_capacity: 1024,
        }
    }
}

impl FeedConfig {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}

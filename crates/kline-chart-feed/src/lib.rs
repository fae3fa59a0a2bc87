pub mod binance;
pub mod config;
pub mod driver;
pub mod error;
pub mod feed;
pub mod ingestor;

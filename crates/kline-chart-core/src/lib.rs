pub mod controller;
pub mod error;
pub mod instrument;
pub mod projection;
pub mod series;
pub mod store;
pub mod tick;

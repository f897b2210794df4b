pub mod config;
pub mod donations;
pub mod error;
pub mod telemetry;

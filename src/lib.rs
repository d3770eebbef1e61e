//! # Energy Price Level
//!
//! Classifies hourly electricity prices relative to the daily average and
//! exposes the level of the current hour as a derived sensor that follows
//! its upstream price entity.
//!
//! ## Architecture
//!
//! - `level`: percentage of the daily average to price level
//! - `aggregate`: per-hour breakdown and current-hour selection
//! - `sensor`: reactive sensor driven by upstream change notifications
//! - `host`: host platform capabilities and the in-memory host
//! - `setup`: config entry creation and validation
//! - `persistence`: last-known-value cache across restarts
//! - `config`: YAML configuration
//! - `logging`: structured logging and tracing

pub mod aggregate;
pub mod config;
pub mod error;
pub mod host;
pub mod level;
pub mod logging;
pub mod persistence;
pub mod sensor;
pub mod setup;

// Re-export commonly used types
pub use aggregate::{PriceLevelResult, aggregate};
pub use config::Config;
pub use error::{PriceLevelError, Result};
pub use level::{PriceLevel, classify};
pub use sensor::PriceLevelSensor;

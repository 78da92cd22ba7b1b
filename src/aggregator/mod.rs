//! # Aggregator Module
//!
//! Central collector of drone summaries.
//!
//! This module handles:
//! - Accepting any number of drone connections
//! - Keeping a bounded per-drone time series and anomaly log
//! - Logging each summary and anomaly as it arrives

pub mod series;
pub mod server;

pub use series::{display_timestamp, AggregatorSeries, DroneRecord, Fleet, SeriesPoint};
pub use server::{AggregatorHandle, CentralAggregator};

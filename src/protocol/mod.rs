//! # Wire Protocol Module
//!
//! Records exchanged on both legs of the network (sensor → drone and
//! drone → aggregator).
//!
//! This module handles:
//! - Reading and Summary record shapes (field names are the wire contract)
//! - Accumulate-until-decode framing of self-delimiting JSON records
//! - ISO-8601 UTC timestamps

pub mod types;
pub mod decoder;
pub mod reader;

pub use decoder::RecordDecoder;
pub use reader::{read_records, ConnectionEnd};
pub use types::{utc_timestamp, Anomaly, Reading, Summary};

//! # Edge Sentinel Library
//!
//! Environmental monitoring for a fleet of drones acting as edge nodes.
//!
//! Sensors stream readings to a drone, the drone flags temperature
//! anomalies against a rolling window and periodically forwards a summary
//! to the central aggregator, which keeps a bounded history per drone.
//! A simulated battery takes the drone out of service to recharge.

pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod analysis;
pub mod drone;
pub mod aggregator;
pub mod sensor;

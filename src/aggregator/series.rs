//! # Aggregator Series
//!
//! Per-drone bounded time series and anomaly log, keyed by the `drone_id`
//! each summary asserts.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use crate::protocol::types::{Anomaly, Summary};

/// Points kept per drone
pub const SERIES_CAPACITY: usize = 50;

/// Anomalies kept per drone
pub const ANOMALY_LOG_LIMIT: usize = 1000;

/// One summary's contribution to a series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: String,
    pub avg_temp: f64,
    pub avg_hum: f64,
    pub battery: u8,
}

/// Four parallel bounded sequences, oldest evicted first
#[derive(Debug, Clone)]
pub struct AggregatorSeries {
    timestamps: VecDeque<String>,
    avg_temps: VecDeque<f64>,
    avg_hums: VecDeque<f64>,
    battery: VecDeque<u8>,
    capacity: usize,
}

impl Default for AggregatorSeries {
    fn default() -> Self {
        Self::with_capacity(SERIES_CAPACITY)
    }
}

impl AggregatorSeries {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            timestamps: VecDeque::with_capacity(capacity),
            avg_temps: VecDeque::with_capacity(capacity),
            avg_hums: VecDeque::with_capacity(capacity),
            battery: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, summary: &Summary) {
        if self.timestamps.len() == self.capacity {
            self.timestamps.pop_front();
            self.avg_temps.pop_front();
            self.avg_hums.pop_front();
            self.battery.pop_front();
        }
        self.timestamps.push_back(summary.timestamp.clone());
        self.avg_temps.push_back(summary.average_temperature);
        self.avg_hums.push_back(summary.average_humidity);
        self.battery.push_back(summary.battery_level);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &str> + '_ {
        self.timestamps.iter().map(String::as_str)
    }

    pub fn avg_temps(&self) -> impl Iterator<Item = f64> + '_ {
        self.avg_temps.iter().copied()
    }

    pub fn avg_hums(&self) -> impl Iterator<Item = f64> + '_ {
        self.avg_hums.iter().copied()
    }

    pub fn battery(&self) -> impl Iterator<Item = u8> + '_ {
        self.battery.iter().copied()
    }

    /// Points oldest first
    pub fn points(&self) -> Vec<SeriesPoint> {
        self.timestamps
            .iter()
            .zip(&self.avg_temps)
            .zip(&self.avg_hums)
            .zip(&self.battery)
            .map(|(((timestamp, &avg_temp), &avg_hum), &battery)| SeriesPoint {
                timestamp: timestamp.clone(),
                avg_temp,
                avg_hum,
                battery,
            })
            .collect()
    }
}

/// Everything known about one drone
#[derive(Debug, Clone, Default)]
pub struct DroneRecord {
    pub series: AggregatorSeries,
    pub anomalies: VecDeque<Anomaly>,
    pub latest: Option<Summary>,
    pub summaries: u64,
}

/// All drones seen by the aggregator
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    drones: BTreeMap<String, DroneRecord>,
    total: u64,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one summary into its drone's record, creating it on first sight
    pub fn ingest(&mut self, summary: Summary) {
        let record = self.drones.entry(summary.drone_id.clone()).or_default();

        record.series.push(&summary);
        for anomaly in &summary.anomalies {
            if record.anomalies.len() == ANOMALY_LOG_LIMIT {
                record.anomalies.pop_front();
            }
            record.anomalies.push_back(anomaly.clone());
        }
        record.summaries += 1;
        record.latest = Some(summary);
        self.total += 1;
    }

    pub fn drone_ids(&self) -> Vec<String> {
        self.drones.keys().cloned().collect()
    }

    pub fn get(&self, drone_id: &str) -> Option<&DroneRecord> {
        self.drones.get(drone_id)
    }

    pub fn len(&self) -> usize {
        self.drones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drones.is_empty()
    }

    /// Summaries ingested across all drones
    pub fn total_summaries(&self) -> u64 {
        self.total
    }
}

/// Render `YYYY-MM-DDTHH:MM:SS[.frac]Z` as `YYYY-MM-DD HH:MM:SS`.
///
/// Anything else is returned unchanged.
pub fn display_timestamp(raw: &str) -> String {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ")
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

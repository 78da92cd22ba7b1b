//! # Edge Node State
//!
//! `DroneState` is the battery-owned availability snapshot. It is published
//! by the battery state machine over a `watch` channel; every other
//! component only reads it.
//!
//! `EdgeStore` holds everything the ingestion connections write and the
//! forwarder drains: the rolling windows, the pending anomaly queue, the
//! anomaly history and the set of sensors seen since the last flush. All of
//! it sits behind one mutex, so there is no lock ordering to get wrong. The
//! lock is never held across an `.await`.

use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::analysis::{classify, RollingWindow};
use crate::protocol::types::{round2, Anomaly, Reading};

/// Anomalies kept in the local history log after they are flushed
pub const ANOMALY_HISTORY_LIMIT: usize = 1000;

/// Availability status driven by the battery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DroneStatus {
    /// Ingesting and forwarding
    Normal,
    /// Battery at or below threshold, flying home
    ReturningToBase,
    /// Docked and recharging
    Charging,
}

impl fmt::Display for DroneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DroneStatus::Normal => "normal",
            DroneStatus::ReturningToBase => "returning-to-base",
            DroneStatus::Charging => "charging",
        };
        f.write_str(name)
    }
}

/// Snapshot of the battery-owned state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DroneState {
    /// Battery percentage (0-100)
    pub battery_level: u8,
    pub status: DroneStatus,
}

impl DroneState {
    pub fn new(battery_level: u8) -> Self {
        Self {
            battery_level: battery_level.min(100),
            status: DroneStatus::Normal,
        }
    }

    pub fn is_normal(&self) -> bool {
        self.status == DroneStatus::Normal
    }
}

/// Data drained by one flush cycle
#[derive(Debug, Clone, PartialEq)]
pub struct FlushSnapshot {
    /// Mean of the temperature window, rounded to 2 dp; 0 when empty
    pub average_temperature: f64,
    /// Mean of the humidity window, rounded to 2 dp; 0 when empty
    pub average_humidity: f64,
    pub anomalies: Vec<Anomaly>,
    /// Sorted sensor ids seen since the previous flush
    pub sensor_ids: Vec<String>,
}

#[derive(Debug, Default)]
struct StoreInner {
    temperature: RollingWindow,
    humidity: RollingWindow,
    pending: Vec<Anomaly>,
    history: VecDeque<Anomaly>,
    sensor_ids: BTreeSet<String>,
}

/// Shared ingestion state of an edge node
#[derive(Debug, Default)]
pub struct EdgeStore {
    inner: Mutex<StoreInner>,
}

impl EdgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Folds one reading into the windows and classifies its temperature.
    ///
    /// Returns the anomaly when the temperature was flagged; it has also
    /// been queued for the next flush. Readings with a non-finite value are
    /// dropped, since a summary cannot carry them.
    pub fn record_reading(&self, reading: &Reading) -> Option<Anomaly> {
        if !reading.temperature.is_finite() || !reading.humidity.is_finite() {
            warn!(
                "Dropping reading from {} with non-finite value (temp={}, hum={})",
                reading.sensor_id, reading.temperature, reading.humidity
            );
            return None;
        }

        let mut inner = self.lock();

        inner.sensor_ids.insert(reading.sensor_id.clone());
        inner.temperature.push(reading.temperature);
        inner.humidity.push(reading.humidity);

        debug!(
            "Received {} -> temp={}, hum={}",
            reading.sensor_id, reading.temperature, reading.humidity
        );

        if !classify(reading.temperature, &inner.temperature) {
            return None;
        }

        let anomaly = Anomaly {
            sensor_id: reading.sensor_id.clone(),
            value: reading.temperature,
            timestamp: reading.timestamp.clone(),
        };
        inner.pending.push(anomaly.clone());
        warn!("Anomaly detected: {}", anomaly);
        Some(anomaly)
    }

    /// Snapshots the averages and drains the pending anomalies and seen
    /// sensors in one critical section.
    ///
    /// Drained anomalies move to the history log here, whether or not the
    /// summary built from them is ever delivered.
    pub fn take_flush(&self) -> FlushSnapshot {
        let mut inner = self.lock();

        let average_temperature = round2(inner.temperature.mean().unwrap_or(0.0));
        let average_humidity = round2(inner.humidity.mean().unwrap_or(0.0));

        let anomalies = std::mem::take(&mut inner.pending);
        for anomaly in &anomalies {
            if inner.history.len() == ANOMALY_HISTORY_LIMIT {
                inner.history.pop_front();
            }
            inner.history.push_back(anomaly.clone());
        }

        let sensor_ids = std::mem::take(&mut inner.sensor_ids).into_iter().collect();

        FlushSnapshot {
            average_temperature,
            average_humidity,
            anomalies,
            sensor_ids,
        }
    }

    /// Anomalies already drained by past flushes, oldest first
    pub fn anomaly_history(&self) -> Vec<Anomaly> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn pending_anomalies(&self) -> usize {
        self.lock().pending.len()
    }

    /// Samples currently in the temperature window
    pub fn temperature_samples(&self) -> usize {
        self.lock().temperature.len()
    }
}

//! # Summary Forwarder
//!
//! Periodically drains the `EdgeStore` into a `Summary` and sends it to the
//! aggregator over a single long-lived connection.
//!
//! ## Delivery
//!
//! Delivery is at-most-once. The pending anomalies and seen sensors are
//! cleared when the summary is built, before the send is attempted, so a
//! failed send loses that cycle's anomalies and sensor ids. They still land
//! in the local anomaly history. Nothing is ever sent twice.
//!
//! ## Failures
//!
//! A failed connect or send is logged, followed by a fixed
//! `retry_interval` pause and a fresh connect. Retries never stop and the
//! pause never grows.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::link::{SummaryChannel, SummaryLink};
use super::state::{DroneState, EdgeStore};
use crate::config::TimingConfig;
use crate::protocol::types::{utc_timestamp, Summary};

/// Forwarder identity and timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderSettings {
    pub drone_id: String,
    pub flush_interval: Duration,
    pub retry_interval: Duration,
}

impl ForwarderSettings {
    pub fn new(drone_id: impl Into<String>, timing: &TimingConfig) -> Self {
        Self {
            drone_id: drone_id.into(),
            flush_interval: timing.flush_interval(),
            retry_interval: timing.retry_interval(),
        }
    }
}

/// Drain the store into a fresh summary
pub fn build_summary(drone_id: &str, store: &EdgeStore, state: DroneState) -> Summary {
    let flush = store.take_flush();
    Summary {
        drone_id: drone_id.to_string(),
        sensor_ids: flush.sensor_ids,
        average_temperature: flush.average_temperature,
        average_humidity: flush.average_humidity,
        anomalies: flush.anomalies,
        battery_level: state.battery_level,
        timestamp: utc_timestamp(),
    }
}

enum SessionEnd {
    Shutdown,
    SendFailed(std::io::Error),
}

/// Periodic summary sender
pub struct SummaryForwarder {
    settings: ForwarderSettings,
    store: Arc<EdgeStore>,
    state: watch::Receiver<DroneState>,
    link: Arc<dyn SummaryLink>,
}

impl std::fmt::Debug for SummaryForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryForwarder")
            .field("settings", &self.settings)
            .field("endpoint", &self.link.endpoint())
            .finish_non_exhaustive()
    }
}

impl SummaryForwarder {
    pub fn new(
        settings: ForwarderSettings,
        store: Arc<EdgeStore>,
        state: watch::Receiver<DroneState>,
        link: Arc<dyn SummaryLink>,
    ) -> Self {
        Self {
            settings,
            store,
            state,
            link,
        }
    }

    /// Run on a new task
    pub fn spawn(self) -> ForwarderHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        ForwarderHandle { shutdown, task }
    }

    /// Connect, flush, reconnect on failure; until `shutdown` reads `true`
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let endpoint = self.link.endpoint().to_string();

        loop {
            let connected = tokio::select! {
                _ = shutdown.wait_for(|&stop| stop) => return,
                connected = self.link.connect() => connected,
            };

            match connected {
                Ok(mut channel) => {
                    info!("Connected to aggregator at {}", endpoint);
                    match self.session(channel.as_mut(), &mut shutdown).await {
                        SessionEnd::Shutdown => return,
                        SessionEnd::SendFailed(e) => {
                            warn!("Error sending to aggregator at {}: {}", endpoint, e)
                        }
                    }
                }
                Err(e) => warn!("Failed to connect to aggregator at {}: {}", endpoint, e),
            }

            debug!("Retrying aggregator connection in {:?}", self.settings.retry_interval);
            tokio::select! {
                _ = shutdown.wait_for(|&stop| stop) => return,
                _ = sleep(self.settings.retry_interval) => {}
            }
        }
    }

    async fn session(
        &self,
        channel: &mut dyn SummaryChannel,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            let state = *self.state.borrow();

            if state.is_normal() {
                let summary = build_summary(&self.settings.drone_id, &self.store, state);
                let payload = match serde_json::to_vec(&summary) {
                    Ok(payload) => payload,
                    Err(e) => {
                        return SessionEnd::SendFailed(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            e,
                        ))
                    }
                };

                let sent = tokio::select! {
                    _ = shutdown.wait_for(|&stop| stop) => return SessionEnd::Shutdown,
                    sent = channel.send(&payload) => sent,
                };
                if let Err(e) = sent {
                    if !summary.anomalies.is_empty() || !summary.sensor_ids.is_empty() {
                        warn!(
                            "Summary lost: {} anomalies from {} sensors not delivered",
                            summary.anomalies.len(),
                            summary.sensor_ids.len()
                        );
                    }
                    return SessionEnd::SendFailed(e);
                }

                info!(
                    "Sent summary: sensors={:?} avg_temp={} avg_hum={} anomalies={} battery={}%",
                    summary.sensor_ids,
                    summary.average_temperature,
                    summary.average_humidity,
                    summary.anomalies.len(),
                    summary.battery_level
                );
            } else {
                debug!("Skipping summary while {}", state.status);
            }

            tokio::select! {
                _ = shutdown.wait_for(|&stop| stop) => return SessionEnd::Shutdown,
                _ = sleep(self.settings.flush_interval) => {}
            }
        }
    }
}

/// A spawned forwarder task
#[derive(Debug)]
pub struct ForwarderHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ForwarderHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the task and wait for it to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Summary forwarder ended abnormally: {}", e);
        }
        info!("Summary forwarder stopped");
    }
}

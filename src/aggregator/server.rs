//! # Central Aggregator Server
//!
//! Accepts drone connections and folds every summary into the `Fleet`.
//!
//! Each drone connection decodes summaries on its own task and pushes them
//! onto one delivery queue. A single writer task drains that queue, so
//! summaries from one connection are applied in arrival order and the fleet
//! has exactly one mutator.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

use super::series::{display_timestamp, Fleet, SeriesPoint};
use crate::error::{EdgeError, Result};
use crate::protocol::reader::read_records;
use crate::protocol::types::{Anomaly, Summary};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Entry point for the aggregator
#[derive(Debug)]
pub struct CentralAggregator;

impl CentralAggregator {
    /// Bind `addr` and start accepting drones
    ///
    /// # Errors
    ///
    /// Returns `EdgeError::Bind` if the listener cannot be opened
    pub async fn start(addr: &str) -> Result<AggregatorHandle> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| EdgeError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Aggregator listening for drones on {}", local_addr);

        let fleet = Arc::new(RwLock::new(Fleet::new()));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let writer = tokio::spawn(apply_summaries(queue_rx, Arc::clone(&fleet)));
        let acceptor = tokio::spawn(accept_loop(listener, queue_tx, shutdown_rx));

        Ok(AggregatorHandle {
            local_addr,
            fleet,
            shutdown,
            acceptor,
            writer,
        })
    }
}

/// A running aggregator
#[derive(Debug)]
pub struct AggregatorHandle {
    local_addr: SocketAddr,
    fleet: Arc<RwLock<Fleet>>,
    shutdown: watch::Sender<bool>,
    acceptor: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl AggregatorHandle {
    fn read(&self) -> RwLockReadGuard<'_, Fleet> {
        self.fleet.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        !self.acceptor.is_finished()
    }

    /// Drones seen so far, sorted
    pub fn drone_ids(&self) -> Vec<String> {
        self.read().drone_ids()
    }

    /// Series points of one drone, oldest first
    pub fn series(&self, drone_id: &str) -> Vec<SeriesPoint> {
        self.read()
            .get(drone_id)
            .map(|record| record.series.points())
            .unwrap_or_default()
    }

    /// Anomaly log of one drone, oldest first
    pub fn anomalies(&self, drone_id: &str) -> Vec<Anomaly> {
        self.read()
            .get(drone_id)
            .map(|record| record.anomalies.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Most recent summary from one drone
    pub fn latest(&self, drone_id: &str) -> Option<Summary> {
        self.read().get(drone_id).and_then(|record| record.latest.clone())
    }

    pub fn summaries_received(&self) -> u64 {
        self.read().total_summaries()
    }

    /// Copy of the whole fleet
    pub fn snapshot(&self) -> Fleet {
        self.read().clone()
    }

    /// Stop accepting, close every drone connection, then let the writer
    /// drain what was already queued.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.acceptor.await {
            warn!("Drone accept loop ended abnormally: {}", e);
        }
        if let Err(e) = self.writer.await {
            warn!("Summary writer ended abnormally: {}", e);
        }
        info!("Aggregator on {} stopped", self.local_addr);
    }
}

async fn accept_loop(
    listener: TcpListener,
    queue: mpsc::UnboundedSender<Summary>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut drones = JoinSet::new();
    let connection_shutdown = shutdown.clone();

    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|&stop| stop).await; } => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("Drone connected from {}", peer);
                    drones.spawn(serve_drone(stream, peer, queue.clone(), connection_shutdown.clone()));
                }
                Err(e) => {
                    warn!("Failed to accept drone connection: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(_) = drones.join_next(), if !drones.is_empty() => {}
        }
    }

    drop(listener);
    while drones.join_next().await.is_some() {}
}

async fn serve_drone(
    stream: TcpStream,
    peer: SocketAddr,
    queue: mpsc::UnboundedSender<Summary>,
    shutdown: watch::Receiver<bool>,
) {
    let (_, summaries) = read_records(stream, peer, "drone", shutdown, |summary: Summary| {
        // The writer only goes away after every connection has ended
        let _ = queue.send(summary);
    })
    .await;

    info!("Drone disconnected from {} ({} summaries)", peer, summaries);
}

async fn apply_summaries(mut queue: mpsc::UnboundedReceiver<Summary>, fleet: Arc<RwLock<Fleet>>) {
    while let Some(summary) = queue.recv().await {
        log_summary(&summary);
        fleet
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .ingest(summary);
    }
}

fn log_summary(summary: &Summary) {
    info!(
        "[{}] {}: avg_temp={} avg_hum={} battery={}% sensors={:?}",
        display_timestamp(&summary.timestamp),
        summary.drone_id,
        summary.average_temperature,
        summary.average_humidity,
        summary.battery_level,
        summary.sensor_ids
    );
    for anomaly in &summary.anomalies {
        warn!("Anomaly from {}: {}", summary.drone_id, anomaly);
    }
}

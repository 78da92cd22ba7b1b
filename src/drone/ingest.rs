//! # Sensor Ingestion Server
//!
//! Accepts sensor connections and folds their readings into the
//! `EdgeStore`.
//!
//! This module handles:
//! - Binding the sensor listener (a bind failure is returned to the caller)
//! - One receive task per accepted sensor
//! - Refusing new sensors while the drone is not `Normal`
//! - Tracking the active connections
//! - Stopping: the accept loop exits, every connection is closed, and only
//!   then is the active set cleared

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::state::{DroneState, EdgeStore};
use crate::error::{EdgeError, Result};
use crate::protocol::reader::{read_records, ConnectionEnd};
use crate::protocol::types::Reading;

/// Pause after a failed `accept` before trying again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Addresses of the currently connected sensors
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peers: Mutex<HashSet<SocketAddr>>,
}

impl ConnectionRegistry {
    fn lock(&self) -> MutexGuard<'_, HashSet<SocketAddr>> {
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(&self, peer: SocketAddr) {
        self.lock().insert(peer);
    }

    fn remove(&self, peer: &SocketAddr) {
        self.lock().remove(peer);
    }

    fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn peers(&self) -> Vec<SocketAddr> {
        self.lock().iter().copied().collect()
    }
}

/// A running sensor listener and its accept loop
#[derive(Debug)]
pub struct IngestionServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    connections: Arc<ConnectionRegistry>,
}

impl IngestionServer {
    /// Bind `addr` and start accepting sensors
    ///
    /// # Arguments
    ///
    /// * `addr` - Listen address, e.g. "0.0.0.0:9000"
    /// * `store` - Shared ingestion state
    /// * `state` - Battery-owned state; new sensors are refused unless `Normal`
    ///
    /// # Errors
    ///
    /// Returns `EdgeError::Bind` if the listener cannot be opened
    pub async fn start(
        addr: &str,
        store: Arc<EdgeStore>,
        state: watch::Receiver<DroneState>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| EdgeError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Drone listening for sensors on {}", local_addr);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let connections = Arc::new(ConnectionRegistry::default());
        let task = tokio::spawn(accept_loop(
            listener,
            store,
            state,
            Arc::clone(&connections),
            shutdown_rx,
        ));

        Ok(Self {
            local_addr,
            shutdown,
            task,
            connections,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the accept loop is still alive
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn active_connections(&self) -> Vec<SocketAddr> {
        self.connections.peers()
    }

    /// Stop accepting, close every sensor connection, then clear the
    /// active set.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Sensor accept loop ended abnormally: {}", e);
        }
        self.connections.clear();
        info!("Sensor listener on {} stopped", self.local_addr);
    }
}

async fn accept_loop(
    listener: TcpListener,
    store: Arc<EdgeStore>,
    state: watch::Receiver<DroneState>,
    connections: Arc<ConnectionRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sensors = JoinSet::new();
    let connection_shutdown = shutdown.clone();

    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|&stop| stop).await; } => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let current = *state.borrow();
                    if !current.is_normal() {
                        debug!("Refusing sensor {} while {}", peer, current.status);
                        continue;
                    }
                    info!("Sensor connected from {}", peer);
                    connections.insert(peer);
                    sensors.spawn(serve_sensor(
                        stream,
                        peer,
                        Arc::clone(&store),
                        Arc::clone(&connections),
                        connection_shutdown.clone(),
                    ));
                }
                Err(e) => {
                    warn!("Failed to accept sensor connection: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(_) = sensors.join_next(), if !sensors.is_empty() => {}
        }
    }

    drop(listener);
    while sensors.join_next().await.is_some() {}
}

async fn serve_sensor(
    stream: TcpStream,
    peer: SocketAddr,
    store: Arc<EdgeStore>,
    connections: Arc<ConnectionRegistry>,
    shutdown: watch::Receiver<bool>,
) {
    let (end, readings) = read_records(stream, peer, "sensor", shutdown, |reading: Reading| {
        store.record_reading(&reading);
    })
    .await;

    connections.remove(&peer);
    match end {
        ConnectionEnd::Shutdown => info!("Closed sensor connection {} ({} readings)", peer, readings),
        _ => info!("Sensor disconnected from {} ({} readings)", peer, readings),
    }
}

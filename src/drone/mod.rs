//! # Drone Edge Node Module
//!
//! The edge node runtime: sensor ingestion, anomaly tracking, the battery
//! lifecycle and the summary forwarder.
//!
//! This module handles:
//! - Wiring the shared `EdgeStore` between ingestion and forwarding
//! - Starting and stopping both services as the battery dictates, without
//!   ever running two listeners or two forwarders at once
//! - Running until the shutdown signal

pub mod state;
pub mod ingest;
pub mod battery;
pub mod link;
pub mod forwarder;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::config::{Config, TimingConfig};
use crate::error::Result;
use battery::{BatteryModel, BatteryStateMachine, BatteryTiming, Lifecycle};
use forwarder::{ForwarderHandle, ForwarderSettings, SummaryForwarder};
use ingest::IngestionServer;
use link::{SummaryLink, TcpSummaryLink};
use state::{DroneState, EdgeStore};

/// Everything an edge node needs to run
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub drone_id: String,
    pub listen_addr: String,
    pub aggregator_addr: String,
    pub battery_initial: u8,
    pub battery_threshold: u8,
    pub timing: TimingConfig,
}

impl NodeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            drone_id: config.drone.id.clone(),
            listen_addr: config.drone.listen_addr(),
            aggregator_addr: config.aggregator.addr(),
            battery_initial: config.drone.battery_initial,
            battery_threshold: config.drone.battery_threshold,
            timing: config.timing.clone(),
        }
    }
}

/// Ingestion and forwarding, started and stopped as a pair
pub struct EdgeServices {
    listen_addr: String,
    forwarder_settings: ForwarderSettings,
    store: Arc<EdgeStore>,
    state: watch::Receiver<DroneState>,
    link: Arc<dyn SummaryLink>,
    ingestion: Option<IngestionServer>,
    forwarder: Option<ForwarderHandle>,
}

impl std::fmt::Debug for EdgeServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeServices")
            .field("listen_addr", &self.listen_addr)
            .field("ingestion", &self.ingestion)
            .field("forwarder", &self.forwarder)
            .finish_non_exhaustive()
    }
}

impl EdgeServices {
    pub fn new(
        listen_addr: impl Into<String>,
        forwarder_settings: ForwarderSettings,
        store: Arc<EdgeStore>,
        state: watch::Receiver<DroneState>,
        link: Arc<dyn SummaryLink>,
    ) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            forwarder_settings,
            store,
            state,
            link,
            ingestion: None,
            forwarder: None,
        }
    }

    pub fn ingestion(&self) -> Option<&IngestionServer> {
        self.ingestion.as_ref()
    }

    pub fn is_ingesting(&self) -> bool {
        self.ingestion.as_ref().is_some_and(IngestionServer::is_running)
    }

    pub fn is_forwarding(&self) -> bool {
        self.forwarder.as_ref().is_some_and(ForwarderHandle::is_running)
    }
}

#[async_trait]
impl Lifecycle for EdgeServices {
    async fn suspend(&mut self) {
        if let Some(server) = self.ingestion.take() {
            server.stop().await;
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.stop().await;
        }
        info!("Ingestion and forwarding suspended");
    }

    async fn resume(&mut self) -> Result<()> {
        if !self.is_ingesting() {
            // Reap a loop that died on its own before binding again
            if let Some(stale) = self.ingestion.take() {
                stale.stop().await;
            }
            let server = IngestionServer::start(
                &self.listen_addr,
                Arc::clone(&self.store),
                self.state.clone(),
            )
            .await?;
            self.ingestion = Some(server);
        }

        if !self.is_forwarding() {
            if let Some(stale) = self.forwarder.take() {
                stale.stop().await;
            }
            let forwarder = SummaryForwarder::new(
                self.forwarder_settings.clone(),
                Arc::clone(&self.store),
                self.state.clone(),
                Arc::clone(&self.link),
            );
            self.forwarder = Some(forwarder.spawn());
        }

        Ok(())
    }
}

/// A complete edge node
#[derive(Debug)]
pub struct EdgeNode {
    settings: NodeSettings,
    store: Arc<EdgeStore>,
    battery: BatteryStateMachine,
}

impl EdgeNode {
    pub fn new(settings: NodeSettings) -> Self {
        let battery = BatteryStateMachine::new(
            BatteryModel::new(settings.battery_initial, settings.battery_threshold),
            BatteryTiming::from(&settings.timing),
        );
        Self {
            settings,
            store: Arc::new(EdgeStore::new()),
            battery,
        }
    }

    pub fn store(&self) -> Arc<EdgeStore> {
        Arc::clone(&self.store)
    }

    /// Read-only view of the battery-owned state
    pub fn state(&self) -> watch::Receiver<DroneState> {
        self.battery.subscribe()
    }

    /// Run over TCP until `shutdown` reads `true`
    ///
    /// # Errors
    ///
    /// Returns an error if the sensor listener cannot be bound, at start or
    /// after a recharge.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let link = Arc::new(TcpSummaryLink::new(self.settings.aggregator_addr.clone()));
        self.run_with_link(link, shutdown).await
    }

    /// Run with a custom aggregator link
    pub async fn run_with_link(
        self,
        link: Arc<dyn SummaryLink>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(
            "Drone {} starting (sensors on {}, aggregator at {})",
            self.settings.drone_id,
            self.settings.listen_addr,
            link.endpoint()
        );

        let mut services = EdgeServices::new(
            self.settings.listen_addr.clone(),
            ForwarderSettings::new(self.settings.drone_id.clone(), &self.settings.timing),
            Arc::clone(&self.store),
            self.battery.subscribe(),
            link,
        );

        services.resume().await?;
        let result = self.battery.run(&mut services, shutdown).await;
        services.suspend().await;

        info!("Drone {} stopped", self.settings.drone_id);
        result
    }
}

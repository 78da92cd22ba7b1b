//! # Battery State Machine
//!
//! Simulated power budget of the edge node and the availability lifecycle
//! it drives.
//!
//! ```text
//!            tick: level -= 1            after return_to_base
//!   Normal ───────────────────► ReturningToBase ──────────────► Charging
//!     ▲      (level <= threshold)                                  │
//!     └────────────────────────────────────────────────────────────┘
//!                    after charge: level = 100, resume services
//! ```
//!
//! The boundary is inclusive: the tick that brings the level down to the
//! threshold is the tick that turns the drone around. The loop never
//! terminates on its own; only the shutdown signal (or a failed resume)
//! ends it.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

use super::state::{DroneState, DroneStatus};
use crate::config::TimingConfig;
use crate::error::Result;

/// Battery level after a full recharge
pub const FULL_CHARGE: u8 = 100;

/// A status change produced by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Normal → ReturningToBase
    ReturnToBase,
    /// ReturningToBase → Charging
    Docked,
    /// Charging → Normal
    Recharged,
}

/// Pure battery model: linear integer drain, fixed thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryModel {
    level: u8,
    threshold: u8,
    status: DroneStatus,
}

impl BatteryModel {
    #[must_use]
    pub fn new(initial_level: u8, threshold: u8) -> Self {
        Self {
            level: initial_level.min(FULL_CHARGE),
            threshold,
            status: DroneStatus::Normal,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn status(&self) -> DroneStatus {
        self.status
    }

    pub fn state(&self) -> DroneState {
        DroneState {
            battery_level: self.level,
            status: self.status,
        }
    }

    /// One drain period elapsed. Ignored unless `Normal`.
    pub fn tick(&mut self) -> Option<Transition> {
        if self.status != DroneStatus::Normal {
            return None;
        }

        self.level = self.level.saturating_sub(1);

        if self.level <= self.threshold {
            self.status = DroneStatus::ReturningToBase;
            return Some(Transition::ReturnToBase);
        }
        None
    }

    /// The return flight is over
    pub fn arrive_at_base(&mut self) -> Option<Transition> {
        if self.status != DroneStatus::ReturningToBase {
            return None;
        }
        self.status = DroneStatus::Charging;
        Some(Transition::Docked)
    }

    /// Charging is over
    pub fn finish_charging(&mut self) -> Option<Transition> {
        if self.status != DroneStatus::Charging {
            return None;
        }
        self.level = FULL_CHARGE;
        self.status = DroneStatus::Normal;
        Some(Transition::Recharged)
    }
}

/// Timer periods of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryTiming {
    /// Drain period while `Normal`
    pub tick: Duration,
    /// Time spent in `ReturningToBase`
    pub return_to_base: Duration,
    /// Time spent in `Charging`
    pub charge: Duration,
}

impl From<&TimingConfig> for BatteryTiming {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            tick: timing.battery_tick(),
            return_to_base: timing.return_to_base(),
            charge: timing.charge(),
        }
    }
}

/// Services whose lifecycle follows the battery
#[async_trait]
pub trait Lifecycle: Send {
    /// Stop ingestion and forwarding. Must not return before every sensor
    /// connection is closed.
    async fn suspend(&mut self);

    /// Start ingestion and forwarding, skipping whichever is still running.
    async fn resume(&mut self) -> Result<()>;
}

/// Timer-driven owner of `DroneState`
#[derive(Debug)]
pub struct BatteryStateMachine {
    model: BatteryModel,
    timing: BatteryTiming,
    state: watch::Sender<DroneState>,
}

impl BatteryStateMachine {
    pub fn new(model: BatteryModel, timing: BatteryTiming) -> Self {
        let (state, _) = watch::channel(model.state());
        Self {
            model,
            timing,
            state,
        }
    }

    /// Read-only view of the published state
    pub fn subscribe(&self) -> watch::Receiver<DroneState> {
        self.state.subscribe()
    }

    pub fn model(&self) -> &BatteryModel {
        &self.model
    }

    fn publish(&self) {
        self.state.send_replace(self.model.state());
    }

    /// Drive the machine until `shutdown` reads `true`
    ///
    /// # Errors
    ///
    /// Returns the error from `Lifecycle::resume` (a listener that cannot
    /// be re-bound); the machine stops there.
    pub async fn run<L: Lifecycle + ?Sized>(
        mut self,
        lifecycle: &mut L,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(
            "Battery at {}% (return threshold {}%)",
            self.model.level(),
            self.model.threshold()
        );

        loop {
            let delay = match self.model.status() {
                DroneStatus::Normal => self.timing.tick,
                DroneStatus::ReturningToBase => self.timing.return_to_base,
                DroneStatus::Charging => self.timing.charge,
            };

            tokio::select! {
                _ = shutdown.wait_for(|&stop| stop) => return Ok(()),
                _ = sleep(delay) => {}
            }

            self.step(lifecycle).await?;
        }
    }

    async fn step<L: Lifecycle + ?Sized>(&mut self, lifecycle: &mut L) -> Result<()> {
        match self.model.status() {
            DroneStatus::Normal => {
                let transition = self.model.tick();
                // Publish first so the ingestion gate closes before teardown
                self.publish();
                info!("Battery level: {}%", self.model.level());

                if transition == Some(Transition::ReturnToBase) {
                    warn!(
                        "Battery low ({}% <= {}%) - Returning to base!",
                        self.model.level(),
                        self.model.threshold()
                    );
                    lifecycle.suspend().await;
                }
            }
            DroneStatus::ReturningToBase => {
                self.model.arrive_at_base();
                self.publish();
                info!("Arrived at base, charging");
            }
            DroneStatus::Charging => {
                self.model.finish_charging();
                self.publish();
                info!("Battery recharged to {}%, resuming operations", self.model.level());
                lifecycle.resume().await?;
            }
        }
        Ok(())
    }
}

//! # Edge Sentinel
//!
//! Runs a drone edge node, the central aggregator, or a simulated sensor.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info};

use edge_sentinel::aggregator::CentralAggregator;
use edge_sentinel::config::Config;
use edge_sentinel::drone::{EdgeNode, NodeSettings};
use edge_sentinel::logging::init_logging;
use edge_sentinel::sensor::{run_sensor, SensorSettings};

#[derive(Parser)]
#[command(name = "edge-sentinel")]
#[command(version)]
#[command(about = "Drone edge nodes and central aggregator for field sensor monitoring", long_about = None)]
struct Cli {
    /// TOML configuration file (built-in defaults when omitted)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a drone edge node
    Drone {
        /// Drone identifier reported in every summary
        #[arg(long)]
        id: Option<String>,

        /// Port the sensor listener binds
        #[arg(long)]
        listen_port: Option<u16>,

        /// Aggregator host
        #[arg(long)]
        server_ip: Option<String>,

        /// Aggregator port
        #[arg(long)]
        server_port: Option<u16>,

        /// Battery level (percent) at which the drone returns to base
        #[arg(long)]
        battery_threshold: Option<u8>,

        /// Battery level (percent) at start-up
        #[arg(long)]
        battery_initial: Option<u8>,
    },

    /// Run a simulated field sensor
    Sensor {
        /// Sensor identifier stamped on every reading
        #[arg(long)]
        id: Option<String>,

        /// Drone host
        #[arg(long)]
        drone_ip: Option<String>,

        /// Drone port
        #[arg(long)]
        drone_port: Option<u16>,

        /// Seconds between readings
        #[arg(long)]
        interval: Option<f64>,
    },

    /// Run the central aggregator
    Aggregator {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to bind
        #[arg(long)]
        port: Option<u16>,
    },
}

impl Commands {
    fn role(&self) -> &'static str {
        match self {
            Commands::Drone { .. } => "drone",
            Commands::Sensor { .. } => "sensor",
            Commands::Aggregator { .. } => "aggregator",
        }
    }

    /// Fold command-line overrides into the loaded configuration
    fn apply(&self, config: &mut Config) {
        match self {
            Commands::Drone {
                id,
                listen_port,
                server_ip,
                server_port,
                battery_threshold,
                battery_initial,
            } => {
                if let Some(id) = id {
                    config.drone.id = id.clone();
                }
                if let Some(port) = listen_port {
                    config.drone.listen_port = *port;
                }
                if let Some(host) = server_ip {
                    config.aggregator.host = host.clone();
                }
                if let Some(port) = server_port {
                    config.aggregator.port = *port;
                }
                if let Some(threshold) = battery_threshold {
                    config.drone.battery_threshold = *threshold;
                }
                if let Some(initial) = battery_initial {
                    config.drone.battery_initial = *initial;
                }
            }
            Commands::Sensor {
                id,
                drone_ip,
                drone_port,
                interval,
            } => {
                if let Some(id) = id {
                    config.sensor.id = id.clone();
                }
                if let Some(host) = drone_ip {
                    config.sensor.drone_host = host.clone();
                }
                if let Some(port) = drone_port {
                    config.sensor.drone_port = *port;
                }
                if let Some(seconds) = interval {
                    config.sensor.send_interval_ms = (seconds * 1000.0).round().max(0.0) as u64;
                }
            }
            Commands::Aggregator { host, port } => {
                if let Some(host) = host {
                    config.aggregator.host = host.clone();
                }
                if let Some(port) = port {
                    config.aggregator.port = *port;
                }
            }
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    cli.command.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Flip the shutdown signal on Ctrl+C
fn spawn_ctrl_c(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown.send(true);
    });
}

/// Main entry point
///
/// # Control Flow
///
/// 1. Parse the command line and load the configuration
/// 2. Install console and file logging for the chosen role
/// 3. Run the chosen role until Ctrl+C
///
/// # Errors
///
/// Returns error if the configuration is invalid, logging cannot be set
/// up, or a listener cannot be bound.
///
/// # Examples
///
/// ```bash
/// edge-sentinel aggregator --port 9100
/// edge-sentinel drone --id drone1 --listen-port 9000 --server-ip 127.0.0.1 --server-port 9100
/// edge-sentinel sensor --id s1 --drone-port 9000 --interval 2
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let _log_guard = init_logging(&config.logging, cli.command.role())?;

    info!("Edge Sentinel v{} starting...", env!("CARGO_PKG_VERSION"));

    let (shutdown_tx, mut shutdown) = watch::channel(false);
    spawn_ctrl_c(shutdown_tx);

    match cli.command {
        Commands::Drone { .. } => {
            let node = EdgeNode::new(NodeSettings::from_config(&config));
            node.run(shutdown).await?;
        }
        Commands::Sensor { .. } => {
            run_sensor(SensorSettings::from_config(&config), shutdown).await;
        }
        Commands::Aggregator { .. } => {
            let aggregator = CentralAggregator::start(&config.aggregator.addr()).await?;
            let _ = shutdown.wait_for(|&stop| stop).await;
            info!(
                "{} summaries received from {} drones",
                aggregator.summaries_received(),
                aggregator.drone_ids().len()
            );
            aggregator.stop().await;
        }
    }

    Ok(())
}

//! End-to-end tests over loopback: sensors -> drone -> aggregator.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use edge_sentinel::aggregator::CentralAggregator;
use edge_sentinel::config::TimingConfig;
use edge_sentinel::drone::forwarder::{ForwarderSettings, SummaryForwarder};
use edge_sentinel::drone::ingest::IngestionServer;
use edge_sentinel::drone::link::TcpSummaryLink;
use edge_sentinel::drone::state::{DroneState, EdgeStore};
use edge_sentinel::drone::{EdgeNode, NodeSettings};

const SPIKE: [f64; 10] = [20.0, 21.0, 20.0, 21.0, 20.0, 21.0, 20.0, 21.0, 20.0, 50.0];

fn reading_json(sensor: &str, temperature: f64) -> String {
    format!(
        r#"{{"sensor_id":"{}","temperature":{},"humidity":50.0,"timestamp":"2024-05-01T10:00:00Z"}}"#,
        sensor, temperature
    )
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(10), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn fast_timing() -> TimingConfig {
    TimingConfig {
        flush_interval_ms: 100,
        retry_interval_ms: 50,
        ..TimingConfig::default()
    }
}

#[tokio::test]
async fn test_spike_flows_from_sensor_to_aggregator() {
    let aggregator = CentralAggregator::start("127.0.0.1:0").await.unwrap();

    let store = Arc::new(EdgeStore::new());
    let (_state_tx, state) = watch::channel(DroneState::new(100));
    let ingestion = IngestionServer::start("127.0.0.1:0", Arc::clone(&store), state.clone())
        .await
        .unwrap();

    // Feed all readings before the forwarder starts so they land in one summary
    let mut sensor = TcpStream::connect(ingestion.local_addr()).await.unwrap();
    for t in SPIKE {
        sensor.write_all(reading_json("s1", t).as_bytes()).await.unwrap();
    }
    wait_until(|| store.temperature_samples() == SPIKE.len()).await;
    assert_eq!(store.pending_anomalies(), 1);

    // The first flush goes out on connect; a long interval keeps it the only one
    let single_flush = TimingConfig {
        flush_interval_ms: 60_000,
        ..fast_timing()
    };
    let link = TcpSummaryLink::new(aggregator.local_addr().to_string());
    let forwarder = SummaryForwarder::new(
        ForwarderSettings::new("drone1", &single_flush),
        Arc::clone(&store),
        state,
        Arc::new(link),
    )
    .spawn();

    wait_until(|| !aggregator.anomalies("drone1").is_empty()).await;

    let anomalies = aggregator.anomalies("drone1");
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].sensor_id, "s1");
    assert_eq!(anomalies[0].value, 50.0);

    let delivered = aggregator.latest("drone1").unwrap();
    assert_eq!(delivered.sensor_ids, vec!["s1".to_string()]);
    assert_eq!(delivered.anomalies.len(), 1);
    assert_eq!(delivered.anomalies[0].value, 50.0);
    assert_eq!(aggregator.summaries_received(), 1);

    let first = aggregator.snapshot();
    let record = first.get("drone1").unwrap();
    assert!(record.series.avg_temps().any(|t| t == 23.4));
    assert_eq!(store.pending_anomalies(), 0);
    assert_eq!(store.anomaly_history().len(), 1);

    forwarder.stop().await;
    ingestion.stop().await;
    aggregator.stop().await;
}

#[tokio::test]
async fn test_forwarder_reconnects_when_aggregator_appears_late() {
    // Reserve a port, then free it so the first connects are refused
    let placeholder = CentralAggregator::start("127.0.0.1:0").await.unwrap();
    let addr = placeholder.local_addr().to_string();
    placeholder.stop().await;

    let store = Arc::new(EdgeStore::new());
    let (_state_tx, state) = watch::channel(DroneState::new(77));
    let forwarder = SummaryForwarder::new(
        ForwarderSettings::new("late", &fast_timing()),
        store,
        state,
        Arc::new(TcpSummaryLink::new(addr.clone())),
    )
    .spawn();

    sleep(Duration::from_millis(200)).await;
    assert!(forwarder.is_running());

    let aggregator = CentralAggregator::start(&addr).await.unwrap();
    wait_until(|| aggregator.summaries_received() > 0).await;
    assert_eq!(aggregator.latest("late").unwrap().battery_level, 77);

    forwarder.stop().await;
    aggregator.stop().await;
}

#[tokio::test]
async fn test_two_drones_keep_separate_series() {
    let aggregator = CentralAggregator::start("127.0.0.1:0").await.unwrap();
    let addr = aggregator.local_addr().to_string();

    let mut forwarders = Vec::new();
    for id in ["alpha", "bravo"] {
        let (state_tx, state) = watch::channel(DroneState::new(100));
        forwarders.push((
            state_tx,
            SummaryForwarder::new(
                ForwarderSettings::new(id, &fast_timing()),
                Arc::new(EdgeStore::new()),
                state,
                Arc::new(TcpSummaryLink::new(addr.clone())),
            )
            .spawn(),
        ));
    }

    wait_until(|| {
        !aggregator.series("alpha").is_empty() && !aggregator.series("bravo").is_empty()
    })
    .await;
    assert_eq!(
        aggregator.drone_ids(),
        vec!["alpha".to_string(), "bravo".to_string()]
    );

    for (_, forwarder) in forwarders {
        forwarder.stop().await;
    }
    aggregator.stop().await;
}

#[tokio::test]
async fn test_edge_node_runs_against_aggregator() {
    let aggregator = CentralAggregator::start("127.0.0.1:0").await.unwrap();

    let node = EdgeNode::new(NodeSettings {
        drone_id: "drone1".to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
        aggregator_addr: aggregator.local_addr().to_string(),
        battery_initial: 100,
        battery_threshold: 20,
        timing: fast_timing(),
    });
    let store = node.store();
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(node.run(stop_rx));

    wait_until(|| aggregator.summaries_received() > 0).await;
    let latest = aggregator.latest("drone1").unwrap();
    assert_eq!(latest.battery_level, 100);
    assert!(latest.anomalies.is_empty());
    assert!(store.anomaly_history().is_empty());

    stop_tx.send(true).unwrap();
    timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    aggregator.stop().await;
}

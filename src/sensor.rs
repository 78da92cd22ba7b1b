//! # Simulated Field Sensor
//!
//! Streams random temperature and humidity readings to a drone, one JSON
//! record per write. A lost connection is re-dialled after a fixed pause,
//! with no cap on attempts.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::protocol::types::{round2, utc_timestamp, Reading};

/// Temperature range of generated readings, °C
pub const TEMPERATURE_RANGE: std::ops::Range<f64> = 20.0..30.0;

/// Humidity range of generated readings, %
pub const HUMIDITY_RANGE: std::ops::Range<f64> = 30.0..70.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSettings {
    pub sensor_id: String,
    pub drone_addr: String,
    pub send_interval: Duration,
    pub retry_interval: Duration,
}

impl SensorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sensor_id: config.sensor.id.clone(),
            drone_addr: config.sensor.drone_addr(),
            send_interval: config.sensor.send_interval(),
            retry_interval: config.timing.retry_interval(),
        }
    }
}

/// One random reading stamped with the current time
pub fn generate_reading<R: Rng>(sensor_id: &str, rng: &mut R) -> Reading {
    Reading {
        sensor_id: sensor_id.to_string(),
        temperature: round2(rng.gen_range(TEMPERATURE_RANGE)),
        humidity: round2(rng.gen_range(HUMIDITY_RANGE)),
        timestamp: utc_timestamp(),
    }
}

/// Send readings until `shutdown` reads `true`
pub async fn run_sensor(settings: SensorSettings, mut shutdown: watch::Receiver<bool>) {
    let mut rng = StdRng::from_entropy();

    info!("Sensor {} reporting to {}", settings.sensor_id, settings.drone_addr);

    loop {
        let connected = tokio::select! {
            _ = shutdown.wait_for(|&stop| stop) => return,
            connected = TcpStream::connect(&settings.drone_addr) => connected,
        };

        match connected {
            Ok(mut stream) => {
                info!("Connected to drone at {}", settings.drone_addr);
                loop {
                    let reading = generate_reading(&settings.sensor_id, &mut rng);
                    let payload = match serde_json::to_vec(&reading) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!("Failed to encode reading: {}", e);
                            break;
                        }
                    };

                    if let Err(e) = stream.write_all(&payload).await {
                        warn!("Error sending to drone at {}: {}", settings.drone_addr, e);
                        break;
                    }
                    debug!(
                        "Sent reading: temp={} hum={}",
                        reading.temperature, reading.humidity
                    );

                    tokio::select! {
                        _ = shutdown.wait_for(|&stop| stop) => return,
                        _ = sleep(settings.send_interval) => {}
                    }
                }
            }
            Err(e) => warn!(
                "Connection to drone at {} failed: {}, retrying in {:?}",
                settings.drone_addr, e, settings.retry_interval
            ),
        }

        tokio::select! {
            _ = shutdown.wait_for(|&stop| stop) => return,
            _ = sleep(settings.retry_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::reader::read_records;
    use tokio::net::TcpListener;

    #[test]
    fn test_generated_reading_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let reading = generate_reading("s1", &mut rng);
            assert_eq!(reading.sensor_id, "s1");
            assert!((20.0..=30.0).contains(&reading.temperature));
            assert!((30.0..=70.0).contains(&reading.humidity));
            assert_eq!(reading.temperature, round2(reading.temperature));
            assert!(reading.timestamp.ends_with('Z'));
        }
    }

    #[tokio::test]
    async fn test_sensor_streams_readings() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let settings = SensorSettings {
            sensor_id: "s9".to_string(),
            drone_addr: listener.local_addr().unwrap().to_string(),
            send_interval: Duration::from_millis(10),
            retry_interval: Duration::from_millis(10),
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        let sensor = tokio::spawn(run_sensor(settings, stop_rx));

        let (stream, peer) = listener.accept().await.unwrap();
        let (reader_stop_tx, reader_stop) = watch::channel(false);
        let mut received = Vec::new();
        let reader = tokio::spawn(async move {
            read_records(stream, peer, "sensor", reader_stop, |r: Reading| {
                received.push(r.sensor_id)
            })
            .await
        });

        sleep(Duration::from_millis(200)).await;
        stop_tx.send(true).unwrap();
        sensor.await.unwrap();

        // The sensor dropped its end; the reader sees end of stream
        let (_, count) = reader.await.unwrap();
        assert!(count >= 1);
        drop(reader_stop_tx);
    }
}

//! # Record Types
//!
//! Serde definitions of the records carried over the wire.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single environmental sample sent by a field sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    pub temperature: f64,
    pub humidity: f64,
    /// ISO-8601 UTC, as stamped by the sensor
    pub timestamp: String,
}

/// A temperature sample flagged by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub sensor_id: String,
    pub value: f64,
    pub timestamp: String,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} -> Temp: {}°C",
            self.timestamp, self.sensor_id, self.value
        )
    }
}

/// Periodic aggregate sent by an edge node to the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub drone_id: String,
    pub sensor_ids: Vec<String>,
    pub average_temperature: f64,
    pub average_humidity: f64,
    pub anomalies: Vec<Anomaly>,
    pub battery_level: u8,
    pub timestamp: String,
}

/// Current time as `YYYY-MM-DDTHH:MM:SS.ffffffZ`
pub fn utc_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Round to two decimal places
///
/// Values too large to scale are already whole and come back unchanged.
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_field_names() {
        let raw = r#"{"sensor_id":"s1","temperature":21.5,"humidity":40.25,"timestamp":"2024-05-01T10:00:00.000000Z"}"#;
        let reading: Reading = serde_json::from_str(raw).unwrap();
        assert_eq!(reading.sensor_id, "s1");
        assert_eq!(reading.temperature, 21.5);
        assert_eq!(reading.humidity, 40.25);
        assert_eq!(reading.timestamp, "2024-05-01T10:00:00.000000Z");
    }

    #[test]
    fn test_reading_missing_field_is_rejected() {
        let raw = r#"{"sensor_id":"s1","temperature":21.5}"#;
        assert!(serde_json::from_str::<Reading>(raw).is_err());
    }

    #[test]
    fn test_summary_serializes_contract_fields() {
        let summary = Summary {
            drone_id: "drone1".to_string(),
            sensor_ids: vec!["s1".to_string()],
            average_temperature: 22.13,
            average_humidity: 51.0,
            anomalies: vec![Anomaly {
                sensor_id: "s1".to_string(),
                value: 50.0,
                timestamp: "t".to_string(),
            }],
            battery_level: 87,
            timestamp: "t".to_string(),
        };

        let value = serde_json::to_value(&summary).unwrap();
        for key in [
            "drone_id",
            "sensor_ids",
            "average_temperature",
            "average_humidity",
            "anomalies",
            "battery_level",
            "timestamp",
        ] {
            assert!(value.get(key).is_some(), "missing field {}", key);
        }
        assert_eq!(value["anomalies"][0]["value"], 50.0);
    }

    #[test]
    fn test_anomaly_display() {
        let anomaly = Anomaly {
            sensor_id: "s3".to_string(),
            value: 48.5,
            timestamp: "2024-05-01T10:00:00Z".to_string(),
        };
        assert_eq!(
            anomaly.to_string(),
            "[2024-05-01T10:00:00Z] s3 -> Temp: 48.5°C"
        );
    }

    #[test]
    fn test_utc_timestamp_shape() {
        let ts = utc_timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-05-01T10:00:00.000000Z".len());
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(20.456), 20.46);
        assert_eq!(round2(20.0), 20.0);
        assert_eq!(round2(-1.234), -1.23);
        assert_eq!(round2(1e308), 1e308);
        assert_eq!(round2(-1e308), -1e308);
    }
}

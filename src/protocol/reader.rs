//! # Record Reader
//!
//! Per-connection receive loop shared by the drone's sensor listener and
//! the aggregator's drone listener.
//!
//! The loop ends on end-of-stream, on a read error (a peer reset included),
//! or as soon as the shutdown signal flips to `true`. Dropping the stream
//! afterwards closes the connection.

use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::{debug, error, warn};

use super::decoder::RecordDecoder;

/// Why a connection's receive loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// Peer closed the stream
    Closed,
    /// Peer reset the connection
    Reset,
    /// Any other read error
    Failed,
    /// Local shutdown signal
    Shutdown,
}

/// Reads `T` records from `stream` until it ends, handing each to `on_record`.
///
/// # Arguments
///
/// * `stream` - Connected peer stream
/// * `peer` - Peer label used in log lines
/// * `kind` - Peer role used in log lines ("sensor", "drone")
/// * `shutdown` - Cancellation signal; the loop stops once it reads `true`
/// * `on_record` - Called once per decoded record, in arrival order
///
/// # Returns
///
/// How the loop ended and how many records were delivered.
pub async fn read_records<S, T, F>(
    mut stream: S,
    peer: impl Display,
    kind: &str,
    mut shutdown: watch::Receiver<bool>,
    mut on_record: F,
) -> (ConnectionEnd, usize)
where
    S: AsyncRead + Unpin,
    T: DeserializeOwned,
    F: FnMut(T),
{
    let mut decoder = RecordDecoder::<T>::new();
    let mut delivered = 0;

    let end = loop {
        let read = tokio::select! {
            _ = shutdown.wait_for(|&stop| stop) => {
                debug!("Closing {} connection {}", kind, peer);
                break ConnectionEnd::Shutdown;
            }
            read = stream.read_buf(decoder.buffer_mut()) => read,
        };

        match read {
            Ok(0) => break ConnectionEnd::Closed,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                debug!("{} {} reset the connection", kind, peer);
                break ConnectionEnd::Reset;
            }
            Err(e) => {
                error!("Error handling {} {}: {}", kind, peer, e);
                break ConnectionEnd::Failed;
            }
        }

        loop {
            match decoder.decode_next() {
                Ok(Some(record)) => {
                    on_record(record);
                    delivered += 1;
                }
                Ok(None) => break,
                Err(e) => warn!("Dropping malformed record from {} {}: {}", kind, peer, e),
            }
        }
    };

    (end, delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Reading;
    use std::io;

    fn reading_json(sensor: &str, temperature: f64) -> String {
        format!(
            r#"{{"sensor_id":"{}","temperature":{},"humidity":45.0,"timestamp":"2024-05-01T10:00:00Z"}}"#,
            sensor, temperature
        )
    }

    #[tokio::test]
    async fn test_reads_until_eof() {
        let first = reading_json("s1", 20.0);
        let (head, tail) = first.split_at(20);
        let stream = tokio_test::io::Builder::new()
            .read(head.as_bytes())
            .read(tail.as_bytes())
            .read(reading_json("s1", 21.0).as_bytes())
            .build();

        let (_tx, rx) = watch::channel(false);
        let mut seen = Vec::new();
        let (end, count) =
            read_records(stream, "test", "sensor", rx, |r: Reading| seen.push(r.temperature)).await;

        assert_eq!(end, ConnectionEnd::Closed);
        assert_eq!(count, 2);
        assert_eq!(seen, vec![20.0, 21.0]);
    }

    #[tokio::test]
    async fn test_reset_ends_loop() {
        let stream = tokio_test::io::Builder::new()
            .read(reading_json("s1", 20.0).as_bytes())
            .read_error(io::Error::new(ErrorKind::ConnectionReset, "reset"))
            .build();

        let (_tx, rx) = watch::channel(false);
        let (end, count) = read_records(stream, "test", "sensor", rx, |_: Reading| {}).await;

        assert_eq!(end, ConnectionEnd::Reset);
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_other_error_ends_loop() {
        let stream = tokio_test::io::Builder::new()
            .read_error(io::Error::new(ErrorKind::Other, "boom"))
            .build();

        let (_tx, rx) = watch::channel(false);
        let (end, count) = read_records(stream, "test", "sensor", rx, |_: Reading| {}).await;

        assert_eq!(end, ConnectionEnd::Failed);
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_malformed_record_does_not_end_loop() {
        let stream = tokio_test::io::Builder::new()
            .read(b"{\"sensor_id\":\"s1\"}")
            .read(reading_json("s1", 22.0).as_bytes())
            .build();

        let (_tx, rx) = watch::channel(false);
        let (end, count) = read_records(stream, "test", "sensor", rx, |_: Reading| {}).await;

        assert_eq!(end, ConnectionEnd::Closed);
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_blocked_read() {
        let (client, server) = tokio::io::duplex(64);
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            read_records(server, "test", "sensor", rx, |_: Reading| {}).await
        });

        tx.send(true).unwrap();
        let (end, count) = task.await.unwrap();
        assert_eq!(end, ConnectionEnd::Shutdown);
        assert_eq!(count, 0);
        drop(client);
    }
}

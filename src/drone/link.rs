//! Trait abstraction for the outbound aggregator connection to enable testing

use async_trait::async_trait;
use std::io;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// An open connection that carries summaries
#[async_trait]
pub trait SummaryChannel: Send {
    /// Write one serialized summary
    async fn send(&mut self, payload: &[u8]) -> io::Result<()>;
}

/// Factory for aggregator connections
#[async_trait]
pub trait SummaryLink: Send + Sync {
    async fn connect(&self) -> io::Result<Box<dyn SummaryChannel>>;

    /// Remote endpoint, for log lines
    fn endpoint(&self) -> &str;
}

/// Plain TCP link to the aggregator
#[derive(Debug, Clone)]
pub struct TcpSummaryLink {
    addr: String,
}

impl TcpSummaryLink {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

struct TcpSummaryChannel {
    stream: TcpStream,
}

#[async_trait]
impl SummaryChannel for TcpSummaryChannel {
    async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.stream.write_all(payload).await?;
        self.stream.flush().await
    }
}

#[async_trait]
impl SummaryLink for TcpSummaryLink {
    async fn connect(&self) -> io::Result<Box<dyn SummaryChannel>> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(TcpSummaryChannel { stream }))
    }

    fn endpoint(&self) -> &str {
        &self.addr
    }
}

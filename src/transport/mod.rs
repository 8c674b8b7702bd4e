//! Duplex byte transport carrying the streaming session.
//!
//! The session engine only sees these traits, so tests can script a server
//! in memory while production uses [`WebSocketConnector`].

mod websocket;

pub use websocket::WebSocketConnector;

use crate::error::Result;
use async_trait::async_trait;

/// Write half of a connection.
#[async_trait]
pub trait TransportSink: Send {
    async fn send(&mut self, data: Vec<u8>) -> Result<()>;

    /// Best-effort close; errors are ignored by callers.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Read half of a connection.
#[async_trait]
pub trait TransportStream: Send {
    /// Next binary message. `None` means the peer closed cleanly.
    async fn recv(&mut self) -> Option<Result<Vec<u8>>>;
}

/// Opens connections to the streaming endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn TransportSink>, Box<dyn TransportStream>)>;
}

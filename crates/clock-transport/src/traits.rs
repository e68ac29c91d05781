//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Events produced by a receiving socket
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Datagram received
    Data(Bytes),
    /// Receive error, the socket keeps running
    Error(String),
}

/// Trait for sending datagrams
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send one datagram
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Check if there is anywhere to send to
    fn is_connected(&self) -> bool;
}

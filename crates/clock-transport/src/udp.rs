//! UDP transport implementation

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Result, TransportError};
use crate::traits::{TransportEvent, TransportSender};

/// UDP configuration
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Maximum packet size
    pub max_packet_size: usize,
    /// Datagrams buffered between the socket and the consumer
    pub queue_depth: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            max_packet_size: 65507, // Max UDP payload
            queue_depth: 256,
        }
    }
}

/// UDP transport (connectionless)
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    config: UdpConfig,
}

impl UdpTransport {
    /// Bind to a local address
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, UdpConfig::default()).await
    }

    /// Bind with config
    pub async fn bind_with_config(addr: &str, config: UdpConfig) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", addr, e)))?;

        if let Ok(local) = socket.local_addr() {
            info!("UDP bound to {}", local);
        }

        Ok(Self {
            socket: Arc::new(socket),
            config,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Io)
    }

    /// Start receiving packets until `cancel` fires
    pub fn start_receiver(&self, cancel: CancellationToken) -> UdpReceiver {
        let (tx, rx) = mpsc::channel(self.config.queue_depth);
        let socket = self.socket.clone();
        let max_size = self.config.max_packet_size;

        tokio::spawn(async move {
            let mut buf = vec![0u8; max_size];

            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = socket.recv_from(&mut buf) => received,
                };

                let event = match received {
                    Ok((len, from)) => {
                        debug!("UDP received {} bytes from {}", len, from);
                        (TransportEvent::Data(Bytes::copy_from_slice(&buf[..len])), from)
                    }
                    Err(e) => {
                        error!("UDP receive error: {}", e);
                        (
                            TransportEvent::Error(e.to_string()),
                            SocketAddr::from(([0, 0, 0, 0], 0)),
                        )
                    }
                };

                if tx.send(event).await.is_err() {
                    break;
                }
            }

            debug!("UDP receiver stopped");
        });

        UdpReceiver { rx }
    }
}

/// UDP sender (to a specific remote)
#[derive(Clone)]
pub struct UdpSender {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
}

impl UdpSender {
    /// Open a fresh outbound socket for `remote`, with broadcast enabled
    pub async fn open(remote: SocketAddr) -> Result<Self> {
        let bind = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        socket.set_broadcast(true).map_err(TransportError::Io)?;

        Ok(Self {
            socket: Arc::new(socket),
            remote,
        })
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

#[async_trait]
impl TransportSender for UdpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        self.socket
            .send_to(&data, self.remote)
            .await
            .map_err(|e| TransportError::SendFailed(format!("{}: {}", self.remote, e)))?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

/// UDP receiver
pub struct UdpReceiver {
    rx: mpsc::Receiver<(TransportEvent, SocketAddr)>,
}

impl UdpReceiver {
    /// Receive the next event with source address
    pub async fn recv_from(&mut self) -> Option<(TransportEvent, SocketAddr)> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_udp_bind() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();
        assert!(addr.port() > 0);
    }

    #[tokio::test]
    async fn test_udp_bind_invalid() {
        let result = UdpTransport::bind("not an address").await;
        assert!(matches!(result, Err(TransportError::BindFailed(_))));
    }

    #[tokio::test]
    async fn test_udp_send_recv() {
        let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let server_addr = server.local_addr().unwrap();
        let mut receiver = server.start_receiver(CancellationToken::new());

        client.send_to(b"hello", server_addr).await.unwrap();

        let (event, from) = receiver.recv_from().await.unwrap();
        match event {
            TransportEvent::Data(data) => {
                assert_eq!(data.as_ref(), b"hello");
            }
            _ => panic!("Expected Data event"),
        }

        assert_eq!(from.port(), client.local_addr().unwrap().port());
    }

    #[tokio::test]
    async fn test_receiver_stops_on_cancel() {
        let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let mut receiver = server.start_receiver(cancel.clone());

        cancel.cancel();

        let next = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from())
            .await
            .expect("receiver should close after cancel");
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_sender_open_and_send() {
        let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let mut receiver = server.start_receiver(CancellationToken::new());

        let sender = UdpSender::open(server.local_addr().unwrap()).await.unwrap();
        sender.send(Bytes::from_static(b"state")).await.unwrap();

        let (event, _) = receiver.recv_from().await.unwrap();
        assert!(matches!(event, TransportEvent::Data(d) if d.as_ref() == b"state"));
    }
}

//! Outbound state feedback
//!
//! A [`FeedbackBroadcaster`] publishes datagrams to either a single configured
//! destination or, when the destination is `255.255.255.255`, to the directed
//! broadcast address of every non-loopback IPv4 interface. The destination set
//! is rebuilt periodically and swapped in as one immutable snapshot, so a
//! concurrent [`publish`](FeedbackBroadcaster::publish) always sees a complete list.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::interfaces::{InterfaceSource, SystemInterfaces};
use crate::traits::TransportSender;
use crate::udp::UdpSender;

/// How often the destination set is rebuilt
pub const INTERFACE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Publishes feedback datagrams to a hot-swappable destination set
pub struct FeedbackBroadcaster {
    /// Configured destination, `host:port`
    address: String,
    port: u16,
    broadcast: bool,
    interfaces: Arc<dyn InterfaceSource>,
    destinations: ArcSwap<Vec<UdpSender>>,
}

impl FeedbackBroadcaster {
    /// Create a broadcaster using the system's interfaces and build the
    /// initial destination set
    pub async fn new(address: &str) -> Result<Self> {
        Self::with_interfaces(address, Arc::new(SystemInterfaces)).await
    }

    pub async fn with_interfaces(
        address: &str,
        interfaces: Arc<dyn InterfaceSource>,
    ) -> Result<Self> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidAddress(address.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| TransportError::InvalidAddress(address.to_string()))?;
        let broadcast = host.parse::<Ipv4Addr>().ok() == Some(Ipv4Addr::BROADCAST);

        let broadcaster = Self {
            address: address.to_string(),
            port,
            broadcast,
            interfaces,
            destinations: ArcSwap::from_pointee(Vec::new()),
        };

        broadcaster.refresh().await;
        Ok(broadcaster)
    }

    /// Configured destination string
    pub fn address(&self) -> &str {
        &self.address
    }

    /// True when sending to every interface's broadcast address
    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    /// Current destination addresses
    pub fn destinations(&self) -> Vec<SocketAddr> {
        self.destinations.load().iter().map(UdpSender::remote).collect()
    }

    /// Rebuild the destination set and swap it in. Returns the number of destinations.
    pub async fn refresh(&self) -> usize {
        let next = if self.broadcast {
            self.broadcast_destinations().await
        } else {
            self.unicast_destination().await
        };

        let Some(next) = next else {
            return self.destinations.load().len();
        };

        let count = next.len();
        self.destinations.store(Arc::new(next));
        debug!("Feedback destinations updated: {} active", count);
        count
    }

    async fn unicast_destination(&self) -> Option<Vec<UdpSender>> {
        let remote = match tokio::net::lookup_host(&self.address).await {
            Ok(mut addrs) => addrs.next(),
            Err(e) => {
                warn!("Failed to resolve feedback address {}: {}", self.address, e);
                return Some(Vec::new());
            }
        };

        let Some(remote) = remote else {
            warn!("Feedback address {} resolved to nothing", self.address);
            return Some(Vec::new());
        };

        match UdpSender::open(remote).await {
            Ok(sender) => Some(vec![sender]),
            Err(e) => {
                warn!("Failed to open feedback socket for {}: {}", remote, e);
                Some(Vec::new())
            }
        }
    }

    /// `None` keeps the previous set when the interface list is unavailable
    async fn broadcast_destinations(&self) -> Option<Vec<UdpSender>> {
        let interfaces = match self.interfaces.ipv4_interfaces() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!("Keeping previous feedback destinations: {}", e);
                return None;
            }
        };

        let mut senders = Vec::new();
        for iface in interfaces.iter().filter(|i| !i.loopback) {
            let remote = SocketAddr::from((iface.broadcast(), self.port));
            match UdpSender::open(remote).await {
                Ok(sender) => {
                    debug!("Feedback: {} via {}", remote, iface.name);
                    senders.push(sender);
                }
                Err(e) => warn!("Skipping interface {} ({}): {}", iface.name, remote, e),
            }
        }

        Some(senders)
    }

    /// Send one datagram to every destination. Returns how many sends succeeded.
    pub async fn publish(&self, data: &[u8]) -> usize {
        let destinations = self.destinations.load_full();
        let data = Bytes::copy_from_slice(data);

        let mut sent = 0;
        for dest in destinations.iter() {
            match dest.send(data.clone()).await {
                Ok(()) => sent += 1,
                Err(e) => debug!("Feedback send failed: {}", e),
            }
        }
        sent
    }

    /// Rebuild the destination set every `interval` until cancelled
    pub fn spawn_monitor(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let broadcaster = Arc::clone(self);
        info!("Monitoring network interfaces for {}", broadcaster.address);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately, the set was built on construction
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        broadcaster.refresh().await;
                    }
                }
            }

            debug!("Interface monitor stopped");
        })
    }
}

#[async_trait]
impl TransportSender for FeedbackBroadcaster {
    async fn send(&self, data: Bytes) -> Result<()> {
        if self.publish(&data).await == 0 && self.is_connected() {
            return Err(TransportError::SendFailed(self.address.clone()));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.destinations.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::InterfaceAddr;

    #[tokio::test]
    async fn test_invalid_address() {
        assert!(FeedbackBroadcaster::new("nope").await.is_err());
        assert!(FeedbackBroadcaster::new("127.0.0.1:port").await.is_err());
    }

    #[tokio::test]
    async fn test_unicast_single_destination() {
        let broadcaster = FeedbackBroadcaster::new("127.0.0.1:1245").await.unwrap();
        assert!(!broadcaster.is_broadcast());
        assert_eq!(
            broadcaster.destinations(),
            vec![SocketAddr::from(([127, 0, 0, 1], 1245))]
        );
    }

    #[tokio::test]
    async fn test_broadcast_without_interfaces() {
        let broadcaster =
            FeedbackBroadcaster::with_interfaces("255.255.255.255:1245", Arc::new(Vec::<InterfaceAddr>::new()))
                .await
                .unwrap();
        assert!(broadcaster.is_broadcast());
        assert!(broadcaster.destinations().is_empty());
        assert!(!broadcaster.is_connected());
        assert_eq!(broadcaster.publish(b"x").await, 0);
    }
}

//! OSC server
//!
//! Owns the control socket, decodes datagrams and offers each OSC message to
//! the registered [`OscHandler`]s in order. Bundles are flattened. Nothing is
//! ever reported back to the sender.

use std::net::SocketAddr;
use std::sync::Arc;

use clock_transport::{TransportEvent, UdpTransport};
use rosc::{OscMessage, OscPacket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::handler::OscHandler;

pub struct OscServer {
    transport: UdpTransport,
    handlers: Vec<Arc<dyn OscHandler>>,
}

impl OscServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let transport = UdpTransport::bind(addr).await?;
        Ok(Self {
            transport,
            handlers: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// Append a handler; earlier handlers get the first look at each message
    pub fn add_handler(&mut self, handler: Arc<dyn OscHandler>) {
        info!("OSC handler registered: {}", handler.name());
        self.handlers.push(handler);
    }

    /// Receive and dispatch until cancelled
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!("OSC server listening on {}", self.local_addr()?);
        let mut receiver = self.transport.start_receiver(cancel.child_token());

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = receiver.recv_from() => next,
            };

            match next {
                Some((TransportEvent::Data(data), from)) => self.dispatch_datagram(&data, from),
                Some((TransportEvent::Error(e), _)) => debug!("Receive error: {}", e),
                None => break,
            }
        }

        info!("OSC server stopped");
        Ok(())
    }

    /// Decode one datagram and dispatch its messages
    pub fn dispatch_datagram(&self, data: &[u8], from: SocketAddr) {
        match rosc::decoder::decode_udp(data) {
            Ok((_, packet)) => self.dispatch_packet(packet, from),
            Err(e) => warn!("OSC decode error from {}: {:?}", from, e),
        }
    }

    pub fn dispatch_packet(&self, packet: OscPacket, from: SocketAddr) {
        match packet {
            OscPacket::Message(msg) => {
                self.dispatch_message(&msg, from);
            }
            OscPacket::Bundle(bundle) => {
                for packet in bundle.content {
                    self.dispatch_packet(packet, from);
                }
            }
        }
    }

    /// Offer a message to each handler in turn. Returns false on a routing miss.
    pub fn dispatch_message(&self, msg: &OscMessage, from: SocketAddr) -> bool {
        let claimed = self.handlers.iter().any(|h| h.handle(msg, from));
        if !claimed {
            debug!("No route for {} from {}", msg.addr, from);
        }
        claimed
    }
}

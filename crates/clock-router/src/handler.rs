//! Handler trait for decoded OSC messages

use rosc::OscMessage;
use std::net::SocketAddr;

/// Consumer of OSC messages arriving on the shared control socket.
///
/// The server offers every message to its handlers in registration order;
/// the first one returning `true` claims it.
pub trait OscHandler: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &str;

    /// Handle a message, returning `true` when it belongs to this handler
    /// (including messages it recognised but had to drop)
    fn handle(&self, msg: &OscMessage, from: SocketAddr) -> bool;
}

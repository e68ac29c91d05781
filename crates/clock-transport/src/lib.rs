//! Clock Transport Layer
//!
//! UDP plumbing for the clock engine:
//! - Command reception ([`UdpTransport`])
//! - Network interface enumeration ([`interfaces`])
//! - State feedback to one or many destinations ([`FeedbackBroadcaster`])

pub mod error;
pub mod feedback;
pub mod interfaces;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use feedback::{FeedbackBroadcaster, INTERFACE_POLL_INTERVAL};
pub use interfaces::{directed_broadcast, InterfaceAddr, InterfaceSource, SystemInterfaces};
pub use traits::{TransportEvent, TransportSender};
pub use udp::{UdpConfig, UdpReceiver, UdpSender, UdpTransport};

//! Clock Router
//!
//! OSC protocol handling for the clock engine:
//! - Address table and argument decoding ([`ClockRouter`])
//! - Subscriber fan-out over bounded broadcast channels
//! - The UDP dispatch loop ([`OscServer`]) shared with the media feeds
//! - Outbound state and media encoding ([`encode`])

pub mod args;
pub mod encode;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use error::{DecodeError, Result, RouterError};
pub use handler::OscHandler;
pub use router::{ClockRouter, Decoded, DEFAULT_CHANNEL_CAPACITY};
pub use server::OscServer;

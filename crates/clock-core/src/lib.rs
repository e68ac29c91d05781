//! Clock Core
//!
//! Core types for the Clock-8001 engine.
//!
//! This crate provides:
//! - Countdown and count-up timers ([`Counter`])
//! - Decoded control commands ([`Message`])
//! - Display snapshots ([`State`], [`Clock`])
//! - Timing utilities ([`time`])

pub mod counter;
pub mod error;
pub mod message;
pub mod state;
pub mod time;

pub use counter::{Counter, CounterOutput};
pub use error::{Error, Result};
pub use message::{MediaSync, Message};
pub use state::{Clock, Color, Mode, State};
pub use time::{Timecode, TimeOfDay};

/// Number of independent counters
pub const NUM_COUNTERS: usize = 10;

/// Default number of display sources
pub const NUM_SOURCES: usize = 4;

/// Default OSC control port
pub const DEFAULT_PORT: u16 = 1245;

/// Default address to listen for commands on
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:1245";

/// Default destination for state feedback
pub const DEFAULT_FEEDBACK_ADDR: &str = "255.255.255.255:1245";

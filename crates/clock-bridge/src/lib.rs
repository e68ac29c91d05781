//! Clock Bridge
//!
//! Translates playback state from external media players into media
//! commands for the engine:
//! - Layer based compositor feed ([`millumin`])
//! - Cue player feed ([`mitti`])
//! - Layer selection, staleness guard and cue watchdog ([`MediaBridge`])

pub mod bridge;
pub mod error;
pub mod millumin;
pub mod mitti;

pub use bridge::{select_layer, BridgeConfig, LayerSelection, MediaBridge, CUE_PLAYER, LAYER_PLAYER};
pub use error::{BridgeError, Result};
pub use millumin::{LayerFeed, LayerSnapshot, LayerState, MediaInfo};
pub use mitti::{CueFeed, CueState};

/// Queue depth between a feed handler and the bridge
pub const FEED_QUEUE_DEPTH: usize = 64;

//! Mitti cue feed
//!
//! ```text
//! /mitti/cueTimeLeft          s "-HH:MM:SS:FF"
//! /mitti/cueTimeElapsed       s "HH:MM:SS:FF"
//! /mitti/togglePlay           i playing
//! /mitti/toggleLoop           i looping
//! /mitti/current/toggleLoop   i looping
//! ```
//!
//! Elapsed time only feeds the progress calculation and does not publish a
//! new snapshot on its own.

use std::net::SocketAddr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use clock_router::args::Args;
use clock_router::OscHandler;
use parking_lot::Mutex;
use regex_lite::Regex;
use rosc::OscMessage;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};

const CUE_TIME_PATTERN: &str = r"^(-?)([0-9]{1,2}):([0-9]{1,2}):([0-9]{1,2}):([0-9]{1,2})$";

fn cue_time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CUE_TIME_PATTERN).expect("cue time pattern is valid"))
}

/// Parse `[-]HH:MM:SS:FF`, requiring the sign to match `negative`
fn parse_cue_time(s: &str, negative: bool) -> Result<(i64, i64, i64, i64)> {
    let invalid = || BridgeError::InvalidCueTime(s.to_string());
    let caps = cue_time_regex().captures(s).ok_or_else(invalid)?;

    let signed = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
    if signed != negative {
        return Err(invalid());
    }

    let field = |i: usize| -> Result<i64> {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(invalid)
    };
    Ok((field(2)?, field(3)?, field(4)?, field(5)?))
}

/// Playback state of the current cue
#[derive(Debug, Clone, PartialEq)]
pub struct CueState {
    /// Whole seconds left
    pub remaining: i64,
    /// Whole seconds played
    pub elapsed: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub frames: i64,
    pub paused: bool,
    pub looping: bool,
    pub updated: DateTime<Utc>,
}

impl Default for CueState {
    fn default() -> Self {
        Self {
            remaining: 0,
            elapsed: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
            frames: 0,
            paused: true,
            looping: false,
            updated: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl CueState {
    pub fn cue_time_left(&mut self, s: &str, now: DateTime<Utc>) -> Result<()> {
        let (hours, minutes, seconds, frames) = parse_cue_time(s, true)?;
        self.hours = hours;
        self.minutes = minutes;
        self.seconds = seconds;
        self.frames = frames;
        self.remaining = (hours * 60 + minutes) * 60 + seconds;
        self.updated = now;
        Ok(())
    }

    pub fn cue_time_elapsed(&mut self, s: &str, now: DateTime<Utc>) -> Result<()> {
        let (hours, minutes, seconds, _) = parse_cue_time(s, false)?;
        self.elapsed = (hours * 60 + minutes) * 60 + seconds;
        self.updated = now;
        Ok(())
    }

    pub fn toggle_play(&mut self, playing: i32, now: DateTime<Utc>) {
        self.paused = playing == 0;
        self.updated = now;
    }

    pub fn toggle_loop(&mut self, looping: i32, now: DateTime<Utc>) {
        self.looping = looping != 0;
        self.updated = now;
    }

    /// Played fraction of the cue, 0-1
    pub fn progress(&self) -> f64 {
        let total = self.remaining + self.elapsed;
        if total <= 0 {
            return 0.0;
        }
        (self.elapsed as f64 / total as f64).clamp(0.0, 1.0)
    }
}

/// OSC handler for the Mitti messages
pub struct CueFeed {
    state: Mutex<CueState>,
    tx: mpsc::Sender<CueState>,
}

impl CueFeed {
    pub fn new(tx: mpsc::Sender<CueState>) -> Self {
        Self {
            state: Mutex::new(CueState::default()),
            tx,
        }
    }

    pub fn state(&self) -> CueState {
        self.state.lock().clone()
    }

    fn apply(&self, msg: &OscMessage, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock();

        let publish = match msg.addr.as_str() {
            "/mitti/cueTimeLeft" => {
                state.cue_time_left(&Args::exact(&msg.args, 1)?.string()?, now)?;
                true
            }
            "/mitti/cueTimeElapsed" => {
                state.cue_time_elapsed(&Args::exact(&msg.args, 1)?.string()?, now)?;
                false
            }
            "/mitti/togglePlay" => {
                state.toggle_play(Args::exact(&msg.args, 1)?.int()?, now);
                true
            }
            _ => {
                state.toggle_loop(Args::exact(&msg.args, 1)?.int()?, now);
                true
            }
        };

        if publish {
            if let Err(e) = self.tx.try_send(state.clone()) {
                debug!("Cue state not queued: {}", e);
            }
        }
        Ok(())
    }
}

impl OscHandler for CueFeed {
    fn name(&self) -> &str {
        "mitti"
    }

    fn handle(&self, msg: &OscMessage, from: SocketAddr) -> bool {
        if !matches!(
            msg.addr.as_str(),
            "/mitti/cueTimeLeft"
                | "/mitti/cueTimeElapsed"
                | "/mitti/togglePlay"
                | "/mitti/toggleLoop"
                | "/mitti/current/toggleLoop"
        ) {
            return false;
        }

        if let Err(e) = self.apply(msg, Utc::now()) {
            warn!("Dropping {} from {}: {}", msg.addr, from, e);
        }
        true
    }
}

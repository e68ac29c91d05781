//! Typed clock commands
//!
//! The router decodes every accepted datagram into exactly one [`Message`].
//! Messages are consumed once by the engine's command loop and discarded.

use chrono::TimeDelta;

use crate::state::Color;

/// Position of a media file reported by an external player
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MediaSync {
    pub hours: i32,
    pub minutes: i32,
    pub seconds: i32,
    pub frames: i32,
    /// Time left in the media file
    pub remaining: TimeDelta,
    /// Elapsed fraction, 0-1
    pub progress: f64,
    pub paused: bool,
    pub looping: bool,
}

impl MediaSync {
    /// Build a sync record from a remaining span, splitting it into clock fields
    pub fn from_remaining(remaining: TimeDelta, progress: f64, paused: bool, looping: bool) -> Self {
        let (hours, minutes, seconds) = crate::time::split_delta(remaining);
        Self {
            hours: hours as i32,
            minutes: minutes as i32,
            seconds: seconds as i32,
            frames: 0,
            remaining: crate::time::truncate_delta(remaining),
            progress,
            paused,
            looping,
        }
    }
}

/// Decoded clock command
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Tally counter: symbol, two digit count and unit
    Count {
        color: Color,
        symbol: String,
        count: i32,
        unit: String,
    },
    /// Literal tally text
    Display { color: Color, text: String },
    /// Tally text with background and its own timeout in seconds (0 keeps the default)
    DisplayText {
        color: Color,
        background: Color,
        timeout: i32,
        text: String,
    },
    TimerStart {
        counter: usize,
        countdown: bool,
        seconds: i32,
    },
    TimerModify { counter: usize, seconds: i32 },
    TimerStop { counter: usize },
    TimerPause { counter: usize },
    TimerResume { counter: usize },
    /// Count toward (or from) a wall clock time `HH:MM:SS`
    TimerTarget {
        counter: usize,
        countdown: bool,
        target: String,
    },
    /// Pause every counter
    Pause,
    /// Resume every counter
    Resume,
    /// Hide all sources
    Kill,
    /// Show all sources
    Normal,
    SecondsOff,
    SecondsOn,
    /// Request to set the system clock to `HH:MM:SS`
    SetTime(String),
    /// Timecode `HH:MM:SS:FF`
    Ltc(String),
    /// Caption text for dual clock faces
    DualText(String),
    SourceHide { source: usize },
    SourceShow { source: usize },
    SourceTitle { source: usize, title: String },
    SourceColors {
        source: usize,
        text: Color,
        background: Color,
    },
    /// Media position for a named player
    Media { player: String, sync: MediaSync },
    /// Named player has nothing playing
    MediaReset { player: String },
    /// Pass-through time from a network time source
    NetworkTime {
        minutes: i32,
        seconds: i32,
        overtime: bool,
    },
}

impl Message {
    /// Short command name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Count { .. } => "count",
            Message::Display { .. } => "display",
            Message::DisplayText { .. } => "displayText",
            Message::TimerStart { countdown: true, .. } => "timerCountdown",
            Message::TimerStart { countdown: false, .. } => "timerCountup",
            Message::TimerModify { .. } => "timerModify",
            Message::TimerStop { .. } => "timerStop",
            Message::TimerPause { .. } => "timerPause",
            Message::TimerResume { .. } => "timerResume",
            Message::TimerTarget { .. } => "timerTarget",
            Message::Pause => "pause",
            Message::Resume => "resume",
            Message::Kill => "kill",
            Message::Normal => "normal",
            Message::SecondsOff => "secondsOff",
            Message::SecondsOn => "secondsOn",
            Message::SetTime(_) => "setTime",
            Message::Ltc(_) => "LTC",
            Message::DualText(_) => "dualText",
            Message::SourceHide { .. } => "sourceHide",
            Message::SourceShow { .. } => "sourceShow",
            Message::SourceTitle { .. } => "sourceTitle",
            Message::SourceColors { .. } => "sourceColors",
            Message::Media { .. } => "media",
            Message::MediaReset { .. } => "mediaReset",
            Message::NetworkTime { .. } => "networkTime",
        }
    }
}

//! Display snapshot types
//!
//! A [`State`] is produced once per engine tick and never mutated afterwards.
//! Renderers and the feedback broadcaster only ever see these values.

use crate::counter::CounterOutput;
use crate::{Error, Result};

/// RGBA color as carried by tally and source color commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };

    /// Opaque color
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Opaque color from float components in the 0-255 range, clamped
    pub fn from_floats(r: f32, g: f32, b: f32) -> Self {
        let c = |v: f32| v.clamp(0.0, 255.0) as u8;
        Self::rgb(c(r), c(g), c(b))
    }

    /// Color from integer components, clamped to 0-255
    pub fn from_ints(r: i32, g: i32, b: i32, a: i32) -> Self {
        let c = |v: i32| v.clamp(0, 255) as u8;
        Self {
            r: c(r),
            g: c(g),
            b: c(b),
            a: c(a),
        }
    }

    /// Parse an HTML style `#RRGGBB` string
    pub fn from_hex(s: &str) -> Result<Self> {
        let hex = s
            .strip_prefix('#')
            .filter(|h| h.len() == 6 && h.is_ascii())
            .ok_or_else(|| Error::InvalidColor(s.to_string()))?;

        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| Error::InvalidColor(s.to_string()))
        };

        Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// What a clock slot is showing.
///
/// The discriminants are part of the feedback wire format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Mode {
    /// Time of day
    Normal = 0,
    Countdown = 1,
    Countup = 2,
    /// Blank
    #[default]
    Off = 3,
    Paused = 4,
    /// Linear timecode
    Ltc = 5,
    /// Mirrored media player position
    Media = 6,
    /// Time received from a network time source
    Slave = 7,
}

impl Mode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Rendered state of a single display source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clock {
    /// Full representation, `HH:MM:SS` or `HH:MM:SS:FF` for timecode
    pub text: String,
    /// 4 character condensed form, icon first
    pub compact: String,
    pub label: String,
    pub icon: String,
    pub mode: Mode,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    /// Only set for timecode
    pub frames: i64,
    pub paused: bool,
    pub expired: bool,
    /// Elapsed fraction of the timer, 0-1
    pub progress: f64,
    pub hidden: bool,
    pub hide_seconds: bool,
    pub text_color: Color,
    pub background: Color,
}

impl Clock {
    /// A blank clock carrying only the source label
    pub fn blank(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            mode: Mode::Off,
            ..Default::default()
        }
    }
}

/// Snapshot of everything a clock face needs for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    /// False until the first command has been processed
    pub initialized: bool,
    pub clocks: Vec<Clock>,
    /// Tally message, empty when expired
    pub tally: String,
    pub tally_color: Color,
    pub tally_background: Color,
    /// Flash cycle phase for expired timers
    pub flash: bool,
    /// Secondary caption text, at most 8 characters
    pub caption: String,
    /// Output of every counter in the pool, by index
    pub timers: Vec<CounterOutput>,
}

impl State {
    /// The first configured clock, used for the legacy single clock feedback
    pub fn primary(&self) -> Option<&Clock> {
        self.clocks.first()
    }
}

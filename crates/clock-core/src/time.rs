//! Timing utilities for the clock engine
//!
//! All local counter arithmetic works on whole seconds. The helpers here
//! truncate deltas and instants, split second counts into clock fields,
//! and parse the two time string formats used by the control protocol:
//!
//! ```text
//! HH:MM:SS:FF   linear timecode
//! HH:MM:SS      time of day
//! ```

use std::sync::OnceLock;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use regex_lite::Regex;

use crate::{Error, Result};

/// Units for the compact 4-character display, smallest first
const COMPACT_UNITS: [(&str, i64); 4] = [("s", 1), ("m", 60), ("h", 60 * 60), ("d", 24 * 60 * 60)];

/// Shown in place of the count when no unit fits in two digits
pub const COMPACT_OVERFLOW: &str = "+++";

const TIMECODE_PATTERN: &str = r"^([0-9][0-9]):([0-5][0-9]):([0-5][0-9]):([0-9][0-9])$";
const TIME_OF_DAY_PATTERN: &str = r"^([0-1]?[0-9]|2[0-3]):([0-5][0-9]):([0-5][0-9])$";
const CLOCK_SET_PATTERN: &str = r"^(2[0-3]|[01][0-9]):([0-5][0-9]):([0-5][0-9])$";

fn timecode_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TIMECODE_PATTERN).expect("timecode pattern is valid"))
}

fn time_of_day_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TIME_OF_DAY_PATTERN).expect("time of day pattern is valid"))
}

fn clock_set_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CLOCK_SET_PATTERN).expect("clock set pattern is valid"))
}

/// Truncate a delta toward zero to whole seconds
pub fn truncate_delta(delta: TimeDelta) -> TimeDelta {
    TimeDelta::seconds(delta.num_seconds())
}

/// Truncate an instant down to the start of its second
pub fn truncate_instant(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_nanosecond(0).unwrap_or(t)
}

/// Split a signed second count into hours, minutes and seconds.
///
/// Each field keeps the sign of the input, so `-61` becomes `(0, -1, -1)`.
pub fn split_seconds(total: i64) -> (i64, i64, i64) {
    let hours = total / 3600;
    let minutes = total / 60 - hours * 60;
    let seconds = total - (hours * 60 + minutes) * 60;
    (hours, minutes, seconds)
}

/// Split a delta into hours, minutes and seconds after truncating it
pub fn split_delta(delta: TimeDelta) -> (i64, i64, i64) {
    split_seconds(delta.num_seconds())
}

/// `HH:MM:SS` with the sign dropped from every field
pub fn format_hms(hours: i64, minutes: i64, seconds: i64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        hours.saturating_abs(),
        minutes.saturating_abs(),
        seconds.saturating_abs()
    )
}

/// Render a whole-second count as a 2-digit count plus a unit letter.
///
/// The first unit whose count stays below 100 wins, so the result is
/// always three characters: `59s`, `01m`, `99h`, `12d` or [`COMPACT_OVERFLOW`].
pub fn secs_to_compact(raw_secs: i64) -> String {
    let secs = raw_secs.saturating_abs();
    for (unit, scale) in COMPACT_UNITS {
        let count = secs / scale;
        if count < 100 {
            return format!("{:02}{}", count, unit);
        }
    }
    COMPACT_OVERFLOW.to_string()
}

/// A decoded linear timecode value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timecode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
}

impl Timecode {
    /// Parse `HH:MM:SS:FF`
    pub fn parse(s: &str) -> Result<Self> {
        let caps = timecode_regex()
            .captures(s)
            .ok_or_else(|| Error::InvalidTimecode(s.to_string()))?;

        let field = |i: usize| -> Result<u32> {
            caps.get(i)
                .and_then(|m| m.as_str().parse().ok())
                .ok_or_else(|| Error::InvalidTimecode(s.to_string()))
        };

        Ok(Self {
            hours: field(1)?,
            minutes: field(2)?,
            seconds: field(3)?,
            frames: field(4)?,
        })
    }

    /// Hours, minutes and seconds as a span; frames are ignored
    pub fn duration(&self) -> TimeDelta {
        TimeDelta::seconds(
            i64::from(self.hours) * 3600 + i64::from(self.minutes) * 60 + i64::from(self.seconds),
        )
    }
}

impl std::fmt::Display for Timecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

/// A wall clock time without a date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl TimeOfDay {
    /// Parse `H:MM:SS` or `HH:MM:SS` as used for timer targets
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_with(time_of_day_regex(), s)
    }

    /// Parse the strict two-digit `HH:MM:SS` form accepted for setting the system clock
    pub fn parse_strict(s: &str) -> Result<Self> {
        Self::parse_with(clock_set_regex(), s)
    }

    fn parse_with(re: &Regex, s: &str) -> Result<Self> {
        let caps = re
            .captures(s)
            .ok_or_else(|| Error::InvalidTimeOfDay(s.to_string()))?;

        let field = |i: usize| -> Result<u32> {
            caps.get(i)
                .and_then(|m| m.as_str().parse().ok())
                .ok_or_else(|| Error::InvalidTimeOfDay(s.to_string()))
        };

        Ok(Self {
            hours: field(1)?,
            minutes: field(2)?,
            seconds: field(3)?,
        })
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_units() {
        assert_eq!(secs_to_compact(0), "00s");
        assert_eq!(secs_to_compact(99), "99s");
        assert_eq!(secs_to_compact(100), "01m");
        assert_eq!(secs_to_compact(5999), "99m");
        assert_eq!(secs_to_compact(6000), "01h");
        assert_eq!(secs_to_compact(360_000), "04d");
        assert_eq!(secs_to_compact(100 * 86_400), COMPACT_OVERFLOW);
    }

    #[test]
    fn test_compact_negative_uses_magnitude() {
        assert_eq!(secs_to_compact(-42), "42s");
        assert_eq!(secs_to_compact(i64::MIN), COMPACT_OVERFLOW);
    }

    #[test]
    fn test_split_seconds() {
        assert_eq!(split_seconds(3723), (1, 2, 3));
        assert_eq!(split_seconds(59), (0, 0, 59));
        assert_eq!(split_seconds(-61), (0, -1, -1));
    }

    #[test]
    fn test_truncate_delta_toward_zero() {
        assert_eq!(truncate_delta(TimeDelta::milliseconds(1999)), TimeDelta::seconds(1));
        assert_eq!(truncate_delta(TimeDelta::milliseconds(-1999)), TimeDelta::seconds(-1));
    }

    #[test]
    fn test_timecode_parse() {
        let tc = Timecode::parse("01:02:03:04").unwrap();
        assert_eq!(tc.hours, 1);
        assert_eq!(tc.frames, 4);
        assert_eq!(tc.duration(), TimeDelta::seconds(3723));
        assert_eq!(tc.to_string(), "01:02:03:04");
    }

    #[test]
    fn test_timecode_rejects_garbage() {
        assert!(Timecode::parse("1:02:03:04").is_err());
        assert!(Timecode::parse("01:60:03:04").is_err());
        assert!(Timecode::parse("01:02:03").is_err());
        assert!(Timecode::parse("").is_err());
    }

    #[test]
    fn test_time_of_day() {
        assert_eq!(
            TimeOfDay::parse("9:05:00").unwrap(),
            TimeOfDay { hours: 9, minutes: 5, seconds: 0 }
        );
        assert!(TimeOfDay::parse("24:00:00").is_err());
        assert!(TimeOfDay::parse_strict("9:05:00").is_err());
        assert!(TimeOfDay::parse_strict("23:59:59").is_ok());
    }
}

//! Countdown / count-up timers
//!
//! A [`Counter`] is either running on its own (a target instant plus the
//! original span) or mirroring the position of an external media player.
//! Starting it replaces the mirrored state and vice versa.
//!
//! Every mutating operation has an `*_at` form taking the current instant,
//! the plain forms read the system clock.

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{Error, Result};
use crate::message::MediaSync;
use crate::time::{format_hms, secs_to_compact, split_delta, split_seconds, truncate_delta, truncate_instant};

pub const ICON_PAUSED: &str = "⏸";
pub const ICON_LOOPING: &str = "↻";
pub const ICON_PLAYING: &str = "▶";
pub const ICON_COUNTDOWN: &str = "↓";
pub const ICON_COUNTUP: &str = "↑";

/// Span a stopped counter is reset to
const STOPPED_SPAN: TimeDelta = TimeDelta::milliseconds(1);

#[derive(Debug, Clone, Copy, PartialEq)]
struct LocalTiming {
    /// Instant the countdown reaches zero, or the origin of a count-up
    target: DateTime<Utc>,
    /// Total span, used for progress
    duration: TimeDelta,
    /// Span left (or elapsed) when paused
    left: TimeDelta,
}

impl LocalTiming {
    fn stopped(now: DateTime<Utc>) -> Self {
        Self {
            target: now,
            duration: STOPPED_SPAN,
            left: STOPPED_SPAN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Timing {
    Local(LocalTiming),
    Media(MediaSync),
}

/// Static output of a counter at a given instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterOutput {
    pub active: bool,
    /// Counter mirrors a playing media file
    pub media: bool,
    pub countdown: bool,
    pub paused: bool,
    pub looping: bool,
    pub expired: bool,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    /// `HH:MM:SS`
    pub text: String,
    pub icon: &'static str,
    /// Icon plus 3 character count, see [`secs_to_compact`]
    pub compact: String,
    /// Elapsed fraction of the total span, 0-1
    pub progress: f64,
    /// Raw signed difference to the target
    pub diff: TimeDelta,
}

/// A single timer
#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    active: bool,
    countdown: bool,
    paused: bool,
    timing: Timing,
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Counter {
    /// An inactive counter
    pub fn new() -> Self {
        Self {
            active: false,
            countdown: false,
            paused: false,
            timing: Timing::Local(LocalTiming::stopped(DateTime::<Utc>::UNIX_EPOCH)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_countdown(&self) -> bool {
        self.countdown
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// True while mirroring an external media player
    pub fn is_media(&self) -> bool {
        matches!(self.timing, Timing::Media(_))
    }

    /// Start counting `duration` down, or up from the current instant
    pub fn start(&mut self, countdown: bool, duration: TimeDelta) {
        self.start_at(countdown, duration, Utc::now());
    }

    pub fn start_at(&mut self, countdown: bool, duration: TimeDelta, now: DateTime<Utc>) {
        let target = truncate_instant(now + duration);
        let left = if countdown {
            truncate_delta(target - now)
        } else {
            truncate_delta(now - target)
        };

        self.timing = Timing::Local(LocalTiming {
            target,
            duration,
            left,
        });
        self.countdown = countdown;
        self.paused = false;
        self.active = true;
    }

    /// Count toward a future instant, or up from a past one
    pub fn target_at(&mut self, target: DateTime<Utc>, now: DateTime<Utc>) {
        let span = target - now;
        if span < TimeDelta::zero() {
            self.start_at(false, span, now);
        } else {
            self.start_at(true, span, now);
        }
    }

    /// Add time to a running counter. On a count-up the origin moves the other way.
    /// A change that would leave the representable range is refused and the
    /// counter is left as it was.
    pub fn modify(&mut self, delta: TimeDelta) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        let delta = if self.countdown { delta } else { -delta };

        if let Timing::Local(local) = &mut self.timing {
            let out_of_range = || Error::OutOfRange(format!("cannot add {}s", delta.num_seconds()));
            *local = LocalTiming {
                target: local.target.checked_add_signed(delta).ok_or_else(out_of_range)?,
                duration: local.duration.checked_add(&delta).ok_or_else(out_of_range)?,
                left: local.left.checked_add(&delta).ok_or_else(out_of_range)?,
            };
        }
        Ok(())
    }

    /// Stop and deactivate
    pub fn stop(&mut self) {
        self.stop_at(Utc::now());
    }

    pub fn stop_at(&mut self, now: DateTime<Utc>) {
        self.active = false;
        self.paused = false;
        self.timing = Timing::Local(LocalTiming::stopped(now));
    }

    /// Freeze the remaining (or elapsed) span
    pub fn pause(&mut self) {
        self.pause_at(Utc::now());
    }

    pub fn pause_at(&mut self, now: DateTime<Utc>) {
        if self.paused {
            return;
        }
        let countdown = self.countdown;
        if let Timing::Local(local) = &mut self.timing {
            local.left = if countdown {
                truncate_delta(local.target - now)
            } else {
                truncate_delta(now - local.target)
            };
            self.paused = true;
        }
    }

    /// Continue from the frozen span
    pub fn resume(&mut self) {
        self.resume_at(Utc::now());
    }

    pub fn resume_at(&mut self, now: DateTime<Utc>) {
        if !self.paused {
            return;
        }
        let countdown = self.countdown;
        if let Timing::Local(local) = &mut self.timing {
            let target = if countdown {
                now.checked_add_signed(local.left).unwrap_or(DateTime::<Utc>::MAX_UTC)
            } else {
                now.checked_sub_signed(local.left).unwrap_or(DateTime::<Utc>::MIN_UTC)
            };
            local.target = truncate_instant(target);
        }
        self.paused = false;
    }

    /// Mirror an external media player
    pub fn set_media(&mut self, sync: MediaSync) {
        self.timing = Timing::Media(sync);
        self.paused = false;
        self.active = true;
    }

    /// Drop the mirrored state. No-op unless the counter is mirroring.
    pub fn reset_media(&mut self) {
        if self.is_media() {
            self.active = false;
            self.timing = Timing::Local(LocalTiming::stopped(DateTime::<Utc>::UNIX_EPOCH));
        }
    }

    /// Signed time to the target: remaining on a countdown, elapsed on a count-up,
    /// the frozen span while paused, the reported remaining time for media.
    pub fn diff(&self, now: DateTime<Utc>) -> TimeDelta {
        match &self.timing {
            Timing::Media(media) => media.remaining,
            Timing::Local(local) if self.paused => local.left,
            Timing::Local(local) if self.countdown => local.target - now,
            Timing::Local(local) => now - local.target,
        }
    }

    /// Display output at `now`
    pub fn output(&self, now: DateTime<Utc>) -> CounterOutput {
        match &self.timing {
            Timing::Media(media) => media_output(media),
            Timing::Local(local) => self.local_output(local, now),
        }
    }

    fn local_output(&self, local: &LocalTiming, now: DateTime<Utc>) -> CounterOutput {
        if !self.active {
            return CounterOutput::default();
        }

        let diff = self.diff(now);
        let (mut hours, mut minutes, mut seconds) = split_delta(diff);

        let mut progress = if self.countdown {
            fraction(local.duration - diff, local.duration)
        } else {
            fraction(diff, local.duration)
        };

        let expired = self.countdown && diff < TimeDelta::seconds(1);
        if expired {
            hours = 0;
            minutes = 0;
            seconds = 0;
            progress = 1.0;
        }

        let icon = if self.paused {
            ICON_PAUSED
        } else if self.countdown {
            ICON_COUNTDOWN
        } else {
            ICON_COUNTUP
        };

        let raw_secs = truncate_delta(diff).num_seconds() + 1;

        CounterOutput {
            active: true,
            media: false,
            countdown: self.countdown,
            paused: self.paused,
            looping: false,
            expired,
            hours,
            minutes,
            seconds,
            text: format_hms(hours, minutes, seconds),
            icon,
            compact: format!("{}{}", icon, secs_to_compact(raw_secs)),
            progress,
            diff,
        }
    }
}

fn media_output(media: &MediaSync) -> CounterOutput {
    let icon = if media.paused {
        ICON_PAUSED
    } else if media.looping {
        ICON_LOOPING
    } else {
        ICON_PLAYING
    };

    let total = (i64::from(media.hours) * 60 + i64::from(media.minutes)) * 60 + i64::from(media.seconds);
    let (hours, minutes, seconds) = split_seconds(total);

    CounterOutput {
        active: true,
        media: true,
        countdown: true,
        paused: media.paused,
        looping: media.looping,
        expired: false,
        hours,
        minutes,
        seconds,
        text: format_hms(hours, minutes, seconds),
        icon,
        compact: format!("{}{}", icon, secs_to_compact(total)),
        progress: media.progress.clamp(0.0, 1.0),
        diff: media.remaining,
    }
}

/// `part / whole` clamped to 0-1, zero for an empty whole
fn fraction(part: TimeDelta, whole: TimeDelta) -> f64 {
    let whole = whole.num_milliseconds();
    if whole <= 0 {
        return 0.0;
    }
    (part.num_milliseconds() as f64 / whole as f64).clamp(0.0, 1.0)
}

//! Clock state machine
//!
//! [`Engine`] owns the counter pool and the display sources. It is a plain
//! value: commands are applied with [`Engine::handle`] and snapshots taken
//! with [`Engine::state`], both at an explicit instant. Timers that expire
//! state (tally, timecode, remote media) live in the service loop, which
//! calls back into the `expire_*` methods.
//!
//! Each source picks what to show in priority order:
//!
//! 1. hidden: blank
//! 2. timecode, while any has been received
//! 3. network time, while fresh
//! 4. the bound counter, while active
//! 5. time of day
//! 6. blank

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use clock_bridge::{CUE_PLAYER, LAYER_PLAYER};
use clock_core::time::{format_hms, split_delta};
use clock_core::{Clock, Color, Counter, Message, Mode, State, TimeOfDay, Timecode, NUM_COUNTERS};
use tracing::{debug, info, warn};

use crate::clock_setter::{LogOnlySetter, SystemClockSetter};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::source::Source;

/// Default tally text color
const TALLY_COLOR: Color = Color::rgb(255, 255, 155);

/// Caption length limit
const CAPTION_CHARS: usize = 8;

/// Icon for network time past its target
const OVERTIME_ICON: &str = "+";

/// An expiry timer the service must (re)arm after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Clear the tally after this long
    Tally(Duration),
    /// Flag timecode as lost after this long
    Ltc(Duration),
}

#[derive(Debug, Clone, Default)]
struct Tally {
    text: String,
    color: Color,
    background: Color,
    active: bool,
}

#[derive(Debug, Clone)]
struct Ltc {
    /// Last decoded value, frames already advanced by one
    timecode: Timecode,
    /// Instant timecode zero would have passed, for follow mode
    target: DateTime<Utc>,
    active: bool,
    timed_out: bool,
}

#[derive(Debug, Clone, Copy)]
struct NetworkTime {
    minutes: i32,
    seconds: i32,
    overtime: bool,
    received: DateTime<Utc>,
}

pub struct Engine {
    counters: Vec<Counter>,
    sources: Vec<Source>,
    /// Player name to counter index
    media_counters: HashMap<String, usize>,
    ltc: Ltc,
    ltc_enabled: bool,
    ltc_follow: bool,
    network_time: Option<NetworkTime>,
    tally: Tally,
    caption: String,
    display_seconds: bool,
    format_12h: bool,
    flash_ms: u32,
    timeout: Duration,
    initialized: bool,
    clock_setter: Box<dyn SystemClockSetter>,
}

impl Engine {
    /// Build from configuration. Bad zones, colors or counter bindings fail here.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let sources = config
            .sources
            .iter()
            .map(Source::from_config)
            .collect::<Result<Vec<_>>>()?;

        let mut media_counters = HashMap::new();
        for (player, counter) in [
            (CUE_PLAYER, config.mitti_counter),
            (LAYER_PLAYER, config.millumin_counter),
        ] {
            if counter >= NUM_COUNTERS {
                return Err(EngineError::CounterOutOfRange {
                    what: player.to_string(),
                    counter,
                    available: NUM_COUNTERS,
                });
            }
            media_counters.insert(player.to_string(), counter);
        }

        info!(
            "Engine initialized: {} counters, {} sources, media counters {:?}",
            NUM_COUNTERS,
            sources.len(),
            media_counters
        );

        Ok(Self {
            counters: vec![Counter::new(); NUM_COUNTERS],
            sources,
            media_counters,
            ltc: Ltc {
                timecode: Timecode::default(),
                target: DateTime::<Utc>::UNIX_EPOCH,
                active: false,
                timed_out: false,
            },
            ltc_enabled: !config.disable_ltc,
            ltc_follow: config.ltc_follow,
            network_time: None,
            tally: Tally {
                color: TALLY_COLOR,
                background: Color::BLACK,
                ..Default::default()
            },
            caption: String::new(),
            display_seconds: true,
            format_12h: config.format_12h,
            flash_ms: config.flash_ms,
            timeout: config.timeout(),
            initialized: false,
            clock_setter: Box::new(LogOnlySetter),
        })
    }

    /// Replace the handler for system clock requests
    pub fn with_clock_setter(mut self, setter: Box<dyn SystemClockSetter>) -> Self {
        self.clock_setter = setter;
        self
    }

    pub fn counter(&self, index: usize) -> Option<&Counter> {
        self.counters.get(index)
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Counter mirroring `player`, if one is configured
    pub fn media_counter(&self, player: &str) -> Option<usize> {
        self.media_counters.get(player).copied()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Zone used for targets and clock setting
    fn primary_zone(&self) -> Tz {
        self.sources
            .first()
            .map(Source::time_zone)
            .unwrap_or(chrono_tz::UTC)
    }

    /// Run `f` on a counter, warning if the index is out of range
    fn with_counter(&mut self, index: usize, f: impl FnOnce(&mut Counter)) -> bool {
        match self.counters.get_mut(index) {
            Some(counter) => {
                f(counter);
                true
            }
            None => {
                warn!("Illegal counter number {} (have {})", index, NUM_COUNTERS);
                false
            }
        }
    }

    fn with_source(&mut self, index: usize, f: impl FnOnce(&mut Source)) {
        let available = self.sources.len();
        match self.sources.get_mut(index) {
            Some(source) => f(source),
            None => warn!("Illegal source number {} (have {})", index + 1, available),
        }
    }

    /// Starting a counter makes every source showing it visible again
    fn unhide_sources(&mut self, counter: usize) {
        for source in self.sources.iter_mut().filter(|s| s.counter() == counter) {
            source.hidden = false;
        }
    }

    fn set_tally(&mut self, text: String, color: Color, background: Color) {
        info!("Setting tally message to: {}", text);
        self.tally = Tally {
            text,
            color,
            background,
            active: true,
        };
    }

    /// Apply one command. Returns the expiry timer to rearm, if any.
    pub fn handle(&mut self, message: Message, now: DateTime<Utc>) -> Option<Expiry> {
        debug!("Handling {}", message.kind());
        self.initialized = true;

        match message {
            Message::Count {
                color,
                symbol,
                count,
                unit,
            } => {
                let text = format!("{}{:02}{}", first_char(&symbol), count, first_char(&unit));
                self.set_tally(text, color, Color::BLACK);
                return Some(Expiry::Tally(self.timeout));
            }
            Message::Display { color, text } => {
                self.set_tally(text, color, Color::BLACK);
                return Some(Expiry::Tally(self.timeout));
            }
            Message::DisplayText {
                color,
                background,
                timeout,
                text,
            } => {
                self.set_tally(text, color, background);
                if timeout > 0 {
                    return Some(Expiry::Tally(Duration::from_secs(timeout as u64)));
                }
            }
            Message::TimerStart {
                counter,
                countdown,
                seconds,
            } => {
                let duration = TimeDelta::seconds(i64::from(seconds));
                if self.with_counter(counter, |c| c.start_at(countdown, duration, now)) {
                    self.unhide_sources(counter);
                }
            }
            Message::TimerModify { counter, seconds } => {
                self.with_counter(counter, |c| {
                    if let Err(e) = c.modify(TimeDelta::seconds(i64::from(seconds))) {
                        warn!("Ignoring modify of counter {}: {}", counter, e);
                    }
                });
            }
            Message::TimerStop { counter } => {
                self.with_counter(counter, |c| c.stop_at(now));
            }
            Message::TimerPause { counter } => {
                self.with_counter(counter, |c| c.pause_at(now));
            }
            Message::TimerResume { counter } => {
                self.with_counter(counter, |c| c.resume_at(now));
            }
            Message::TimerTarget {
                counter,
                countdown,
                target,
            } => self.target_counter(counter, countdown, &target, now),
            Message::Pause => self.counters.iter_mut().for_each(|c| c.pause_at(now)),
            Message::Resume => self.counters.iter_mut().for_each(|c| c.resume_at(now)),
            Message::Kill => self.sources.iter_mut().for_each(|s| s.hidden = true),
            Message::Normal => self.sources.iter_mut().for_each(|s| s.hidden = false),
            Message::SecondsOff => self.display_seconds = false,
            Message::SecondsOn => self.display_seconds = true,
            Message::SetTime(time) => self.set_time(&time, now),
            Message::Ltc(timecode) => {
                if !self.ltc_enabled {
                    return None;
                }
                match Timecode::parse(&timecode) {
                    Ok(tc) => self.set_ltc(tc, now),
                    Err(e) => warn!("Ignoring timecode: {}", e),
                }
                return Some(Expiry::Ltc(self.timeout));
            }
            Message::DualText(text) => {
                self.caption = text.chars().take(CAPTION_CHARS).collect();
            }
            Message::SourceHide { source } => self.with_source(source, |s| s.hidden = true),
            Message::SourceShow { source } => self.with_source(source, |s| s.hidden = false),
            Message::SourceTitle { source, title } => self.with_source(source, |s| s.title = title),
            Message::SourceColors {
                source,
                text,
                background,
            } => {
                info!("Setting source {} colors: {} - {}", source + 1, text, background);
                self.with_source(source, |s| {
                    s.text_color = text;
                    s.background = background;
                });
            }
            Message::Media { player, sync } => match self.media_counter(&player) {
                Some(counter) => {
                    self.with_counter(counter, |c| c.set_media(sync));
                }
                None => debug!("No counter for media player {}", player),
            },
            Message::MediaReset { player } => self.expire_media(&player),
            Message::NetworkTime {
                minutes,
                seconds,
                overtime,
            } => {
                self.network_time = Some(NetworkTime {
                    minutes,
                    seconds,
                    overtime,
                    received: now,
                });
            }
        }
        None
    }

    /// Tally timer fired
    pub fn expire_tally(&mut self) {
        debug!("Tally message expired");
        self.tally.text.clear();
        self.tally.active = false;
    }

    /// Timecode timer fired
    pub fn expire_ltc(&mut self) {
        if self.ltc.active && !self.ltc.timed_out {
            info!("Timecode lost");
        }
        self.ltc.timed_out = true;
    }

    /// Media for `player` is gone, either reported or timed out
    pub fn expire_media(&mut self, player: &str) {
        if let Some(counter) = self.media_counter(player) {
            self.with_counter(counter, Counter::reset_media);
        }
    }

    fn target_counter(&mut self, counter: usize, countdown: bool, target: &str, now: DateTime<Utc>) {
        let time = match TimeOfDay::parse(target) {
            Ok(time) => time,
            Err(e) => {
                warn!("Illegal timer target: {}", e);
                return;
            }
        };

        let zone = self.primary_zone();
        let local = now
            .with_timezone(&zone)
            .date_naive()
            .and_hms_opt(time.hours, time.minutes, time.seconds)
            .and_then(|naive| zone.from_local_datetime(&naive).earliest());
        let Some(local) = local else {
            warn!("Timer target {} does not exist in {}", time, zone);
            return;
        };

        let mut target = local.with_timezone(&Utc);
        if countdown && target < now {
            target += TimeDelta::days(1);
        } else if !countdown && target > now {
            target -= TimeDelta::days(1);
        }

        if self.with_counter(counter, |c| c.target_at(target, now)) {
            debug!("Counter {} target set to {}", counter, target);
            self.unhide_sources(counter);
        }
    }

    fn set_time(&mut self, time: &str, now: DateTime<Utc>) {
        let time = match TimeOfDay::parse_strict(time) {
            Ok(time) => time,
            Err(e) => {
                warn!("Invalid time provided: {}", e);
                return;
            }
        };

        if let Err(e) = self.clock_setter.set_time(time, self.primary_zone(), now) {
            warn!("Failed to set system clock: {}", e);
        }
    }

    /// A zero frame count re-anchors the follow target
    fn set_ltc(&mut self, tc: Timecode, now: DateTime<Utc>) {
        let target = if tc.frames == 0 {
            now - tc.duration()
        } else {
            self.ltc.target
        };

        self.ltc = Ltc {
            timecode: Timecode {
                frames: tc.frames + 1,
                ..tc
            },
            target,
            active: true,
            timed_out: false,
        };
    }

    fn fresh_network_time(&self, now: DateTime<Utc>) -> Option<NetworkTime> {
        let timeout = TimeDelta::from_std(self.timeout).unwrap_or(TimeDelta::MAX);
        self.network_time.filter(|t| now - t.received < timeout)
    }

    fn flash(&self, now: DateTime<Utc>) -> bool {
        self.flash_ms > 0 && now.timestamp_subsec_millis() < self.flash_ms
    }

    /// Display snapshot at `now`
    pub fn state(&self, now: DateTime<Utc>) -> State {
        let clocks = self.sources.iter().map(|s| self.clock(s, now)).collect();

        let (tally, tally_color, tally_background) = if self.tally.active {
            (self.tally.text.clone(), self.tally.color, self.tally.background)
        } else {
            (String::new(), Color::TRANSPARENT, Color::TRANSPARENT)
        };

        State {
            initialized: self.initialized,
            clocks,
            tally,
            tally_color,
            tally_background,
            flash: self.flash(now),
            caption: self.caption.clone(),
            timers: self.counters.iter().map(|c| c.output(now)).collect(),
        }
    }

    fn clock(&self, source: &Source, now: DateTime<Utc>) -> Clock {
        let mut clock = Clock {
            hidden: source.hidden,
            hide_seconds: !self.display_seconds,
            text_color: source.text_color,
            background: source.background,
            ..Clock::blank(source.title.clone())
        };

        if source.hidden {
            return clock;
        }

        let counter = &self.counters[source.counter()];

        if source.shows_ltc() && self.ltc.active {
            self.ltc_clock(&mut clock, now);
        } else if let Some(network) = self
            .fresh_network_time(now)
            .filter(|_| source.shows_network_time())
        {
            network_clock(&mut clock, &network);
        } else if source.shows_timer() && counter.is_active() {
            timer_clock(&mut clock, counter, now);
        } else if source.shows_tod() {
            self.tod_clock(&mut clock, source.time_zone(), now);
        }

        clock
    }

    fn ltc_clock(&self, clock: &mut Clock, now: DateTime<Utc>) {
        clock.mode = Mode::Ltc;
        clock.expired = self.ltc.timed_out;

        if !self.ltc.timed_out {
            let tc = self.ltc.timecode;
            clock.text = tc.to_string();
            clock.hours = i64::from(tc.hours);
            clock.minutes = i64::from(tc.minutes);
            clock.seconds = i64::from(tc.seconds);
            clock.frames = i64::from(tc.frames);
        } else if self.ltc_follow {
            let (hours, minutes, seconds) = split_delta(now - self.ltc.target);
            clock.text = format!("{}:00", format_hms(hours, minutes, seconds));
            clock.hours = hours;
            clock.minutes = minutes;
            clock.seconds = seconds;
        }
    }

    fn tod_clock(&self, clock: &mut Clock, zone: Tz, now: DateTime<Utc>) {
        let local = now.with_timezone(&zone);
        clock.mode = Mode::Normal;

        if self.format_12h {
            clock.text = local.format("%I:%M:%S").to_string();
            clock.hours = i64::from(local.hour() % 12);
        } else {
            clock.text = local.format("%H:%M:%S").to_string();
            clock.hours = i64::from(local.hour());
        }
        clock.minutes = i64::from(local.minute());
        clock.seconds = i64::from(local.second());

        if !self.display_seconds {
            clock.text.truncate(5);
        }
    }
}

fn timer_clock(clock: &mut Clock, counter: &Counter, now: DateTime<Utc>) {
    let out = counter.output(now);

    clock.mode = if out.media {
        Mode::Media
    } else if out.countdown {
        Mode::Countdown
    } else {
        Mode::Countup
    };
    clock.text = out.text;
    clock.compact = out.compact;
    clock.icon = out.icon.to_string();
    clock.hours = out.hours;
    clock.minutes = out.minutes;
    clock.seconds = out.seconds;
    clock.paused = out.paused;
    clock.expired = out.expired;
    clock.progress = out.progress;
}

fn network_clock(clock: &mut Clock, network: &NetworkTime) {
    clock.mode = Mode::Slave;
    clock.text = format!("{:02}:{:02}", network.minutes, network.seconds);
    clock.minutes = i64::from(network.minutes);
    clock.seconds = i64::from(network.seconds);
    clock.expired = network.overtime;
    if network.overtime {
        clock.icon = OVERTIME_ICON.to_string();
    }
}

fn first_char(s: &str) -> String {
    s.chars().take(1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_count_formatting() {
        let mut engine = engine();
        let expiry = engine.handle(
            Message::Count {
                color: Color::rgb(255, 0, 0),
                symbol: "+-".into(),
                count: 7,
                unit: "min".into(),
            },
            Utc::now(),
        );

        assert_eq!(expiry, Some(Expiry::Tally(Duration::from_secs(1))));
        let state = engine.state(Utc::now());
        assert_eq!(state.tally, "+07m");
        assert_eq!(state.tally_color, Color::rgb(255, 0, 0));
    }

    #[test]
    fn test_display_text_timeout() {
        let mut engine = engine();
        let text = |timeout| Message::DisplayText {
            color: Color::WHITE,
            background: Color::rgb(0, 0, 255),
            timeout,
            text: "ON AIR".into(),
        };

        assert_eq!(engine.handle(text(0), Utc::now()), None);
        assert_eq!(
            engine.handle(text(5), Utc::now()),
            Some(Expiry::Tally(Duration::from_secs(5)))
        );
        assert_eq!(engine.state(Utc::now()).tally_background, Color::rgb(0, 0, 255));

        engine.expire_tally();
        let state = engine.state(Utc::now());
        assert_eq!(state.tally, "");
    }

    #[test]
    fn test_caption_truncated() {
        let mut engine = engine();
        engine.handle(Message::DualText("ABCDEFGHIJ".into()), Utc::now());
        assert_eq!(engine.state(Utc::now()).caption, "ABCDEFGH");
    }

    #[test]
    fn test_out_of_range_counter_ignored() {
        let mut engine = engine();
        engine.handle(
            Message::TimerStart {
                counter: NUM_COUNTERS,
                countdown: true,
                seconds: 10,
            },
            Utc::now(),
        );
        assert!(engine.state(Utc::now()).timers.iter().all(|t| !t.active));
    }

    #[test]
    fn test_media_counter_binding_checked() {
        let config = EngineConfig {
            millumin_counter: NUM_COUNTERS,
            ..Default::default()
        };
        assert!(matches!(
            Engine::new(&config),
            Err(EngineError::CounterOutOfRange { .. })
        ));
    }

    #[test]
    fn test_initialized_on_first_command() {
        let mut engine = engine();
        assert!(!engine.state(Utc::now()).initialized);
        engine.handle(Message::SecondsOn, Utc::now());
        assert!(engine.is_initialized());
    }
}

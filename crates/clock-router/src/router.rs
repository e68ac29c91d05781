//! Clock command router
//!
//! Maps OSC addresses to typed [`Message`]s and fans them out to every
//! subscriber. Addresses carrying a timer or source number, or a media
//! player name, capture it with a regex group.
//!
//! Fan-out uses a bounded broadcast channel: a subscriber that falls behind
//! loses the oldest messages instead of blocking the publisher, and dropping
//! a receiver unsubscribes it.

use std::net::SocketAddr;

use chrono::TimeDelta;
use clock_core::{Color, MediaSync, Message, NUM_COUNTERS};
use regex_lite::Regex;
use rosc::OscMessage;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::args::Args;
use crate::error::{DecodeError, Result, RouterError};
use crate::handler::OscHandler;

/// Default per-subscriber queue depth
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Count,
    Display,
    DisplayText,
    TimerCountdown,
    TimerCountup,
    TimerModify,
    TimerStop,
    TimerPause,
    TimerResume,
    TimerTarget,
    Pause,
    Resume,
    Kill,
    Normal,
    SecondsOff,
    SecondsOn,
    TimeSet,
    Ltc,
    DualText,
    SourceHide,
    SourceShow,
    SourceTitle,
    SourceColors,
    Media,
    ResetMedia,
}

/// Address table: pattern, command, fixed timer index for legacy addresses
const ROUTES: &[(&str, Command, Option<usize>)] = &[
    (r"^/clock/tally$", Command::Count, None),
    (r"^/qmsk/clock/count$", Command::Count, None),
    (r"^/clock/display$", Command::Display, None),
    (r"^/clock/text$", Command::DisplayText, None),
    (r"^/clock/timer/(\d+)/countdown$", Command::TimerCountdown, None),
    (r"^/clock/timer/(\d+)/countup$", Command::TimerCountup, None),
    (r"^/clock/timer/(\d+)/modify$", Command::TimerModify, None),
    (r"^/clock/timer/(\d+)/stop$", Command::TimerStop, None),
    (r"^/clock/timer/(\d+)/pause$", Command::TimerPause, None),
    (r"^/clock/timer/(\d+)/resume$", Command::TimerResume, None),
    (r"^/clock/timer/(\d+)/target$", Command::TimerTarget, None),
    (r"^/clock/countdown/start$", Command::TimerCountdown, Some(0)),
    (r"^/clock/countdown2/start$", Command::TimerCountdown, Some(1)),
    (r"^/clock/countdown/modify$", Command::TimerModify, Some(0)),
    (r"^/clock/countdown2/modify$", Command::TimerModify, Some(1)),
    (r"^/clock/countup/modify$", Command::TimerModify, Some(0)),
    (r"^/clock/countdown/stop$", Command::TimerStop, Some(0)),
    (r"^/clock/countdown2/stop$", Command::TimerStop, Some(1)),
    (r"^/clock/countup/start$", Command::TimerCountup, Some(0)),
    (r"^/clock/pause$", Command::Pause, None),
    (r"^/clock/resume$", Command::Resume, None),
    (r"^/clock/kill$", Command::Kill, None),
    (r"^/clock/normal$", Command::Normal, None),
    (r"^/clock/seconds/off$", Command::SecondsOff, None),
    (r"^/clock/seconds/on$", Command::SecondsOn, None),
    (r"^/clock/time/set$", Command::TimeSet, None),
    (r"^/clock/ltc$", Command::Ltc, None),
    (r"^/clock/dual/text$", Command::DualText, None),
    (r"^/clock/source/(\d+)/hide$", Command::SourceHide, None),
    (r"^/clock/source/(\d+)/show$", Command::SourceShow, None),
    (r"^/clock/source/(\d+)/title$", Command::SourceTitle, None),
    (r"^/clock/source/(\d+)/colors$", Command::SourceColors, None),
    (r"^/clock/media/([^/]+)$", Command::Media, None),
    (r"^/clock/resetmedia/([^/]+)$", Command::ResetMedia, None),
];

struct Route {
    regex: Regex,
    command: Command,
    index: Option<usize>,
}

/// Result of decoding a routed message
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Message(Message),
    /// A media update this instance sent itself
    OwnEcho,
}

/// Decodes clock commands and fans them out to subscribers
pub struct ClockRouter {
    routes: Vec<Route>,
    tx: broadcast::Sender<Message>,
    instance_id: String,
}

impl ClockRouter {
    pub fn new(instance_id: impl Into<String>) -> Result<Self> {
        Self::with_capacity(instance_id, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(instance_id: impl Into<String>, capacity: usize) -> Result<Self> {
        let routes = ROUTES
            .iter()
            .map(|(pattern, command, index)| {
                Regex::new(pattern)
                    .map(|regex| Route {
                        regex,
                        command: *command,
                        index: *index,
                    })
                    .map_err(|e| RouterError::InvalidPattern(format!("{}: {}", pattern, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let (tx, _) = broadcast::channel(capacity.max(1));

        Ok(Self {
            routes,
            tx,
            instance_id: instance_id.into(),
        })
    }

    /// Identifier used to recognise our own media broadcasts
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Register a new subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Deliver a message to every subscriber. Returns the number reached.
    pub fn publish(&self, message: Message) -> usize {
        debug!("Routing {}", message.kind());
        self.tx.send(message).unwrap_or(0)
    }

    /// Decode an OSC message. `None` when no route matches the address.
    pub fn decode(&self, msg: &OscMessage) -> Option<std::result::Result<Decoded, DecodeError>> {
        self.routes.iter().find_map(|route| {
            let caps = route.regex.captures(&msg.addr)?;
            let capture = caps.get(1).map(|m| m.as_str());
            Some(self.decode_route(route, capture, msg))
        })
    }

    fn decode_route(
        &self,
        route: &Route,
        capture: Option<&str>,
        msg: &OscMessage,
    ) -> std::result::Result<Decoded, DecodeError> {
        let args = &msg.args;
        let timer = || timer_index(route.index, capture);
        let source = || source_index(capture);

        let message = match route.command {
            Command::Count => {
                let mut a = Args::between(args, 5, 6)?;
                let color = float_color(&mut a)?;
                let symbol = a.string()?;
                let count = a.int()?;
                let unit = if a.remaining() > 0 { a.string()? } else { String::new() };
                Message::Count {
                    color,
                    symbol,
                    count,
                    unit,
                }
            }
            Command::Display => {
                let mut a = Args::exact(args, 4)?;
                let color = float_color(&mut a)?;
                Message::Display {
                    color,
                    text: a.string()?,
                }
            }
            Command::DisplayText => {
                let mut a = Args::exact(args, 10)?;
                let color = int_color(&mut a)?;
                let background = int_color(&mut a)?;
                Message::DisplayText {
                    color,
                    background,
                    timeout: a.int()?,
                    text: a.string()?,
                }
            }
            Command::TimerCountdown => Message::TimerStart {
                counter: timer()?,
                countdown: true,
                seconds: Args::exact(args, 1)?.int()?,
            },
            Command::TimerCountup => {
                Args::exact(args, 0)?;
                Message::TimerStart {
                    counter: timer()?,
                    countdown: false,
                    seconds: 0,
                }
            }
            Command::TimerModify => Message::TimerModify {
                counter: timer()?,
                seconds: Args::exact(args, 1)?.int()?,
            },
            Command::TimerStop => {
                Args::exact(args, 0)?;
                Message::TimerStop { counter: timer()? }
            }
            Command::TimerPause => {
                Args::exact(args, 0)?;
                Message::TimerPause { counter: timer()? }
            }
            Command::TimerResume => {
                Args::exact(args, 0)?;
                Message::TimerResume { counter: timer()? }
            }
            Command::TimerTarget => Message::TimerTarget {
                counter: timer()?,
                countdown: true,
                target: Args::exact(args, 1)?.string()?,
            },
            Command::Pause => no_args(args, Message::Pause)?,
            Command::Resume => no_args(args, Message::Resume)?,
            Command::Kill => no_args(args, Message::Kill)?,
            Command::Normal => no_args(args, Message::Normal)?,
            Command::SecondsOff => no_args(args, Message::SecondsOff)?,
            Command::SecondsOn => no_args(args, Message::SecondsOn)?,
            Command::TimeSet => Message::SetTime(Args::exact(args, 1)?.string()?),
            Command::Ltc => Message::Ltc(Args::exact(args, 1)?.string()?),
            Command::DualText => Message::DualText(Args::exact(args, 1)?.string()?),
            Command::SourceHide => {
                Args::exact(args, 0)?;
                Message::SourceHide { source: source()? }
            }
            Command::SourceShow => {
                Args::exact(args, 0)?;
                Message::SourceShow { source: source()? }
            }
            Command::SourceTitle => Message::SourceTitle {
                source: source()?,
                title: Args::exact(args, 1)?.string()?,
            },
            Command::SourceColors => {
                let mut a = Args::exact(args, 8)?;
                Message::SourceColors {
                    source: source()?,
                    text: int_color(&mut a)?,
                    background: int_color(&mut a)?,
                }
            }
            Command::Media => {
                let mut a = Args::between(args, 9, 10)?;
                let hours = a.int()?;
                let minutes = a.int()?;
                let seconds = a.int()?;
                let frames = a.int()?;
                let remaining = a.int()?;
                let progress = a.float()?;
                let paused = a.boolean()?;
                let looping = a.boolean()?;
                a.time()?;
                if a.remaining() > 0 && a.string()? == self.instance_id {
                    return Ok(Decoded::OwnEcho);
                }

                Message::Media {
                    player: capture.unwrap_or_default().to_string(),
                    sync: MediaSync {
                        hours,
                        minutes,
                        seconds,
                        frames,
                        remaining: TimeDelta::seconds(i64::from(remaining)),
                        progress,
                        paused,
                        looping,
                    },
                }
            }
            Command::ResetMedia => {
                let mut a = Args::between(args, 0, 2)?;
                if a.remaining() > 0 {
                    a.time()?;
                }
                if a.remaining() > 0 && a.string()? == self.instance_id {
                    return Ok(Decoded::OwnEcho);
                }
                Message::MediaReset {
                    player: capture.unwrap_or_default().to_string(),
                }
            }
        };

        Ok(Decoded::Message(message))
    }
}

impl OscHandler for ClockRouter {
    fn name(&self) -> &str {
        "clock"
    }

    fn handle(&self, msg: &OscMessage, from: SocketAddr) -> bool {
        match self.decode(msg) {
            None => false,
            Some(Err(e)) => {
                warn!("Dropping {} from {}: {}", msg.addr, from, e);
                true
            }
            Some(Ok(Decoded::OwnEcho)) => {
                debug!("Ignoring own echo on {}", msg.addr);
                true
            }
            Some(Ok(Decoded::Message(message))) => {
                debug!("{} from {}: {:?}", msg.addr, from, message);
                self.publish(message);
                true
            }
        }
    }
}

fn no_args(args: &[rosc::OscType], message: Message) -> std::result::Result<Message, DecodeError> {
    Args::exact(args, 0)?;
    Ok(message)
}

fn float_color(a: &mut Args<'_>) -> std::result::Result<Color, DecodeError> {
    let r = a.float()?;
    let g = a.float()?;
    let b = a.float()?;
    Ok(Color::from_floats(r as f32, g as f32, b as f32))
}

fn int_color(a: &mut Args<'_>) -> std::result::Result<Color, DecodeError> {
    let r = a.int()?;
    let g = a.int()?;
    let b = a.int()?;
    let alpha = a.int()?;
    Ok(Color::from_ints(r, g, b, alpha))
}

fn timer_index(fixed: Option<usize>, capture: Option<&str>) -> std::result::Result<usize, DecodeError> {
    if let Some(index) = fixed {
        return Ok(index);
    }
    let raw = capture.unwrap_or_default();
    raw.parse::<usize>()
        .ok()
        .filter(|i| *i < NUM_COUNTERS)
        .ok_or_else(|| DecodeError::Index(format!("timer {}", raw)))
}

/// Sources are numbered from 1 on the wire
fn source_index(capture: Option<&str>) -> std::result::Result<usize, DecodeError> {
    let raw = capture.unwrap_or_default();
    raw.parse::<usize>()
        .ok()
        .and_then(|i| i.checked_sub(1))
        .ok_or_else(|| DecodeError::Index(format!("source {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscTime, OscType};

    fn osc(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    fn decode(router: &ClockRouter, msg: OscMessage) -> Message {
        match router.decode(&msg) {
            Some(Ok(Decoded::Message(m))) => m,
            other => panic!("{} decoded to {:?}", msg.addr, other),
        }
    }

    #[test]
    fn test_timer_routes() {
        let router = ClockRouter::new("me").unwrap();

        assert_eq!(
            decode(&router, osc("/clock/timer/3/countdown", vec![OscType::Int(90)])),
            Message::TimerStart {
                counter: 3,
                countdown: true,
                seconds: 90
            }
        );
        assert_eq!(
            decode(&router, osc("/clock/timer/2/countup", vec![])),
            Message::TimerStart {
                counter: 2,
                countdown: false,
                seconds: 0
            }
        );
        assert_eq!(
            decode(&router, osc("/clock/timer/1/pause", vec![])),
            Message::TimerPause { counter: 1 }
        );
    }

    #[test]
    fn test_legacy_routes() {
        let router = ClockRouter::new("me").unwrap();

        assert_eq!(
            decode(&router, osc("/clock/countdown2/start", vec![OscType::Int(10)])),
            Message::TimerStart {
                counter: 1,
                countdown: true,
                seconds: 10
            }
        );
        assert_eq!(
            decode(&router, osc("/clock/countup/modify", vec![OscType::Int(-5)])),
            Message::TimerModify {
                counter: 0,
                seconds: -5
            }
        );
        assert_eq!(
            decode(&router, osc("/clock/countdown/stop", vec![])),
            Message::TimerStop { counter: 0 }
        );
    }

    #[test]
    fn test_timer_index_out_of_range() {
        let router = ClockRouter::new("me").unwrap();
        let result = router.decode(&osc("/clock/timer/10/stop", vec![]));
        assert!(matches!(result, Some(Err(DecodeError::Index(_)))));
    }

    #[test]
    fn test_source_index_is_one_based() {
        let router = ClockRouter::new("me").unwrap();
        assert_eq!(
            decode(&router, osc("/clock/source/1/hide", vec![])),
            Message::SourceHide { source: 0 }
        );
        assert!(matches!(
            router.decode(&osc("/clock/source/0/hide", vec![])),
            Some(Err(DecodeError::Index(_)))
        ));
    }

    #[test]
    fn test_count_with_optional_unit() {
        let router = ClockRouter::new("me").unwrap();
        let args = vec![
            OscType::Float(255.0),
            OscType::Float(0.0),
            OscType::Float(0.0),
            OscType::String("Q".into()),
            OscType::Int(7),
        ];
        assert_eq!(
            decode(&router, osc("/clock/tally", args)),
            Message::Count {
                color: Color::rgb(255, 0, 0),
                symbol: "Q".into(),
                count: 7,
                unit: String::new(),
            }
        );
    }

    #[test]
    fn test_unrouted() {
        let router = ClockRouter::new("me").unwrap();
        assert!(router.decode(&osc("/clock/unknown", vec![])).is_none());
        assert!(router.decode(&osc("/clock/timer/x/stop", vec![])).is_none());
    }

    #[test]
    fn test_own_media_echo() {
        let router = ClockRouter::new("me").unwrap();
        let mut args = vec![
            OscType::Int(0),
            OscType::Int(1),
            OscType::Int(2),
            OscType::Int(0),
            OscType::Int(62),
            OscType::Double(0.5),
            OscType::Bool(false),
            OscType::Bool(true),
            OscType::Time(OscTime::from((0, 1))),
            OscType::String("me".into()),
        ];
        let own = router.decode(&osc("/clock/media/mitti", args.clone()));
        assert_eq!(own, Some(Ok(Decoded::OwnEcho)));

        args[9] = OscType::String("other".into());
        match decode(&router, osc("/clock/media/mitti", args)) {
            Message::Media { player, sync } => {
                assert_eq!(player, "mitti");
                assert_eq!(sync.minutes, 1);
                assert_eq!(sync.remaining, TimeDelta::seconds(62));
                assert!(sync.looping);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fan_out() {
        let router = ClockRouter::new("me").unwrap();
        let mut a = router.subscribe();
        let mut b = router.subscribe();
        assert_eq!(router.subscriber_count(), 2);

        assert!(router.handle(&osc("/clock/kill", vec![]), "127.0.0.1:9".parse().unwrap()));
        assert_eq!(a.recv().await.unwrap(), Message::Kill);
        assert_eq!(b.recv().await.unwrap(), Message::Kill);

        drop(b);
        assert_eq!(router.subscriber_count(), 1);
    }
}

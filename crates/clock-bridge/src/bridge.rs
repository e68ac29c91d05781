//! Media bridge
//!
//! Turns layer snapshots and cue states into [`Message::Media`] and
//! [`Message::MediaReset`] commands for the engine.
//!
//! Layer selection walks layers in name order and takes the first one that is
//! playing, not ignored and updated recently. When something is playing but
//! nothing qualifies the previous media state is left alone; when nothing is
//! playing at all the media is reset.
//!
//! The cue feed has a watchdog: if no cue update arrives within the timeout,
//! the cue media is reset once.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use clock_core::{MediaSync, Message};
use regex_lite::{Regex, RegexBuilder};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::millumin::{LayerSnapshot, LayerState};
use crate::mitti::CueState;

/// Player name used for layer feed media
pub const LAYER_PLAYER: &str = "millumin";

/// Player name used for cue feed media
pub const CUE_PLAYER: &str = "mitti";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Layers whose name matches are never shown, case-insensitive
    pub ignore_pattern: String,
    /// Layer updates older than this are not trusted
    pub stale_after: Duration,
    /// Cue media is reset when no cue update arrives within this time
    pub cue_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ignore_pattern: "ignore".to_string(),
            stale_after: Duration::from_secs(1),
            cue_timeout: Duration::from_secs(1),
        }
    }
}

/// Outcome of picking a layer to show
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerSelection<'a> {
    Layer(&'a LayerState),
    /// Layers are playing but none may be shown
    NoneQualified,
    /// Nothing is playing
    Idle,
}

/// First playing, non-ignored, fresh layer in name order
pub fn select_layer<'a>(
    layers: &'a LayerSnapshot,
    ignore: &Regex,
    stale_after: TimeDelta,
    now: DateTime<Utc>,
) -> LayerSelection<'a> {
    let mut any_playing = false;

    for state in layers.values().filter(|s| s.playing) {
        any_playing = true;

        if ignore.is_match(&state.layer) {
            debug!("Layer {} ignored", state.layer);
        } else if state.updated < now - stale_after {
            debug!("Layer {} stale", state.layer);
        } else {
            return LayerSelection::Layer(state);
        }
    }

    if any_playing {
        LayerSelection::NoneQualified
    } else {
        LayerSelection::Idle
    }
}

/// Whole seconds of a player reported span, if it fits in an `i32`
fn whole_seconds(value: f32) -> Option<i64> {
    let value = value.trunc();
    (value.is_finite() && value >= i32::MIN as f32 && value <= i32::MAX as f32)
        .then_some(value as i64)
}

/// Media position for a layer. The player reports the floor of the
/// remaining time, so one second is added. `None` when the reported
/// duration is out of range.
pub fn layer_sync(state: &LayerState) -> Option<MediaSync> {
    let remaining = TimeDelta::try_seconds(whole_seconds(state.remaining())? + 1)?;
    let total = TimeDelta::try_seconds(whole_seconds(state.duration)?)?;

    let progress = if total > TimeDelta::zero() {
        (1.0 - remaining.num_seconds() as f64 / total.num_seconds() as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Some(MediaSync::from_remaining(remaining, progress, state.paused, false))
}

/// Media position for the current cue
pub fn cue_sync(state: &CueState) -> MediaSync {
    MediaSync {
        hours: state.hours as i32,
        minutes: state.minutes as i32,
        seconds: state.seconds as i32,
        frames: state.frames as i32,
        remaining: TimeDelta::seconds(state.remaining),
        progress: state.progress(),
        paused: state.paused,
        looping: state.looping,
    }
}

pub struct MediaBridge {
    config: BridgeConfig,
    ignore: Regex,
    tx: mpsc::Sender<Message>,
}

impl MediaBridge {
    /// `tx` receives the media commands, normally the engine's local command queue
    pub fn new(config: BridgeConfig, tx: mpsc::Sender<Message>) -> Result<Self> {
        let ignore = RegexBuilder::new(&config.ignore_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| BridgeError::InvalidPattern(format!("{}: {}", config.ignore_pattern, e)))?;

        Ok(Self { config, ignore, tx })
    }

    /// Command for a layer snapshot, `None` when the media state should be left alone
    pub fn layer_update(&self, layers: &LayerSnapshot, now: DateTime<Utc>) -> Option<Message> {
        let stale_after =
            TimeDelta::from_std(self.config.stale_after).unwrap_or(TimeDelta::seconds(1));

        match select_layer(layers, &self.ignore, stale_after, now) {
            LayerSelection::Layer(state) => match layer_sync(state) {
                Some(sync) => Some(Message::Media {
                    player: LAYER_PLAYER.to_string(),
                    sync,
                }),
                None => {
                    warn!(
                        "Layer {} position out of range (duration {}, time {})",
                        state.layer, state.duration, state.time
                    );
                    None
                }
            },
            LayerSelection::NoneQualified => None,
            LayerSelection::Idle => Some(Message::MediaReset {
                player: LAYER_PLAYER.to_string(),
            }),
        }
    }

    pub fn cue_update(&self, state: &CueState) -> Message {
        Message::Media {
            player: CUE_PLAYER.to_string(),
            sync: cue_sync(state),
        }
    }

    async fn send(&self, message: Message) -> bool {
        debug!("Bridge: {:?}", message);
        self.tx.send(message).await.is_ok()
    }

    /// Translate feed updates until cancelled or the engine goes away
    pub async fn run(
        self,
        mut layers: mpsc::Receiver<LayerSnapshot>,
        mut cues: mpsc::Receiver<CueState>,
        cancel: CancellationToken,
    ) {
        info!("Media bridge running");

        let watchdog = tokio::time::sleep(self.config.cue_timeout);
        tokio::pin!(watchdog);
        let mut watchdog_armed = false;

        loop {
            let delivered = tokio::select! {
                _ = cancel.cancelled() => break,

                Some(snapshot) = layers.recv() => {
                    match self.layer_update(&snapshot, Utc::now()) {
                        Some(message) => self.send(message).await,
                        None => true,
                    }
                }

                Some(state) = cues.recv() => {
                    watchdog
                        .as_mut()
                        .reset(tokio::time::Instant::now() + self.config.cue_timeout);
                    watchdog_armed = true;
                    self.send(self.cue_update(&state)).await
                }

                _ = &mut watchdog, if watchdog_armed => {
                    watchdog_armed = false;
                    warn!("No cue updates for {:?}, resetting media", self.config.cue_timeout);
                    self.send(Message::MediaReset { player: CUE_PLAYER.to_string() }).await
                }

                else => break,
            };

            if !delivered {
                break;
            }
        }

        info!("Media bridge stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::millumin::MediaInfo;

    fn playing(layer: &str, now: DateTime<Utc>) -> LayerState {
        let mut state = LayerState::new(layer);
        state.media_started(
            MediaInfo {
                index: 1,
                name: "clip".into(),
                duration: 100.0,
            },
            now,
        );
        state.media_time(39.6, 100.0, now);
        state
    }

    #[test]
    fn test_layer_sync_adds_one_second() {
        let sync = layer_sync(&playing("A", Utc::now())).unwrap();
        // 60.4 s left is reported as 61
        assert_eq!(sync.remaining, TimeDelta::seconds(61));
        assert_eq!((sync.minutes, sync.seconds), (1, 1));
        assert!((sync.progress - 0.39).abs() < 1e-9);
    }

    #[test]
    fn test_layer_sync_zero_duration() {
        let state = LayerState::new("A");
        assert_eq!(layer_sync(&state).unwrap().progress, 0.0);
    }

    #[test]
    fn test_layer_sync_out_of_range() {
        let mut state = playing("A", Utc::now());
        for duration in [1.0e17, 1.0e30, f32::INFINITY, f32::NAN] {
            state.duration = duration;
            assert_eq!(layer_sync(&state), None, "duration {}", duration);
        }
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        let (tx, _rx) = mpsc::channel(1);
        let config = BridgeConfig {
            ignore_pattern: "(".into(),
            ..Default::default()
        };
        assert!(matches!(
            MediaBridge::new(config, tx),
            Err(BridgeError::InvalidPattern(_))
        ));
    }
}

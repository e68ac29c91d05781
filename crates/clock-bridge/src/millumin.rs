//! Millumin layer feed
//!
//! Millumin reports playback per layer:
//!
//! ```text
//! /millumin/layer:{name}/mediaStarted   i index, s name, f duration
//! /millumin/layer:{name}/media/time     f time, f duration
//! /millumin/layer:{name}/mediaPaused    i index, s name, f duration
//! /millumin/layer:{name}/mediaStopped   i index, s name, f duration
//! ```
//!
//! [`LayerFeed`] keeps the latest state of every layer and pushes a complete
//! snapshot to the bridge after each update.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use clock_router::args::Args;
use clock_router::{DecodeError, OscHandler};
use parking_lot::Mutex;
use regex_lite::Regex;
use rosc::OscMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const LAYER_PATTERN: &str = r"^/millumin/layer:([^/]+)/(mediaStarted|media/time|mediaPaused|mediaStopped)$";

fn layer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LAYER_PATTERN).expect("layer pattern is valid"))
}

/// Every layer's state, ordered by layer name
pub type LayerSnapshot = BTreeMap<String, LayerState>;

/// The media file a layer event refers to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub index: i32,
    pub name: String,
    pub duration: f32,
}

impl MediaInfo {
    fn decode(msg: &OscMessage) -> Result<Self, DecodeError> {
        let mut args = Args::exact(&msg.args, 3)?;
        Ok(Self {
            index: args.int()?,
            name: args.string()?,
            duration: args.float()? as f32,
        })
    }
}

/// Playback state of one layer
#[derive(Debug, Clone, PartialEq)]
pub struct LayerState {
    pub layer: String,
    pub updated: DateTime<Utc>,
    pub playing: bool,
    pub paused: bool,
    pub info: MediaInfo,
    /// Seconds
    pub duration: f32,
    /// Playback position, seconds
    pub time: f32,
}

impl LayerState {
    pub fn new(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            updated: DateTime::<Utc>::UNIX_EPOCH,
            playing: false,
            paused: false,
            info: MediaInfo::default(),
            duration: 0.0,
            time: 0.0,
        }
    }

    /// Seconds left in the current media
    pub fn remaining(&self) -> f32 {
        self.duration - self.time
    }

    pub fn media_started(&mut self, info: MediaInfo, now: DateTime<Utc>) {
        self.updated = now;
        self.playing = true;
        self.paused = false;
        self.duration = info.duration;
        self.time = 0.0;
        self.info = info;
        info!("Media started on {}: {}", self.layer, self.info.name);
    }

    pub fn media_paused(&mut self, info: MediaInfo, now: DateTime<Utc>) {
        self.updated = now;
        self.paused = true;
        self.duration = info.duration;
        self.info = info;
        info!("Media paused on {}: {}", self.layer, self.info.name);
    }

    /// Millumin sends `mediaStarted` for the new media before `mediaStopped`
    /// for the old one, so a stop for another index is ignored
    pub fn media_stopped(&mut self, info: MediaInfo, now: DateTime<Utc>) {
        if self.info.index > 0 && info.index != self.info.index {
            debug!(
                "Ignoring stop of media {} on {}, playing {}",
                info.index, self.layer, self.info.index
            );
            return;
        }

        self.updated = now;
        self.playing = false;
        self.duration = info.duration;
        self.info = info;
        info!("Media stopped on {}", self.layer);
    }

    pub fn media_time(&mut self, time: f32, duration: f32, now: DateTime<Utc>) {
        self.updated = now;
        self.duration = duration;
        self.time = time;
    }
}

/// OSC handler for the Millumin layer messages
pub struct LayerFeed {
    layers: Mutex<LayerSnapshot>,
    tx: mpsc::Sender<LayerSnapshot>,
}

impl LayerFeed {
    pub fn new(tx: mpsc::Sender<LayerSnapshot>) -> Self {
        Self {
            layers: Mutex::new(BTreeMap::new()),
            tx,
        }
    }

    /// Current state of every layer
    pub fn snapshot(&self) -> LayerSnapshot {
        self.layers.lock().clone()
    }

    /// Apply one layer event at `now`. Returns `false` if the address is not a layer event.
    pub fn apply(&self, msg: &OscMessage, now: DateTime<Utc>) -> Result<bool, DecodeError> {
        let Some(caps) = layer_regex().captures(&msg.addr) else {
            return Ok(false);
        };
        let layer = caps.get(1).map_or("", |m| m.as_str());
        let event = caps.get(2).map_or("", |m| m.as_str());

        let snapshot = {
            let mut layers = self.layers.lock();
            let state = layers
                .entry(layer.to_string())
                .or_insert_with(|| LayerState::new(layer));

            match event {
                "mediaStarted" => state.media_started(MediaInfo::decode(msg)?, now),
                "mediaPaused" => state.media_paused(MediaInfo::decode(msg)?, now),
                "mediaStopped" => state.media_stopped(MediaInfo::decode(msg)?, now),
                _ => {
                    let mut args = Args::exact(&msg.args, 2)?;
                    let time = args.float()? as f32;
                    let duration = args.float()? as f32;
                    state.media_time(time, duration, now);
                }
            }

            layers.clone()
        };

        if let Err(e) = self.tx.try_send(snapshot) {
            debug!("Layer snapshot not queued: {}", e);
        }
        Ok(true)
    }
}

impl OscHandler for LayerFeed {
    fn name(&self) -> &str {
        "millumin"
    }

    fn handle(&self, msg: &OscMessage, from: SocketAddr) -> bool {
        match self.apply(msg, Utc::now()) {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!("Dropping {} from {}: {}", msg.addr, from, e);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::OscType;

    fn info(index: i32) -> MediaInfo {
        MediaInfo {
            index,
            name: format!("clip{}", index),
            duration: 120.0,
        }
    }

    #[test]
    fn test_started_resets_position() {
        let mut state = LayerState::new("A");
        state.media_time(30.0, 120.0, Utc::now());
        state.media_started(info(1), Utc::now());

        assert!(state.playing);
        assert!(!state.paused);
        assert_eq!(state.remaining(), 120.0);
    }

    #[test]
    fn test_stop_for_other_media_is_ignored() {
        let mut state = LayerState::new("A");
        state.media_started(info(2), Utc::now());
        state.media_stopped(info(1), Utc::now());
        assert!(state.playing);

        state.media_stopped(info(2), Utc::now());
        assert!(!state.playing);
    }

    #[tokio::test]
    async fn test_feed_publishes_snapshot() {
        let (tx, mut rx) = mpsc::channel(4);
        let feed = LayerFeed::new(tx);

        let msg = OscMessage {
            addr: "/millumin/layer:Video 1/mediaStarted".into(),
            args: vec![
                OscType::Int(3),
                OscType::String("intro.mov".into()),
                OscType::Float(60.0),
            ],
        };
        assert!(feed.handle(&msg, "127.0.0.1:5000".parse().unwrap()));

        let snapshot = rx.recv().await.unwrap();
        let layer = &snapshot["Video 1"];
        assert!(layer.playing);
        assert_eq!(layer.info.name, "intro.mov");
    }

    #[test]
    fn test_other_addresses_not_claimed() {
        let (tx, _rx) = mpsc::channel(4);
        let feed = LayerFeed::new(tx);
        let msg = OscMessage {
            addr: "/clock/kill".into(),
            args: vec![],
        };
        assert_eq!(feed.apply(&msg, Utc::now()), Ok(false));
    }

    #[test]
    fn test_bad_arguments_claimed_without_update() {
        let (tx, _rx) = mpsc::channel(4);
        let feed = LayerFeed::new(tx);
        let msg = OscMessage {
            addr: "/millumin/layer:A/media/time".into(),
            args: vec![OscType::String("x".into())],
        };
        assert!(feed.apply(&msg, Utc::now()).is_err());
        assert!(feed.handle(&msg, "127.0.0.1:5000".parse().unwrap()));
    }
}

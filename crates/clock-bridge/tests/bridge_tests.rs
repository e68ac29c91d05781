//! Bridge Integration Tests
//!
//! Layer selection and the cue watchdog, driven through the public feed
//! handlers and the bridge task.

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use clock_bridge::{
    select_layer, BridgeConfig, CueFeed, CueState, LayerSelection, LayerSnapshot, LayerState,
    LayerFeed, MediaBridge, MediaInfo, CUE_PLAYER, LAYER_PLAYER,
};
use clock_core::Message;
use clock_router::OscHandler;
use regex_lite::RegexBuilder;
use rosc::{OscMessage, OscType};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn layer(name: &str, playing: bool, age: TimeDelta) -> LayerState {
    let now = Utc::now();
    let mut state = LayerState::new(name);
    state.media_started(
        MediaInfo {
            index: 1,
            name: format!("{}.mov", name),
            duration: 60.0,
        },
        now - age,
    );
    state.media_time(10.0, 60.0, now - age);
    state.playing = playing;
    state
}

fn snapshot(layers: Vec<LayerState>) -> LayerSnapshot {
    layers.into_iter().map(|l| (l.layer.clone(), l)).collect()
}

fn bridge() -> (MediaBridge, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(16);
    (MediaBridge::new(BridgeConfig::default(), tx).unwrap(), rx)
}

#[test]
fn test_ignored_layer_never_shown() {
    let (bridge, _rx) = bridge();
    let layers = snapshot(vec![layer("Background IGNORE", true, TimeDelta::zero())]);

    // Playing but ignored: leave the media state alone
    assert_eq!(bridge.layer_update(&layers, Utc::now()), None);
}

#[test]
fn test_first_layer_by_name_wins() {
    let (bridge, _rx) = bridge();
    let layers = snapshot(vec![
        layer("B", true, TimeDelta::zero()),
        layer("A ignore", true, TimeDelta::zero()),
        layer("C", true, TimeDelta::zero()),
    ]);

    let ignore = RegexBuilder::new("ignore").case_insensitive(true).build().unwrap();
    match select_layer(&layers, &ignore, TimeDelta::seconds(1), Utc::now()) {
        LayerSelection::Layer(state) => assert_eq!(state.layer, "B"),
        other => panic!("unexpected selection: {:?}", other),
    }

    match bridge.layer_update(&layers, Utc::now()) {
        Some(Message::Media { player, sync }) => {
            assert_eq!(player, LAYER_PLAYER);
            // 50 s left reported as 51
            assert_eq!((sync.minutes, sync.seconds), (0, 51));
        }
        other => panic!("unexpected update: {:?}", other),
    }
}

#[test]
fn test_stale_layer_skipped() {
    let (bridge, _rx) = bridge();
    let layers = snapshot(vec![layer("A", true, TimeDelta::seconds(5))]);
    assert_eq!(bridge.layer_update(&layers, Utc::now()), None);

    let layers = snapshot(vec![
        layer("A", true, TimeDelta::seconds(5)),
        layer("B", true, TimeDelta::zero()),
    ]);
    assert!(matches!(
        bridge.layer_update(&layers, Utc::now()),
        Some(Message::Media { .. })
    ));
}

#[test]
fn test_nothing_playing_resets() {
    let (bridge, _rx) = bridge();
    let layers = snapshot(vec![layer("A", false, TimeDelta::zero())]);
    assert_eq!(
        bridge.layer_update(&layers, Utc::now()),
        Some(Message::MediaReset {
            player: LAYER_PLAYER.into()
        })
    );
    assert_eq!(
        bridge.layer_update(&LayerSnapshot::new(), Utc::now()),
        Some(Message::MediaReset {
            player: LAYER_PLAYER.into()
        })
    );
}

fn media_started(duration: OscType) -> OscMessage {
    OscMessage {
        addr: "/millumin/layer:A/mediaStarted".into(),
        args: vec![OscType::Int(1), OscType::String("x".into()), duration],
    }
}

#[test]
fn test_out_of_range_layer_duration_dropped() {
    let (bridge, _rx) = bridge();
    let (tx, _snapshots) = mpsc::channel(16);
    let feed = LayerFeed::new(tx);
    let from = "127.0.0.1:5000".parse().unwrap();

    for duration in [OscType::Float(1.0e17), OscType::Double(1.0e30)] {
        assert!(feed.handle(&media_started(duration), from));
        assert_eq!(bridge.layer_update(&feed.snapshot(), Utc::now()), None);
    }

    // A sane update on the same layer is shown again
    assert!(feed.handle(&media_started(OscType::Float(90.0)), from));
    match bridge.layer_update(&feed.snapshot(), Utc::now()) {
        Some(Message::Media { sync, .. }) => assert_eq!((sync.minutes, sync.seconds), (1, 31)),
        other => panic!("unexpected update: {:?}", other),
    }
}

#[test]
fn test_cue_update() {
    let (bridge, _rx) = bridge();
    let state = CueState {
        remaining: 125,
        elapsed: 375,
        minutes: 2,
        seconds: 5,
        frames: 12,
        paused: false,
        looping: true,
        ..Default::default()
    };

    match bridge.cue_update(&state) {
        Message::Media { player, sync } => {
            assert_eq!(player, CUE_PLAYER);
            assert_eq!((sync.minutes, sync.seconds, sync.frames), (2, 5, 12));
            assert_eq!(sync.progress, 0.75);
            assert!(sync.looping);
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cue_watchdog_resets_once() {
    let (bridge, mut rx) = bridge();
    let (_layer_tx, layer_rx) = mpsc::channel(4);
    let (cue_tx, cue_rx) = mpsc::channel(4);
    let feed = CueFeed::new(cue_tx);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(bridge.run(layer_rx, cue_rx, cancel.clone()));

    // Quiet before the first cue update
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(rx.try_recv().is_err());

    let msg = OscMessage {
        addr: "/mitti/cueTimeLeft".into(),
        args: vec![OscType::String("-00:01:00:00".into())],
    };
    assert!(feed.handle(&msg, "127.0.0.1:5000".parse().unwrap()));

    assert!(matches!(rx.recv().await, Some(Message::Media { .. })));
    assert_eq!(
        rx.recv().await,
        Some(Message::MediaReset {
            player: CUE_PLAYER.into()
        })
    );

    // Disarmed after firing
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(rx.try_recv().is_err());

    cancel.cancel();
    task.await.unwrap();
}

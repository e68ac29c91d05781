//! Outbound OSC encoding
//!
//! Every feedback cycle sends two datagrams: the single-clock `/clock/state`
//! message understood by older units, then a bundle with one state message
//! per source and per counter.

use std::time::SystemTime;

use clock_core::{MediaSync, State};
use rosc::{encoder, OscBundle, OscMessage, OscPacket, OscTime, OscType};

use crate::error::{Result, RouterError};

/// Timetag for "now", falling back to "immediately"
fn now_tag() -> OscTime {
    OscTime::try_from(SystemTime::now()).unwrap_or(OscTime::from((0, 1)))
}

/// Encode a packet into a datagram
pub fn encode_packet(packet: &OscPacket) -> Result<Vec<u8>> {
    encoder::encode(packet).map_err(|e| RouterError::Encode(e.to_string()))
}

/// Legacy single clock state from the first source
pub fn legacy_state_message(state: &State) -> OscMessage {
    let (mode, hours, minutes, seconds, paused) = match state.primary() {
        Some(clock) if clock.expired => (
            clock.mode.as_i32(),
            "00".to_string(),
            "00".to_string(),
            "00".to_string(),
            clock.paused,
        ),
        Some(clock) => {
            let parts: Vec<&str> = clock.text.split(':').collect();
            let (h, m, s) = if parts.len() > 2 {
                (parts[0], parts[1], parts[2])
            } else {
                ("", "", "")
            };
            (
                clock.mode.as_i32(),
                h.to_string(),
                m.to_string(),
                s.to_string(),
                clock.paused,
            )
        }
        None => (
            clock_core::Mode::Off.as_i32(),
            String::new(),
            String::new(),
            String::new(),
            false,
        ),
    };

    OscMessage {
        addr: "/clock/state".to_string(),
        args: vec![
            OscType::Int(mode),
            OscType::String(hours),
            OscType::String(minutes),
            OscType::String(seconds),
            OscType::String(state.tally.clone()),
            OscType::Int(i32::from(paused)),
        ],
    }
}

/// Per source and per counter state bundle
pub fn state_bundle(state: &State, instance_id: &str) -> OscBundle {
    let sources = state.clocks.iter().enumerate().map(|(i, clock)| {
        OscPacket::Message(OscMessage {
            addr: format!("/clock/source/{}/state", i + 1),
            args: vec![
                OscType::String(instance_id.to_string()),
                OscType::Bool(clock.hidden),
                OscType::String(clock.text.clone()),
                OscType::String(clock.compact.clone()),
                OscType::String(clock.icon.clone()),
                OscType::Float(clock.progress as f32),
                OscType::Bool(clock.expired),
                OscType::Bool(clock.paused),
                OscType::String(clock.label.clone()),
                OscType::Int(clock.mode.as_i32()),
            ],
        })
    });

    let timers = state.timers.iter().enumerate().map(|(i, out)| {
        OscPacket::Message(OscMessage {
            addr: format!("/clock/timer/{}/state", i),
            args: vec![
                OscType::String(instance_id.to_string()),
                OscType::Bool(out.active),
                OscType::String(out.text.clone()),
                OscType::String(out.compact.clone()),
                OscType::String(out.icon.to_string()),
                OscType::Float(out.progress as f32),
                OscType::Bool(out.expired),
                OscType::Bool(out.paused),
            ],
        })
    });

    OscBundle {
        timetag: now_tag(),
        content: sources.chain(timers).collect(),
    }
}

/// Both feedback datagrams for one state snapshot
pub fn state_packets(state: &State, instance_id: &str) -> Result<Vec<Vec<u8>>> {
    Ok(vec![
        encode_packet(&OscPacket::Message(legacy_state_message(state)))?,
        encode_packet(&OscPacket::Bundle(state_bundle(state, instance_id)))?,
    ])
}

/// Media position for other units to mirror
pub fn media_message(player: &str, sync: &MediaSync, instance_id: &str) -> OscMessage {
    let remaining = i32::try_from(sync.remaining.num_seconds()).unwrap_or(i32::MAX);
    OscMessage {
        addr: format!("/clock/media/{}", player),
        args: vec![
            OscType::Int(sync.hours),
            OscType::Int(sync.minutes),
            OscType::Int(sync.seconds),
            OscType::Int(sync.frames),
            OscType::Int(remaining),
            OscType::Double(sync.progress),
            OscType::Bool(sync.paused),
            OscType::Bool(sync.looping),
            OscType::Time(now_tag()),
            OscType::String(instance_id.to_string()),
        ],
    }
}

/// Tell other units a player has nothing playing
pub fn reset_media_message(player: &str, instance_id: &str) -> OscMessage {
    OscMessage {
        addr: format!("/clock/resetmedia/{}", player),
        args: vec![
            OscType::Time(now_tag()),
            OscType::String(instance_id.to_string()),
        ],
    }
}

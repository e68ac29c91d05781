//! Engine command loop
//!
//! The single task that mutates the [`Engine`]. It waits on:
//! - decoded commands from the router
//! - media commands from the local bridge
//! - the tally, timecode and per-player media expiry timers
//! - the display tick, which publishes a fresh [`State`]
//!
//! Local media is re-broadcast so other units can mirror it. State feedback
//! runs as a separate task reading the latest published snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use clock_core::{Message, State};
use clock_router::encode::{encode_packet, media_message, reset_media_message, state_packets};
use clock_transport::TransportSender;
use rosc::OscPacket;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::{Engine, Expiry};

/// Wait until `deadline`, forever if there is none
async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub struct EngineService {
    engine: Engine,
    instance_id: String,
    tick: Duration,
    feedback_interval: Duration,
    media_timeout: Duration,
    feedback: Option<Arc<dyn TransportSender>>,
    state_tx: watch::Sender<Arc<State>>,
}

impl EngineService {
    pub fn new(engine: Engine, config: &EngineConfig, instance_id: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(Arc::new(engine.state(Utc::now())));
        Self {
            engine,
            instance_id: instance_id.into(),
            tick: config.tick(),
            feedback_interval: config.feedback_interval(),
            media_timeout: config.media_timeout(),
            feedback: None,
            state_tx,
        }
    }

    /// Publish state and local media through `sender`
    pub fn with_feedback(mut self, sender: Arc<dyn TransportSender>) -> Self {
        self.feedback = Some(sender);
        self
    }

    /// Latest display snapshot, updated every tick and after every command
    pub fn subscribe_state(&self) -> watch::Receiver<Arc<State>> {
        self.state_tx.subscribe()
    }

    fn publish_state(&self) {
        self.state_tx
            .send_replace(Arc::new(self.engine.state(Utc::now())));
    }

    async fn send_feedback(&self, packet: OscPacket) {
        let Some(sender) = &self.feedback else {
            return;
        };
        match encode_packet(&packet) {
            Ok(data) => {
                if let Err(e) = sender.send(Bytes::from(data)).await {
                    debug!("Media feedback not sent: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode media feedback: {}", e),
        }
    }

    /// Mirror a local media command to other units
    async fn rebroadcast(&self, message: &Message) {
        let packet = match message {
            Message::Media { player, sync } => media_message(player, sync, &self.instance_id),
            Message::MediaReset { player } => reset_media_message(player, &self.instance_id),
            _ => return,
        };
        self.send_feedback(OscPacket::Message(packet)).await;
    }

    fn spawn_feedback(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let sender = self.feedback.clone()?;
        let mut state_rx = self.state_tx.subscribe();
        let instance_id = self.instance_id.clone();
        let period = self.feedback_interval;

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let state = state_rx.borrow_and_update().clone();
                        match state_packets(&state, &instance_id) {
                            Ok(packets) => {
                                for packet in packets {
                                    if let Err(e) = sender.send(Bytes::from(packet)).await {
                                        debug!("State feedback not sent: {}", e);
                                    }
                                }
                            }
                            Err(e) => warn!("Failed to encode state: {}", e),
                        }
                    }
                }
            }
            debug!("Feedback task stopped");
        }))
    }

    /// Process commands until cancelled
    pub async fn run(
        mut self,
        mut commands: broadcast::Receiver<Message>,
        mut local: mpsc::Receiver<Message>,
        cancel: CancellationToken,
    ) {
        info!("Engine running");
        let feedback = self.spawn_feedback(cancel.child_token());

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut tally_deadline: Option<Instant> = None;
        let mut ltc_deadline: Option<Instant> = None;
        let mut media_deadlines: HashMap<String, Instant> = HashMap::new();
        let mut commands_open = true;
        let mut local_open = true;

        loop {
            let next_media = media_deadlines
                .iter()
                .min_by_key(|(_, at)| **at)
                .map(|(player, at)| (player.clone(), *at));

            let expiry_rearm = tokio::select! {
                _ = cancel.cancelled() => break,

                received = commands.recv(), if commands_open => match received {
                    Ok(message) => {
                        if let Message::Media { player, .. } = &message {
                            media_deadlines.insert(player.clone(), Instant::now() + self.media_timeout);
                        } else if let Message::MediaReset { player } = &message {
                            media_deadlines.remove(player);
                        }
                        let rearm = self.engine.handle(message, Utc::now());
                        self.publish_state();
                        rearm
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Engine lagged, {} commands dropped", n);
                        None
                    }
                    Err(RecvError::Closed) => {
                        info!("Router closed");
                        commands_open = false;
                        None
                    }
                },

                received = local.recv(), if local_open => match received {
                    Some(message) => {
                        // The local bridge owns this player now
                        if let Message::Media { player, .. } | Message::MediaReset { player } = &message {
                            media_deadlines.remove(player);
                        }
                        self.rebroadcast(&message).await;
                        let rearm = self.engine.handle(message, Utc::now());
                        self.publish_state();
                        rearm
                    }
                    None => {
                        local_open = false;
                        None
                    }
                },

                _ = expiry(tally_deadline) => {
                    tally_deadline = None;
                    self.engine.expire_tally();
                    self.publish_state();
                    None
                }

                _ = expiry(ltc_deadline) => {
                    ltc_deadline = None;
                    self.engine.expire_ltc();
                    self.publish_state();
                    None
                }

                _ = expiry(next_media.as_ref().map(|(_, at)| *at)) => {
                    if let Some((player, _)) = next_media {
                        debug!("No media updates from {}, resetting", player);
                        media_deadlines.remove(&player);
                        self.engine.expire_media(&player);
                        self.publish_state();
                    }
                    None
                }

                _ = ticker.tick() => {
                    self.publish_state();
                    None
                }
            };

            match expiry_rearm {
                Some(Expiry::Tally(after)) => tally_deadline = Some(Instant::now() + after),
                Some(Expiry::Ltc(after)) => ltc_deadline = Some(Instant::now() + after),
                None => {}
            }
        }

        if let Some(handle) = feedback {
            let _ = handle.await;
        }
        info!("Engine stopped");
    }
}

//! Clock-8001 Service
//!
//! Runs the clock engine: OSC control, media player feeds and state
//! feedback, until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use clock_bridge::{CueFeed, LayerFeed, MediaBridge, FEED_QUEUE_DEPTH};
use clock_core::Message;
use clock_engine::{Engine, EngineConfig, EngineService};
use clock_router::{ClockRouter, OscHandler, OscServer};
use clock_transport::{FeedbackBroadcaster, INTERFACE_POLL_INTERVAL};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "clock-service")]
#[command(about = "Clock-8001 engine service")]
#[command(version)]
struct Cli {
    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen for OSC commands on
    #[arg(short, long)]
    listen: Option<String>,

    /// State feedback destination
    #[arg(short, long)]
    feedback: Option<String>,

    /// Disable state feedback
    #[arg(long)]
    no_feedback: bool,

    /// Log every decoded command
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };

        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        if let Some(feedback) = &self.feedback {
            config.feedback = feedback.clone();
        }
        if self.no_feedback {
            config.disable_feedback = true;
        }
        Ok(config)
    }
}

/// Second router subscriber that logs every command
fn spawn_command_logger(router: &ClockRouter, cancel: CancellationToken) {
    let mut rx = router.subscribe();
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => received,
            };
            match received {
                Ok(message) => log_command(&message),
                Err(RecvError::Lagged(n)) => warn!("Command logger lagged, {} skipped", n),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn log_command(message: &Message) {
    info!("Command {}: {:?}", message.kind(), message);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.engine_config()?;
    let instance_id = Uuid::new_v4().to_string();
    info!("Starting Clock-8001 engine {}", env!("CARGO_PKG_VERSION"));
    info!("Instance id: {}", instance_id);

    let engine = Engine::new(&config).context("invalid engine configuration")?;
    let router = Arc::new(ClockRouter::new(instance_id.clone())?);
    let cancel = CancellationToken::new();

    // Media player feeds into the bridge, bridge into the engine
    let (layer_tx, layer_rx) = mpsc::channel(FEED_QUEUE_DEPTH);
    let (cue_tx, cue_rx) = mpsc::channel(FEED_QUEUE_DEPTH);
    let (media_tx, media_rx) = mpsc::channel(FEED_QUEUE_DEPTH);
    let bridge = MediaBridge::new(config.bridge(), media_tx).context("invalid layer ignore pattern")?;

    let mut server = OscServer::bind(&config.listen)
        .await
        .with_context(|| format!("failed to listen on {}", config.listen))?;
    server.add_handler(router.clone() as Arc<dyn OscHandler>);
    server.add_handler(Arc::new(LayerFeed::new(layer_tx)));
    server.add_handler(Arc::new(CueFeed::new(cue_tx)));

    let commands = router.subscribe();
    if cli.debug {
        spawn_command_logger(&router, cancel.child_token());
    }

    let mut service = EngineService::new(engine, &config, instance_id);
    let mut monitor = None;
    if config.disable_feedback {
        info!("State feedback disabled");
    } else {
        let broadcaster = Arc::new(FeedbackBroadcaster::new(&config.feedback).await?);
        info!(
            "State feedback to {} ({} destinations)",
            broadcaster.address(),
            broadcaster.destinations().len()
        );
        if broadcaster.is_broadcast() {
            monitor = Some(broadcaster.spawn_monitor(INTERFACE_POLL_INTERVAL, cancel.child_token()));
        }
        service = service.with_feedback(broadcaster);
    }

    let server_task = tokio::spawn(server.run(cancel.child_token()));
    let bridge_task = tokio::spawn(bridge.run(layer_rx, cue_rx, cancel.child_token()));
    let engine_task = tokio::spawn(service.run(commands, media_rx, cancel.child_token()));

    info!("Clock ready");

    // Run until interrupted
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    cancel.cancel();

    server_task.await??;
    bridge_task.await?;
    engine_task.await?;
    if let Some(monitor) = monitor {
        monitor.await?;
    }

    Ok(())
}

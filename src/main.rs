use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use packet_dodge::config::EngineConfig;
use packet_dodge::feed::inbox::{BatchSender, InboxError};
use packet_dodge::feed::protocol::{decode_line, FeedMessage};
use packet_dodge::game::packet::PacketDescriptor;
use packet_dodge::game::session::{GamePhase, GameSession};
use packet_dodge::metrics::{self, Metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Packet Dodge v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: tick_rate={}, hit_radius={}, graze_radius={}, inbox_capacity={}",
        config.tick_rate, config.hit_radius, config.graze_radius, config.inbox_capacity
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let mut session = GameSession::new(&config);
    tokio::spawn(read_feed(session.sender(), metrics.clone()));

    session.start();
    info!("Reading packet feed from stdin");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        _ = run_frames(&mut session, &config, &metrics) => {}
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    let snapshot = session.stats_snapshot();
    info!(
        packets = snapshot.packets.total,
        dodged = snapshot.dodged,
        grazes = snapshot.grazes,
        score = snapshot.score,
        "Driver stopped"
    );

    Ok(())
}

/// Fixed-rate frame loop. The headless driver keeps the avatar parked at its
/// start position and restarts the game when it ends.
async fn run_frames(session: &mut GameSession, config: &EngineConfig, metrics: &Metrics) {
    let tick_duration = Duration::from_secs_f32(config.tick_seconds());
    let mut ticker = interval(tick_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let stats_every = config.stats_log_secs * config.tick_rate as u64;
    let clock = Instant::now();
    let avatar = config.avatar_start;
    let mut frame: u64 = 0;

    loop {
        ticker.tick().await;
        frame += 1;

        let started = Instant::now();
        let now_ms = clock.elapsed().as_secs_f64() * 1000.0;
        let report = session.update(now_ms, avatar);
        metrics.record_frame_time(started.elapsed());
        metrics.record_frame(&report);
        metrics.record_state(
            session.engine().len(),
            session.progress().level,
            session.phase(),
            session.stats(),
        );

        if report.level_ups > 0 {
            debug!(level = session.progress().level, "Level changed");
        }

        if stats_every > 0 && frame % stats_every == 0 {
            let stats = session.stats();
            info!(
                "Frame {}: {} live, {} packets (tcp={}, udp={}, icmp={}), dodged={}, level={}, lives={}",
                frame,
                session.engine().len(),
                stats.total,
                stats.tcp,
                stats.udp,
                stats.icmp,
                session.progress().dodged,
                session.progress().level,
                session.progress().lives,
            );
        }

        if session.phase() == GamePhase::GameOver {
            session.restart();
        }
    }
}

/// Decode feed lines from stdin and hand them to the session inbox
async fn read_feed(sender: BatchSender, metrics: Arc<Metrics>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Packet feed closed");
                return;
            }
            Err(e) => {
                error!("Failed to read packet feed: {}", e);
                return;
            }
        };

        let message = match decode_line(&line) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                metrics.feed_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Skipping feed line: {}", e);
                continue;
            }
        };

        let (records, sources) = match message {
            FeedMessage::PacketBatch(records) => (records, None),
            FeedMessage::GameState { bullets, sources } => (bullets, Some(sources)),
        };

        if let Some(sources) = sources {
            if let Err(e) = sender.try_update_sources(sources) {
                warn!("Dropping source update: {}", e);
                if e == InboxError::Disconnected {
                    return;
                }
            }
        }

        if records.is_empty() {
            continue;
        }
        let batch: Vec<PacketDescriptor> = records.iter().map(|r| r.to_descriptor()).collect();
        match sender.try_submit(batch) {
            Ok(()) => {}
            Err(InboxError::Full) => {
                metrics.batches_rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Inbox full, dropping batch of {} packets", records.len());
            }
            Err(InboxError::Disconnected) => return,
        }
    }
}

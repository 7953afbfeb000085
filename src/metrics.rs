//! Prometheus-compatible metrics endpoint
//!
//! Exposes engine and traffic counters in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::game::session::{FrameReport, GamePhase};
use crate::game::stats::StatsTally;

/// Rolling window for frame time percentiles
const FRAME_HISTORY: usize = 1000;

/// Metrics registry for the driver
#[derive(Debug)]
pub struct Metrics {
    // Live set
    pub live_projectiles: AtomicU64,

    // Frame timing (microseconds)
    pub frame_time_us: AtomicU64,
    pub frame_time_p95_us: AtomicU64,
    pub frame_time_p99_us: AtomicU64,
    pub frame_time_max_us: AtomicU64,
    pub frame_count: AtomicU64,

    // Feed
    pub packets_admitted: AtomicU64,
    pub packets_dropped: AtomicU64,
    pub batches_rejected: AtomicU64,
    pub feed_errors: AtomicU64,

    // Player
    pub dodged: AtomicU64,
    pub grazes: AtomicU64,
    pub hits: AtomicU64,
    pub games_over: AtomicU64,
    pub level: AtomicU64,
    /// 0=Waiting, 1=Playing, 2=GameOver
    pub phase: AtomicU64,

    // Latest traffic tally, replaced wholesale every frame
    traffic: RwLock<StatsTally>,

    start_time: Instant,

    frame_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            live_projectiles: AtomicU64::new(0),
            frame_time_us: AtomicU64::new(0),
            frame_time_p95_us: AtomicU64::new(0),
            frame_time_p99_us: AtomicU64::new(0),
            frame_time_max_us: AtomicU64::new(0),
            frame_count: AtomicU64::new(0),
            packets_admitted: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            batches_rejected: AtomicU64::new(0),
            feed_errors: AtomicU64::new(0),
            dodged: AtomicU64::new(0),
            grazes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            games_over: AtomicU64::new(0),
            level: AtomicU64::new(1),
            phase: AtomicU64::new(0),
            traffic: RwLock::new(StatsTally::default()),
            start_time: Instant::now(),
            frame_history: RwLock::new(VecDeque::with_capacity(FRAME_HISTORY)),
        }
    }

    /// Record a frame time and update percentiles
    pub fn record_frame_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.frame_time_us.store(us, Ordering::Relaxed);
        self.frame_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.frame_history.write();
        history.push_back(us);
        while history.len() > FRAME_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.frame_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.frame_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.frame_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Fold one frame's outcome into the counters
    pub fn record_frame(&self, report: &FrameReport) {
        self.packets_admitted.fetch_add(report.admitted as u64, Ordering::Relaxed);
        self.packets_dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);
        self.dodged.fetch_add(report.dodged as u64, Ordering::Relaxed);
        self.grazes.fetch_add(report.grazes as u64, Ordering::Relaxed);
        if report.hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        if report.game_over {
            self.games_over.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Gauges that mirror session state
    pub fn record_state(&self, live: usize, level: u32, phase: GamePhase, traffic: &StatsTally) {
        self.live_projectiles.store(live as u64, Ordering::Relaxed);
        self.level.store(level as u64, Ordering::Relaxed);
        let phase = match phase {
            GamePhase::Waiting => 0,
            GamePhase::Playing => 1,
            GamePhase::GameOver => 2,
        };
        self.phase.store(phase, Ordering::Relaxed);
        *self.traffic.write() = *traffic;
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("packet_dodge_projectiles", "Live projectiles", "gauge",
            self.live_projectiles.load(Ordering::Relaxed));

        metric!("packet_dodge_frame_time_microseconds", "Current frame time in microseconds", "gauge",
            self.frame_time_us.load(Ordering::Relaxed));
        metric!("packet_dodge_frame_time_p95_microseconds", "95th percentile frame time", "gauge",
            self.frame_time_p95_us.load(Ordering::Relaxed));
        metric!("packet_dodge_frame_time_p99_microseconds", "99th percentile frame time", "gauge",
            self.frame_time_p99_us.load(Ordering::Relaxed));
        metric!("packet_dodge_frame_time_max_microseconds", "Maximum frame time", "gauge",
            self.frame_time_max_us.load(Ordering::Relaxed));
        metric!("packet_dodge_frame_count", "Total frames processed", "counter",
            self.frame_count.load(Ordering::Relaxed));

        metric!("packet_dodge_packets_admitted_total", "Packets spawned as projectiles", "counter",
            self.packets_admitted.load(Ordering::Relaxed));
        metric!("packet_dodge_packets_dropped_total", "Packets over the admission cap", "counter",
            self.packets_dropped.load(Ordering::Relaxed));
        metric!("packet_dodge_batches_rejected_total", "Batches rejected by a full inbox", "counter",
            self.batches_rejected.load(Ordering::Relaxed));
        metric!("packet_dodge_feed_errors_total", "Feed lines that failed to decode", "counter",
            self.feed_errors.load(Ordering::Relaxed));

        metric!("packet_dodge_dodged_total", "Projectiles that left through the bottom edge", "counter",
            self.dodged.load(Ordering::Relaxed));
        metric!("packet_dodge_grazes_total", "Graze events", "counter",
            self.grazes.load(Ordering::Relaxed));
        metric!("packet_dodge_hits_total", "Avatar hits", "counter",
            self.hits.load(Ordering::Relaxed));
        metric!("packet_dodge_games_over_total", "Finished games", "counter",
            self.games_over.load(Ordering::Relaxed));
        metric!("packet_dodge_level", "Current player level", "gauge",
            self.level.load(Ordering::Relaxed));
        metric!("packet_dodge_phase", "Session phase (0=Waiting, 1=Playing, 2=GameOver)", "gauge",
            self.phase.load(Ordering::Relaxed));

        let traffic = *self.traffic.read();
        output.push_str("# HELP packet_dodge_traffic_packets Admitted packets by category\n");
        output.push_str("# TYPE packet_dodge_traffic_packets gauge\n");
        for (category, value) in traffic_buckets(&traffic) {
            output.push_str(&format!(
                "packet_dodge_traffic_packets{{category=\"{}\"}} {}\n",
                category, value
            ));
        }

        metric!("packet_dodge_uptime_seconds", "Driver uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON metrics for direct API access
    pub fn to_json(&self) -> String {
        let traffic = *self.traffic.read();
        serde_json::json!({
            "projectiles": self.live_projectiles.load(Ordering::Relaxed),
            "performance": {
                "frame_time_us": self.frame_time_us.load(Ordering::Relaxed),
                "frame_time_p95_us": self.frame_time_p95_us.load(Ordering::Relaxed),
                "frame_time_p99_us": self.frame_time_p99_us.load(Ordering::Relaxed),
                "frame_time_max_us": self.frame_time_max_us.load(Ordering::Relaxed),
                "frame_count": self.frame_count.load(Ordering::Relaxed),
            },
            "feed": {
                "admitted": self.packets_admitted.load(Ordering::Relaxed),
                "dropped": self.packets_dropped.load(Ordering::Relaxed),
                "batches_rejected": self.batches_rejected.load(Ordering::Relaxed),
                "errors": self.feed_errors.load(Ordering::Relaxed),
            },
            "player": {
                "dodged": self.dodged.load(Ordering::Relaxed),
                "grazes": self.grazes.load(Ordering::Relaxed),
                "hits": self.hits.load(Ordering::Relaxed),
                "games_over": self.games_over.load(Ordering::Relaxed),
                "level": self.level.load(Ordering::Relaxed),
                "phase": self.phase.load(Ordering::Relaxed),
            },
            "traffic": traffic,
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn traffic_buckets(t: &StatsTally) -> [(&'static str, u64); 12] {
    [
        ("total", t.total),
        ("tcp", t.tcp),
        ("udp", t.udp),
        ("icmp", t.icmp),
        ("http", t.http),
        ("ssh", t.ssh),
        ("dns", t.dns),
        ("ephemeral", t.ephemeral),
        ("wellknown", t.wellknown),
        ("private", t.private),
        ("loopback", t.loopback),
        ("broadcast", t.broadcast),
    ]
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

/// Response for a raw HTTP request
fn route(metrics: &Metrics, request: &str) -> String {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("GET "))
        .and_then(|rest| rest.split_whitespace().next());

    match path {
        Some("/metrics") => http_response("200 OK", "text/plain; version=0.0.4", &metrics.to_prometheus()),
        Some("/metrics/json") | Some("/json") => http_response("200 OK", "application/json", &metrics.to_json()),
        Some("/health") | Some("/") => http_response("200 OK", "text/plain", "OK"),
        _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = route(&metrics, &request);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

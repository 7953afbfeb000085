//! Game session
//!
//! Owns every piece of per-run state: the motion engine, traffic statistics,
//! player progression, admission gate, feed inbox and source registry. The
//! driver calls [`GameSession::update`] once per frame.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::feed::inbox::{BatchInbox, BatchSender, InboxMessage};
use crate::feed::sources::{SourceRegistry, SourceSummary, SpawnHintProvider};
use crate::game::admission::AdmissionGate;
use crate::game::classifier::ClassifyContext;
use crate::game::constants::admission;
use crate::game::engine::{MotionEngine, TickContext};
use crate::game::packet::PacketDescriptor;
use crate::game::progress::{FinalScore, HitOutcome, PlayerProgress};
use crate::game::stats::StatsTally;
use crate::util::vec2::Vec2;

/// Longest frame delta fed to the engine (ms)
const MAX_FRAME_MS: f64 = 100.0;

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GamePhase {
    /// Projectiles fly, nothing is scored
    Waiting,
    Playing,
    /// Ingestion stopped, final score fixed
    GameOver,
}

/// What happened during one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub dodged: u32,
    /// The avatar lost a life this frame
    pub hit: bool,
    pub grazes: u32,
    pub admitted: u32,
    pub dropped: u32,
    pub level_ups: u32,
    /// The game ended this frame
    pub game_over: bool,
}

/// Pull-based view of the session for UIs and logs
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: GamePhase,
    pub paused: bool,
    pub packets: StatsTally,
    pub live_projectiles: usize,
    pub dodged: u64,
    pub grazes: u64,
    pub level: u32,
    pub experience: u32,
    pub exp_threshold: u32,
    pub combo: u32,
    pub max_combo: u32,
    pub lives: u32,
    pub score: u64,
    pub survival_secs: u64,
    pub final_score: Option<FinalScore>,
    pub sources: Vec<SourceSummary>,
}

/// One run of the game
pub struct GameSession {
    engine: MotionEngine,
    stats: StatsTally,
    progress: PlayerProgress,
    gate: AdmissionGate,
    inbox: BatchInbox,
    /// Batches received since the last ingestion point
    backlog: Vec<Vec<PacketDescriptor>>,
    backlog_len: usize,
    /// Packets that arrived after the backlog already held the maximum cap
    overflow: usize,
    sources: SourceRegistry,
    phase: GamePhase,
    paused: bool,
    hit_radius: f32,
    graze_radius: f32,
    /// Scene clock (ms), frozen while paused
    scene_ms: f64,
    last_frame_ms: Option<f64>,
    played_ms: f64,
    final_score: Option<FinalScore>,
}

impl GameSession {
    pub fn new(config: &EngineConfig) -> Self {
        let engine = match config.rng_seed {
            Some(seed) => MotionEngine::with_seed(seed),
            None => MotionEngine::new(),
        };
        Self {
            engine: engine.with_bounds(config.cull_bounds()),
            stats: StatsTally::new(),
            progress: PlayerProgress::new(),
            gate: AdmissionGate::new(),
            inbox: BatchInbox::new(config.inbox_capacity),
            backlog: Vec::new(),
            backlog_len: 0,
            overflow: 0,
            sources: SourceRegistry::new(config.source_ring),
            phase: GamePhase::Waiting,
            paused: false,
            hit_radius: config.hit_radius,
            graze_radius: config.graze_radius,
            scene_ms: 0.0,
            last_frame_ms: None,
            played_ms: 0.0,
            final_score: None,
        }
    }

    /// Handle for transport tasks
    pub fn sender(&self) -> BatchSender {
        self.inbox.sender()
    }

    /// Waiting -> Playing
    pub fn start(&mut self) {
        if self.phase == GamePhase::Waiting {
            self.phase = GamePhase::Playing;
            info!("Game started");
        }
    }

    /// Advance one frame. `now_ms` is the driver's monotonic clock.
    pub fn update(&mut self, now_ms: f64, avatar: Vec2) -> FrameReport {
        let mut report = FrameReport::default();

        let delta_ms = match self.last_frame_ms {
            Some(last) => (now_ms - last).clamp(0.0, MAX_FRAME_MS),
            None => 0.0,
        };
        self.last_frame_ms = Some(now_ms);
        if self.paused {
            return report;
        }
        self.scene_ms += delta_ms;
        let now = self.scene_ms;

        self.ingest(now, avatar, &mut report);

        let playing = self.phase == GamePhase::Playing;
        let outcome = self.engine.tick(&TickContext {
            now_ms: now,
            dt: (delta_ms / 1000.0) as f32,
            avatar,
            game_active: playing,
        });
        report.dodged = outcome.dodged;

        if playing {
            self.played_ms += delta_ms;
            self.progress.add_dodged(outcome.dodged);

            if self.engine.check_collision(avatar, self.hit_radius) {
                match self.progress.take_hit(now) {
                    HitOutcome::Ignored => {}
                    HitOutcome::Damaged { lives_left } => {
                        report.hit = true;
                        info!(lives_left, "Avatar hit");
                    }
                    HitOutcome::Dead => {
                        report.hit = true;
                        report.game_over = true;
                        self.finish();
                    }
                }
            }

            if self.phase == GamePhase::Playing {
                let grazes = self.engine.check_graze(avatar, self.hit_radius, self.graze_radius);
                for _ in 0..grazes {
                    report.level_ups += self.progress.record_graze(now);
                }
                report.grazes = grazes;
            }
        }

        self.progress.expire_combo(now);
        report
    }

    /// Pull everything from the inbox, apply source updates and, at an
    /// ingestion point, spawn the admitted packets
    fn ingest(&mut self, now: f64, avatar: Vec2, report: &mut FrameReport) {
        for message in self.inbox.drain() {
            match message {
                InboxMessage::Sources(sources) => self.sources.sync(&sources),
                InboxMessage::Batch(_) if self.phase == GamePhase::GameOver => {}
                InboxMessage::Batch(batch) => self.buffer(batch),
            }
        }

        let level = self.progress.level;
        if self.backlog.is_empty() || !self.gate.is_due(now, level) {
            return;
        }

        let admitted = self.gate.admit(now, level, self.backlog.drain(..));
        let dropped = admitted.dropped + std::mem::take(&mut self.overflow);
        self.backlog_len = 0;

        let ctx = ClassifyContext {
            now_ms: now,
            level,
            avatar_x: avatar.x,
            target_x: None,
        };
        for mut packet in admitted.packets {
            self.stats.record(&packet);
            if let Some(source) = packet.source.as_mut() {
                if let Some(name) = source.name.as_deref() {
                    self.sources.record_packet(name);
                }
                source.spawn_hint = self
                    .sources
                    .spawn_hint(source.id.as_deref(), source.name.as_deref(), now);
            }
            self.engine.ingest(&packet, &ctx);
            report.admitted += 1;
        }
        report.dropped = dropped as u32;
    }

    /// Hold a batch until the next ingestion point. Packets beyond the
    /// largest possible cap can never be admitted, so they are only counted.
    fn buffer(&mut self, batch: Vec<PacketDescriptor>) {
        let room = (admission::MAX_CAP as usize).saturating_sub(self.backlog_len);
        if batch.len() > room {
            self.overflow += batch.len() - room;
            if room == 0 {
                return;
            }
            let kept: Vec<PacketDescriptor> = batch.into_iter().take(room).collect();
            self.backlog_len += kept.len();
            self.backlog.push(kept);
        } else if !batch.is_empty() {
            self.backlog_len += batch.len();
            self.backlog.push(batch);
        }
    }

    fn finish(&mut self) {
        self.phase = GamePhase::GameOver;
        let score = self.progress.final_score(self.survival_secs());
        info!(
            total = score.total,
            dodged = score.dodged,
            survival = score.survival_bonus,
            graze = score.graze_bonus,
            combo = score.combo_bonus,
            "Game over"
        );
        self.final_score = Some(score);
        self.backlog.clear();
        self.backlog_len = 0;
        self.overflow = 0;
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!("Session paused");
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            debug!("Session resumed");
        }
    }

    pub fn toggle_god_mode(&mut self) -> bool {
        let enabled = self.progress.toggle_god_mode();
        info!(enabled, "God mode toggled");
        enabled
    }

    /// Clear all run state and return to `Waiting`. Synchronous and total:
    /// the next `update` sees an empty engine and zeroed counters.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.stats.reset();
        self.progress.reset();
        self.gate.reset();
        self.sources.reset();
        let discarded = self.inbox.clear();
        self.backlog.clear();
        self.backlog_len = 0;
        self.overflow = 0;
        self.phase = GamePhase::Waiting;
        self.paused = false;
        self.played_ms = 0.0;
        self.final_score = None;
        info!(discarded, "Session reset");
    }

    /// Reset and start playing again
    pub fn restart(&mut self) {
        self.reset();
        self.start();
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn engine(&self) -> &MotionEngine {
        &self.engine
    }

    pub fn stats(&self) -> &StatsTally {
        &self.stats
    }

    pub fn progress(&self) -> &PlayerProgress {
        &self.progress
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn scene_ms(&self) -> f64 {
        self.scene_ms
    }

    pub fn survival_secs(&self) -> u64 {
        (self.played_ms / 1000.0) as u64
    }

    pub fn final_score(&self) -> Option<FinalScore> {
        self.final_score
    }

    pub fn stats_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            paused: self.paused,
            packets: self.stats,
            live_projectiles: self.engine.len(),
            dodged: self.progress.dodged,
            grazes: self.progress.grazes,
            level: self.progress.level,
            experience: self.progress.experience,
            exp_threshold: self.progress.exp_threshold,
            combo: self.progress.combo,
            max_combo: self.progress.max_combo,
            lives: self.progress.lives,
            score: self.progress.score(),
            survival_secs: self.survival_secs(),
            final_score: self.final_score,
            sources: self.sources.summaries(),
        }
    }
}

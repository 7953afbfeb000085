use crate::feed::inbox::DEFAULT_INBOX_CAPACITY;
use crate::feed::sources::RingGeometry;
use crate::game::constants::{bounds, player};
use crate::game::engine::CullBounds;
use crate::util::vec2::Vec2;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("tick_rate must be 1-240, got {0}")]
    TickRate(u32),
    #[error("hit_radius must be positive, got {0}")]
    HitRadius(f32),
    #[error("graze_radius ({graze}) must exceed hit_radius ({hit})")]
    GrazeRadius { hit: f32, graze: f32 },
    #[error("inbox_capacity must be at least 1")]
    InboxCapacity,
    #[error("metrics_port cannot be 0")]
    MetricsPort,
    #[error("cull bounds are inverted")]
    Bounds,
}

/// Engine and driver configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cull bounds (screen pixels)
    pub cull_left: f32,
    pub cull_right: f32,
    pub cull_bottom: f32,
    /// Avatar start position (the headless driver keeps it parked here)
    pub avatar_start: Vec2,
    pub hit_radius: f32,
    pub graze_radius: f32,
    /// Frames per second
    pub tick_rate: u32,
    /// Buffered feed messages before backpressure
    pub inbox_capacity: usize,
    /// Capture source ring
    pub source_ring: RingGeometry,
    pub metrics_port: u16,
    /// Seconds between stats log lines (0 disables)
    pub stats_log_secs: u64,
    /// Fixed RNG seed for reproducible runs
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cull_left: bounds::LEFT,
            cull_right: bounds::RIGHT,
            cull_bottom: bounds::BOTTOM,
            avatar_start: Vec2::new(player::START_X, player::START_Y),
            hit_radius: player::HIT_RADIUS,
            graze_radius: player::GRAZE_RADIUS,
            tick_rate: 60,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            source_ring: RingGeometry::default(),
            metrics_port: 9090,
            stats_log_secs: 10,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(rate) = std::env::var("TICK_RATE") {
            if let Ok(parsed) = rate.parse::<u32>() {
                if (1..=240).contains(&parsed) {
                    config.tick_rate = parsed;
                } else {
                    tracing::warn!("TICK_RATE must be 1-240, using default");
                }
            } else {
                tracing::warn!("Invalid TICK_RATE '{}', using default", rate);
            }
        }

        if let Ok(radius) = std::env::var("HIT_RADIUS") {
            match radius.parse::<f32>() {
                Ok(parsed) if parsed > 0.0 && parsed.is_finite() => config.hit_radius = parsed,
                _ => tracing::warn!("Invalid HIT_RADIUS '{}', using default", radius),
            }
        }

        if let Ok(radius) = std::env::var("GRAZE_RADIUS") {
            match radius.parse::<f32>() {
                Ok(parsed) if parsed > 0.0 && parsed.is_finite() => config.graze_radius = parsed,
                _ => tracing::warn!("Invalid GRAZE_RADIUS '{}', using default", radius),
            }
        }

        if let Ok(capacity) = std::env::var("INBOX_CAPACITY") {
            if let Ok(parsed) = capacity.parse::<usize>() {
                if parsed > 0 && parsed <= 100_000 {
                    config.inbox_capacity = parsed;
                } else {
                    tracing::warn!("INBOX_CAPACITY must be 1-100000, using default");
                }
            } else {
                tracing::warn!("Invalid INBOX_CAPACITY '{}', using default", capacity);
            }
        }

        if let Ok(port) = std::env::var("METRICS_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.metrics_port = parsed,
                Ok(_) => tracing::warn!("METRICS_PORT must be > 0, using default"),
                Err(_) => tracing::warn!("Invalid METRICS_PORT '{}', using default", port),
            }
        }

        if let Ok(secs) = std::env::var("STATS_LOG_SECS") {
            if let Ok(parsed) = secs.parse::<u64>() {
                config.stats_log_secs = parsed;
            } else {
                tracing::warn!("Invalid STATS_LOG_SECS '{}', using default", secs);
            }
        }

        if let Ok(seed) = std::env::var("RNG_SEED") {
            if let Ok(parsed) = seed.parse::<u64>() {
                config.rng_seed = Some(parsed);
            } else {
                tracing::warn!("Invalid RNG_SEED '{}', ignoring", seed);
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > 240 {
            return Err(ConfigError::TickRate(self.tick_rate));
        }
        if self.hit_radius.is_nan() || self.hit_radius <= 0.0 {
            return Err(ConfigError::HitRadius(self.hit_radius));
        }
        if self.graze_radius.is_nan() || self.graze_radius <= self.hit_radius {
            return Err(ConfigError::GrazeRadius {
                hit: self.hit_radius,
                graze: self.graze_radius,
            });
        }
        if self.inbox_capacity == 0 {
            return Err(ConfigError::InboxCapacity);
        }
        if self.metrics_port == 0 {
            return Err(ConfigError::MetricsPort);
        }
        if self.cull_left >= self.cull_right || self.cull_bottom <= 0.0 {
            return Err(ConfigError::Bounds);
        }
        Ok(())
    }

    pub fn cull_bounds(&self) -> CullBounds {
        CullBounds {
            left: self.cull_left,
            right: self.cull_right,
            bottom: self.cull_bottom,
            top: bounds::TOP,
        }
    }

    /// Frame duration in seconds
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}

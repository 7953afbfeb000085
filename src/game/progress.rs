//! Player progression: level, experience, graze combo, lives and score

use serde::Serialize;
use tracing::info;

use crate::game::constants::{player, score};

/// Result of a collision against the avatar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// Invincible or god mode; nothing happened
    Ignored,
    /// Lost a life, some remain
    Damaged { lives_left: u32 },
    /// Last life lost
    Dead,
}

/// Breakdown of the final score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FinalScore {
    pub dodged: u64,
    pub survival_bonus: u64,
    pub graze_bonus: u64,
    pub combo_bonus: u64,
    pub total: u64,
}

/// Per-run player state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerProgress {
    pub level: u32,
    pub experience: u32,
    pub exp_threshold: u32,
    pub combo: u32,
    pub max_combo: u32,
    pub grazes: u64,
    pub lives: u32,
    pub dodged: u64,
    pub god_mode: bool,
    #[serde(skip)]
    last_graze_ms: Option<f64>,
    #[serde(skip)]
    invincible_until_ms: f64,
}

impl Default for PlayerProgress {
    fn default() -> Self {
        Self {
            level: 1,
            experience: 0,
            exp_threshold: player::BASE_EXP_THRESHOLD,
            combo: 0,
            max_combo: 0,
            grazes: 0,
            lives: player::LIVES,
            dodged: 0,
            god_mode: false,
            last_graze_ms: None,
            invincible_until_ms: 0.0,
        }
    }
}

impl PlayerProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Experience for a graze at the current level and combo
    pub fn graze_experience(&self) -> u32 {
        let base = (player::BASE_GRAZE_EXP + player::GRAZE_EXP_PER_LEVEL * self.level) as f32;
        let bonus = 1.0 + self.combo.min(player::COMBO_CAP) as f32 * player::COMBO_EXP_STEP;
        (base * bonus).floor() as u32
    }

    /// Credit one graze event. Returns the number of level-ups it caused.
    pub fn record_graze(&mut self, now_ms: f64) -> u32 {
        self.grazes += 1;
        self.combo += 1;
        self.max_combo = self.max_combo.max(self.combo);
        self.last_graze_ms = Some(now_ms);
        let gain = self.graze_experience();
        self.gain_experience(gain)
    }

    /// Add experience, levelling up while the threshold is reached
    pub fn gain_experience(&mut self, amount: u32) -> u32 {
        self.experience += amount;
        let mut level_ups = 0;
        while self.experience >= self.exp_threshold {
            self.experience -= self.exp_threshold;
            self.level += 1;
            self.exp_threshold = player::BASE_EXP_THRESHOLD + player::EXP_THRESHOLD_PER_LEVEL * self.level;
            level_ups += 1;
            info!(level = self.level, "Player level up");
        }
        level_ups
    }

    /// Drop the combo once the timeout has passed without a graze
    pub fn expire_combo(&mut self, now_ms: f64) -> bool {
        match self.last_graze_ms {
            Some(last) if self.combo > 0 && now_ms - last > player::COMBO_TIMEOUT_MS => {
                self.combo = 0;
                true
            }
            _ => false,
        }
    }

    pub fn is_invincible(&self, now_ms: f64) -> bool {
        self.god_mode || now_ms < self.invincible_until_ms
    }

    /// Apply a collision
    pub fn take_hit(&mut self, now_ms: f64) -> HitOutcome {
        if self.lives == 0 || self.is_invincible(now_ms) {
            return HitOutcome::Ignored;
        }
        self.lives -= 1;
        if self.lives == 0 {
            return HitOutcome::Dead;
        }
        self.invincible_until_ms = now_ms + player::INVINCIBILITY_MS;
        HitOutcome::Damaged { lives_left: self.lives }
    }

    pub fn toggle_god_mode(&mut self) -> bool {
        self.god_mode = !self.god_mode;
        self.god_mode
    }

    pub fn add_dodged(&mut self, count: u32) {
        self.dodged += count as u64;
    }

    /// Running score (one point per dodge)
    pub fn score(&self) -> u64 {
        self.dodged
    }

    pub fn final_score(&self, survival_secs: u64) -> FinalScore {
        let survival_bonus = survival_secs * score::PER_SURVIVAL_SECOND;
        let graze_bonus = self.grazes * score::PER_GRAZE;
        let combo_bonus = self.max_combo as u64 * score::PER_MAX_COMBO;
        FinalScore {
            dodged: self.dodged,
            survival_bonus,
            graze_bonus,
            combo_bonus,
            total: self.dodged + survival_bonus + graze_bonus + combo_bonus,
        }
    }

    /// Back to a fresh run. God mode survives a restart.
    pub fn reset(&mut self) {
        let god_mode = self.god_mode;
        *self = Self::default();
        self.god_mode = god_mode;
    }
}

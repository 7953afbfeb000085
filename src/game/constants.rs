/// Playfield geometry (screen pixels)
pub mod playfield {
    /// Horizontal center, used by pulling and loopback kinematics
    pub const CENTER_X: f32 = 400.0;
    /// Leftmost x of the port-derived spawn band
    pub const SPAWN_BAND_MIN_X: f32 = 100.0;
    /// Width of the port-derived spawn band
    pub const SPAWN_BAND_WIDTH: f32 = 600.0;
    /// Spawn y for projectiles without a source hint (just above the top edge)
    pub const SPAWN_Y: f32 = -20.0;
    /// Source hints spawn slightly below the source marker
    pub const SOURCE_SPAWN_OFFSET_Y: f32 = 20.0;
    /// Vertical distance used to aim projectiles at a target x
    pub const TRAVEL_HEIGHT: f32 = 600.0;
}

/// Base velocities (pixels per second)
pub mod speed {
    /// Vertical speed before any pattern or protocol override
    pub const DEFAULT_VY: f32 = 100.0;
    pub const TCP_VY: f32 = 120.0;
    pub const UDP_VY: f32 = 150.0;
    pub const ICMP_VY: f32 = 180.0;
    /// UDP horizontal drift multiplier
    pub const UDP_VX_SCALE: f32 = 1.5;
    /// Vertical speed increase per player level above 1
    pub const DIFFICULTY_PER_LEVEL: f32 = 0.08;
    /// Half-width of the random horizontal jitter for source-spawned projectiles
    pub const SOURCE_JITTER: f32 = 15.0;
}

/// Per-pattern kinematic tuning
pub mod pattern {
    pub const ZIGZAG_AMPLITUDE: f32 = 250.0;
    /// Phase rate per millisecond of scene time
    pub const ZIGZAG_RATE: f64 = 0.01;
    pub const SEEK_INITIAL_GAIN: f32 = 0.01;
    pub const SEEK_TICK_GAIN: f32 = 0.005;
    pub const SEEK_MAX_VX: f32 = 250.0;
    pub const PULL_GAIN: f32 = 0.4;
    pub const SPREAD_HALF_WIDTH: f32 = 175.0;
    /// Spreading projectiles widen by this factor every tick
    pub const SPREAD_GROWTH: f32 = 1.01;
    /// FTP-data companion offset and drift
    pub const DOUBLE_OFFSET_X: f32 = 20.0;
    pub const DOUBLE_COMPANION_VX: f32 = 10.0;
}

/// Horizontal drift for ports without a special pattern
pub mod drift {
    pub const PARITY_BASE: f32 = 20.0;
    pub const PARITY_MODULUS: u16 = 100;
    pub const PARITY_SCALE: f32 = 0.5;
    /// Bias added on top of an aimed velocity
    pub const AIMED_BASE: f32 = 10.0;
    pub const AIMED_MODULUS: u16 = 50;
    pub const AIMED_SCALE: f32 = 0.3;
    /// Prime-port wave at spawn
    pub const PRIME_SPAWN_AMPLITUDE: f32 = 100.0;
    pub const PRIME_SPAWN_RATE: f64 = 0.003;
    /// Prime-port wave perturbation per tick
    pub const PRIME_TICK_AMPLITUDE: f32 = 5.0;
    pub const PRIME_TICK_RATE: f64 = 0.005;
    /// Wind applied to small packets every tick
    pub const WIND_AMPLITUDE: f32 = 2.0;
    pub const WIND_TIME_RATE: f64 = 0.002;
    pub const WIND_DEPTH_RATE: f32 = 0.01;
}

/// IP class modifiers
pub mod ip {
    pub const PRIVATE_VY_SCALE: f32 = 0.7;
    pub const BROADCAST_VY_SCALE: f32 = 0.8;
}

/// Packet size classes (bytes)
pub mod size {
    pub const SMALL_LIMIT: u32 = 100;
    pub const NORMAL_LIMIT: u32 = 500;
    pub const LARGE_LIMIT: u32 = 1500;
    /// Size assumed when the feed omits it
    pub const DEFAULT_BYTES: u32 = 100;
    /// Velocity added per tick is gravity_scale * this, for scales above 1
    pub const GRAVITY_STEP: f32 = 0.5;
}

/// One-shot derived spawn triggers
pub mod trigger {
    pub const LOOPBACK_Y: f32 = 250.0;
    pub const LOOPBACK_VY_SCALE: f32 = -1.2;
    pub const LOOPBACK_CENTER_GAIN: f32 = 0.8;

    pub const BROADCAST_Y: f32 = 200.0;
    pub const BROADCAST_STEP_VX: f32 = 80.0;
    pub const BROADCAST_VY_SCALE: f32 = 0.5;
    pub const BROADCAST_CHILD_BYTES: u32 = 60;

    pub const FRAGMENT_Y: f32 = 150.0;
    /// Fragment angles from vertical, in degrees
    pub const FRAGMENT_ANGLES_DEG: [f32; 3] = [-60.0, 0.0, 60.0];
    pub const FRAGMENT_SPEED_X: f32 = 100.0;
    pub const FRAGMENT_SPEED_Y: f32 = 150.0;
    pub const FRAGMENT_CHILD_BYTES: u32 = 500;

    pub const SYN_Y: f32 = 100.0;
    pub const SYN_OFFSET_X: f32 = 30.0;
    pub const SYN_DELTA_VX: f32 = 50.0;

    pub const FIN_Y: f32 = 500.0;
    pub const FIN_SPEED: f32 = 100.0;
    pub const FIN_CHILD_BYTES: u32 = 50;
    pub const FIN_SHARDS: usize = 4;
}

/// Live-set bounds
pub mod bounds {
    pub const BOTTOM: f32 = 620.0;
    pub const LEFT: f32 = -30.0;
    pub const RIGHT: f32 = 830.0;
    /// Upward-moving projectiles (after a U-turn) leave through here
    pub const TOP: f32 = -60.0;
}

/// Port ranges
pub mod ports {
    pub const WELL_KNOWN_END: u16 = 1024;
    pub const EPHEMERAL_START: u16 = 49152;
    pub const MAX: u16 = 65535;
}

/// Avatar and progression tuning
pub mod player {
    pub const HIT_RADIUS: f32 = 8.0;
    pub const GRAZE_RADIUS: f32 = 40.0;
    pub const START_X: f32 = 400.0;
    pub const START_Y: f32 = 500.0;
    pub const LIVES: u32 = 3;
    pub const INVINCIBILITY_MS: f64 = 1500.0;
    pub const COMBO_TIMEOUT_MS: f64 = 2000.0;
    /// Combo contributes to experience up to this many grazes
    pub const COMBO_CAP: u32 = 50;
    pub const COMBO_EXP_STEP: f32 = 0.02;
    pub const BASE_GRAZE_EXP: u32 = 10;
    pub const GRAZE_EXP_PER_LEVEL: u32 = 3;
    pub const BASE_EXP_THRESHOLD: u32 = 100;
    pub const EXP_THRESHOLD_PER_LEVEL: u32 = 50;
}

/// Final score bonuses
pub mod score {
    pub const PER_SURVIVAL_SECOND: u64 = 100;
    pub const PER_GRAZE: u64 = 50;
    pub const PER_MAX_COMBO: u64 = 100;
}

/// Packet admission control
pub mod admission {
    pub const BASE_INTERVAL_MS: f64 = 1000.0;
    pub const INTERVAL_STEP_MS: f64 = 100.0;
    pub const MIN_INTERVAL_MS: f64 = 200.0;
    pub const BASE_CAP: u32 = 5;
    pub const CAP_PER_LEVEL: f32 = 1.5;
    pub const MAX_CAP: u32 = 20;
}

/// Vertical speed multiplier for a player level
#[inline]
pub fn difficulty_factor(level: u32) -> f32 {
    1.0 + (level.max(1) - 1) as f32 * speed::DIFFICULTY_PER_LEVEL
}

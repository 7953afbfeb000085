//! Packet classification
//!
//! Maps a decoded packet to a motion pattern, spawn position, initial
//! velocity, size class, color and service label. Resolution order:
//! port pattern, then protocol defaults (only without a port pattern), then
//! IP class modifiers, then the difficulty factor on vertical speed.
//!
//! Classification has no side effects. The only non-determinism (DHCP spread
//! and source jitter) is drawn from the caller's RNG.

use std::borrow::Cow;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;

use crate::game::constants::{difficulty_factor, drift, ip, pattern, playfield, ports, size, speed};
use crate::game::packet::{PacketDescriptor, Protocol, Rgb, TcpFlags};
use crate::game::services;
use crate::util::vec2::Vec2;

/// Named kinematic behavior of a projectile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MotionPattern {
    None,
    Straight,
    Zigzag,
    Double,
    Fast,
    Chain,
    Seeking,
    Pulling,
    Spreading,
    Loopback,
    Broadcast,
}

impl MotionPattern {
    /// Pattern assigned by a well-known port, `None` for everything else
    pub fn for_port(port: u16) -> Self {
        match port {
            80 => MotionPattern::Straight,
            443 => MotionPattern::Zigzag,
            20 | 21 => MotionPattern::Double,
            22 => MotionPattern::Fast,
            25 => MotionPattern::Chain,
            53 => MotionPattern::Seeking,
            110 => MotionPattern::Pulling,
            67 | 68 => MotionPattern::Spreading,
            _ => MotionPattern::None,
        }
    }

    /// Base vertical speed for a port pattern
    fn base_vy(self) -> f32 {
        match self {
            MotionPattern::Straight => 140.0,
            MotionPattern::Zigzag => 120.0,
            MotionPattern::Double => 100.0,
            MotionPattern::Fast => 200.0,
            MotionPattern::Chain => 110.0,
            MotionPattern::Seeking => 90.0,
            MotionPattern::Pulling => 100.0,
            MotionPattern::Spreading => 80.0,
            _ => speed::DEFAULT_VY,
        }
    }

    pub fn is_special(self) -> bool {
        self != MotionPattern::None
    }
}

/// Coarse class of the source address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IpClass {
    Global,
    Private,
    Loopback,
    Broadcast,
}

impl IpClass {
    /// Classify by the textual address. Absent addresses are `Global`.
    /// The private check runs first, so 192.168.1.255 is private.
    pub fn of(ip: Option<&str>) -> Self {
        let Some(ip) = ip.map(str::trim) else {
            return IpClass::Global;
        };
        if ip.starts_with("192.168.") || ip.starts_with("10.") || ip.starts_with("172.") {
            IpClass::Private
        } else if ip.starts_with("127.") {
            IpClass::Loopback
        } else if ip.ends_with(".255") {
            IpClass::Broadcast
        } else {
            IpClass::Global
        }
    }
}

/// Size class derived from the byte size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SizeClass {
    Small,
    Normal,
    Large,
    Oversized,
}

impl SizeClass {
    pub fn of(bytes: u32) -> Self {
        if bytes < size::SMALL_LIMIT {
            SizeClass::Small
        } else if bytes < size::NORMAL_LIMIT {
            SizeClass::Normal
        } else if bytes < size::LARGE_LIMIT {
            SizeClass::Large
        } else {
            SizeClass::Oversized
        }
    }

    pub fn radius(self) -> f32 {
        match self {
            SizeClass::Small => 3.0,
            SizeClass::Normal => 5.0,
            SizeClass::Large => 7.0,
            SizeClass::Oversized => 9.0,
        }
    }

    pub fn gravity_scale(self) -> f32 {
        match self {
            SizeClass::Small => 0.5,
            SizeClass::Normal => 1.0,
            SizeClass::Large => 1.5,
            SizeClass::Oversized => 2.0,
        }
    }

    /// Oversized packets break into fragments mid-flight
    pub fn fragments(self) -> bool {
        self == SizeClass::Oversized
    }
}

/// Inputs that are not part of the packet itself
#[derive(Debug, Clone, Copy)]
pub struct ClassifyContext {
    /// Scene time in milliseconds
    pub now_ms: f64,
    pub level: u32,
    /// Current avatar x, for seeking projectiles
    pub avatar_x: f32,
    /// Aim non-special high ports at this x
    pub target_x: Option<f32>,
}

impl Default for ClassifyContext {
    fn default() -> Self {
        Self {
            now_ms: 0.0,
            level: 1,
            avatar_x: playfield::CENTER_X,
            target_x: None,
        }
    }
}

/// Everything needed to spawn a projectile for one packet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    /// Pattern driving kinematics (after IP class override)
    pub pattern: MotionPattern,
    /// Pattern implied by the port alone
    pub port_pattern: MotionPattern,
    pub ip_class: IpClass,
    pub size_class: SizeClass,
    pub position: Vec2,
    pub velocity: Vec2,
    pub service_label: Cow<'static, str>,
    pub color: Rgb,
    pub protocol: Protocol,
    pub port: u16,
    pub size: u32,
    pub tcp_flags: Option<TcpFlags>,
    pub source_id: Option<Arc<str>>,
    pub source_name: Option<Arc<str>>,
}

impl Classification {
    /// Label shown next to the projectile, e.g. "HTTPS:443"
    pub fn display_label(&self) -> String {
        format!("{}:{}", self.service_label, self.port)
    }
}

/// Classify a packet
pub fn classify<R: Rng + ?Sized>(packet: &PacketDescriptor, ctx: &ClassifyContext, rng: &mut R) -> Classification {
    let port = packet.effective_port();
    let port_pattern = MotionPattern::for_port(port);
    let ip_class = IpClass::of(packet.src_ip.as_deref());
    let spawn_hint = packet.source.as_ref().and_then(|s| s.spawn_hint);

    let position = match spawn_hint {
        Some(hint) => Vec2::new(hint.x, hint.y + playfield::SOURCE_SPAWN_OFFSET_Y),
        None => Vec2::new(port_spawn_x(port, ctx.target_x), playfield::SPAWN_Y),
    };

    let mut vy = port_pattern.base_vy();
    let mut vx = if spawn_hint.is_some() {
        rng.gen_range(-speed::SOURCE_JITTER..=speed::SOURCE_JITTER)
    } else {
        0.0
    };

    match port_pattern {
        MotionPattern::Straight | MotionPattern::Fast => vx = 0.0,
        MotionPattern::Zigzag => vx = zigzag_vx(ctx.now_ms, port),
        MotionPattern::Seeking => {
            vx = ((ctx.avatar_x - position.x) * pattern::SEEK_INITIAL_GAIN)
                .clamp(-pattern::SEEK_MAX_VX, pattern::SEEK_MAX_VX);
        }
        MotionPattern::Pulling => vx = (playfield::CENTER_X - position.x) * pattern::PULL_GAIN,
        MotionPattern::Spreading => {
            vx = rng.gen_range(-pattern::SPREAD_HALF_WIDTH..=pattern::SPREAD_HALF_WIDTH);
        }
        // Double and Chain keep the jitter; companions are added at spawn
        MotionPattern::Double | MotionPattern::Chain => {}
        MotionPattern::None | MotionPattern::Loopback | MotionPattern::Broadcast => {
            if spawn_hint.is_none() {
                vx = unpatterned_vx(port, position.x, vy, ctx);
            }
        }
    }

    if !port_pattern.is_special() {
        match packet.protocol {
            Protocol::Tcp => vy = speed::TCP_VY,
            Protocol::Udp => {
                vy = speed::UDP_VY;
                vx *= speed::UDP_VX_SCALE;
            }
            Protocol::Icmp => {
                vy = speed::ICMP_VY;
                if ctx.target_x.is_none() {
                    vx = 0.0;
                }
            }
            Protocol::Other(_) => {}
        }
    }

    let mut kinematic = port_pattern;
    match ip_class {
        IpClass::Private => vy *= ip::PRIVATE_VY_SCALE,
        IpClass::Loopback => kinematic = MotionPattern::Loopback,
        IpClass::Broadcast => {
            kinematic = MotionPattern::Broadcast;
            vx = 0.0;
            vy *= ip::BROADCAST_VY_SCALE;
        }
        IpClass::Global => {}
    }

    vy *= difficulty_factor(ctx.level);

    let size_class = SizeClass::of(packet.size);
    let service_label = services::resolve(packet, port, port_pattern, ip_class);
    let color = packet
        .color
        .unwrap_or_else(|| default_color(port_pattern, port, &packet.protocol));

    Classification {
        pattern: kinematic,
        port_pattern,
        ip_class,
        size_class,
        position,
        velocity: Vec2::new(vx, vy),
        service_label,
        color,
        protocol: packet.protocol.clone(),
        port,
        size: packet.size,
        tcp_flags: packet.tcp_flags,
        source_id: packet.source.as_ref().and_then(|s| s.id.clone()),
        source_name: packet.source_name().cloned(),
    }
}

/// Spawn x for projectiles without a source hint
pub fn port_spawn_x(port: u16, target_x: Option<f32>) -> f32 {
    if port < ports::WELL_KNOWN_END {
        playfield::SPAWN_BAND_MIN_X + (port as f32 / (ports::WELL_KNOWN_END - 1) as f32) * playfield::SPAWN_BAND_WIDTH
    } else if let Some(x) = target_x {
        x
    } else {
        let normalized = (port - ports::WELL_KNOWN_END) as f32 / (ports::MAX - ports::WELL_KNOWN_END) as f32;
        playfield::SPAWN_BAND_MIN_X + normalized * playfield::SPAWN_BAND_WIDTH
    }
}

/// HTTPS zigzag velocity at a point in time
#[inline]
pub fn zigzag_vx(now_ms: f64, port: u16) -> f32 {
    ((now_ms * pattern::ZIGZAG_RATE + port as f64).sin() as f32) * pattern::ZIGZAG_AMPLITUDE
}

/// Drift for ports without a special pattern: parity bias, aimed at a
/// target when one is given, replaced by a wave for prime ports.
fn unpatterned_vx(port: u16, x: f32, vy: f32, ctx: &ClassifyContext) -> f32 {
    let sign = if port % 2 == 0 { 1.0 } else { -1.0 };
    let mut vx = match ctx.target_x {
        Some(target) if target != x => {
            let time_to_bottom = playfield::TRAVEL_HEIGHT / vy;
            let aimed = (target - x) / time_to_bottom;
            aimed + sign * (drift::AIMED_BASE + (port % drift::AIMED_MODULUS) as f32 * drift::AIMED_SCALE)
        }
        _ => sign * (drift::PARITY_BASE + (port % drift::PARITY_MODULUS) as f32 * drift::PARITY_SCALE),
    };
    if is_prime(port) {
        vx = ((ctx.now_ms * drift::PRIME_SPAWN_RATE + port as f64).sin() as f32) * drift::PRIME_SPAWN_AMPLITUDE;
    }
    vx
}

fn default_color(port_pattern: MotionPattern, port: u16, protocol: &Protocol) -> Rgb {
    if port_pattern.is_special() {
        match port {
            80 => return Rgb(0x00AAFF),
            443 => return Rgb(0xFFAA00),
            22 => return Rgb(0xFF00FF),
            53 => return Rgb(0xAAFF00),
            25 => return Rgb(0xFFFF00),
            _ => {}
        }
    }
    protocol_color(protocol)
}

/// Color for a protocol when nothing more specific applies
pub fn protocol_color(protocol: &Protocol) -> Rgb {
    match protocol {
        Protocol::Tcp => Rgb(0xFF6666),
        Protocol::Udp => Rgb(0x6666FF),
        Protocol::Icmp => Rgb(0x66FF66),
        Protocol::Other(_) => Rgb::GRAY,
    }
}

/// Trial division primality test
pub fn is_prime(n: u16) -> bool {
    if n < 2 {
        return false;
    }
    let n = n as u32;
    let mut i = 2;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 1;
    }
    true
}

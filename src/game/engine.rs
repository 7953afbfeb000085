//! Motion engine
//!
//! Owns the live projectile set. Projectiles enter through [`MotionEngine::spawn`]
//! and leave through culling or terminal events in [`MotionEngine::tick`].
//! Derived spawns produced during a tick are queued and appended after the
//! main pass, so they are first integrated on the following tick.

use rand::rngs::StdRng;
use rand::SeedableRng;
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::game::classifier::{classify, is_prime, zigzag_vx, Classification, ClassifyContext, MotionPattern};
use crate::game::constants::{bounds, drift, pattern, playfield, size, trigger};
use crate::game::packet::PacketDescriptor;
use crate::game::projectile::{Lifecycle, Projectile, ProjectileId};
use crate::game::spatial::{self, ProjectileGrid};
use crate::util::vec2::Vec2;

/// Handles returned from a single spawn (main projectile plus companions)
pub type SpawnHandles = SmallVec<[ProjectileId; 2]>;

/// Per-tick inputs
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    /// Scene time in milliseconds
    pub now_ms: f64,
    /// Seconds since the previous tick
    pub dt: f32,
    pub avatar: Vec2,
    /// Dodges are only counted while the game is running
    pub game_active: bool,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Projectiles that left through the bottom edge this tick
    pub dodged: u32,
    /// Projectiles removed by bounds
    pub culled: u32,
    /// Projectiles removed by a terminal event (fragmentation, FIN)
    pub terminated: u32,
    /// Derived projectiles queued this tick
    pub derived: u32,
}

/// Live-set bounds. Projectiles outside are culled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullBounds {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    /// Only applies to projectiles moving up
    pub top: f32,
}

impl Default for CullBounds {
    fn default() -> Self {
        Self {
            left: bounds::LEFT,
            right: bounds::RIGHT,
            bottom: bounds::BOTTOM,
            top: bounds::TOP,
        }
    }
}

/// How a projectile left the playfield
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Bottom,
    Side,
    Top,
}

/// Outcome of the trigger stage for one projectile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Alive,
    Terminated,
}

/// Allocates ids and queues derived projectiles during a tick
struct Spawner<'a> {
    next_id: &'a mut ProjectileId,
    queue: &'a mut Vec<Projectile>,
    spawned: u32,
}

impl Spawner<'_> {
    fn derive(&mut self, parent: &Projectile, offset_x: f32, velocity: Vec2, bytes: u32) {
        let id = *self.next_id;
        *self.next_id += 1;
        self.queue.push(parent.derive(id, offset_x, velocity, bytes));
        self.spawned += 1;
    }
}

/// Owner of the live projectile set
pub struct MotionEngine {
    projectiles: Vec<Projectile>,
    /// Derived spawns waiting to join the live set
    pending: Vec<Projectile>,
    next_id: ProjectileId,
    rng: StdRng,
    grid: ProjectileGrid,
    grid_dirty: bool,
    bounds: CullBounds,
}

impl MotionEngine {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic engine for tests and replays
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            projectiles: Vec::with_capacity(256),
            pending: Vec::with_capacity(32),
            next_id: 1,
            rng,
            grid: ProjectileGrid::default(),
            grid_dirty: true,
            bounds: CullBounds::default(),
        }
    }

    pub fn with_bounds(mut self, bounds: CullBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Classify a packet with the engine's RNG and spawn it
    pub fn ingest(&mut self, packet: &PacketDescriptor, ctx: &ClassifyContext) -> SpawnHandles {
        let classification = classify(packet, ctx, &mut self.rng);
        self.spawn(&classification)
    }

    /// Create projectiles for a classification.
    ///
    /// FTP-data (port 20) adds an offset companion. Chain stays a single
    /// projectile.
    pub fn spawn(&mut self, classification: &Classification) -> SpawnHandles {
        let mut handles = SpawnHandles::new();
        let id = self.allocate_id();
        let main = Projectile::from_classification(id, classification);
        handles.push(id);

        if classification.port_pattern == MotionPattern::Double && classification.port == 20 {
            let companion_id = self.allocate_id();
            let velocity = Vec2::new(pattern::DOUBLE_COMPANION_VX, main.velocity.y);
            let companion = main.derive(companion_id, pattern::DOUBLE_OFFSET_X, velocity, main.size);
            handles.push(companion_id);
            self.projectiles.push(main);
            self.projectiles.push(companion);
        } else {
            self.projectiles.push(main);
        }

        self.grid_dirty = true;
        handles
    }

    /// Advance every live projectile by one frame
    pub fn tick(&mut self, ctx: &TickContext) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let bounds = self.bounds;
        let mut queue = std::mem::take(&mut self.pending);
        let mut spawner = Spawner {
            next_id: &mut self.next_id,
            queue: &mut queue,
            spawned: 0,
        };

        self.projectiles.retain_mut(|p| {
            p.position += p.velocity * ctx.dt;
            apply_kinematics(p, ctx);

            if p.gravity_scale > 1.0 {
                p.velocity.y += p.gravity_scale * size::GRAVITY_STEP;
            }

            if !p.position.is_finite() || !p.velocity.is_finite() {
                warn!(id = p.id, "Dropping projectile with non-finite state");
                outcome.culled += 1;
                return false;
            }

            if apply_triggers(p, &mut spawner) == Fate::Terminated {
                outcome.terminated += 1;
                return false;
            }

            if p.size < size::SMALL_LIMIT {
                let phase = ctx.now_ms * drift::WIND_TIME_RATE + (p.position.y * drift::WIND_DEPTH_RATE) as f64;
                p.velocity.x += phase.sin() as f32 * drift::WIND_AMPLITUDE;
                if p.pattern == MotionPattern::Seeking {
                    p.velocity.x = p.velocity.x.clamp(-pattern::SEEK_MAX_VX, pattern::SEEK_MAX_VX);
                }
            }

            match exit_edge(p, &bounds) {
                None => true,
                Some(exit) => {
                    if exit == Exit::Bottom && ctx.game_active && p.flags.mark(Lifecycle::Counted) {
                        outcome.dodged += 1;
                    }
                    outcome.culled += 1;
                    false
                }
            }
        });

        outcome.derived = spawner.spawned;
        if outcome.derived > 0 {
            trace!(derived = outcome.derived, "Derived projectiles queued");
        }
        self.projectiles.append(&mut queue);
        self.pending = queue;
        self.grid_dirty = true;
        outcome
    }

    /// True if any projectile overlaps the avatar's hit circle
    pub fn check_collision(&mut self, avatar: Vec2, hit_radius: f32) -> bool {
        self.refresh_grid();
        spatial::check_collision(&self.grid, &self.projectiles, avatar, hit_radius)
    }

    /// Number of new graze events for the avatar
    pub fn check_graze(&mut self, avatar: Vec2, hit_radius: f32, graze_radius: f32) -> u32 {
        self.refresh_grid();
        spatial::check_graze(&self.grid, &mut self.projectiles, avatar, hit_radius, graze_radius)
    }

    /// Destroy every projectile. Ids keep increasing across resets.
    pub fn reset(&mut self) {
        self.projectiles.clear();
        self.pending.clear();
        self.grid.clear();
        self.grid_dirty = true;
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn get(&self, id: ProjectileId) -> Option<&Projectile> {
        self.projectiles.iter().find(|p| p.id == id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
    }

    fn allocate_id(&mut self) -> ProjectileId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn refresh_grid(&mut self) {
        if self.grid_dirty {
            self.grid.rebuild(&self.projectiles);
            self.grid_dirty = false;
        }
    }
}

impl Default for MotionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Continuous per-pattern velocity updates
fn apply_kinematics(p: &mut Projectile, ctx: &TickContext) {
    match p.pattern {
        MotionPattern::Zigzag => p.velocity.x = zigzag_vx(ctx.now_ms, p.port),
        MotionPattern::Seeking => {
            let dx = ctx.avatar.x - p.position.x;
            p.velocity.x = (p.velocity.x + dx * pattern::SEEK_TICK_GAIN)
                .clamp(-pattern::SEEK_MAX_VX, pattern::SEEK_MAX_VX);
        }
        MotionPattern::Spreading => p.velocity.x *= pattern::SPREAD_GROWTH,
        MotionPattern::None if p.port > 0 && is_prime(p.port) => {
            let phase = ctx.now_ms * drift::PRIME_TICK_RATE + p.port as f64;
            p.velocity.x += phase.cos() as f32 * drift::PRIME_TICK_AMPLITUDE;
        }
        _ => {}
    }
}

/// One-shot events gated by depth and a lifecycle flag
fn apply_triggers(p: &mut Projectile, spawner: &mut Spawner<'_>) -> Fate {
    let y = p.position.y;

    if p.pattern == MotionPattern::Loopback && y > trigger::LOOPBACK_Y && p.flags.mark(Lifecycle::UTurned) {
        p.velocity.y *= trigger::LOOPBACK_VY_SCALE;
        p.velocity.x = (playfield::CENTER_X - p.position.x) * trigger::LOOPBACK_CENTER_GAIN;
    }

    if p.pattern == MotionPattern::Broadcast && y > trigger::BROADCAST_Y && p.flags.mark(Lifecycle::BroadcastSplit) {
        let vy = p.velocity.y * trigger::BROADCAST_VY_SCALE;
        for step in [-2.0f32, -1.0, 1.0, 2.0] {
            let velocity = Vec2::new(step * trigger::BROADCAST_STEP_VX, vy);
            spawner.derive(p, 0.0, velocity, trigger::BROADCAST_CHILD_BYTES);
        }
    }

    if p.size_class.fragments() && y > trigger::FRAGMENT_Y && p.flags.mark(Lifecycle::Fragmented) {
        for degrees in trigger::FRAGMENT_ANGLES_DEG {
            let angle = degrees.to_radians();
            let velocity = Vec2::new(
                angle.sin() * trigger::FRAGMENT_SPEED_X,
                angle.cos() * trigger::FRAGMENT_SPEED_Y,
            );
            spawner.derive(p, 0.0, velocity, trigger::FRAGMENT_CHILD_BYTES);
        }
        return Fate::Terminated;
    }

    if p.is_syn_only() {
        if y > trigger::SYN_Y && p.flags.mark(Lifecycle::SynSplit) {
            for side in [-1.0f32, 1.0] {
                let velocity = Vec2::new(p.velocity.x + side * trigger::SYN_DELTA_VX, p.velocity.y);
                spawner.derive(p, side * trigger::SYN_OFFSET_X, velocity, p.size);
            }
        }
    } else if p.is_fin() && y > trigger::FIN_Y && p.flags.mark(Lifecycle::FinExploded) {
        for i in 0..trigger::FIN_SHARDS {
            let angle = (i as f32 * 90.0).to_radians();
            spawner.derive(p, 0.0, Vec2::from_angle(angle) * trigger::FIN_SPEED, trigger::FIN_CHILD_BYTES);
        }
        return Fate::Terminated;
    }

    Fate::Alive
}

fn exit_edge(p: &Projectile, bounds: &CullBounds) -> Option<Exit> {
    let Vec2 { x, y } = p.position;
    if y > bounds.bottom {
        Some(Exit::Bottom)
    } else if x < bounds.left || x > bounds.right {
        Some(Exit::Side)
    } else if y < bounds.top && p.velocity.y < 0.0 {
        Some(Exit::Top)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::classifier::IpClass;
    use crate::game::packet::{Protocol, TcpFlags};

    const DT: f32 = 1.0 / 60.0;

    fn ctx_at(frame: u32) -> TickContext {
        TickContext {
            now_ms: frame as f64 * 1000.0 / 60.0,
            dt: DT,
            avatar: Vec2::new(400.0, 500.0),
            game_active: true,
        }
    }

    fn run(engine: &mut MotionEngine, frames: u32) -> TickOutcome {
        let mut total = TickOutcome::default();
        for frame in 0..frames {
            let o = engine.tick(&ctx_at(frame));
            total.dodged += o.dodged;
            total.culled += o.culled;
            total.terminated += o.terminated;
            total.derived += o.derived;
        }
        total
    }

    /// Ids are sequential, so everything spawned after `id` was derived from it
    /// when it is the only top-level projectile
    fn spawned_after(engine: &MotionEngine, id: ProjectileId) -> usize {
        engine.projectiles().iter().filter(|p| p.id > id).count()
    }

    #[test]
    fn test_spawn_returns_handle() {
        let mut engine = MotionEngine::with_seed(1);
        let packet = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(None, Some(80));
        let handles = engine.ingest(&packet, &ClassifyContext::default());
        assert_eq!(handles.len(), 1);
        assert_eq!(engine.len(), 1);
        assert!(engine.get(handles[0]).is_some());
    }

    #[test]
    fn test_ftp_data_spawns_companion() {
        let mut engine = MotionEngine::with_seed(1);
        let packet = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(None, Some(20));
        let handles = engine.ingest(&packet, &ClassifyContext::default());
        assert_eq!(handles.len(), 2);
        let main = engine.get(handles[0]).map(|p| p.position.x).unwrap_or_default();
        let companion = engine.get(handles[1]).map(|p| p.position.x).unwrap_or_default();
        assert!((companion - main - 20.0).abs() < 1e-4);

        // FTP control and SMTP chain stay single
        let control = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(None, Some(21));
        assert_eq!(engine.ingest(&control, &ClassifyContext::default()).len(), 1);
        let smtp = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(None, Some(25));
        assert_eq!(engine.ingest(&smtp, &ClassifyContext::default()).len(), 1);
    }

    #[test]
    fn test_fragmentation_end_to_end() {
        let mut engine = MotionEngine::with_seed(7);
        let packet = PacketDescriptor::new(Protocol::Tcp, 2000)
            .with_ports(Some(51000), Some(1500))
            .with_src_ip("10.0.0.5");
        let ctx = ClassifyContext::default();
        let c = classify(&packet, &ctx, &mut StdRng::seed_from_u64(7));
        assert_eq!(c.pattern, MotionPattern::None);
        assert_eq!(c.ip_class, IpClass::Private);
        assert!((c.velocity.y - 120.0 * 0.7).abs() < 1e-3);
        assert_eq!(c.size_class.radius(), 9.0);
        assert!(c.size_class.fragments());

        let id = engine.spawn(&c)[0];
        let mut frame = 0;
        while engine.get(id).is_some() {
            let before = engine.get(id).map(|p| p.position.y).unwrap_or_default();
            let outcome = engine.tick(&ctx_at(frame));
            frame += 1;
            if engine.get(id).is_none() {
                assert!(before <= 150.0 + 3.0);
                assert_eq!(outcome.terminated, 1);
                assert_eq!(outcome.derived, 3);
            }
            assert!(frame < 1000, "projectile never fragmented");
        }
        assert_eq!(engine.len(), 3);
        assert_eq!(spawned_after(&engine, id), 3);
        for child in engine.projectiles() {
            assert_eq!(child.size, 500);
            assert!(!child.size_class.fragments());
            assert!(child.position.y > 150.0);
        }
    }

    #[test]
    fn test_fragments_do_not_move_on_spawn_tick() {
        let mut engine = MotionEngine::with_seed(3);
        let packet = PacketDescriptor::new(Protocol::Tcp, 2000).with_ports(None, Some(1500));
        let mut c = classify(&packet, &ClassifyContext::default(), &mut StdRng::seed_from_u64(3));
        c.position = Vec2::new(400.0, 149.0);
        c.velocity = Vec2::new(0.0, 120.0);
        engine.spawn(&c);
        engine.tick(&ctx_at(0));
        let ys: Vec<f32> = engine.projectiles().iter().map(|p| p.position.y).collect();
        assert_eq!(ys.len(), 3);
        assert!(ys.iter().all(|&y| (y - ys[0]).abs() < 1e-4));
    }

    #[test]
    fn test_syn_split_fires_once() {
        let mut engine = MotionEngine::with_seed(5);
        let packet = PacketDescriptor::new(Protocol::Tcp, 200)
            .with_ports(Some(51000), Some(8080))
            .with_flags(TcpFlags::SYN);
        let id = engine.ingest(&packet, &ClassifyContext::default())[0];
        let mut splits = 0;
        for frame in 0..400 {
            splits += engine.tick(&ctx_at(frame)).derived;
            if engine.get(id).is_none() {
                break;
            }
        }
        assert_eq!(splits, 2);
    }

    #[test]
    fn test_syn_ack_does_not_split() {
        let mut engine = MotionEngine::with_seed(5);
        let packet = PacketDescriptor::new(Protocol::Tcp, 200)
            .with_ports(Some(51000), Some(8080))
            .with_flags(TcpFlags::SYN.union(TcpFlags::ACK));
        engine.ingest(&packet, &ClassifyContext::default());
        assert_eq!(run(&mut engine, 400).derived, 0);
    }

    #[test]
    fn test_fin_explodes_into_four() {
        let mut engine = MotionEngine::with_seed(9);
        let packet = PacketDescriptor::new(Protocol::Tcp, 200)
            .with_ports(Some(51000), Some(80))
            .with_flags(TcpFlags::FIN.union(TcpFlags::ACK));
        let id = engine.ingest(&packet, &ClassifyContext::default())[0];
        let mut derived = 0;
        for frame in 0..600 {
            let outcome = engine.tick(&ctx_at(frame));
            derived += outcome.derived;
            if engine.get(id).is_none() {
                assert_eq!(outcome.terminated, 1);
                break;
            }
        }
        assert_eq!(derived, 4);
        assert_eq!(spawned_after(&engine, id), 4);
        for child in engine.projectiles() {
            assert_eq!(child.size, 50);
            assert!((child.velocity.length() - 100.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_broadcast_splits_once_and_continues() {
        let mut engine = MotionEngine::with_seed(2);
        let packet = PacketDescriptor::new(Protocol::Udp, 200)
            .with_ports(None, Some(1500))
            .with_src_ip("255.255.255.255");
        let id = engine.ingest(&packet, &ClassifyContext::default())[0];
        let mut derived = 0;
        for frame in 0..2000 {
            let outcome = engine.tick(&ctx_at(frame));
            derived += outcome.derived;
            if outcome.derived > 0 {
                let parent = engine.get(id).map(|p| p.velocity.y).unwrap_or_default();
                let mut vxs: Vec<f32> = engine
                    .projectiles()
                    .iter()
                    .filter(|p| p.id > id)
                    .map(|p| p.velocity.x)
                    .collect();
                vxs.sort_by(|a, b| a.total_cmp(b));
                assert_eq!(vxs, vec![-160.0, -80.0, 80.0, 160.0]);
                for child in engine.projectiles().iter().filter(|p| p.id > id) {
                    assert!((child.velocity.y - parent * 0.5).abs() < 1e-3);
                    assert_eq!(child.size, 60);
                }
            }
            if engine.get(id).is_none() {
                break;
            }
        }
        assert_eq!(derived, 4);
    }

    #[test]
    fn test_loopback_turns_once_and_is_not_counted() {
        let mut engine = MotionEngine::with_seed(4);
        let packet = PacketDescriptor::new(Protocol::Tcp, 200)
            .with_ports(None, Some(1500))
            .with_src_ip("127.0.0.1");
        let id = engine.ingest(&packet, &ClassifyContext::default())[0];
        let mut dodged = 0;
        let mut turned_at = None;
        for frame in 0..2000 {
            dodged += engine.tick(&ctx_at(frame)).dodged;
            match engine.get(id) {
                Some(p) if p.flags.has(Lifecycle::UTurned) => {
                    turned_at.get_or_insert(frame);
                    assert!(p.velocity.y < 0.0);
                }
                Some(_) => {}
                None => break,
            }
        }
        assert!(turned_at.is_some());
        assert!(engine.get(id).is_none());
        assert_eq!(dodged, 0);
    }

    #[test]
    fn test_seeking_clamped() {
        let mut engine = MotionEngine::with_seed(11);
        let packet = PacketDescriptor::new(Protocol::Udp, 200).with_ports(None, Some(53));
        let ctx = ClassifyContext { avatar_x: 5000.0, ..Default::default() };
        let id = engine.ingest(&packet, &ctx)[0];
        for frame in 0..600 {
            let mut tick = ctx_at(frame);
            tick.avatar = Vec2::new(if frame % 200 < 100 { 100_000.0 } else { -100_000.0 }, 500.0);
            engine.tick(&tick);
            match engine.get(id) {
                Some(p) => assert!((-250.0..=250.0).contains(&p.velocity.x)),
                None => break,
            }
        }
    }

    #[test]
    fn test_small_seeking_stays_clamped_under_wind() {
        let mut engine = MotionEngine::with_seed(11);
        let packet = PacketDescriptor::new(Protocol::Udp, 60).with_ports(None, Some(53));
        let ctx = ClassifyContext { avatar_x: 5000.0, ..Default::default() };
        let id = engine.ingest(&packet, &ctx)[0];
        assert!(engine.get(id).map(|p| p.size < size::SMALL_LIMIT).unwrap_or(false));
        for frame in 0..600 {
            let mut tick = ctx_at(frame);
            tick.avatar = Vec2::new(if frame % 200 < 100 { 100_000.0 } else { -100_000.0 }, 500.0);
            engine.tick(&tick);
            match engine.get(id) {
                Some(p) => assert!(p.velocity.x.abs() <= pattern::SEEK_MAX_VX, "vx = {}", p.velocity.x),
                None => break,
            }
        }
    }

    /// Spawn a single projectile with a fixed position and velocity
    fn spawn_with(engine: &mut MotionEngine, packet: &PacketDescriptor, position: Vec2, velocity: Vec2) -> ProjectileId {
        let mut c = classify(packet, &ClassifyContext::default(), &mut StdRng::seed_from_u64(1));
        c.position = position;
        c.velocity = velocity;
        engine.spawn(&c)[0]
    }

    fn velocity_of(engine: &MotionEngine, id: ProjectileId) -> Vec2 {
        engine.get(id).map(|p| p.velocity).unwrap_or_default()
    }

    #[test]
    fn test_zigzag_recomputed_each_tick() {
        let mut engine = MotionEngine::with_seed(1);
        let packet = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(Some(51000), Some(443));
        let id = spawn_with(&mut engine, &packet, Vec2::new(400.0, 100.0), Vec2::new(0.0, 120.0));
        for frame in [5, 6, 40] {
            let ctx = ctx_at(frame);
            engine.tick(&ctx);
            let expected = zigzag_vx(ctx.now_ms, 443);
            assert!((velocity_of(&engine, id).x - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn test_spreading_widens_each_tick() {
        let mut engine = MotionEngine::with_seed(1);
        let packet = PacketDescriptor::new(Protocol::Udp, 200).with_ports(Some(68), Some(67));
        let id = spawn_with(&mut engine, &packet, Vec2::new(400.0, 100.0), Vec2::new(40.0, 80.0));
        let mut expected = 40.0f32;
        for frame in 0..10 {
            engine.tick(&ctx_at(frame));
            expected *= pattern::SPREAD_GROWTH;
        }
        assert!((velocity_of(&engine, id).x - expected).abs() < 1e-3);
        assert!(expected > 44.0);
    }

    #[test]
    fn test_prime_port_perturbed_each_tick() {
        let mut engine = MotionEngine::with_seed(1);
        let prime = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(None, Some(1009));
        let plain = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(None, Some(1000));
        let prime_id = spawn_with(&mut engine, &prime, Vec2::new(300.0, 100.0), Vec2::new(20.0, 120.0));
        let plain_id = spawn_with(&mut engine, &plain, Vec2::new(500.0, 100.0), Vec2::new(20.0, 120.0));

        let ctx = ctx_at(3);
        engine.tick(&ctx);
        let phase = ctx.now_ms * drift::PRIME_TICK_RATE + 1009.0;
        let expected = 20.0 + phase.cos() as f32 * drift::PRIME_TICK_AMPLITUDE;
        assert!((velocity_of(&engine, prime_id).x - expected).abs() < 1e-3);
        assert!((velocity_of(&engine, plain_id).x - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_gravity_only_above_unit_scale() {
        let mut engine = MotionEngine::with_seed(1);
        let start = Vec2::new(0.0, 100.0);
        let ids: Vec<(u32, ProjectileId)> = [200, 1000, 2000]
            .into_iter()
            .enumerate()
            .map(|(i, bytes)| {
                let packet = PacketDescriptor::new(Protocol::Tcp, bytes).with_ports(None, Some(8080));
                (bytes, spawn_with(&mut engine, &packet, Vec2::new(200.0 + i as f32 * 150.0, 50.0), start))
            })
            .collect();

        engine.tick(&ctx_at(0));
        let vy = |engine: &MotionEngine, bytes: u32| {
            ids.iter()
                .find(|(b, _)| *b == bytes)
                .map(|(_, id)| velocity_of(engine, *id).y)
                .unwrap_or_default()
        };
        assert_eq!(vy(&engine, 200), 100.0);
        assert!((vy(&engine, 1000) - (100.0 + 1.5 * size::GRAVITY_STEP)).abs() < 1e-4);
        assert!((vy(&engine, 2000) - (100.0 + 2.0 * size::GRAVITY_STEP)).abs() < 1e-4);

        engine.tick(&ctx_at(1));
        assert_eq!(vy(&engine, 200), 100.0);
        assert!((vy(&engine, 1000) - (100.0 + 3.0 * size::GRAVITY_STEP)).abs() < 1e-4);
    }

    #[test]
    fn test_wind_only_for_small_packets() {
        let mut engine = MotionEngine::with_seed(1);
        let small = PacketDescriptor::new(Protocol::Tcp, 60).with_ports(None, Some(8080));
        let normal = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(None, Some(8080));
        let small_id = spawn_with(&mut engine, &small, Vec2::new(300.0, 300.0), Vec2::new(0.0, 100.0));
        let normal_id = spawn_with(&mut engine, &normal, Vec2::new(500.0, 300.0), Vec2::new(0.0, 100.0));

        let ctx = ctx_at(4);
        engine.tick(&ctx);
        let y = 300.0 + 100.0 * DT;
        let phase = ctx.now_ms * drift::WIND_TIME_RATE + (y * drift::WIND_DEPTH_RATE) as f64;
        let expected = phase.sin() as f32 * drift::WIND_AMPLITUDE;
        assert!((velocity_of(&engine, small_id).x - expected).abs() < 1e-4);
        assert_eq!(velocity_of(&engine, normal_id).x, 0.0);
    }

    #[test]
    fn test_fragment_velocities() {
        let mut engine = MotionEngine::with_seed(3);
        let packet = PacketDescriptor::new(Protocol::Tcp, 2000).with_ports(None, Some(1500));
        let id = spawn_with(&mut engine, &packet, Vec2::new(400.0, 149.0), Vec2::new(0.0, 120.0));
        let outcome = engine.tick(&ctx_at(0));
        assert_eq!(outcome.terminated, 1);
        assert!(engine.get(id).is_none());

        let mut fragments: Vec<&Projectile> = engine.projectiles().iter().collect();
        fragments.sort_by_key(|p| p.id);
        assert_eq!(fragments.len(), 3);
        for (fragment, degrees) in fragments.iter().zip([-60.0f32, 0.0, 60.0]) {
            let angle = degrees.to_radians();
            let expected = Vec2::new(angle.sin() * 100.0, angle.cos() * 150.0);
            assert!((fragment.velocity.x - expected.x).abs() < 1e-3);
            assert!((fragment.velocity.y - expected.y).abs() < 1e-3);
        }
    }

    #[test]
    fn test_bottom_exit_counted_once() {
        let mut engine = MotionEngine::with_seed(1);
        let packet = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(None, Some(80));
        let mut c = classify(&packet, &ClassifyContext::default(), &mut StdRng::seed_from_u64(1));
        c.position = Vec2::new(400.0, 615.0);
        engine.spawn(&c);
        let outcome = run(&mut engine, 10);
        assert_eq!(outcome.dodged, 1);
        assert_eq!(outcome.culled, 1);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_side_exit_not_counted() {
        let mut engine = MotionEngine::with_seed(1);
        let packet = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(None, Some(80));
        let mut c = classify(&packet, &ClassifyContext::default(), &mut StdRng::seed_from_u64(1));
        c.position = Vec2::new(828.0, 300.0);
        c.velocity = Vec2::new(300.0, 10.0);
        engine.spawn(&c);
        let outcome = run(&mut engine, 10);
        assert_eq!(outcome.dodged, 0);
        assert_eq!(outcome.culled, 1);
    }

    #[test]
    fn test_custom_bounds() {
        let bounds = CullBounds {
            bottom: 300.0,
            ..Default::default()
        };
        let mut engine = MotionEngine::with_seed(1).with_bounds(bounds);
        let packet = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(None, Some(80));
        let mut c = classify(&packet, &ClassifyContext::default(), &mut StdRng::seed_from_u64(1));
        c.position = Vec2::new(400.0, 299.0);
        engine.spawn(&c);
        assert_eq!(engine.tick(&ctx_at(0)).dodged, 1);
    }

    #[test]
    fn test_inactive_game_does_not_count() {
        let mut engine = MotionEngine::with_seed(1);
        let packet = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(None, Some(80));
        let mut c = classify(&packet, &ClassifyContext::default(), &mut StdRng::seed_from_u64(1));
        c.position = Vec2::new(400.0, 615.0);
        engine.spawn(&c);
        let mut tick = ctx_at(0);
        tick.game_active = false;
        assert_eq!(engine.tick(&tick).dodged, 0);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut engine = MotionEngine::with_seed(1);
        for port in [80, 443, 20, 53] {
            let packet = PacketDescriptor::new(Protocol::Tcp, 2000).with_ports(None, Some(port));
            engine.ingest(&packet, &ClassifyContext::default());
        }
        run(&mut engine, 30);
        assert!(!engine.is_empty());
        engine.reset();
        assert!(engine.is_empty());
        assert_eq!(engine.tick(&ctx_at(0)), TickOutcome::default());
        assert!(!engine.check_collision(Vec2::new(400.0, 500.0), 8.0));
    }

    #[test]
    fn test_non_finite_projectile_dropped() {
        let mut engine = MotionEngine::with_seed(1);
        let packet = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(None, Some(80));
        let mut classification = classify(&packet, &ClassifyContext::default(), &mut engine.rng);
        classification.velocity = Vec2::new(f32::NAN, 100.0);
        engine.spawn(&classification);
        engine.ingest(&packet, &ClassifyContext::default());

        let outcome = engine.tick(&ctx_at(0));
        assert_eq!(outcome.culled, 1);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_graze_through_engine() {
        let mut engine = MotionEngine::with_seed(1);
        let packet = PacketDescriptor::new(Protocol::Tcp, 200).with_ports(None, Some(80));
        let mut c = classify(&packet, &ClassifyContext::default(), &mut StdRng::seed_from_u64(1));
        c.position = Vec2::new(420.0, 500.0);
        engine.spawn(&c);
        let avatar = Vec2::new(400.0, 500.0);
        assert!(!engine.check_collision(avatar, 8.0));
        assert_eq!(engine.check_graze(avatar, 8.0, 40.0), 1);
        assert_eq!(engine.check_graze(avatar, 8.0, 40.0), 0);
    }

    #[test]
    fn test_bounded_fan_out() {
        // Oversized SYN from a broadcast address: every trigger is eligible
        let mut engine = MotionEngine::with_seed(13);
        let packet = PacketDescriptor::new(Protocol::Tcp, 4000)
            .with_ports(Some(51000), Some(1500))
            .with_src_ip("8.8.8.255")
            .with_flags(TcpFlags::SYN);
        engine.ingest(&packet, &ClassifyContext::default());
        let outcome = run(&mut engine, 2000);
        // SYN split (2, oversized), each sibling and the parent fragment (3 x 3)
        assert!(outcome.derived <= 2 + 4 + 9);
        assert!(engine.is_empty());
    }
}

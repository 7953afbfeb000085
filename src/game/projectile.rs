//! Live projectile entities
//!
//! A projectile is spawned from a [`Classification`] (or derived from another
//! projectile) and owned by the motion engine until it is culled.

use std::borrow::Cow;
use std::sync::Arc;

use bitvec::prelude::*;

use crate::game::classifier::{Classification, IpClass, MotionPattern, SizeClass};
use crate::game::packet::{Protocol, Rgb, TcpFlags};
use crate::util::vec2::Vec2;

/// Unique projectile identifier, never reused within an engine
pub type ProjectileId = u64;

/// One-shot lifecycle events. Each may be observed at most once per projectile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Lifecycle {
    /// Graze credit awarded
    Grazed = 0,
    /// Dodge counted on bottom exit
    Counted,
    /// Loopback U-turn applied
    UTurned,
    /// Broadcast siblings spawned
    BroadcastSplit,
    /// MTU fragments spawned (terminal)
    Fragmented,
    /// SYN handshake siblings spawned
    SynSplit,
    /// FIN shards spawned (terminal)
    FinExploded,
}

/// Per-projectile lifecycle bitset. Bits are only ever set; the whole set
/// goes away with the projectile on engine reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleFlags(BitArray<[u8; 1], Lsb0>);

impl LifecycleFlags {
    #[inline]
    pub fn has(&self, event: Lifecycle) -> bool {
        self.0[event as usize]
    }

    /// Set the flag, returning true only the first time
    #[inline]
    pub fn mark(&mut self, event: Lifecycle) -> bool {
        let index = event as usize;
        if self.0[index] {
            return false;
        }
        self.0.set(index, true);
        true
    }
}

/// A moving projectile
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: ProjectileId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub pattern: MotionPattern,
    pub ip_class: IpClass,
    pub size_class: SizeClass,
    /// Byte size (derived projectiles carry their reduced size here)
    pub size: u32,
    pub radius: f32,
    pub gravity_scale: f32,
    pub protocol: Protocol,
    pub port: u16,
    pub tcp_flags: Option<TcpFlags>,
    pub label: Cow<'static, str>,
    pub color: Rgb,
    pub source_id: Option<Arc<str>>,
    pub source_name: Option<Arc<str>>,
    pub flags: LifecycleFlags,
}

impl Projectile {
    /// Build a top-level projectile from a classification
    pub fn from_classification(id: ProjectileId, c: &Classification) -> Self {
        Self {
            id,
            position: c.position,
            velocity: c.velocity,
            pattern: c.pattern,
            ip_class: c.ip_class,
            size_class: c.size_class,
            size: c.size,
            radius: c.size_class.radius(),
            gravity_scale: c.size_class.gravity_scale(),
            protocol: c.protocol.clone(),
            port: c.port,
            tcp_flags: c.tcp_flags,
            label: c.service_label.clone(),
            color: c.color,
            source_id: c.source_id.clone(),
            source_name: c.source_name.clone(),
            flags: LifecycleFlags::default(),
        }
    }

    /// Build a derived projectile at this one's position.
    ///
    /// Children have no pattern and no TCP flags, so they can never re-trigger
    /// a pattern or handshake event. They keep protocol, port, label, color
    /// and source.
    pub fn derive(&self, id: ProjectileId, offset_x: f32, velocity: Vec2, size: u32) -> Self {
        let size_class = SizeClass::of(size);
        Self {
            id,
            position: Vec2::new(self.position.x + offset_x, self.position.y),
            velocity,
            pattern: MotionPattern::None,
            ip_class: self.ip_class,
            size_class,
            size,
            radius: size_class.radius(),
            gravity_scale: size_class.gravity_scale(),
            protocol: self.protocol.clone(),
            port: self.port,
            tcp_flags: None,
            label: self.label.clone(),
            color: self.color,
            source_id: self.source_id.clone(),
            source_name: self.source_name.clone(),
            flags: LifecycleFlags::default(),
        }
    }

    /// Label shown next to the projectile
    pub fn display_label(&self) -> String {
        format!("{}:{}", self.label, self.port)
    }

    #[inline]
    pub fn is_syn_only(&self) -> bool {
        self.tcp_flags.is_some_and(TcpFlags::is_syn_only)
    }

    #[inline]
    pub fn is_fin(&self) -> bool {
        self.tcp_flags.is_some_and(|f| f.contains(TcpFlags::FIN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::classifier::{classify, ClassifyContext};
    use crate::game::packet::PacketDescriptor;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn syn_projectile() -> Projectile {
        let packet = PacketDescriptor::new(Protocol::Tcp, 1600)
            .with_ports(Some(51000), Some(8080))
            .with_flags(TcpFlags::SYN);
        let c = classify(&packet, &ClassifyContext::default(), &mut StdRng::seed_from_u64(1));
        Projectile::from_classification(1, &c)
    }

    #[test]
    fn test_flags_mark_once() {
        let mut flags = LifecycleFlags::default();
        assert!(!flags.has(Lifecycle::Grazed));
        assert!(flags.mark(Lifecycle::Grazed));
        assert!(!flags.mark(Lifecycle::Grazed));
        assert!(flags.has(Lifecycle::Grazed));
        assert!(!flags.has(Lifecycle::Counted));
    }

    #[test]
    fn test_from_classification() {
        let p = syn_projectile();
        assert_eq!(p.radius, 9.0);
        assert_eq!(p.gravity_scale, 2.0);
        assert!(p.is_syn_only());
        assert!(!p.is_fin());
        assert_eq!(p.display_label(), "HTTP-ALT:8080");
    }

    #[test]
    fn test_derived_children_cannot_retrigger() {
        let parent = syn_projectile();
        let child = parent.derive(2, 30.0, Vec2::new(50.0, 100.0), 60);
        assert_eq!(child.id, 2);
        assert_eq!(child.pattern, MotionPattern::None);
        assert!(child.tcp_flags.is_none());
        assert!(!child.size_class.fragments());
        assert_eq!(child.radius, 3.0);
        assert_eq!(child.port, 8080);
        assert!((child.position.x - (parent.position.x + 30.0)).abs() < 1e-4);
    }
}

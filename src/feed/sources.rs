//! Traffic-source registry
//!
//! Capture sources sit on a slowly rotating ellipse near the top of the
//! playfield. Packets observed by a source spawn from its current position.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::feed::protocol::CaptureSource;
use crate::game::packet::Rgb;
use crate::util::vec2::Vec2;

/// Source marker colors, assigned per display name in first-seen order
pub const SOURCE_PALETTE: [Rgb; 8] = [
    Rgb(0xFF6B6B),
    Rgb(0x4ECDC4),
    Rgb(0x45B7D1),
    Rgb(0xFECA57),
    Rgb(0xA55EEA),
    Rgb(0x26DE81),
    Rgb(0xFD79A8),
    Rgb(0x00B894),
];

/// Ring rotation speed (radians per millisecond)
pub const ROTATION_RATE: f64 = 0.0003;

/// Angular slot per registration index
const SLOT_ANGLE: f64 = std::f64::consts::TAU / 8.0;

/// Read-only spawn position lookup consumed at spawn time
pub trait SpawnHintProvider {
    /// Current marker position of a source, by id first and display name second
    fn spawn_hint(&self, source_id: Option<&str>, source_name: Option<&str>, now_ms: f64) -> Option<Vec2>;
}

/// Ellipse the sources are placed on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingGeometry {
    pub center: Vec2,
    pub radius_x: f32,
    pub radius_y: f32,
}

impl Default for RingGeometry {
    fn default() -> Self {
        Self {
            center: Vec2::new(400.0, 50.0),
            radius_x: 300.0,
            radius_y: 35.0,
        }
    }
}

#[derive(Debug, Clone)]
struct SourceMarker {
    id: Arc<str>,
    name: Arc<str>,
    base_angle: f64,
    active: bool,
    packets_per_second: f64,
}

/// Per-source view for snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub id: String,
    pub name: String,
    pub color: String,
    pub active: bool,
    pub packets: u64,
    pub packets_per_second: f64,
}

/// Registry of capture sources, owned by the session
#[derive(Debug, Default)]
pub struct SourceRegistry {
    geometry: RingGeometry,
    /// Registration order
    markers: Vec<SourceMarker>,
    colors: FxHashMap<Arc<str>, Rgb>,
    counts: FxHashMap<Arc<str>, u64>,
}

impl SourceRegistry {
    pub fn new(geometry: RingGeometry) -> Self {
        Self {
            geometry,
            ..Default::default()
        }
    }

    /// Add new sources, refresh known ones and drop the ones that vanished
    pub fn sync(&mut self, sources: &[CaptureSource]) {
        let before = self.markers.len();
        self.markers.retain(|m| sources.iter().any(|s| *s.id == *m.id));
        let removed = before - self.markers.len();
        if removed > 0 {
            let markers = &self.markers;
            self.colors.retain(|name, _| markers.iter().any(|m| m.name == *name));
            self.counts.retain(|name, _| markers.iter().any(|m| m.name == *name));
        }

        let mut added = 0;
        for source in sources {
            if let Some(marker) = self.markers.iter_mut().find(|m| *m.id == *source.id) {
                marker.active = source.active;
                marker.packets_per_second = source.packets_per_second;
                continue;
            }
            let base_angle = self.base_angle(source);
            let name: Arc<str> = Arc::from(source.name.as_str());
            self.color_for(&name);
            self.markers.push(SourceMarker {
                id: Arc::from(source.id.as_str()),
                name,
                base_angle,
                active: source.active,
                packets_per_second: source.packets_per_second,
            });
            added += 1;
        }

        if added > 0 || removed > 0 {
            info!(added, removed, total = self.markers.len(), "Capture sources updated");
        }
    }

    /// Index slot plus an offset from the last octet, or from an id hash
    /// when the address is unknown
    fn base_angle(&self, source: &CaptureSource) -> f64 {
        let slot = self.markers.len() as f64 * SLOT_ANGLE;
        match source.last_octet() {
            Some(octet) => slot + (octet as f64 / 255.0) * (std::f64::consts::PI / 4.0),
            None => slot + (id_hash(&source.id).unsigned_abs() % 360) as f64 * (std::f64::consts::PI / 180.0),
        }
    }

    /// Marker position at a point in time
    pub fn position_at(&self, base_angle: f64, now_ms: f64) -> Vec2 {
        let rotation = (now_ms * ROTATION_RATE) % std::f64::consts::TAU;
        let angle = base_angle + rotation;
        Vec2::new(
            self.geometry.center.x + angle.cos() as f32 * self.geometry.radius_x,
            self.geometry.center.y + angle.sin() as f32 * self.geometry.radius_y,
        )
    }

    /// Palette color for a display name, assigned on first use
    pub fn color_for(&mut self, name: &str) -> Rgb {
        if let Some(color) = self.colors.get(name) {
            return *color;
        }
        let color = SOURCE_PALETTE[self.colors.len() % SOURCE_PALETTE.len()];
        self.colors.insert(Arc::from(name), color);
        color
    }

    /// Count an admitted packet against its source name. Unregistered names are ignored.
    pub fn record_packet(&mut self, name: &str) {
        if let Some(count) = self.counts.get_mut(name) {
            *count += 1;
            return;
        }
        if let Some(marker) = self.markers.iter().find(|m| &*m.name == name) {
            self.counts.insert(Arc::clone(&marker.name), 1);
        }
    }

    pub fn packet_count(&self, name: &str) -> u64 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Sources in registration order
    pub fn summaries(&self) -> Vec<SourceSummary> {
        self.markers
            .iter()
            .map(|m| SourceSummary {
                id: m.id.to_string(),
                name: m.name.to_string(),
                color: self.colors.get(&m.name).copied().unwrap_or(Rgb::GRAY).to_string(),
                active: m.active,
                packets: self.packet_count(&m.name),
                packets_per_second: m.packets_per_second,
            })
            .collect()
    }

    /// Forget all sources, colors and counters
    pub fn reset(&mut self) {
        self.markers.clear();
        self.colors.clear();
        self.counts.clear();
        debug!("Source registry cleared");
    }
}

impl SpawnHintProvider for SourceRegistry {
    fn spawn_hint(&self, source_id: Option<&str>, source_name: Option<&str>, now_ms: f64) -> Option<Vec2> {
        let by_id = source_id.and_then(|id| self.markers.iter().find(|m| &*m.id == id || &*m.name == id));
        let marker = by_id.or_else(|| source_name.and_then(|name| self.markers.iter().find(|m| &*m.name == name)))?;
        Some(self.position_at(marker.base_angle, now_ms))
    }
}

/// 32-bit rolling string hash (h * 31 + c, wrapping)
fn id_hash(id: &str) -> i32 {
    id.encode_utf16()
        .fold(0i32, |h, c| h.wrapping_shl(5).wrapping_sub(h).wrapping_add(c as i32))
}

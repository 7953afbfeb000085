//! Spatial hash grid for avatar proximity queries
//!
//! Divides the playfield into square cells holding indices into the live
//! projectile slice. Collision and graze queries only visit the cells that
//! overlap the query circle.

use hashbrown::HashMap;

use crate::game::projectile::{Lifecycle, Projectile};
use crate::util::vec2::Vec2;

/// Default cell size (screen pixels). Comfortably larger than the biggest
/// projectile radius.
pub const GRID_CELL_SIZE: f32 = 64.0;

/// Initial capacity for the cell map (800x640 playfield is ~130 cells)
const GRID_INITIAL_CAPACITY: usize = 160;

/// Initial capacity for index vectors within cells
const CELL_INITIAL_CAPACITY: usize = 8;

/// Grid cell key - (x, y) cell coordinates
pub type CellKey = (i32, i32);

/// Spatial hash over projectile indices
pub struct ProjectileGrid {
    inv_cell_size: f32,
    cells: HashMap<CellKey, Vec<usize>>,
    /// Largest projectile radius seen in the last rebuild
    max_radius: f32,
    len: usize,
}

impl ProjectileGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::with_capacity(GRID_INITIAL_CAPACITY),
            max_radius: 0.0,
            len: 0,
        }
    }

    /// Clear all entries, keeping per-cell allocations
    #[inline]
    pub fn clear(&mut self) {
        for cell in self.cells.values_mut() {
            cell.clear();
        }
        self.max_radius = 0.0;
        self.len = 0;
    }

    #[inline]
    fn position_to_cell(&self, position: Vec2) -> CellKey {
        (
            (position.x * self.inv_cell_size).floor() as i32,
            (position.y * self.inv_cell_size).floor() as i32,
        )
    }

    /// Re-index the live set. Indices refer to positions in `projectiles`.
    pub fn rebuild(&mut self, projectiles: &[Projectile]) {
        self.clear();
        for (index, projectile) in projectiles.iter().enumerate() {
            let key = self.position_to_cell(projectile.position);
            self.cells
                .entry(key)
                .or_insert_with(|| Vec::with_capacity(CELL_INITIAL_CAPACITY))
                .push(index);
            self.max_radius = self.max_radius.max(projectile.radius);
        }
        self.len = projectiles.len();
    }

    /// Indices of projectiles whose cell overlaps the circle at `center`
    /// with radius `reach`
    pub fn candidates(&self, center: Vec2, reach: f32) -> impl Iterator<Item = usize> + '_ {
        let (min_x, min_y) = self.position_to_cell(Vec2::new(center.x - reach, center.y - reach));
        let (max_x, max_y) = self.position_to_cell(Vec2::new(center.x + reach, center.y + reach));
        (min_y..=max_y)
            .flat_map(move |cy| (min_x..=max_x).map(move |cx| (cx, cy)))
            .filter_map(move |key| self.cells.get(&key))
            .flat_map(|cell| cell.iter().copied())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn max_radius(&self) -> f32 {
        self.max_radius
    }
}

impl Default for ProjectileGrid {
    fn default() -> Self {
        Self::new(GRID_CELL_SIZE)
    }
}

/// True if any projectile overlaps the avatar's hit circle.
///
/// `grid` must have been rebuilt from `projectiles`.
pub fn check_collision(grid: &ProjectileGrid, projectiles: &[Projectile], avatar: Vec2, hit_radius: f32) -> bool {
    let reach = hit_radius + grid.max_radius();
    grid.candidates(avatar, reach).any(|index| {
        let p = &projectiles[index];
        let limit = hit_radius + p.radius;
        p.position.distance_sq_to(avatar) < limit * limit
    })
}

/// Credit grazes for projectiles strictly inside the annulus between the hit
/// and graze radii. Each projectile is credited at most once in its lifetime.
///
/// `grid` must have been rebuilt from `projectiles`.
pub fn check_graze(
    grid: &ProjectileGrid,
    projectiles: &mut [Projectile],
    avatar: Vec2,
    hit_radius: f32,
    graze_radius: f32,
) -> u32 {
    let mut events = 0;
    for index in grid.candidates(avatar, graze_radius) {
        let p = &mut projectiles[index];
        if p.flags.has(Lifecycle::Grazed) {
            continue;
        }
        let distance = p.position.distance_to(avatar);
        if distance > hit_radius && distance < graze_radius && p.flags.mark(Lifecycle::Grazed) {
            events += 1;
        }
    }
    events
}

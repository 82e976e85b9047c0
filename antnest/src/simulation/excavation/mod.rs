//! Tile-level excavation: the digger pheromone field, per-tile hit points,
//! the frontier of diggable soil, and the corridor/room carving rules.

mod carving;
mod frontier;
mod objectives;
mod targeting;

pub use objectives::{ChamberObjective, ObjectiveStatus};

use glam::Vec2;
use shared::{GridPos, TileKind, seeded_noise};
use tracing::info;

use super::field::ScalarField;
use super::map::TileGrid;
use super::planner::{ExcavationPlanner, WorkfaceId};
use super::pressure::PressureSnapshot;
use crate::config::DigSettings;

const NO_SLOT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigMode {
    #[default]
    Corridor,
    Room,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DigTarget {
    pub pos: GridPos,
    pub mode: DigMode,
    /// Granted for this exact tile only.
    pub allow_branching: bool,
    /// Set when the planner issued the target.
    pub workface: Option<WorkfaceId>,
}

/// Per-agent excavation state.
#[derive(Debug, Clone)]
pub struct DigState {
    pub target: Option<DigTarget>,
    pub mode: DigMode,
    pub room_center: Option<GridPos>,
    pub room_radius: f32,
    pub room_dig_budget: i32,
    pub room_dug: i32,
    pub room_cooldown: f32,
    pub heading_angle: f32,
    pub heading_strength: f32,
    pub last_dug: Option<GridPos>,
    pub pending_vector: Option<Vec2>,
    pub idle_time: f32,
    pub retarget_timer: f32,
    pub assigned_workface: Option<WorkfaceId>,
}

impl Default for DigState {
    fn default() -> Self {
        Self {
            target: None,
            mode: DigMode::Corridor,
            room_center: None,
            room_radius: 0.0,
            room_dig_budget: 0,
            room_dug: 0,
            room_cooldown: 0.0,
            heading_angle: 0.0,
            heading_strength: 0.0,
            last_dug: None,
            pending_vector: None,
            idle_time: 0.0,
            retarget_timer: 0.0,
            assigned_workface: None,
        }
    }
}

impl DigState {
    /// Back to corridor digging, optionally blocking new rooms for `cooldown` seconds.
    pub fn leave_room(&mut self, cooldown: f32) {
        self.mode = DigMode::Corridor;
        self.room_center = None;
        self.room_radius = 0.0;
        self.room_dig_budget = 0;
        self.room_dug = 0;
        self.room_cooldown = self.room_cooldown.max(cooldown);
    }

    pub fn enter_room(&mut self, center: GridPos, radius: f32, budget: i32) {
        self.mode = DigMode::Room;
        self.room_center = Some(center);
        self.room_radius = radius;
        self.room_dig_budget = budget;
        self.room_dug = 0;
    }

    /// Dig heading as a unit vector, if one has been established.
    pub fn heading_vector(&self) -> Option<Vec2> {
        if self.heading_strength > 0.01 && self.heading_angle.is_finite() {
            let (sin, cos) = shared::fast_sin_cos(self.heading_angle);
            Some(Vec2::new(cos, sin))
        } else {
            None
        }
    }
}

/// The view of an agent the engine needs.
pub struct Digger<'a> {
    pub pos: Vec2,
    pub carrying: bool,
    pub is_digger: bool,
    pub state: &'a mut DigState,
}

/// Side effects of a successful carve, for the rest of the world to react to.
pub trait ExcavationCollaborators {
    fn on_tunnel_dug(&mut self, _pos: GridPos) {}
    fn spawn_dig_particles(&mut self, _pos: GridPos) {}
}

pub struct NoopCollaborators;

impl ExcavationCollaborators for NoopCollaborators {}

/// Everything outside the engine that target choice and carving read or touch.
pub struct ExcavationContext<'a> {
    pub grid: &'a mut TileGrid,
    pub air: Option<&'a ScalarField>,
    pub waste: Option<&'a ScalarField>,
    pub pressure: &'a PressureSnapshot,
    pub planner: Option<&'a mut ExcavationPlanner>,
    pub hooks: &'a mut dyn ExcavationCollaborators,
    pub queen_pos: Option<Vec2>,
    pub chamber: Option<&'a ChamberObjective>,
    /// Inner and outer radius (tiles) of the nursery ring around the queen.
    pub nursery_band: (f32, f32),
}

pub struct ExcavationEngine {
    settings: DigSettings,
    width: usize,
    height: usize,
    region_split: usize,
    cell_size: f32,
    pheromone: ScalarField,
    hp: ScalarField,
    /// Index into `frontier_list`, or `NO_SLOT`.
    frontier_slot: Vec<Vec<u32>>,
    frontier_list: Vec<GridPos>,
    queued: Vec<Vec<bool>>,
    update_queue: Vec<GridPos>,
    decay_cursor: usize,
    heading_warned: bool,
}

impl ExcavationEngine {
    pub fn new(
        width: usize,
        height: usize,
        region_split: usize,
        cell_size: f32,
        settings: DigSettings,
    ) -> Self {
        Self {
            settings,
            width,
            height,
            region_split,
            cell_size,
            pheromone: ScalarField::new(width, height),
            hp: ScalarField::new(width, height),
            frontier_slot: vec![vec![NO_SLOT; width]; height],
            frontier_list: Vec::new(),
            queued: vec![vec![false; width]; height],
            update_queue: Vec::new(),
            decay_cursor: region_split,
            heading_warned: false,
        }
    }

    pub fn for_grid(grid: &TileGrid, settings: DigSettings) -> Self {
        Self::new(
            grid.width,
            grid.height,
            grid.region_split,
            grid.cell_size,
            settings,
        )
    }

    pub fn settings(&self) -> &DigSettings {
        &self.settings
    }

    /// Recomputes hit points, clears pheromone and rebuilds the frontier.
    pub fn reset(&mut self, grid: &TileGrid) {
        self.pheromone.fill(0.0);
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let hp = self.compute_tile_hp(grid, x, y);
                self.hp.set(x, y, hp);
            }
        }
        self.update_queue.clear();
        for row in &mut self.queued {
            row.fill(false);
        }
        self.decay_cursor = self.region_split;
        self.rebuild_frontier(grid);
        info!(frontier = self.frontier_list.len(), "excavation engine reset");
    }

    /// Starting hit points of a tile. Pure in `(x, y)` and the grid dimensions.
    pub fn compute_tile_hp(&self, grid: &TileGrid, x: i32, y: i32) -> f32 {
        if grid.get(x, y) != TileKind::Soil {
            return 0.0;
        }
        let s = &self.settings;
        let depth = (y - self.region_split as i32).max(0) as f32;
        let depth_norm = depth / (self.height as f32 - self.region_split as f32).max(1.0);
        let hp = s.base_tile_hp
            + s.depth_hardness * depth_norm
            + s.hardness_jitter * (seeded_noise(x, y) - 0.5);
        hp.max(s.dig_damage)
    }

    pub fn dig_pheromone(&self) -> &ScalarField {
        &self.pheromone
    }

    pub fn pheromone_at(&self, x: i32, y: i32) -> f32 {
        self.pheromone.get(x, y)
    }

    pub fn hp_at(&self, x: i32, y: i32) -> f32 {
        self.hp.get(x, y)
    }

    pub fn is_frontier(&self, x: i32, y: i32) -> bool {
        self.slot(x, y).is_some()
    }

    pub fn frontier(&self) -> &[GridPos] {
        &self.frontier_list
    }

    pub fn pending_updates(&self) -> usize {
        self.update_queue.len()
    }

    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    fn slot(&self, x: i32, y: i32) -> Option<usize> {
        if !self.in_bounds(x, y) {
            return None;
        }
        let slot = self.frontier_slot[y as usize][x as usize];
        (slot != NO_SLOT).then_some(slot as usize)
    }

    fn cell_center(&self, pos: GridPos) -> Vec2 {
        Vec2::new(
            (pos.x as f32 + 0.5) * self.cell_size,
            (pos.y as f32 + 0.5) * self.cell_size,
        )
    }

    fn world_to_cell(&self, pos: Vec2) -> GridPos {
        GridPos::new(
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
        )
    }

    fn depth_norm(&self, y: i32) -> f32 {
        let depth = (y - self.region_split as i32).max(0) as f32;
        depth / (self.height as f32 - self.region_split as f32).max(1.0)
    }
}

/// Normalizes a direction, falling back (and warning once per engine) when it
/// is degenerate.
fn unit_or(warned: &mut bool, v: Vec2, fallback: Vec2, context: &'static str) -> Vec2 {
    let len = v.length();
    if v.is_finite() && len > 1e-6 {
        return v / len;
    }
    if !*warned {
        *warned = true;
        tracing::warn!(context, x = v.x, y = v.y, "degenerate dig heading");
    }
    fallback
}

fn tile_point(pos: GridPos) -> Vec2 {
    Vec2::new(pos.x as f32 + 0.5, pos.y as f32 + 0.5)
}


#[cfg(test)]
mod tests {
    use super::test_support::seeded_world;
    use super::*;

    #[test]
    fn tile_hp_is_pure_and_floored() {
        let grid = seeded_world(30, 40, 5, GridPos::new(15, 10));
        let engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
        for y in 5..39 {
            for x in 1..29 {
                let a = engine.compute_tile_hp(&grid, x, y);
                assert_eq!(a, engine.compute_tile_hp(&grid, x, y));
                if grid.get(x, y) == TileKind::Soil {
                    assert!(a >= 1.0);
                    assert!(a <= 3.5 + 1.0 + 0.1 + 1e-4);
                }
            }
        }
        assert_eq!(engine.compute_tile_hp(&grid, 15, 10), 0.0);
        assert_eq!(engine.compute_tile_hp(&grid, 0, 10), 0.0);
    }

    #[test]
    fn deeper_soil_is_harder_on_average() {
        let grid = TileGrid::new(60, 80, 10, 12.0);
        let engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
        let row_mean = |y: i32| {
            (1..59).map(|x| engine.compute_tile_hp(&grid, x, y)).sum::<f32>() / 58.0
        };
        assert!(row_mean(75) > row_mean(11));
    }

    #[test]
    fn reset_builds_frontier_around_open_tiles() {
        let grid = seeded_world(20, 20, 4, GridPos::new(10, 10));
        let mut engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
        engine.reset(&grid);
        assert_eq!(engine.frontier().len(), 4);
        for n in GridPos::new(10, 10).neighbors4() {
            assert!(engine.is_frontier(n.x, n.y));
            assert!(engine.pheromone_at(n.x, n.y) >= 0.9);
        }
    }

    #[test]
    fn heading_vector_requires_strength() {
        let mut state = DigState::default();
        assert!(state.heading_vector().is_none());
        state.heading_strength = 0.5;
        state.heading_angle = std::f32::consts::FRAC_PI_2;
        let v = state.heading_vector().expect("heading");
        assert!(v.y > 0.99);
    }
}

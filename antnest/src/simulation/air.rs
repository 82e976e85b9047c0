use shared::GridPos;

use super::field::ScalarField;
use super::map::TileGrid;
use crate::config::AirSettings;

/// Breathability per tile, flooded from the surface through open tiles.
///
/// Propagation is a plain work stack (no priority): a tile is only pushed when
/// it would be raised, so stale entries are cheap and the level field converges
/// over a few ticks of bounded work.
#[derive(Clone, Debug)]
pub struct AirField {
    settings: AirSettings,
    levels: ScalarField,
    queue: Vec<(GridPos, f32)>,
    updates_since_seed: u32,
    enqueued_while_empty: bool,
}

impl AirField {
    pub fn new(width: usize, height: usize, settings: AirSettings) -> Self {
        Self {
            settings,
            levels: ScalarField::new(width, height),
            queue: Vec::new(),
            updates_since_seed: 0,
            enqueued_while_empty: false,
        }
    }

    pub fn levels(&self) -> &ScalarField {
        &self.levels
    }

    pub fn level(&self, x: i32, y: i32) -> f32 {
        self.levels.get(x, y)
    }

    fn breathable(grid: &TileGrid, x: i32, y: i32) -> bool {
        !grid.get(x, y).is_solid()
    }

    fn enqueue(&mut self, pos: GridPos, level: f32) {
        if level < self.settings.min_level || !self.levels.in_bounds(pos.x, pos.y) {
            return;
        }
        if level <= self.levels.get(pos.x, pos.y) + 0.001 {
            return;
        }
        if self.queue.is_empty() {
            self.enqueued_while_empty = true;
        }
        self.queue.push((pos, level));
    }

    fn seed_surface(&mut self, grid: &TileGrid) {
        let last_row = grid.region_split.min(grid.height.saturating_sub(1)) as i32;
        for y in 1..=last_row {
            for x in 0..grid.width as i32 {
                if Self::breathable(grid, x, y) {
                    self.enqueue(GridPos::new(x, y), 1.0);
                }
            }
        }
        self.updates_since_seed = 0;
    }

    /// Clears all levels and floods from the surface until the queue drains.
    pub fn reset(&mut self, grid: &TileGrid) {
        self.levels.fill(0.0);
        self.queue.clear();
        self.seed_surface(grid);
        while !self.queue.is_empty() {
            self.propagate(grid, usize::MAX);
        }
        self.enqueued_while_empty = false;
    }

    /// A tile just became open: give it air from its best neighbour (or full air
    /// above the split) and let it spread from there.
    pub fn notify_tile_opened(&mut self, grid: &TileGrid, pos: GridPos) {
        if !Self::breathable(grid, pos.x, pos.y) {
            return;
        }
        let level = if !grid.is_underground(pos.y) {
            1.0
        } else {
            let best = pos
                .neighbors4()
                .iter()
                .filter(|n| Self::breathable(grid, n.x, n.y))
                .map(|n| self.levels.get(n.x, n.y))
                .fold(0.0, f32::max);
            if best <= 0.0 {
                return;
            }
            (best * self.settings.step_falloff + self.settings.neighbor_bonus).min(1.0)
        };
        self.enqueue(pos, level);
    }

    /// One bounded propagation step. Reseeds from the surface when idle or
    /// every `reseed_interval` calls.
    pub fn update(&mut self, grid: &TileGrid) {
        self.updates_since_seed += 1;
        if self.queue.is_empty()
            || self.enqueued_while_empty
            || self.updates_since_seed >= self.settings.reseed_interval
        {
            self.seed_surface(grid);
            self.enqueued_while_empty = false;
        }
        self.propagate(grid, self.settings.propagation_budget);
    }

    fn propagate(&mut self, grid: &TileGrid, budget: usize) {
        let mut processed = 0;
        while processed < budget {
            let Some((pos, level)) = self.queue.pop() else {
                break;
            };
            processed += 1;
            if !Self::breathable(grid, pos.x, pos.y) || level <= self.levels.get(pos.x, pos.y) {
                continue;
            }
            self.levels.set(pos.x, pos.y, level);
            let next = level * self.settings.step_falloff;
            for n in pos.neighbors4() {
                if Self::breathable(grid, n.x, n.y) {
                    self.enqueue(n, next);
                }
            }
        }
    }
}

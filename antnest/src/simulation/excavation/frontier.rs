use rand::Rng;
use shared::{GridPos, TileKind};

use super::{ExcavationEngine, NO_SLOT};
use crate::simulation::map::TileGrid;

impl ExcavationEngine {
    /// Underground, off the border, soil, and touching open space.
    pub fn is_frontier_cell(&self, grid: &TileGrid, x: i32, y: i32) -> bool {
        if !grid.is_underground(y) || grid.is_border(x, y) {
            return false;
        }
        grid.get(x, y) == TileKind::Soil && grid.open_neighbors4(x, y) > 0
    }

    /// Adds an eligible tile to the frontier and seeds its pheromone.
    pub(super) fn add_frontier(&mut self, grid: &TileGrid, x: i32, y: i32) {
        if self.slot(x, y).is_some() || !self.is_frontier_cell(grid, x, y) {
            return;
        }
        self.frontier_slot[y as usize][x as usize] = self.frontier_list.len() as u32;
        self.frontier_list.push(GridPos::new(x, y));
        self.pheromone.raise_to(x, y, self.settings.pheromone_deposit);
    }

    /// Drops a tile from the frontier and zeroes its pheromone.
    pub(super) fn clear_frontier(&mut self, x: i32, y: i32) {
        let Some(slot) = self.slot(x, y) else {
            return;
        };
        self.pheromone.set(x, y, 0.0);
        self.frontier_slot[y as usize][x as usize] = NO_SLOT;
        self.frontier_list.swap_remove(slot);
        if let Some(moved) = self.frontier_list.get(slot).copied() {
            self.frontier_slot[moved.y as usize][moved.x as usize] = slot as u32;
        }
    }

    fn refresh_frontier_at(&mut self, grid: &TileGrid, x: i32, y: i32) {
        if self.is_frontier_cell(grid, x, y) {
            self.add_frontier(grid, x, y);
        } else {
            self.clear_frontier(x, y);
        }
    }

    pub(super) fn rebuild_frontier(&mut self, grid: &TileGrid) {
        for row in &mut self.frontier_slot {
            row.fill(NO_SLOT);
        }
        self.frontier_list.clear();
        for y in self.region_split as i32..self.height as i32 {
            for x in 0..self.width as i32 {
                self.add_frontier(grid, x, y);
            }
        }
    }

    fn enqueue_update(&mut self, x: i32, y: i32) {
        if !self.in_bounds(x, y) || (y as usize) < self.region_split {
            return;
        }
        let queued = &mut self.queued[y as usize][x as usize];
        if !*queued {
            *queued = true;
            self.update_queue.push(GridPos::new(x, y));
        }
    }

    /// Schedules a frontier re-check of the square of half-size `radius` around a tile.
    pub fn notify_tile_changed(&mut self, cx: i32, cy: i32, radius: i32) {
        for y in cy - radius..=cy + radius {
            for x in cx - radius..=cx + radius {
                self.enqueue_update(x, y);
            }
        }
    }

    /// Drains up to `frontier_queue_budget` queued re-checks, then decays
    /// `decay_rows_per_tick` underground rows of pheromone.
    pub fn update_frontier_tiles(&mut self, grid: &TileGrid) {
        let mut budget = self.settings.frontier_queue_budget;
        while budget > 0 {
            let Some(pos) = self.update_queue.pop() else {
                break;
            };
            self.queued[pos.y as usize][pos.x as usize] = false;
            self.refresh_frontier_at(grid, pos.x, pos.y);
            budget -= 1;
        }
        self.decay_pheromone();
    }

    fn decay_pheromone(&mut self) {
        self.decay_cursor = self.pheromone.decay_rows(
            self.decay_cursor,
            self.settings.decay_rows_per_tick,
            self.region_split,
            self.settings.decay,
            self.settings.min_strength,
        );
    }

    /// Frontier soil in the clamped square of half-size `radius` around `center`.
    pub fn collect_frontier_candidates(
        &self,
        grid: &TileGrid,
        center: GridPos,
        radius: i32,
    ) -> Vec<GridPos> {
        let min_x = (center.x - radius).max(1);
        let max_x = (center.x + radius).min(self.width as i32 - 2);
        let min_y = (center.y - radius).max(self.region_split as i32);
        let max_y = (center.y + radius).min(self.height as i32 - 2);
        let mut out = Vec::new();
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                if self.is_frontier(x, y) && grid.get(x, y) == TileKind::Soil {
                    out.push(GridPos::new(x, y));
                }
            }
        }
        out
    }

    /// Uniform samples (with replacement) from the whole frontier.
    pub(super) fn sample_frontier(&self, count: usize, rng: &mut impl Rng) -> Vec<GridPos> {
        if self.frontier_list.is_empty() {
            return Vec::new();
        }
        let n = count.min(self.frontier_list.len());
        (0..n)
            .map(|_| self.frontier_list[rng.random_range(0..self.frontier_list.len())])
            .collect()
    }
}

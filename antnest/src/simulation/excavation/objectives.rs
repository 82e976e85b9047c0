use std::collections::VecDeque;

use shared::{GridPos, TileKind};

use super::ExcavationEngine;
use crate::simulation::field::ScalarField;
use crate::simulation::map::TileGrid;

const MAX_REACH_CHECKS: usize = 6000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveStatus {
    Pending,
    Ready,
}

/// The queen's chamber. While pending, diggers are steered toward it first.
#[derive(Debug, Clone, PartialEq)]
pub struct ChamberObjective {
    pub center: GridPos,
    pub radius: f32,
    pub min_tiles: usize,
    pub status: ObjectiveStatus,
}

impl ChamberObjective {
    pub fn new(center: GridPos, radius: f32, min_tiles: usize) -> Self {
        Self {
            center,
            radius,
            min_tiles,
            status: ObjectiveStatus::Pending,
        }
    }

    /// Marks the chamber ready once enough tunnel lies inside its radius.
    pub fn refresh(&mut self, grid: &TileGrid) -> ObjectiveStatus {
        if self.status == ObjectiveStatus::Pending
            && grid.count_tunnels_within(self.center, self.radius) >= self.min_tiles
        {
            self.status = ObjectiveStatus::Ready;
        }
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == ObjectiveStatus::Pending
    }
}

/// Breadth-first walk over open tiles from `start`, returning the first one within
/// `radius` of `center`. Gives up after a fixed number of visited nodes.
pub(super) fn find_reachable_tunnel_near(
    grid: &TileGrid,
    center: GridPos,
    radius: f32,
    start: GridPos,
) -> Option<GridPos> {
    let width = grid.width as i32;
    let height = grid.height as i32;
    let split = grid.region_split as i32;
    let limit = (grid.width * grid.height).min(MAX_REACH_CHECKS);
    let reach_sq = (radius + 0.5) * (radius + 0.5);

    let mut visited = vec![false; grid.width * grid.height];
    let mut queue = VecDeque::new();
    if !grid.in_bounds(start.x, start.y) {
        return None;
    }
    visited[(start.y * width + start.x) as usize] = true;
    queue.push_back(start);

    let mut checks = 0;
    while let Some(node) = queue.pop_front() {
        if checks >= limit {
            break;
        }
        checks += 1;
        let (dx, dy) = ((node.x - center.x) as f32, (node.y - center.y) as f32);
        if dx * dx + dy * dy <= reach_sq && grid.at(node).is_open() {
            return Some(node);
        }
        for n in node.neighbors4() {
            if n.x <= 0 || n.x >= width - 1 || n.y <= split || n.y >= height - 1 {
                continue;
            }
            if !grid.at(n).is_open() {
                continue;
            }
            let key = (n.y * width + n.x) as usize;
            if !visited[key] {
                visited[key] = true;
                queue.push_back(n);
            }
        }
    }
    None
}

impl ExcavationEngine {
    /// Walks greedily from `start` toward `center` through open tiles and returns
    /// the first frontier soil tile the walk runs into.
    pub(super) fn find_corridor_frontier_target(
        &self,
        grid: &TileGrid,
        start: GridPos,
        center: GridPos,
    ) -> Option<GridPos> {
        let width = grid.width as i32;
        let height = grid.height as i32;
        let split = grid.region_split as i32;
        let inside = |p: GridPos| p.x > 0 && p.x < width - 1 && p.y > split && p.y < height - 1;

        let max_steps = 40.max(start.manhattan(center));
        let mut cur = start;
        for _ in 0..max_steps {
            if cur == center {
                break;
            }
            let dx = (center.x - cur.x).signum();
            let dy = match (center.y - cur.y).signum() {
                0 => 1,
                s => s,
            };
            let prioritize_y = (center.y - cur.y).abs() >= (center.x - cur.x).abs();
            let steps = if prioritize_y {
                [(0, dy), (dx, 0)]
            } else {
                [(dx, 0), (0, dy)]
            };

            let mut advanced = false;
            for (ox, oy) in steps {
                let next = cur.offset(ox, oy);
                if !inside(next) || next == cur {
                    continue;
                }
                let tile = grid.at(next);
                if tile == TileKind::Bedrock {
                    continue;
                }
                if tile.is_open() {
                    cur = next;
                    advanced = true;
                    break;
                }
                if tile == TileKind::Soil
                    && (self.is_frontier(next.x, next.y) || self.is_frontier_cell(grid, next.x, next.y))
                {
                    return Some(next);
                }
            }

            if !advanced {
                return cur
                    .neighbors4()
                    .into_iter()
                    .filter(|n| inside(*n) && self.is_frontier(n.x, n.y) && grid.at(*n) == TileKind::Soil)
                    .max_by(|a, b| {
                        let score = |p: &GridPos| {
                            (center.y - p.y) as f32 * 1.2 - (center.x - p.x).abs() as f32
                        };
                        score(a).total_cmp(&score(b))
                    });
            }
        }
        None
    }

    /// Best frontier tile in the ring around the queen for a new nursery room.
    pub(super) fn find_nursery_frontier(
        &self,
        grid: &TileGrid,
        center: GridPos,
        band: (f32, f32),
        waste: Option<&ScalarField>,
    ) -> Option<GridPos> {
        let (inner, outer) = band;
        let search = ((outer + 6.0).ceil() as i32).max(self.settings.sample_radius);
        let target_radius = outer + 1.5;
        let min_radius = (inner - 1.0).max(1.0);
        let max_radius = outer + 4.0;

        let mut best: Option<(GridPos, f32)> = None;
        for tile in self.collect_frontier_candidates(grid, center, search) {
            let dist = tile.distance(center);
            if dist < min_radius || dist > max_radius {
                continue;
            }
            let neighbor_bonus = match grid.open_neighbors4(tile.x, tile.y) {
                1 => 0.8,
                2 => 0.45,
                _ => -0.5,
            };
            let entrance_penalty = 0.4 / tile.distance(grid.entrance).max(1.0);
            let waste_here = waste.map_or(0.0, |w| w.get(tile.x, tile.y));
            let depth_bonus = self.depth_norm(tile.y) * 0.3;
            let score = -(dist - target_radius).abs() * 0.9 + neighbor_bonus
                - entrance_penalty
                - waste_here * 0.35
                + depth_bonus;
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((tile, score));
            }
        }
        best.map(|(tile, _)| tile)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::seeded_world;
    use super::*;
    use crate::config::DigSettings;

    #[test]
    fn chamber_becomes_ready_when_dug_out() {
        let mut grid = seeded_world(30, 30, 4, GridPos::new(15, 15));
        let mut chamber = ChamberObjective::new(GridPos::new(15, 15), 1.5, 5);
        assert_eq!(chamber.refresh(&grid), ObjectiveStatus::Pending);
        for n in GridPos::new(15, 15).neighbors4() {
            grid.set(n.x, n.y, TileKind::Tunnel);
        }
        assert_eq!(chamber.refresh(&grid), ObjectiveStatus::Ready);
    }

    #[test]
    fn reachable_tunnel_follows_open_tiles_only() {
        let mut grid = seeded_world(30, 30, 4, GridPos::new(5, 10));
        for x in 6..=12 {
            grid.set(x, 10, TileKind::Tunnel);
        }
        let found = find_reachable_tunnel_near(&grid, GridPos::new(14, 10), 2.0, GridPos::new(5, 10));
        assert_eq!(found, Some(GridPos::new(12, 10)));
        // Isolated tunnel near the centre is not reachable.
        let found = find_reachable_tunnel_near(&grid, GridPos::new(20, 20), 1.0, GridPos::new(5, 10));
        assert_eq!(found, None);
    }

    #[test]
    fn corridor_walk_stops_at_first_soil_on_the_way() {
        let mut grid = seeded_world(30, 40, 4, GridPos::new(10, 8));
        for y in 9..=12 {
            grid.set(10, y, TileKind::Tunnel);
        }
        let mut engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
        engine.reset(&grid);
        let target = engine.find_corridor_frontier_target(&grid, GridPos::new(10, 8), GridPos::new(10, 25));
        assert_eq!(target, Some(GridPos::new(10, 13)));
    }

    #[test]
    fn nursery_pick_lies_in_the_ring() {
        let mut grid = seeded_world(40, 40, 4, GridPos::new(20, 20));
        for x in 14..=26 {
            grid.set(x, 20, TileKind::Tunnel);
        }
        let mut engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
        engine.reset(&grid);
        let pick = engine
            .find_nursery_frontier(&grid, GridPos::new(20, 20), (3.0, 6.0), None)
            .expect("ring tile");
        let d = pick.distance(GridPos::new(20, 20));
        assert!((2.0..=10.0).contains(&d), "distance {}", d);
        assert!(engine.is_frontier(pick.x, pick.y));
    }
}

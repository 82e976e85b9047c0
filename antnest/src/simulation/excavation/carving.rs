use std::f32::consts::PI;

use glam::Vec2;
use rand::Rng;
use shared::{GridPos, TileKind, fast_sin_cos};
use tracing::debug;

use super::{DigMode, DigState, DigTarget, Digger, ExcavationContext, ExcavationEngine};
use crate::simulation::map::TileGrid;

#[inline(always)]
fn round_half_up(v: f32) -> i32 {
    (v + 0.5).floor() as i32
}

/// Whether opening `pos` would leave a 2x2 window connected only diagonally.
pub fn forms_checkerboard(grid: &TileGrid, pos: GridPos) -> bool {
    let (w, h) = (grid.width as i32, grid.height as i32);
    let open = |x: i32, y: i32| (x == pos.x && y == pos.y) || grid.get(x, y).is_open();
    for oy in -1..=0 {
        for ox in -1..=0 {
            let (x0, y0) = (pos.x + ox, pos.y + oy);
            if x0 < 0 || y0 < 0 || x0 >= w - 1 || y0 >= h - 1 {
                continue;
            }
            let a = open(x0, y0);
            let b = open(x0 + 1, y0);
            let c = open(x0, y0 + 1);
            let d = open(x0 + 1, y0 + 1);
            if (a && d && !b && !c) || (b && c && !a && !d) {
                return true;
            }
        }
    }
    false
}

impl ExcavationEngine {
    /// Shape rules for opening `pos`: it must touch open space, a corridor may
    /// only widen where branching was granted for this exact tile, and no
    /// diagonal-only connection may appear.
    pub fn can_carve_here(&self, grid: &TileGrid, state: &DigState, pos: GridPos) -> bool {
        let allow_branching = state
            .target
            .is_some_and(|t| t.pos == pos && t.allow_branching);
        let neighbors = grid.open_neighbors4(pos.x, pos.y);
        if neighbors == 0 {
            return false;
        }
        if state.mode == DigMode::Corridor && neighbors >= 2 && !allow_branching {
            return false;
        }
        !forms_checkerboard(grid, pos)
    }

    /// One dig hit on `(x, y)`.
    ///
    /// Returns `false` when the hit is refused (tile is not soil, the shape
    /// rules fail, or the neighbourhood is too open for the current space
    /// pressure). Returns `true` when the hit landed, whether or not the tile
    /// was carved by it.
    pub fn apply_dig_action(
        &mut self,
        agent: &mut Digger,
        ctx: &mut ExcavationContext,
        x: i32,
        y: i32,
        rng: &mut impl Rng,
    ) -> bool {
        let pos = GridPos::new(x, y);
        if ctx.grid.get(x, y) != TileKind::Soil {
            return false;
        }
        let state = &mut *agent.state;
        if !self.can_carve_here(ctx.grid, state, pos) {
            return false;
        }
        if ctx.pressure.space_pressure <= self.settings.crowding_pressure_gate
            && ctx.grid.open_neighbors8(x, y) > self.settings.max_open_neighbors
        {
            return false;
        }

        let hp = self.hp.get(x, y) - self.settings.dig_damage;
        self.hp.set(x, y, hp);
        if hp > 0.0 {
            self.pheromone.raise_to(x, y, self.settings.neighbor_deposit);
            return true;
        }

        if !self.can_carve_here(ctx.grid, state, pos) {
            let restored = self.compute_tile_hp(ctx.grid, x, y);
            self.hp.set(x, y, restored);
            return false;
        }
        if !ctx.grid.set(x, y, TileKind::Tunnel) {
            return false;
        }
        self.hp.set(x, y, 0.0);
        self.clear_frontier(x, y);
        self.pheromone.set(x, y, 0.0);

        let target = state.target;
        state.idle_time = 0.0;
        if state.mode == DigMode::Room {
            state.room_dug += 1;
            if state.room_dig_budget > 0 {
                state.room_dig_budget -= 1;
            }
            let radius = if state.room_radius > 0.0 {
                state.room_radius
            } else {
                2.5
            };
            let tile_cap = 4.max((PI * radius * radius).round() as i32);
            if state.room_dig_budget <= 0 || state.room_dug >= tile_cap {
                debug!(x, y, dug = state.room_dug, "room finished");
                state.leave_room(self.settings.room_cooldown);
            }
        }

        let to_tile = self.cell_center(pos) - agent.pos;
        if to_tile.length() > 0.0 {
            state.pending_vector = Some(to_tile.normalize());
        }
        self.update_heading(state, pos);

        for n in pos.neighbors4() {
            if ctx.grid.at(n) == TileKind::Soil {
                self.pheromone.raise_to(n.x, n.y, self.settings.neighbor_deposit);
            }
        }
        let dir = self.deposit_direction(state, target, pos);
        self.deposit_directional(ctx.grid, pos, dir);
        for n in pos.neighbors4() {
            self.add_frontier(ctx.grid, n.x, n.y);
        }
        self.notify_tile_changed(x, y, 2);

        ctx.hooks.on_tunnel_dug(pos);
        ctx.hooks.spawn_dig_particles(pos);

        if let Some(t) = target.filter(|t| t.pos == pos) {
            if let (Some(id), Some(planner)) = (t.workface, ctx.planner.as_deref_mut()) {
                planner.notify_tunnel_dug(pos, id, ctx.grid, rng);
            }
        }

        state.target = None;
        debug!(x, y, "tunnel carved");
        true
    }

    fn update_heading(&self, state: &mut DigState, pos: GridPos) {
        let gain = self.settings.heading_gain;
        match state.last_dug.replace(pos) {
            Some(prev) if prev != pos => {
                let (hx, hy) = ((pos.x - prev.x) as f32, (pos.y - prev.y) as f32);
                state.heading_angle = hy.atan2(hx);
                state.heading_strength = (state.heading_strength * 0.6 + gain).min(1.0);
            }
            Some(_) => {}
            None => {
                if let Some(v) = state.pending_vector {
                    state.heading_angle = v.y.atan2(v.x);
                    state.heading_strength = (state.heading_strength + gain * 0.6).min(1.0);
                }
            }
        }
    }

    fn deposit_direction(&self, state: &DigState, target: Option<DigTarget>, pos: GridPos) -> Vec2 {
        if state.heading_strength > 0.0 && state.heading_angle.is_finite() {
            let (sin, cos) = fast_sin_cos(state.heading_angle);
            return Vec2::new(cos, sin);
        }
        if let Some(v) = state.pending_vector {
            return v;
        }
        if let Some(t) = target {
            let from = state.last_dug.unwrap_or(pos);
            let d = Vec2::new((t.pos.x - from.x) as f32, (t.pos.y - from.y) as f32);
            if d.length() > 0.0 {
                return d.normalize();
            }
        }
        Vec2::Y
    }

    /// Lays a cone of pheromone ahead of a fresh carve, a little to each side
    /// of the first two steps and a trace behind. The carved tile keeps a
    /// faint mark of its own.
    fn deposit_directional(&mut self, grid: &TileGrid, origin: GridPos, dir: Vec2) {
        self.pheromone
            .raise_to(origin.x, origin.y, self.settings.neighbor_deposit * 0.75);
        let n = if dir.length() > 1e-6 {
            dir.normalize()
        } else {
            Vec2::Y
        };
        let side = Vec2::new(-n.y, n.x);
        let steps = self.settings.directional_pheromone_length.max(1);
        let side_falloff = self.settings.directional_side_falloff;
        let o = Vec2::new(origin.x as f32, origin.y as f32);

        let mut visited: Vec<GridPos> = Vec::with_capacity(steps as usize * 3 + 1);
        for i in 1..=steps {
            let f = o + n * i as f32;
            let weight = (1.0 - (i - 1) as f32 / steps as f32).max(0.2);
            self.deposit_at(grid, &mut visited, f, weight);
            if i <= 2 {
                let fx = round_half_up(f.x) as f32;
                let fy = round_half_up(f.y) as f32;
                let ahead = Vec2::new(fx, fy);
                self.deposit_at(grid, &mut visited, ahead + side, weight * side_falloff);
                self.deposit_at(grid, &mut visited, ahead - side, weight * side_falloff);
            }
        }
        let back = self.settings.directional_back_strength;
        self.deposit_at(grid, &mut visited, o - n, back);
    }

    fn deposit_at(&mut self, grid: &TileGrid, visited: &mut Vec<GridPos>, at: Vec2, weight: f32) {
        let tile = GridPos::new(round_half_up(at.x), round_half_up(at.y));
        if grid.at(tile) != TileKind::Soil || !self.is_frontier_cell(grid, tile.x, tile.y) {
            return;
        }
        if visited.contains(&tile) {
            return;
        }
        visited.push(tile);
        let amount = self.settings.directional_pheromone_strength * weight;
        self.pheromone.raise_to(tile.x, tile.y, amount);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{Recorder, seeded_world};
    use super::super::{DigTarget, ExcavationCollaborators};
    use super::*;
    use crate::config::{DigSettings, PlannerSettings};
    use crate::simulation::planner::ExcavationPlanner;
    use crate::simulation::pressure::PressureSnapshot;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn context<'a>(
        grid: &'a mut TileGrid,
        pressure: &'a PressureSnapshot,
        hooks: &'a mut dyn ExcavationCollaborators,
    ) -> ExcavationContext<'a> {
        ExcavationContext {
            grid,
            air: None,
            waste: None,
            pressure,
            planner: None,
            hooks,
            queen_pos: None,
            chamber: None,
            nursery_band: (3.0, 6.0),
        }
    }

    /// Hits `pos` until it is carved or a hit is refused.
    fn dig_out(
        engine: &mut ExcavationEngine,
        state: &mut DigState,
        ctx: &mut ExcavationContext,
        pos: GridPos,
        rng: &mut StdRng,
    ) -> bool {
        for _ in 0..16 {
            let mut digger = Digger {
                pos: Vec2::new(pos.x as f32 * 12.0, (pos.y - 1) as f32 * 12.0),
                carrying: false,
                is_digger: true,
                state: &mut *state,
            };
            if !engine.apply_dig_action(&mut digger, ctx, pos.x, pos.y, rng) {
                return false;
            }
            if ctx.grid.at(pos) == TileKind::Tunnel {
                return true;
            }
        }
        false
    }

    #[test]
    fn diagonal_only_connection_is_a_checkerboard() {
        let grid = seeded_world(12, 12, 2, GridPos::new(4, 4));
        assert!(forms_checkerboard(&grid, GridPos::new(5, 5)));
        assert!(forms_checkerboard(&grid, GridPos::new(3, 3)));
        assert!(!forms_checkerboard(&grid, GridPos::new(5, 4)));
        assert!(!forms_checkerboard(&grid, GridPos::new(4, 5)));
    }

    #[test]
    fn hits_wear_down_hp_before_carving() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut grid = seeded_world(20, 20, 4, GridPos::new(10, 10));
        let mut engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
        engine.reset(&grid);
        let target = GridPos::new(10, 11);
        let hp = engine.hp_at(target.x, target.y);
        let pressure = PressureSnapshot::default();
        let mut hooks = Recorder::default();
        let mut ctx = context(&mut grid, &pressure, &mut hooks);
        let mut state = DigState::default();

        let mut hits = 0;
        while ctx.grid.at(target) == TileKind::Soil {
            let mut digger = Digger {
                pos: Vec2::new(120.0, 125.0),
                carrying: false,
                is_digger: true,
                state: &mut state,
            };
            assert!(engine.apply_dig_action(&mut digger, &mut ctx, target.x, target.y, &mut rng));
            hits += 1;
            assert!(hits < 10, "tile never carved");
        }
        assert_eq!(hits, hp.ceil() as i32);
        assert_eq!(engine.hp_at(target.x, target.y), 0.0);
        assert_eq!(hooks.dug, vec![target]);
        assert_eq!(hooks.particles, 1);
    }

    #[test]
    fn carving_moves_the_frontier() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut grid = seeded_world(20, 20, 4, GridPos::new(10, 10));
        let mut engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
        engine.reset(&grid);
        let pressure = PressureSnapshot::default();
        let mut hooks = Recorder::default();
        let mut ctx = context(&mut grid, &pressure, &mut hooks);
        let mut state = DigState::default();
        let carved = GridPos::new(11, 10);
        assert!(dig_out(&mut engine, &mut state, &mut ctx, carved, &mut rng));

        assert!(!engine.is_frontier(carved.x, carved.y));
        let mark = DigSettings::default().neighbor_deposit * 0.75;
        assert!((engine.pheromone_at(carved.x, carved.y) - mark).abs() < 1e-6);
        for n in carved.neighbors4() {
            if ctx.grid.at(n) == TileKind::Soil {
                assert!(engine.is_frontier(n.x, n.y), "{:?} missing from frontier", n);
                assert!(engine.pheromone_at(n.x, n.y) >= 0.9);
            }
        }
        assert_eq!(state.last_dug, Some(carved));
        assert!(state.target.is_none());
    }

    #[test]
    fn corridor_refuses_unauthorized_widening() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut grid = seeded_world(20, 20, 4, GridPos::new(10, 10));
        grid.set(11, 10, TileKind::Tunnel);
        grid.set(11, 11, TileKind::Tunnel);
        let mut engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
        engine.reset(&grid);
        let pressure = PressureSnapshot::default();
        let mut hooks = Recorder::default();
        let mut ctx = context(&mut grid, &pressure, &mut hooks);
        // (10, 11) touches both (10, 10) and (11, 11).
        let pos = GridPos::new(10, 11);
        let mut state = DigState::default();
        assert!(!dig_out(&mut engine, &mut state, &mut ctx, pos, &mut rng));
        assert_eq!(ctx.grid.at(pos), TileKind::Soil);

        state.target = Some(DigTarget {
            pos,
            mode: DigMode::Corridor,
            allow_branching: true,
            workface: None,
        });
        assert!(dig_out(&mut engine, &mut state, &mut ctx, pos, &mut rng));
    }

    #[test]
    fn crowded_neighbourhood_is_gated_by_space_pressure() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut grid = seeded_world(20, 20, 2, GridPos::new(4, 5));
        for (x, y) in [(4, 4), (5, 4), (6, 4)] {
            grid.set(x, y, TileKind::Tunnel);
        }
        let mut engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
        engine.reset(&grid);
        let mut state = DigState::default();
        state.enter_room(GridPos::new(5, 5), 3.0, 10);
        let pos = GridPos::new(5, 5);

        let calm = PressureSnapshot {
            space_pressure: 0.5,
            ..PressureSnapshot::default()
        };
        let mut hooks = Recorder::default();
        let mut ctx = context(&mut grid, &calm, &mut hooks);
        assert!(!dig_out(&mut engine, &mut state, &mut ctx, pos, &mut rng));

        let at_gate = PressureSnapshot {
            space_pressure: 0.9,
            ..PressureSnapshot::default()
        };
        let mut ctx = context(&mut grid, &at_gate, &mut hooks);
        assert!(!dig_out(&mut engine, &mut state, &mut ctx, pos, &mut rng));
        assert_eq!(ctx.grid.at(pos), TileKind::Soil);

        let crowded = PressureSnapshot {
            space_pressure: 0.95,
            ..PressureSnapshot::default()
        };
        let mut ctx = context(&mut grid, &crowded, &mut hooks);
        assert!(dig_out(&mut engine, &mut state, &mut ctx, pos, &mut rng));
    }

    #[test]
    fn diagonal_only_carve_is_refused_without_damage() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut grid = seeded_world(20, 20, 4, GridPos::new(10, 10));
        grid.set(9, 12, TileKind::Tunnel);
        let mut engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
        engine.reset(&grid);
        // (10, 11) hangs under the seed and would touch (9, 12) only by its corner.
        let pos = GridPos::new(10, 11);
        let hp = engine.hp_at(pos.x, pos.y);
        let pressure = PressureSnapshot {
            space_pressure: 1.0,
            ..PressureSnapshot::default()
        };
        let mut hooks = Recorder::default();
        let mut ctx = context(&mut grid, &pressure, &mut hooks);

        let mut state = DigState::default();
        assert!(!dig_out(&mut engine, &mut state, &mut ctx, pos, &mut rng));
        state.enter_room(pos, 3.0, 10);
        assert!(!dig_out(&mut engine, &mut state, &mut ctx, pos, &mut rng));

        assert_eq!(ctx.grid.at(pos), TileKind::Soil);
        assert_eq!(engine.hp_at(pos.x, pos.y), hp);
        drop(ctx);
        assert!(hooks.dug.is_empty());

        // The straight neighbour on the other side is fine.
        let mut ctx = context(&mut grid, &pressure, &mut hooks);
        assert!(dig_out(&mut engine, &mut state, &mut ctx, GridPos::new(11, 10), &mut rng));
    }

    #[test]
    fn room_mode_ends_within_budget() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut grid = seeded_world(30, 30, 4, GridPos::new(15, 15));
        let mut engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
        engine.reset(&grid);
        let pressure = PressureSnapshot {
            space_pressure: 1.0,
            ..PressureSnapshot::default()
        };
        let mut hooks = Recorder::default();
        let mut ctx = context(&mut grid, &pressure, &mut hooks);
        let mut state = DigState::default();
        state.enter_room(GridPos::new(15, 16), 2.0, 3);

        let mut carves = 0;
        for pos in [
            GridPos::new(15, 16),
            GridPos::new(16, 16),
            GridPos::new(16, 15),
            GridPos::new(14, 15),
        ] {
            if state.mode != DigMode::Room {
                break;
            }
            assert!(dig_out(&mut engine, &mut state, &mut ctx, pos, &mut rng));
            carves += 1;
        }
        assert_eq!(carves, 3);
        assert_eq!(state.mode, DigMode::Corridor);
        assert!(state.room_center.is_none());
        assert_eq!(state.room_cooldown, 6.0);
    }

    #[test]
    fn planner_targets_advance_their_workface() {
        let mut rng = StdRng::seed_from_u64(10);
        let mut grid = seeded_world(30, 40, 4, GridPos::new(15, 10));
        let mut engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
        engine.reset(&grid);
        let mut planner = ExcavationPlanner::new(PlannerSettings::default());
        planner.reset(&grid, &mut rng);
        let mut state = DigState::default();
        let planned = planner
            .request_dig_target(GridPos::new(15, 10), &mut state.assigned_workface, &grid, &mut rng)
            .expect("planned target");
        state.target = Some(DigTarget {
            pos: planned.pos,
            mode: DigMode::Corridor,
            allow_branching: false,
            workface: Some(planned.workface),
        });

        let pressure = PressureSnapshot::default();
        let mut hooks = Recorder::default();
        let mut ctx = context(&mut grid, &pressure, &mut hooks);
        ctx.planner = Some(&mut planner);
        assert!(dig_out(&mut engine, &mut state, &mut ctx, planned.pos, &mut rng));
        drop(ctx);
        let workface = planner.workface(planned.workface).expect("workface");
        assert_eq!(workface.tip, planned.pos);
        assert_eq!(workface.steps, 1);
    }

    #[test]
    fn directional_deposit_only_marks_frontier_soil() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut grid = seeded_world(30, 30, 4, GridPos::new(15, 10));
        let mut engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
        engine.reset(&grid);
        let pressure = PressureSnapshot::default();
        let mut hooks = Recorder::default();
        let mut ctx = context(&mut grid, &pressure, &mut hooks);
        let mut state = DigState::default();
        assert!(dig_out(&mut engine, &mut state, &mut ctx, GridPos::new(15, 11), &mut rng));
        for y in 0..30 {
            for x in 0..30 {
                if engine.pheromone_at(x, y) > 0.0 && ctx.grid.get(x, y) == TileKind::Soil {
                    assert!(
                        engine.is_frontier_cell(ctx.grid, x, y),
                        "pheromone on non-frontier tile ({}, {})",
                        x,
                        y
                    );
                }
            }
        }
    }
}

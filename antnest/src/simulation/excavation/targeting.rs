use std::f32::consts::PI;

use glam::Vec2;
use rand::Rng;
use shared::GridPos;
use tracing::debug;

use super::objectives::find_reachable_tunnel_near;
use super::{DigMode, DigTarget, Digger, ExcavationContext, ExcavationEngine, tile_point, unit_or};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueenPhase {
    /// Still digging the access corridor toward the chamber.
    Corridor,
    /// Open tunnel reaches the chamber; hollow it out.
    Chamber,
}

#[derive(Debug, Clone, Copy)]
struct QueenPlan {
    phase: QueenPhase,
    anchor: GridPos,
    center: GridPos,
    radius: f32,
}

#[derive(Debug, Clone, Copy)]
struct NurseryPlan {
    anchor: GridPos,
    center: GridPos,
}

impl ExcavationEngine {
    /// Picks the next tile for a digger, or `None` when it is not eligible or
    /// nothing qualifies.
    ///
    /// Priority objectives (an unfinished queen chamber, then nursery space)
    /// steer the search and may switch the agent into room mode. Without one,
    /// corridor diggers are routed through the planner first and fall back to
    /// scoring nearby frontier tiles.
    pub fn choose_dig_target(
        &mut self,
        agent: &mut Digger,
        ctx: &mut ExcavationContext,
        rng: &mut impl Rng,
    ) -> Option<DigTarget> {
        if agent.carrying || !agent.is_digger {
            return None;
        }
        if self.frontier_list.is_empty() {
            return None;
        }

        let s = self.settings.clone();
        let grid = &*ctx.grid;
        let split_y = self.region_split as f32 * self.cell_size;
        let origin = if agent.pos.y < split_y {
            self.cell_center(grid.dig_start)
        } else {
            agent.pos
        };
        let cell = self.world_to_cell(origin);
        let queen_world = ctx.queen_pos.unwrap_or(origin);

        let space = ctx.pressure.space_pressure;
        let waste = ctx.pressure.waste_pressure;
        let brood = ctx.pressure.brood_pressure;
        let nursery = ctx.pressure.nursery_pressure;

        let state = &mut *agent.state;
        if state.mode == DigMode::Room && (state.room_center.is_none() || state.room_dig_budget <= 0) {
            state.leave_room(0.0);
        }

        let favor_soft_soil = space < 0.5 && brood < 0.2;
        let mut heading_strength = state.heading_strength;
        let mut heading = state.heading_vector();

        let chamber_pending = ctx.chamber.is_some_and(|c| c.is_pending());
        let mut queen_plan = None;
        if let Some(chamber) = ctx.chamber.filter(|c| c.is_pending()) {
            let start = grid.entrance;
            let center = chamber.center;
            let corridor = self.find_corridor_frontier_target(grid, start, center);
            let tunnel = find_reachable_tunnel_near(grid, center, chamber.radius, start);
            let (phase, anchor) = match tunnel {
                Some(t) => (QueenPhase::Chamber, t),
                None => (QueenPhase::Corridor, corridor.unwrap_or(start)),
            };
            let dir = Vec2::new((center.x - anchor.x) as f32, (center.y - anchor.y) as f32);
            heading = Some(unit_or(
                &mut self.heading_warned,
                dir,
                heading.unwrap_or(Vec2::X),
                "queen-plan",
            ));
            heading_strength = heading_strength.max(match phase {
                QueenPhase::Corridor => 0.95,
                QueenPhase::Chamber => 0.65,
            });
            match phase {
                QueenPhase::Chamber => {
                    let quota = (chamber.min_tiles as i32).max((chamber.radius * chamber.radius).round() as i32);
                    state.mode = DigMode::Room;
                    state.room_center = Some(center);
                    state.room_radius = chamber.radius;
                    state.room_dig_budget = state.room_dig_budget.max(quota);
                }
                QueenPhase::Corridor => {
                    state.leave_room(0.0);
                    state.heading_angle = dir.y.atan2(dir.x);
                    state.heading_strength = heading_strength;
                }
            }
            queen_plan = Some(QueenPlan {
                phase,
                anchor,
                center,
                radius: chamber.radius,
            });
        }

        let nursery_ready = !chamber_pending;
        let mut nursery_plan = None;
        if queen_plan.is_none()
            && nursery_ready
            && nursery > s.nursery_pressure_dig_threshold
            && waste < 0.8
        {
            let center = ctx
                .queen_pos
                .map(|q| self.world_to_cell(q))
                .or_else(|| ctx.chamber.map(|c| c.center));
            let pick = center.and_then(|c| {
                self.find_nursery_frontier(grid, c, ctx.nursery_band, ctx.waste)
                    .map(|p| (p, c))
            });
            if let Some((anchor, center)) = pick {
                let radius = s.nursery_room_radius;
                let budget = 6.max((PI * radius * radius * 0.6).round() as i32);
                let budget = state.room_dig_budget.max(budget);
                state.enter_room(anchor, radius, budget);
                let dir = Vec2::new((anchor.x - cell.x) as f32, (anchor.y - cell.y) as f32);
                heading = Some(unit_or(
                    &mut self.heading_warned,
                    dir,
                    heading.unwrap_or(Vec2::X),
                    "nursery-plan",
                ));
                heading_strength = heading_strength.max(0.55);
                nursery_plan = Some(NurseryPlan { anchor, center });
            }
        }

        let has_priority = queen_plan.is_some() || nursery_plan.is_some() || chamber_pending;
        if space < s.min_space_pressure && !has_priority {
            return None;
        }

        if let Some(h) = heading {
            heading = Some(unit_or(&mut self.heading_warned, h, Vec2::X, "heading-normalize"));
        }

        let start_room = queen_plan.is_none()
            && nursery_plan.is_none()
            && state.mode != DigMode::Room
            && state.room_cooldown <= 0.0
            && state.idle_time >= s.room_mode_stuck_time
            && space >= s.room_mode_space_pressure
            && rng.random::<f32>() < space;
        if start_room {
            let anchor = state.last_dug.unwrap_or(cell);
            let radius = rng.random_range(s.room_radius_min..=s.room_radius_max);
            let (px, py) = match heading {
                Some(h) => (
                    ((h.x * 2.0).round() as i32).clamp(-1, 1),
                    ((h.y * 2.0).round() as i32).clamp(-1, 1),
                ),
                None => (rng.random_range(-1..=1), rng.random_range(-1..=1)),
            };
            let center = GridPos::new(
                (anchor.x + px).clamp(1, self.width as i32 - 2),
                (anchor.y + py).clamp(self.region_split as i32 + 1, self.height as i32 - 2),
            );
            let budget = 4.max((PI * radius * radius * 0.75).round() as i32);
            state.enter_room(center, radius, budget);
            state.idle_time = 0.0;
            debug!(x = center.x, y = center.y, radius, budget, "digger starts a room");
        }

        if state.mode == DigMode::Corridor && queen_plan.is_none() && nursery_plan.is_none() {
            if let Some(planner) = ctx.planner.as_deref_mut() {
                if let Some(planned) =
                    planner.request_dig_target(cell, &mut state.assigned_workface, grid, rng)
                {
                    return Some(DigTarget {
                        pos: planned.pos,
                        mode: DigMode::Corridor,
                        allow_branching: grid.open_neighbors4(planned.pos.x, planned.pos.y) >= 2,
                        workface: Some(planned.workface),
                    });
                }
            }
        }

        let mut radius = s.sample_radius;
        let mut candidates;
        if let Some(plan) = queen_plan {
            let base = match plan.phase {
                QueenPhase::Corridor => 7,
                QueenPhase::Chamber => 4.max((plan.radius * 0.6).round() as i32),
            };
            radius = base;
            candidates = self.collect_frontier_candidates(grid, plan.anchor, radius);
            while candidates.is_empty() && radius < base + 10 {
                radius += 3;
                candidates = self.collect_frontier_candidates(grid, plan.anchor, radius);
            }
            if plan.phase == QueenPhase::Chamber {
                let reach = (plan.radius + 1.0) * (plan.radius + 1.0);
                candidates.retain(|t| {
                    let (dx, dy) = ((t.x - plan.center.x) as f32, (t.y - plan.center.y) as f32);
                    dx * dx + dy * dy <= reach
                });
            }
        } else if let Some(plan) = nursery_plan {
            let (inner, outer) = ctx.nursery_band;
            radius = ((outer + 5.0).ceil() as i32).max(s.sample_radius);
            candidates = self.collect_frontier_candidates(grid, plan.anchor, radius);
            candidates.retain(|t| {
                let d = t.distance(plan.center);
                d >= inner - 1.0 && d <= outer + 4.0
            });
            while candidates.is_empty() && radius < s.max_sample_radius {
                radius += 2;
                candidates = self.collect_frontier_candidates(grid, plan.anchor, radius);
            }
        } else {
            candidates = self.collect_frontier_candidates(grid, cell, radius);
            while candidates.is_empty() && radius < s.max_sample_radius {
                radius += s.sample_radius_step;
                candidates = self.collect_frontier_candidates(grid, cell, radius);
            }
            if candidates.is_empty() {
                candidates = self.sample_frontier(s.frontier_sample_count, rng);
            }
        }
        if candidates.is_empty() && (queen_plan.is_some() || nursery_plan.is_some()) {
            let wider = s.max_sample_radius.min(radius + s.sample_radius_step);
            candidates = self.collect_frontier_candidates(grid, cell, wider);
        }
        if candidates.is_empty() {
            return None;
        }

        let pressure_boost = 0.6 + space * 1.4;
        // The corridor anchor is the next soil tile itself, so measure from one
        // step behind it.
        let heading_anchor = match queen_plan {
            Some(plan) if plan.phase == QueenPhase::Corridor => {
                tile_point(plan.anchor) - heading.unwrap_or(Vec2::ZERO)
            }
            Some(plan) => tile_point(plan.anchor),
            None => tile_point(state.last_dug.unwrap_or(cell)),
        };
        let room_center = state.room_center.filter(|_| state.mode == DigMode::Room);
        let room_radius = if state.room_radius > 0.0 {
            state.room_radius
        } else {
            2.5
        };

        let mut best: Option<(GridPos, f32, bool)> = None;
        for tile in candidates {
            if !self.is_frontier(tile.x, tile.y) {
                continue;
            }
            let world = self.cell_center(tile);
            let depth = self.depth_norm(tile.y);
            let upward_bias = 1.0 + (1.0 - depth) * (0.35 + waste * 0.25);
            let air = ctx.air.map_or(0.0, |a| a.get(tile.x, tile.y));
            let air_bonus = 1.0 + air * (1.6 + waste * 0.8);
            let pher_bonus = 1.0 + self.pheromone.get(tile.x, tile.y) * 2.5;
            let nest_penalty = 1.0 + world.distance(queen_world) / (self.cell_size * 10.0);
            let ant_penalty = 1.0 + world.distance(origin) / (self.cell_size * 4.0);
            let noise = rng.random::<f32>() * 0.05;

            let mode_bonus = if favor_soft_soil {
                (1.6 - grid.texture.get(tile.x, tile.y) * 1.2).max(0.4)
            } else {
                1.0
            };

            let mut heading_bonus = 1.0;
            if let Some(h) = heading {
                let d = tile_point(tile) - heading_anchor;
                let dist = d.length();
                if dist > 0.0 {
                    let forward = (d.dot(h) / dist + 1.0) * 0.5;
                    let ahead = 1.0 / (1.0 + (dist - 1.0).abs());
                    heading_bonus +=
                        heading_strength * (forward * s.forward_bias + ahead * s.heading_ahead_bias);
                }
            }

            let neighbors = grid.open_neighbors4(tile.x, tile.y);
            let mut allow_branch = false;
            let shape_bonus = match state.mode {
                DigMode::Corridor => match neighbors {
                    1 => s.corridor_endpoint_bonus,
                    2 => {
                        let chance =
                            s.corridor_branch_chance + space * 0.15 + heading_strength * 0.1;
                        allow_branch = rng.random::<f32>() < chance;
                        if allow_branch {
                            s.corridor_branch_penalty * 1.8
                        } else {
                            s.corridor_branch_penalty
                        }
                    }
                    _ => s.corridor_balloon_penalty,
                },
                DigMode::Room => match neighbors {
                    0 | 1 => s.room_neighbor_bonus,
                    2 => 1.0,
                    _ => s.room_neighbor_penalty,
                },
            };
            if state.mode == DigMode::Corridor && neighbors >= 2 && !allow_branch {
                continue;
            }

            let room_bias = match room_center {
                Some(rc) => {
                    let d = tile.distance(rc);
                    if d <= room_radius + 0.5 {
                        1.0 + s.room_center_bias * (1.0 - d / (room_radius + 0.5).max(0.001)).max(0.0)
                    } else {
                        (1.0 - (d - room_radius) * 0.35).max(0.1)
                    }
                }
                None => 1.0,
            };

            let score = upward_bias
                * air_bonus
                * pher_bonus
                * heading_bonus
                * pressure_boost
                * mode_bonus
                * shape_bonus
                * room_bias
                / (nest_penalty * ant_penalty)
                + noise;
            if best.is_none_or(|(_, b, _)| score > b) {
                let branching = allow_branch && state.mode == DigMode::Corridor && neighbors >= 2;
                best = Some((tile, score, branching));
            }
        }

        let (pos, _, allow_branching) = best?;
        let target = DigTarget {
            pos,
            mode: state.mode,
            allow_branching,
            workface: None,
        };
        if target.mode == DigMode::Corridor
            && grid.open_neighbors4(pos.x, pos.y) >= 2
            && !target.allow_branching
        {
            debug!(x = pos.x, y = pos.y, "corridor target failed shape re-check");
            return None;
        }
        Some(target)
    }
}

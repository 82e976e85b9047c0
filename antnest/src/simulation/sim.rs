use std::f32::consts::PI;

use rand::SeedableRng;
use rand::rngs::StdRng;
use shared::GridPos;
use tracing::{debug, info};

use crate::config::SimulationConfig;

use super::air::AirField;
use super::ant::AntWorld;
use super::brood::{BroodReport, BroodSystem, QueenView};
use super::colony::Colony;
use super::excavation::{ChamberObjective, ExcavationCollaborators, ExcavationEngine};
use super::map::TileGrid;
use super::planner::{ExcavationPlanner, PlannerDebugState};
use super::pressure::{ColonyPressureModel, PressureInputs, PressureSnapshot};
use super::waste::WasteField;

/// Carves reported by the excavation engine during the agent step, fanned out
/// to the air field once every agent has moved.
#[derive(Debug, Default)]
pub struct DigEvents {
    pub dug: Vec<GridPos>,
    pub particles: u64,
    pub total_dug: u64,
}

impl ExcavationCollaborators for DigEvents {
    fn on_tunnel_dug(&mut self, pos: GridPos) {
        self.dug.push(pos);
        self.total_dug += 1;
    }

    fn spawn_dig_particles(&mut self, _pos: GridPos) {
        self.particles += 1;
    }
}

/// Snapshot of the colony for reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSummary {
    pub tick: u64,
    pub ants: usize,
    pub queen_alive: bool,
    pub brood: usize,
    pub larvae: usize,
    pub stored_food: f32,
    pub waste: f32,
    pub tunnels: usize,
    pub frontier: usize,
    pub tiles_dug: u64,
    pub workfaces: PlannerDebugState,
    pub pressure: PressureSnapshot,
}

pub struct Simulation {
    pub tick: u64,
    pub config: SimulationConfig,
    pub grid: TileGrid,
    pub engine: ExcavationEngine,
    pub planner: ExcavationPlanner,
    pub air: AirField,
    pub waste: WasteField,
    pub pressure: ColonyPressureModel,
    pub brood: BroodSystem,
    pub colony: Colony,
    pub chamber: ChamberObjective,
    pub events: DigEvents,
    rng: StdRng,
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Chamber objective around the queen's home, sized from the configured chamber.
fn queen_chamber(grid: &TileGrid, config: &SimulationConfig) -> ChamberObjective {
    let radius = config
        .grid
        .queen_chamber_half_height
        .min(config.grid.queen_chamber_half_width)
        .max(1) as f32;
    let min_tiles = (PI * radius * radius * 0.6).round() as usize;
    ChamberObjective::new(grid.queen_home, radius, min_tiles)
}

impl Simulation {
    pub fn new(config: &SimulationConfig) -> Self {
        let grid = TileGrid::generate(&config.grid);
        let (w, h) = (grid.width, grid.height);
        let mut sim = Self {
            tick: 0,
            engine: ExcavationEngine::for_grid(&grid, config.dig.clone()),
            planner: ExcavationPlanner::new(config.planner.clone()),
            air: AirField::new(w, h, config.air.clone()),
            waste: WasteField::new(w, h, config.waste.max_tile),
            pressure: ColonyPressureModel::new(config.pressure.clone()),
            brood: BroodSystem::new(w, h, grid.cell_size, config.brood.clone()),
            colony: Colony::new(
                config.ants.clone(),
                config.roles.clone(),
                config.waste.clone(),
                config.initial_food,
            ),
            chamber: queen_chamber(&grid, config),
            events: DigEvents::default(),
            rng: make_rng(config.seed),
            config: config.clone(),
            grid,
        };
        sim.reset();
        sim
    }

    /// Regenerates the world and every subsystem from the configuration.
    /// With a fixed seed, two resets replay the same run.
    pub fn reset(&mut self) {
        self.tick = 0;
        self.rng = make_rng(self.config.seed);
        self.grid = TileGrid::generate(&self.config.grid);

        self.engine.reset(&self.grid);
        self.planner.reset(&self.grid, &mut self.rng);
        self.air.reset(&self.grid);
        self.waste.clear();
        self.pressure.reset();
        self.brood.reset();

        self.colony.stored_food = self.config.initial_food;
        self.colony.populate(&self.grid, &mut self.rng);

        self.chamber = queen_chamber(&self.grid, &self.config);
        self.chamber.refresh(&self.grid);
        self.events = DigEvents::default();
        self.refresh_pressure();

        info!(
            width = self.grid.width,
            height = self.grid.height,
            ants = self.colony.ants.len(),
            frontier = self.engine.frontier().len(),
            seed = ?self.config.seed,
            "simulation reset"
        );
    }

    /// One fixed step of the whole colony.
    pub fn tick(&mut self, dt: f32) {
        self.spoil_food(dt);
        self.refresh_pressure();

        let report = self.update_brood(dt);
        if !report.hatched.is_empty() || report.starved > 0 {
            debug!(hatched = report.hatched.len(), starved = report.starved, "brood update");
        }
        let pressure = *self.pressure.snapshot();
        for pos in report.hatched {
            self.colony.spawn_hatchling(pos, &pressure, &mut self.rng);
        }
        let pressure = self.refresh_pressure();

        self.engine.update_frontier_tiles(&self.grid);
        self.chamber.refresh(&self.grid);
        self.planner.update(&self.grid, &pressure, &mut self.rng);
        if self.tick % self.config.air.update_every_ticks.max(1) == 0 {
            self.air.update(&self.grid);
        }

        self.colony
            .reassess_roles(dt, &self.grid, &self.waste, &mut self.brood);

        let nursery_band = (
            self.config.pressure.nursery_band_inner,
            self.config.pressure.nursery_band_outer,
        );
        let mut world = AntWorld {
            grid: &mut self.grid,
            engine: &mut self.engine,
            planner: &mut self.planner,
            air: self.air.levels(),
            waste: &mut self.waste,
            brood: &mut self.brood,
            pressure: &pressure,
            chamber: Some(&self.chamber),
            nursery_band,
            hooks: &mut self.events,
        };
        self.colony.update(&mut world, dt, &mut self.rng);

        for pos in self.events.dug.drain(..) {
            self.air.notify_tile_opened(&self.grid, pos);
        }

        self.tick += 1;
    }

    /// Stored food above the spoilage floor rots into waste at the queen.
    fn spoil_food(&mut self, dt: f32) {
        let settings = &self.config.waste;
        let excess = self.colony.stored_food - settings.spoilage_floor;
        if excess <= 0.0 {
            return;
        }
        let spoiled = excess * settings.spoilage_rate * dt;
        self.colony.stored_food -= spoiled;
        let cell = self
            .colony
            .queen_pos()
            .map_or(self.grid.queen_home, |p| self.grid.world_to_grid(p));
        self.waste.add(cell, spoiled);
    }

    fn refresh_pressure(&mut self) -> PressureSnapshot {
        let queen_cell = self.colony.queen_pos().map(|p| self.grid.world_to_grid(p));
        self.pressure.update(&PressureInputs {
            grid: &self.grid,
            waste: &self.waste,
            queen_cell,
            ant_count: self.colony.ants.len(),
            stored_food: self.colony.stored_food,
            brood_count: self.brood.len(),
            larva_count: self.brood.larva_count(),
        })
    }

    fn update_brood(&mut self, dt: f32) -> BroodReport {
        let attendants = self.colony.attendants(self.brood.settings().attendant_radius);
        let colony = &mut self.colony;
        let queen = match colony.queen {
            Some(key) => colony.ants.get_mut(key),
            None => None,
        }
        .map(|q| QueenView {
            pos: q.pos,
            energy: &mut q.energy,
            attendants,
        });
        self.brood.update(
            dt,
            queen,
            &mut colony.stored_food,
            &mut self.waste,
            &mut self.rng,
        )
    }

    pub fn summary(&self) -> TickSummary {
        TickSummary {
            tick: self.tick,
            ants: self.colony.ants.len(),
            queen_alive: self.colony.queen().is_some(),
            brood: self.brood.len(),
            larvae: self.brood.larva_count(),
            stored_food: self.colony.stored_food,
            waste: self.waste.total(),
            tunnels: self.grid.tunnel_count(),
            frontier: self.engine.frontier().len(),
            tiles_dug: self.events.total_dug,
            workfaces: self.planner.debug_state(),
            pressure: *self.pressure.snapshot(),
        }
    }
}

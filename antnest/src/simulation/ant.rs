use std::f32::consts::{PI, TAU};

use glam::Vec2;
use rand::Rng;
use shared::{GridPos, TileKind, fast_sin_cos};
use slotmap::{Key, new_key_type};

use super::brood::{BroodKey, BroodSystem};
use super::excavation::{
    ChamberObjective, Digger, DigState, ExcavationCollaborators, ExcavationContext,
    ExcavationEngine,
};
use super::field::ScalarField;
use super::map::TileGrid;
use super::planner::ExcavationPlanner;
use super::pressure::PressureSnapshot;
use super::roles::Role;
use super::waste::WasteField;
use crate::config::{AntSettings, WasteSettings};

new_key_type! {
    /// Key for ant slotmap.
    pub struct AntKey;
}

/// Distance ahead of the ant probed for collisions, in world units.
const LOOK_AHEAD: f32 = 6.0;
/// Turn applied when the way ahead is blocked.
const BLOCKED_TURN: f32 = 1.5;
/// Energy a worker keeps for itself when feeding the queen.
const TROPHALLAXIS_RESERVE: f32 = 10.0;
/// Nurses search for brood this many tiles around them.
const NURSE_SEARCH_TILES: f32 = 10.0;
/// Nurses give up a tend or carry task after this many seconds.
const TASK_TIMEOUT: f32 = 8.0;

/// What a nurse is busy with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NurseTask {
    #[default]
    Idle,
    /// Walking to a locked larva to feed it.
    Tending(BroodKey),
    /// Relocating a locked entry into the nursery ring.
    Carrying(BroodKey),
}

/// State of an ant.
#[derive(Debug, Clone)]
pub struct Ant {
    pub key: AntKey,
    pub role: Role,
    /// Task a middle-aged worker returns to when it is not needed elsewhere.
    pub preference: Role,

    pub pos: Vec2,
    pub rotation: f32,
    pub speed: f32,
    pub age: f32,
    pub lifespan: f32,
    pub energy: f32,
    /// Brood-scent level above which this worker switches to nursing.
    pub nurse_threshold: f32,

    pub carrying_waste: f32,
    pub nurse_task: NurseTask,
    task_time: f32,
    pub goal: Option<Vec2>,
    pub dig: DigState,
}

/// Colony-wide resources an ant reads and writes during its update.
#[derive(Debug, Clone, Default)]
pub struct Provisions {
    pub food: f32,
    pub queen_pos: Option<Vec2>,
    /// Energy the queen can still take this tick.
    pub queen_need: f32,
    /// Energy handed to the queen this tick, applied after all ants moved.
    pub queen_gift: f32,
}

/// The shared world seen by the agent loop.
pub struct AntWorld<'a> {
    pub grid: &'a mut TileGrid,
    pub engine: &'a mut ExcavationEngine,
    pub planner: &'a mut ExcavationPlanner,
    pub air: &'a ScalarField,
    pub waste: &'a mut WasteField,
    pub brood: &'a mut BroodSystem,
    pub pressure: &'a PressureSnapshot,
    pub chamber: Option<&'a ChamberObjective>,
    pub nursery_band: (f32, f32),
    pub hooks: &'a mut dyn ExcavationCollaborators,
}

impl AntWorld<'_> {
    /// Splits the world into the engine and the context it digs in.
    fn dig_parts(&mut self, queen_pos: Option<Vec2>) -> (&mut ExcavationEngine, ExcavationContext<'_>) {
        let ctx = ExcavationContext {
            grid: &mut *self.grid,
            air: Some(self.air),
            waste: Some(self.waste.field()),
            pressure: self.pressure,
            planner: Some(&mut *self.planner),
            hooks: &mut *self.hooks,
            queen_pos,
            chamber: self.chamber,
            nursery_band: self.nursery_band,
        };
        (&mut *self.engine, ctx)
    }
}

/// Tunables the agent loop needs besides what the world carries.
#[derive(Debug, Clone, Copy)]
pub struct AntTuning<'a> {
    pub ants: &'a AntSettings,
    pub waste: &'a WasteSettings,
}

impl Ant {
    /// Create a new worker of the given age, as a fraction of its lifespan.
    pub fn new(
        pos: Vec2,
        preference: Role,
        age_fraction: f32,
        nurse_threshold: f32,
        settings: &AntSettings,
        rng: &mut impl Rng,
    ) -> Self {
        let lifespan = settings.lifespan_min + rng.random::<f32>() * settings.lifespan_extra;
        Self {
            key: AntKey::null(),
            role: preference,
            preference,
            pos,
            rotation: rng.random_range(0.0..TAU),
            speed: settings.worker_speed,
            age: age_fraction.clamp(0.0, 1.0) * lifespan,
            lifespan,
            energy: settings.max_energy,
            nurse_threshold,
            carrying_waste: 0.0,
            nurse_task: NurseTask::Idle,
            task_time: 0.0,
            goal: None,
            dig: DigState::default(),
        }
    }

    /// The queen does not age out and never leaves her chamber.
    pub fn queen(pos: Vec2, settings: &AntSettings) -> Self {
        Self {
            key: AntKey::null(),
            role: Role::Queen,
            preference: Role::Queen,
            pos,
            rotation: 0.0,
            speed: 0.0,
            age: 0.0,
            lifespan: f32::INFINITY,
            energy: settings.max_energy,
            nurse_threshold: f32::INFINITY,
            carrying_waste: 0.0,
            nurse_task: NurseTask::Idle,
            task_time: 0.0,
            goal: None,
            dig: DigState::default(),
        }
    }

    pub fn is_queen(&self) -> bool {
        self.role == Role::Queen
    }

    pub fn is_dead(&self) -> bool {
        self.energy <= 0.0 || self.age > self.lifespan
    }

    /// Fraction of the lifespan already lived, in `[0, 1]`.
    pub fn age_fraction(&self) -> f32 {
        if self.lifespan.is_finite() && self.lifespan > 0.0 {
            (self.age / self.lifespan).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn carried_brood(&self) -> Option<BroodKey> {
        match self.nurse_task {
            NurseTask::Carrying(key) => Some(key),
            _ => None,
        }
    }

    pub fn is_carrying(&self) -> bool {
        self.carrying_waste > 0.0 || self.carried_brood().is_some()
    }

    /// Switches task, dropping whatever belonged to the old one.
    pub fn set_role(&mut self, role: Role, brood: &mut BroodSystem) {
        if role == self.role {
            return;
        }
        if self.role == Role::Nurse {
            self.drop_nurse_task(brood);
        }
        if self.role == Role::Digger {
            self.dig.target = None;
            self.dig.assigned_workface = None;
        }
        self.role = role;
        self.goal = None;
    }

    fn drop_nurse_task(&mut self, brood: &mut BroodSystem) {
        match self.nurse_task {
            NurseTask::Tending(key) | NurseTask::Carrying(key) => brood.release(key, self.key),
            NurseTask::Idle => {}
        }
        self.nurse_task = NurseTask::Idle;
        self.task_time = 0.0;
    }

    /// Update ant state and behavior.
    pub fn update(
        &mut self,
        tuning: AntTuning,
        world: &mut AntWorld,
        provisions: &mut Provisions,
        dt: f32,
        rng: &mut impl Rng,
    ) {
        if self.is_dead() {
            return;
        }
        let settings = tuning.ants;

        self.age += dt;
        self.energy -= settings.energy_decay * dt;
        self.eat(settings, world.grid, provisions);
        if self.is_dead() {
            return;
        }

        if self.is_queen() {
            return;
        }

        self.feed_queen(settings, world.grid.cell_size, provisions);
        self.drop_waste(tuning.waste, world, dt, rng);

        self.goal = match self.role {
            Role::Queen => None,
            Role::Digger => self.digger_goal(world, provisions, dt, rng),
            Role::Nurse => self.nurse_goal(world, provisions, dt),
            Role::Cleaner => self.cleaner_goal(tuning.waste, world),
            Role::Forager => {
                provisions.food += settings.forage_rate * dt;
                Some(world.grid.grid_to_world(world.grid.entrance) - Vec2::Y * 3.0 * world.grid.cell_size)
            }
        };
        if self.role != Role::Digger {
            self.dig.target = None;
            self.dig.retarget_timer = 0.0;
        }

        self.steer(settings, dt, rng);
        self.update_position(world, provisions, dt, rng);
    }

    /// Eats from the stores when hungry and inside the nest.
    fn eat(&mut self, settings: &AntSettings, grid: &TileGrid, provisions: &mut Provisions) {
        if self.energy >= settings.max_energy * settings.eat_threshold || provisions.food <= 0.0 {
            return;
        }
        if !grid.is_underground(grid.world_to_grid(self.pos).y) {
            return;
        }
        let per_food = settings.energy_per_food.max(1e-3);
        let gain = settings
            .meal_size
            .min(settings.max_energy - self.energy)
            .min(provisions.food * per_food);
        if gain > 0.0 {
            provisions.food -= gain / per_food;
            self.energy += gain;
        }
    }

    /// Trophallaxis: workers next to the queen pass her some of their energy.
    fn feed_queen(&mut self, settings: &AntSettings, cell_size: f32, provisions: &mut Provisions) {
        let Some(queen) = provisions.queen_pos else {
            return;
        };
        if provisions.queen_need <= 0.0 || self.energy <= TROPHALLAXIS_RESERVE {
            return;
        }
        if self.pos.distance(queen) > cell_size {
            return;
        }
        let amount = settings
            .queen_feed_amount
            .min(provisions.queen_need)
            .min(self.energy - TROPHALLAXIS_RESERVE);
        self.energy -= amount;
        provisions.queen_need -= amount;
        provisions.queen_gift += amount;
    }

    fn drop_waste(&mut self, settings: &WasteSettings, world: &mut AntWorld, dt: f32, rng: &mut impl Rng) {
        let cell = world.grid.world_to_grid(self.pos);
        if world.grid.at(cell) != TileKind::Tunnel {
            return;
        }
        if rng.random::<f32>() < settings.drop_chance_per_second * dt {
            world.waste.add(cell, settings.drop_amount);
        }
    }

    fn digger_goal(
        &mut self,
        world: &mut AntWorld,
        provisions: &Provisions,
        dt: f32,
        rng: &mut impl Rng,
    ) -> Option<Vec2> {
        self.dig.idle_time += dt;
        self.dig.room_cooldown = (self.dig.room_cooldown - dt).max(0.0);
        if self.is_carrying() {
            self.dig.target = None;
            self.dig.retarget_timer = 0.0;
            return None;
        }

        self.dig.retarget_timer -= dt;
        let stale = self
            .dig
            .target
            .is_none_or(|t| world.grid.at(t.pos) != TileKind::Soil);
        if stale || self.dig.retarget_timer <= 0.0 {
            let (retarget_min, retarget_jitter) = {
                let s = world.engine.settings();
                (s.retarget_min, s.retarget_jitter)
            };
            self.dig.retarget_timer = retarget_min + rng.random::<f32>() * retarget_jitter;
            let (engine, mut ctx) = world.dig_parts(provisions.queen_pos);
            let mut agent = Digger {
                pos: self.pos,
                carrying: false,
                is_digger: true,
                state: &mut self.dig,
            };
            let target = engine.choose_dig_target(&mut agent, &mut ctx, rng);
            self.dig.target = target;
        }
        self.dig.target.map(|t| world.grid.grid_to_world(t.pos))
    }

    fn nurse_goal(&mut self, world: &mut AntWorld, provisions: &mut Provisions, dt: f32) -> Option<Vec2> {
        let cell_size = world.grid.cell_size;
        let queen = provisions.queen_pos;
        self.task_time += dt;

        match self.nurse_task {
            NurseTask::Carrying(key) => {
                let Some(dest) = queen.map(|q| nursery_spot(q, self.pos, world.nursery_band, cell_size))
                else {
                    self.drop_nurse_task(world.brood);
                    return None;
                };
                if !world.brood.carry_to(key, self.key, self.pos) {
                    self.nurse_task = NurseTask::Idle;
                    return None;
                }
                if self.pos.distance(dest) < cell_size * 0.75 || self.task_time > TASK_TIMEOUT {
                    self.drop_nurse_task(world.brood);
                    return queen;
                }
                Some(dest)
            }
            NurseTask::Tending(key) => {
                let Some(entry_pos) = world.brood.get(key).map(|b| b.pos) else {
                    self.nurse_task = NurseTask::Idle;
                    return queen;
                };
                if self.task_time > TASK_TIMEOUT {
                    self.drop_nurse_task(world.brood);
                    return queen;
                }
                if self.pos.distance(entry_pos) > cell_size {
                    return Some(entry_pos);
                }
                world.brood.feed(key, &mut provisions.food, world.waste);
                let misplaced = queen.is_some_and(|q| {
                    let tiles = entry_pos.distance(q) / cell_size;
                    tiles < world.nursery_band.0 || tiles > world.nursery_band.1
                });
                if misplaced {
                    self.nurse_task = NurseTask::Carrying(key);
                    self.task_time = 0.0;
                    queen.map(|q| nursery_spot(q, self.pos, world.nursery_band, cell_size))
                } else {
                    self.drop_nurse_task(world.brood);
                    queen
                }
            }
            NurseTask::Idle => {
                if let Some(key) = world.brood.neediest_near(self.pos, NURSE_SEARCH_TILES * cell_size) {
                    if world.brood.try_lock(key, self.key) {
                        self.nurse_task = NurseTask::Tending(key);
                        self.task_time = 0.0;
                        return world.brood.get(key).map(|b| b.pos);
                    }
                }
                queen
            }
        }
    }

    fn cleaner_goal(&mut self, settings: &WasteSettings, world: &mut AntWorld) -> Option<Vec2> {
        let grid = &*world.grid;
        let cell = grid.world_to_grid(self.pos);
        let split = grid.region_split as i32;
        let dump_row = (split - settings.cleaner_dump_rows as i32).max(1);

        if self.carrying_waste > 0.0 {
            if cell.y < dump_row {
                let drop = GridPos::new(cell.x, cell.y.clamp(1, dump_row));
                world.waste.add(drop, self.carrying_waste);
                self.carrying_waste = 0.0;
                return None;
            }
            let above = GridPos::new(grid.entrance.x, split - settings.cleaner_dump_rows as i32 - 1);
            return Some(grid.grid_to_world(above));
        }

        if world.waste.get(cell.x, cell.y) > 0.1 {
            self.carrying_waste = world.waste.take(cell, settings.cleaner_pickup);
            return None;
        }
        world
            .waste
            .find_dirtiest(grid, cell, settings.cleaner_sight_radius, 0.1)
            .map(|pos| grid.grid_to_world(pos))
    }

    fn steer(&mut self, settings: &AntSettings, dt: f32, rng: &mut impl Rng) {
        match self.goal {
            Some(goal) if goal.distance_squared(self.pos) > 1.0 => {
                let d = goal - self.pos;
                let wanted = d.y.atan2(d.x);
                let diff = (wanted - self.rotation + PI).rem_euclid(TAU) - PI;
                let max_turn = settings.turn_rate * dt;
                self.rotation = (self.rotation + diff.clamp(-max_turn, max_turn)).rem_euclid(TAU);
            }
            _ => {
                self.rotation = (self.rotation + (rng.random::<f32>() - 0.5) * 0.6 * dt * settings.turn_rate)
                    .rem_euclid(TAU);
            }
        }
    }

    fn update_position(
        &mut self,
        world: &mut AntWorld,
        provisions: &Provisions,
        dt: f32,
        rng: &mut impl Rng,
    ) {
        let (dy, dx) = fast_sin_cos(self.rotation);
        let dir = Vec2::new(dx, dy);
        let next = self.pos + dir * self.speed * dt;
        if !next.is_finite() {
            tracing::warn!(key = ?self.key, rotation = self.rotation, "non-finite ant position, movement skipped");
            return;
        }

        let ahead = self.pos + dir * LOOK_AHEAD;
        if !world.grid.blocks_movement(ahead) && !world.grid.blocks_movement(next) {
            self.pos = next;
            return;
        }

        let blocked = world.grid.world_to_grid(ahead);
        if self.try_dig(blocked, world, provisions, rng) {
            return;
        }

        let grid = &*world.grid;
        let clear = |angle: f32| {
            let (sy, sx) = fast_sin_cos(self.rotation + angle);
            !grid.blocks_movement(self.pos + Vec2::new(sx, sy) * LOOK_AHEAD)
        };
        let cw_clear = clear(BLOCKED_TURN);
        let ccw_clear = clear(-BLOCKED_TURN);
        let turn = match (cw_clear, ccw_clear) {
            (true, false) => BLOCKED_TURN,
            (false, true) => -BLOCKED_TURN,
            (true, true) => {
                if rng.random::<bool>() {
                    BLOCKED_TURN
                } else {
                    -BLOCKED_TURN
                }
            }
            (false, false) => PI,
        };
        self.rotation = (self.rotation + turn).rem_euclid(TAU);
    }

    /// Digging when blocked by soil that is the current target, or that carries
    /// enough shared frontier pheromone to be worth opening.
    fn try_dig(
        &mut self,
        tile: GridPos,
        world: &mut AntWorld,
        provisions: &Provisions,
        rng: &mut impl Rng,
    ) -> bool {
        if self.role != Role::Digger || self.is_carrying() {
            return false;
        }
        if world.grid.at(tile) != TileKind::Soil {
            return false;
        }
        let threshold = world.engine.settings().shared_frontier_threshold;
        let is_target = self.dig.target.is_some_and(|t| t.pos == tile);
        if !is_target && world.engine.pheromone_at(tile.x, tile.y) <= threshold {
            return false;
        }
        let (engine, mut ctx) = world.dig_parts(provisions.queen_pos);
        let mut agent = Digger {
            pos: self.pos,
            carrying: false,
            is_digger: true,
            state: &mut self.dig,
        };
        engine.apply_dig_action(&mut agent, &mut ctx, tile.x, tile.y, rng)
    }
}

/// Drop-off point in the middle of the nursery ring, on the ant's side of the queen.
fn nursery_spot(queen: Vec2, from: Vec2, band: (f32, f32), cell_size: f32) -> Vec2 {
    let dir = (from - queen).try_normalize().unwrap_or(Vec2::Y);
    queen + dir * (band.0 + band.1) * 0.5 * cell_size
}

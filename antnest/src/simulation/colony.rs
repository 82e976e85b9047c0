use glam::Vec2;
use rand::Rng;
use slotmap::SlotMap;
use tracing::debug;

use super::Timer;
use super::ant::{Ant, AntKey, AntTuning, AntWorld, Provisions};
use super::brood::BroodSystem;
use super::map::TileGrid;
use super::pressure::PressureSnapshot;
use super::roles::{self, Role, RoleCensus};
use super::waste::WasteField;
use crate::config::{AntSettings, RoleSettings, WasteSettings};

/// Local waste above which a middle-aged worker keeps cleaning.
const CLEANING_WASTE_LEVEL: f32 = 0.4;

/// The ants of one nest, the queen among them, and the shared food stores.
pub struct Colony {
    pub ants: SlotMap<AntKey, Ant>,
    pub queen: Option<AntKey>,
    pub stored_food: f32,
    settings: AntSettings,
    role_settings: RoleSettings,
    waste_settings: WasteSettings,
    reassess_timer: Timer,
    reassess_cursor: usize,
}

impl Colony {
    pub fn new(
        settings: AntSettings,
        role_settings: RoleSettings,
        waste_settings: WasteSettings,
        stored_food: f32,
    ) -> Self {
        let reassess_timer = Timer::new(role_settings.reassess_period, 0.0);
        Self {
            ants: SlotMap::with_key(),
            queen: None,
            stored_food,
            settings,
            role_settings,
            waste_settings,
            reassess_timer,
            reassess_cursor: 0,
        }
    }

    pub fn settings(&self) -> &AntSettings {
        &self.settings
    }

    /// Queen in her chamber plus the configured starting workforce: young nurses,
    /// middle-aged diggers and old foragers.
    pub fn populate(&mut self, grid: &TileGrid, rng: &mut impl Rng) {
        self.ants.clear();
        self.queen = None;
        self.reassess_cursor = 0;
        self.reassess_timer = Timer::new(self.role_settings.reassess_period, 0.0);

        let home = grid.grid_to_world(grid.queen_home);
        self.spawn_queen(home);

        let cohorts = [
            (self.settings.initial_nurses, Role::Nurse, 0.1),
            (self.settings.initial_diggers, Role::Digger, 0.5),
            (self.settings.initial_foragers, Role::Forager, 0.8),
        ];
        for (count, preference, age_fraction) in cohorts {
            for _ in 0..count {
                let jitter = Vec2::new(
                    (rng.random::<f32>() - 0.5) * 3.0,
                    (rng.random::<f32>() - 0.5) * 3.0,
                ) * grid.cell_size;
                self.spawn_worker(home + jitter, preference, age_fraction, rng);
            }
        }
    }

    pub fn spawn_queen(&mut self, pos: Vec2) -> AntKey {
        let mut queen = Ant::queen(pos, &self.settings);
        let key = self.ants.insert_with_key(|k| {
            queen.key = k;
            queen
        });
        self.queen = Some(key);
        key
    }

    /// Adds a worker whose role follows from its age and preference.
    pub fn spawn_worker(
        &mut self,
        pos: Vec2,
        preference: Role,
        age_fraction: f32,
        rng: &mut impl Rng,
    ) -> AntKey {
        let threshold = roles::random_nurse_threshold(&self.role_settings, rng);
        let mut ant = Ant::new(pos, preference, age_fraction, threshold, &self.settings, rng);
        ant.role = roles::age_role(&self.role_settings, age_fraction, preference, false);
        self.ants.insert_with_key(|k| {
            ant.key = k;
            ant
        })
    }

    /// Newly hatched worker; its long-term task is picked from the current needs.
    pub fn spawn_hatchling(
        &mut self,
        pos: Vec2,
        pressure: &PressureSnapshot,
        rng: &mut impl Rng,
    ) -> AntKey {
        let preference = roles::pick_role_for_new_worker(&self.role_settings, pressure, self.census());
        self.spawn_worker(pos, preference, 0.0, rng)
    }

    /// Removes an ant, releasing its brood locks and leaving its body and load as waste.
    pub fn despawn_ant(
        &mut self,
        key: AntKey,
        grid: &TileGrid,
        brood: &mut BroodSystem,
        waste: &mut WasteField,
    ) {
        let Some(ant) = self.ants.remove(key) else {
            tracing::warn!(?key, "ant not found during despawn");
            return;
        };
        brood.release_all(key);
        let cell = grid.world_to_grid(ant.pos);
        waste.add(cell, self.waste_settings.max_tile + ant.carrying_waste);
        if self.queen == Some(key) {
            tracing::warn!("the queen died");
            self.queen = None;
        }
        debug!(?key, role = ?ant.role, age = ant.age, energy = ant.energy, "ant died");
    }

    pub fn queen(&self) -> Option<&Ant> {
        self.queen.and_then(|k| self.ants.get(k))
    }

    pub fn queen_mut(&mut self) -> Option<&mut Ant> {
        self.queen.and_then(|k| self.ants.get_mut(k))
    }

    pub fn queen_pos(&self) -> Option<Vec2> {
        self.queen().map(|q| q.pos)
    }

    pub fn worker_count(&self) -> usize {
        self.ants.values().filter(|a| !a.is_queen()).count()
    }

    pub fn census(&self) -> RoleCensus {
        let mut census = RoleCensus::default();
        for ant in self.ants.values().filter(|a| !a.is_queen()) {
            census.workers += 1;
            match ant.role {
                Role::Digger => census.diggers += 1,
                Role::Cleaner => census.cleaners += 1,
                _ => {}
            }
        }
        census
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.ants.values().filter(|a| a.role == role).count()
    }

    /// Workers within `radius` world units of the queen.
    pub fn attendants(&self, radius: f32) -> usize {
        let Some(queen) = self.queen_pos() else {
            return 0;
        };
        let r2 = radius * radius;
        self.ants
            .values()
            .filter(|a| !a.is_queen() && a.pos.distance_squared(queen) <= r2)
            .count()
    }

    /// Runs every ant once in slot order, then removes the dead.
    pub fn update(&mut self, world: &mut AntWorld, dt: f32, rng: &mut impl Rng) {
        let queen_pos = self.queen_pos();
        let queen_need = self
            .queen()
            .map_or(0.0, |q| (self.settings.max_energy - q.energy).max(0.0));
        let mut provisions = Provisions {
            food: self.stored_food,
            queen_pos,
            queen_need,
            queen_gift: 0.0,
        };
        let tuning = AntTuning {
            ants: &self.settings,
            waste: &self.waste_settings,
        };

        let mut ants_to_despawn: Vec<AntKey> = Vec::new();
        for (key, ant) in self.ants.iter_mut() {
            ant.update(tuning, world, &mut provisions, dt, rng);
            if ant.is_dead() {
                ants_to_despawn.push(key);
            }
        }

        self.stored_food = provisions.food.max(0.0);
        if provisions.queen_gift > 0.0 {
            let max_energy = self.settings.max_energy;
            if let Some(queen) = self.queen_mut() {
                queen.energy = (queen.energy + provisions.queen_gift).min(max_energy);
            }
        }

        for key in ants_to_despawn {
            self.despawn_ant(key, world.grid, world.brood, world.waste);
        }
    }

    /// Every `reassess_period` seconds, re-derives the role of the next
    /// `batch_size` workers from age, local waste and brood scent.
    pub fn reassess_roles(
        &mut self,
        dt: f32,
        grid: &TileGrid,
        waste: &WasteField,
        brood: &mut BroodSystem,
    ) {
        self.reassess_timer.update(dt);
        if !self.reassess_timer.is_ready() {
            return;
        }
        self.reassess_timer.wrap();

        let workers: Vec<AntKey> = self
            .ants
            .iter()
            .filter(|(_, a)| !a.is_queen())
            .map(|(k, _)| k)
            .collect();
        if workers.is_empty() {
            return;
        }
        let batch = self.role_settings.batch_size.min(workers.len());
        for i in 0..batch {
            let key = workers[(self.reassess_cursor + i) % workers.len()];
            let Some(ant) = self.ants.get_mut(key) else {
                continue;
            };
            let cell = grid.world_to_grid(ant.pos);
            let cleaning = ant.carrying_waste > 0.0 || waste.local_average(cell, 2) > CLEANING_WASTE_LEVEL;
            let mut role = roles::age_role(&self.role_settings, ant.age_fraction(), ant.preference, cleaning);
            if role != Role::Nurse && brood.scent_at(ant.pos) > ant.nurse_threshold {
                role = Role::Nurse;
            }
            if role != ant.role {
                debug!(?key, from = ?ant.role, to = ?role, "role change");
                ant.set_role(role, brood);
            }
        }
        self.reassess_cursor = (self.reassess_cursor + batch) % workers.len();
    }
}

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Rejections raised by [`SimulationConfig::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("grid must be at least 8x8, got {width}x{height}")]
    GridTooSmall { width: usize, height: usize },
    #[error("region_split {split} must lie in [2, {max}]")]
    SplitOutOfRange { split: usize, max: usize },
    #[error("cell_size must be positive, got {0}")]
    NonPositiveCellSize(f32),
    #[error("{name} decay must be in (0, 1], got {value}")]
    DecayOutOfRange { name: &'static str, value: f32 },
    #[error("room radius range is inverted: {min} > {max}")]
    RoomRadiusRange { min: f32, max: f32 },
    #[error("branch cooldown range is inverted: {min} > {max}")]
    BranchCooldownRange { min: u32, max: u32 },
    #[error("nursery band inner radius {inner} must be below outer radius {outer}")]
    NurseryBand { inner: f32, outer: f32 },
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GridConfig {
    pub width: usize,
    pub height: usize,
    pub region_split: usize,
    pub cell_size: f32,
    pub entrance_radius: i32,
    pub entrance_corridor_depth: i32,
    pub queen_chamber_half_width: i32,
    pub queen_chamber_half_height: i32,
    pub queen_depth: i32,
}

impl Default for GridConfig {
    fn default() -> Self {
        let height = 140;
        Self {
            width: 160,
            height,
            region_split: (height as f32 * 0.35).floor() as usize,
            cell_size: 12.0,
            entrance_radius: 2,
            entrance_corridor_depth: 8,
            queen_chamber_half_width: 5,
            queen_chamber_half_height: 4,
            queen_depth: 8,
        }
    }
}

/// Tunables of the excavation engine.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DigSettings {
    pub pheromone_deposit: f32,
    pub directional_pheromone_strength: f32,
    pub directional_pheromone_length: i32,
    pub directional_side_falloff: f32,
    pub directional_back_strength: f32,
    pub neighbor_deposit: f32,
    pub decay: f32,
    pub min_strength: f32,
    pub sample_radius: i32,
    pub max_sample_radius: i32,
    pub sample_radius_step: i32,
    pub forward_bias: f32,
    pub heading_ahead_bias: f32,
    pub heading_gain: f32,
    pub corridor_endpoint_bonus: f32,
    pub corridor_branch_penalty: f32,
    pub corridor_branch_chance: f32,
    pub corridor_balloon_penalty: f32,
    pub room_neighbor_penalty: f32,
    pub room_neighbor_bonus: f32,
    pub room_center_bias: f32,
    pub frontier_sample_count: usize,
    pub frontier_queue_budget: usize,
    pub decay_rows_per_tick: usize,
    pub base_tile_hp: f32,
    pub hardness_jitter: f32,
    pub depth_hardness: f32,
    pub dig_damage: f32,
    /// Pheromone level at which a blocked worker digs without an assigned target.
    pub shared_frontier_threshold: f32,
    /// Space pressure above which the 3x3 crowding limit is lifted.
    pub crowding_pressure_gate: f32,
    pub max_open_neighbors: usize,
    pub min_space_pressure: f32,
    pub room_mode_stuck_time: f32,
    pub room_mode_space_pressure: f32,
    pub room_radius_min: f32,
    pub room_radius_max: f32,
    pub room_cooldown: f32,
    pub nursery_pressure_dig_threshold: f32,
    pub nursery_room_radius: f32,
    pub retarget_min: f32,
    pub retarget_jitter: f32,
}

impl Default for DigSettings {
    fn default() -> Self {
        Self {
            pheromone_deposit: 0.9,
            directional_pheromone_strength: 1.25,
            directional_pheromone_length: 4,
            directional_side_falloff: 0.35,
            directional_back_strength: 0.1,
            neighbor_deposit: 0.35,
            decay: 0.995,
            min_strength: 0.01,
            sample_radius: 8,
            max_sample_radius: 22,
            sample_radius_step: 4,
            forward_bias: 0.65,
            heading_ahead_bias: 0.9,
            heading_gain: 0.5,
            corridor_endpoint_bonus: 2.4,
            corridor_branch_penalty: 0.45,
            corridor_branch_chance: 0.12,
            corridor_balloon_penalty: 0.08,
            room_neighbor_penalty: 0.6,
            room_neighbor_bonus: 1.35,
            room_center_bias: 3.5,
            frontier_sample_count: 32,
            frontier_queue_budget: 120,
            decay_rows_per_tick: 6,
            base_tile_hp: 3.5,
            hardness_jitter: 0.2,
            depth_hardness: 1.0,
            dig_damage: 1.0,
            shared_frontier_threshold: 0.08,
            crowding_pressure_gate: 0.9,
            max_open_neighbors: 3,
            min_space_pressure: 0.05,
            room_mode_stuck_time: 6.0,
            room_mode_space_pressure: 0.6,
            room_radius_min: 2.0,
            room_radius_max: 3.5,
            room_cooldown: 6.0,
            nursery_pressure_dig_threshold: 0.35,
            nursery_room_radius: 2.6,
            retarget_min: 0.6,
            retarget_jitter: 0.6,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PlannerSettings {
    pub max_branch_depth: u32,
    pub branch_cooldown_min: u32,
    pub branch_cooldown_max: u32,
    pub base_branch_target: usize,
    pub extra_branch_target: usize,
    pub isolation_radius: i32,
    pub start_search_radius: i32,
    pub junction_checks_per_update: usize,
    pub update_interval_ticks: u32,
    pub max_junction_history: usize,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_branch_depth: 3,
            branch_cooldown_min: 8,
            branch_cooldown_max: 15,
            base_branch_target: 2,
            extra_branch_target: 4,
            isolation_radius: 2,
            start_search_radius: 3,
            junction_checks_per_update: 4,
            update_interval_ticks: 10,
            max_junction_history: 64,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AirSettings {
    pub step_falloff: f32,
    pub propagation_budget: usize,
    pub min_level: f32,
    pub reseed_interval: u32,
    pub neighbor_bonus: f32,
    pub update_every_ticks: u64,
}

impl Default for AirSettings {
    fn default() -> Self {
        Self {
            step_falloff: 0.88,
            propagation_budget: 600,
            min_level: 0.01,
            reseed_interval: 180,
            neighbor_bonus: 0.05,
            update_every_ticks: 4,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PressureSettings {
    pub queen_room_radius: i32,
    pub target_ants_per_tile: f32,
    pub desired_food_per_ant: f32,
    pub minimum_desired_food: f32,
    pub nursery_band_inner: f32,
    pub nursery_band_outer: f32,
    pub larvae_per_tile_target: f32,
}

impl Default for PressureSettings {
    fn default() -> Self {
        Self {
            queen_room_radius: 10,
            target_ants_per_tile: 0.35,
            desired_food_per_ant: 0.6,
            minimum_desired_food: 4.0,
            nursery_band_inner: 3.0,
            nursery_band_outer: 6.0,
            larvae_per_tile_target: 1.1,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BroodSettings {
    pub lay_interval: f32,
    pub lay_food_reserve: f32,
    pub lay_cost: f32,
    pub queen_min_energy: f32,
    pub queen_lay_energy_cost: f32,
    pub min_attendants: usize,
    pub attendant_radius: f32,
    pub egg_duration: f32,
    pub larva_growth_needed: f32,
    pub pupa_duration: f32,
    pub maturation_jitter: f32,
    pub feed_cost: f32,
    pub satiation_duration: f32,
    pub starvation_time: f32,
    pub waste_per_meal: f32,
    pub hunger_relief: f32,
    pub scent_gain: f32,
    pub scent_decay: f32,
}

impl Default for BroodSettings {
    fn default() -> Self {
        Self {
            lay_interval: 7.5,
            lay_food_reserve: 3.5,
            lay_cost: 0.25,
            queen_min_energy: 25.0,
            queen_lay_energy_cost: 15.0,
            min_attendants: 3,
            attendant_radius: 100.0,
            egg_duration: 4.0,
            larva_growth_needed: 8.0,
            pupa_duration: 4.0,
            maturation_jitter: 0.25,
            feed_cost: 0.25,
            satiation_duration: 5.0,
            starvation_time: 20.0,
            waste_per_meal: 0.12,
            hunger_relief: 2.5,
            scent_gain: 0.6,
            scent_decay: 0.97,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RoleSettings {
    pub reassess_period: f32,
    pub batch_size: usize,
    pub base_digger_fraction: f32,
    pub min_digger_fraction: f32,
    pub max_digger_fraction: f32,
    pub base_cleaner_fraction: f32,
    pub max_cleaner_fraction: f32,
    pub cleaner_pressure_gain: f32,
    pub nurse_age_fraction: f32,
    pub forager_age_fraction: f32,
    pub nurse_threshold_min: f32,
    pub nurse_threshold_max: f32,
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            reassess_period: 2.5,
            batch_size: 3,
            base_digger_fraction: 0.28,
            min_digger_fraction: 0.12,
            max_digger_fraction: 0.78,
            base_cleaner_fraction: 0.06,
            max_cleaner_fraction: 0.28,
            cleaner_pressure_gain: 0.45,
            nurse_age_fraction: 0.30,
            forager_age_fraction: 0.75,
            nurse_threshold_min: 0.3,
            nurse_threshold_max: 0.8,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WasteSettings {
    pub drop_chance_per_second: f32,
    pub drop_amount: f32,
    pub max_tile: f32,
    pub cleaner_sight_radius: i32,
    pub cleaner_pickup: f32,
    pub cleaner_dump_rows: usize,
    pub spoilage_rate: f32,
    pub spoilage_floor: f32,
}

impl Default for WasteSettings {
    fn default() -> Self {
        Self {
            drop_chance_per_second: 0.18,
            drop_amount: 0.25,
            max_tile: 6.0,
            cleaner_sight_radius: 7,
            cleaner_pickup: 1.2,
            cleaner_dump_rows: 2,
            spoilage_rate: 0.008,
            spoilage_floor: 6.0,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AntSettings {
    pub worker_speed: f32,
    pub turn_rate: f32,
    pub max_energy: f32,
    pub energy_decay: f32,
    pub eat_threshold: f32,
    pub meal_size: f32,
    pub energy_per_food: f32,
    pub queen_feed_amount: f32,
    pub lifespan_min: f32,
    pub lifespan_extra: f32,
    pub forage_rate: f32,
    pub initial_nurses: u32,
    pub initial_diggers: u32,
    pub initial_foragers: u32,
}

impl Default for AntSettings {
    fn default() -> Self {
        Self {
            worker_speed: 60.0,
            turn_rate: 6.0,
            max_energy: 100.0,
            energy_decay: 0.833,
            eat_threshold: 0.6,
            meal_size: 20.0,
            energy_per_food: 20.0,
            queen_feed_amount: 40.0,
            lifespan_min: 2000.0,
            lifespan_extra: 1000.0,
            forage_rate: 0.05,
            initial_nurses: 10,
            initial_diggers: 6,
            initial_foragers: 10,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed RNG seed. `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Food in the stores at reset.
    pub initial_food: f32,
    pub grid: GridConfig,
    pub dig: DigSettings,
    pub planner: PlannerSettings,
    pub air: AirSettings,
    pub pressure: PressureSettings,
    pub brood: BroodSettings,
    pub roles: RoleSettings,
    pub waste: WasteSettings,
    pub ants: AntSettings,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            initial_food: 12.0,
            grid: GridConfig::default(),
            dig: DigSettings::default(),
            planner: PlannerSettings::default(),
            air: AirSettings::default(),
            pressure: PressureSettings::default(),
            brood: BroodSettings::default(),
            roles: RoleSettings::default(),
            waste: WasteSettings::default(),
            ants: AntSettings::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let grid = &self.grid;
        if grid.width < 8 || grid.height < 8 {
            return Err(ConfigError::GridTooSmall {
                width: grid.width,
                height: grid.height,
            });
        }
        let max_split = grid.height - 3;
        if grid.region_split < 2 || grid.region_split > max_split {
            return Err(ConfigError::SplitOutOfRange {
                split: grid.region_split,
                max: max_split,
            });
        }
        if grid.cell_size <= 0.0 || !grid.cell_size.is_finite() {
            return Err(ConfigError::NonPositiveCellSize(grid.cell_size));
        }
        for (name, value) in [
            ("dig pheromone", self.dig.decay),
            ("brood scent", self.brood.scent_decay),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::DecayOutOfRange { name, value });
            }
        }
        if self.dig.room_radius_min > self.dig.room_radius_max {
            return Err(ConfigError::RoomRadiusRange {
                min: self.dig.room_radius_min,
                max: self.dig.room_radius_max,
            });
        }
        if self.planner.branch_cooldown_min > self.planner.branch_cooldown_max {
            return Err(ConfigError::BranchCooldownRange {
                min: self.planner.branch_cooldown_min,
                max: self.planner.branch_cooldown_max,
            });
        }
        if self.pressure.nursery_band_inner >= self.pressure.nursery_band_outer {
            return Err(ConfigError::NurseryBand {
                inner: self.pressure.nursery_band_inner,
                outer: self.pressure.nursery_band_outer,
            });
        }
        Ok(())
    }
}

/// Loads the simulation configuration from a TOML file or uses defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SimulationConfig> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?;
            let config: SimulationConfig = toml::from_str(&content)
                .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
            info!(path = %path.display(), "loaded config");
            config
        }
        None => {
            info!("no config file provided, using defaults");
            SimulationConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}

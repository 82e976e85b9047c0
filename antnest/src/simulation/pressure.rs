use shared::{GridPos, clamp01};

use super::map::TileGrid;
use super::waste::WasteField;
use crate::config::PressureSettings;

/// Colony-level pressures for one tick. Every pressure is in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSnapshot {
    pub ant_count: usize,
    pub stored_food: f32,
    pub nest_tiles: usize,
    pub space_pressure: f32,
    pub food_pressure: f32,
    pub waste_pressure: f32,
    pub brood_count: usize,
    pub brood_pressure: f32,
    pub larva_count: usize,
    pub nursery_tiles: usize,
    pub nursery_pressure: f32,
}

/// Used before the first computation: moderate space demand, nothing else pressing.
impl Default for PressureSnapshot {
    fn default() -> Self {
        Self {
            ant_count: 0,
            stored_food: 0.0,
            nest_tiles: 0,
            space_pressure: 0.3,
            food_pressure: 0.0,
            waste_pressure: 0.0,
            brood_count: 0,
            brood_pressure: 0.0,
            larva_count: 0,
            nursery_tiles: 0,
            nursery_pressure: 0.0,
        }
    }
}

/// World state the pressures are derived from.
pub struct PressureInputs<'a> {
    pub grid: &'a TileGrid,
    pub waste: &'a WasteField,
    pub queen_cell: Option<GridPos>,
    pub ant_count: usize,
    pub stored_food: f32,
    pub brood_count: usize,
    pub larva_count: usize,
}

pub fn compute_pressures(settings: &PressureSettings, inputs: &PressureInputs) -> PressureSnapshot {
    let radius = settings.queen_room_radius;
    let (nest_tiles, nursery_tiles, local_waste) = match inputs.queen_cell {
        Some(queen) => (
            inputs.grid.count_tunnels_in_square(queen, radius as i32),
            inputs.grid.count_tunnels_in_band(
                queen,
                settings.nursery_band_inner,
                settings.nursery_band_outer,
            ),
            inputs.waste.local_average(queen, radius),
        ),
        None => (0, 0, 0.0),
    };
    let ant_count = inputs.ant_count;

    let space_pressure = if nest_tiles == 0 {
        1.0
    } else {
        let capacity = (nest_tiles as f32 * settings.target_ants_per_tile).max(1.0);
        clamp01(ant_count as f32 / capacity)
    };

    let desired_food =
        (ant_count as f32 * settings.desired_food_per_ant).max(settings.minimum_desired_food);
    let food_pressure = clamp01(1.0 - inputs.stored_food / desired_food);

    let local_term = clamp01(local_waste * 0.5) * 0.6;
    let global_term = clamp01(inputs.waste.total() / nest_tiles.max(1) as f32 * 0.2) * 0.4;
    let waste_pressure = clamp01(local_term + global_term);

    let brood_count = inputs.brood_count;
    let brood_pressure = if nest_tiles == 0 {
        clamp01(brood_count as f32 * 0.15)
    } else {
        let brood_capacity = (nest_tiles as f32 * settings.target_ants_per_tile * 0.55).max(4.0);
        clamp01(brood_count as f32 / brood_capacity)
    };

    let nursery_capacity = nursery_tiles as f32 * settings.larvae_per_tile_target;
    let nursery_pressure =
        clamp01((inputs.larva_count as f32 - nursery_capacity) / nursery_capacity.max(1.0));

    PressureSnapshot {
        ant_count,
        stored_food: inputs.stored_food,
        nest_tiles,
        space_pressure,
        food_pressure,
        waste_pressure,
        brood_count,
        brood_pressure,
        larva_count: inputs.larva_count,
        nursery_tiles,
        nursery_pressure,
    }
}

/// Holds the last frozen snapshot; consumers never see a partial recompute.
#[derive(Debug, Clone)]
pub struct ColonyPressureModel {
    settings: PressureSettings,
    last: PressureSnapshot,
}

impl ColonyPressureModel {
    pub fn new(settings: PressureSettings) -> Self {
        Self {
            settings,
            last: PressureSnapshot::default(),
        }
    }

    pub fn update(&mut self, inputs: &PressureInputs) -> PressureSnapshot {
        self.last = compute_pressures(&self.settings, inputs);
        self.last
    }

    pub fn snapshot(&self) -> &PressureSnapshot {
        &self.last
    }

    pub fn reset(&mut self) {
        self.last = PressureSnapshot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::TileKind;

    fn nest(tunnels: i32) -> (TileGrid, GridPos) {
        let mut grid = TileGrid::new(40, 40, 5, 12.0);
        let queen = GridPos::new(20, 20);
        for i in 0..tunnels {
            grid.set(20 + i % 5, 20 + i / 5, TileKind::Tunnel);
        }
        (grid, queen)
    }

    fn inputs<'a>(grid: &'a TileGrid, waste: &'a WasteField, queen: Option<GridPos>) -> PressureInputs<'a> {
        PressureInputs {
            grid,
            waste,
            queen_cell: queen,
            ant_count: 7,
            stored_food: 2.0,
            brood_count: 3,
            larva_count: 0,
        }
    }

    #[test]
    fn no_nest_means_full_space_pressure() {
        let (grid, _) = nest(0);
        let waste = WasteField::new(40, 40, 6.0);
        let snap = compute_pressures(&PressureSettings::default(), &inputs(&grid, &waste, None));
        assert_eq!(snap.nest_tiles, 0);
        assert_eq!(snap.space_pressure, 1.0);
        assert!((snap.brood_pressure - 0.45).abs() < 1e-6);
    }

    #[test]
    fn space_pressure_scales_with_nest_size() {
        let (grid, queen) = nest(20);
        let waste = WasteField::new(40, 40, 6.0);
        let snap =
            compute_pressures(&PressureSettings::default(), &inputs(&grid, &waste, Some(queen)));
        assert_eq!(snap.nest_tiles, 20);
        // 7 ants over 20 * 0.35 = 7 capacity.
        assert!((snap.space_pressure - 1.0).abs() < 1e-6);
        // desired food = max(4, 4.2) = 4.2
        assert!((snap.food_pressure - (1.0 - 2.0 / 4.2)).abs() < 1e-5);
        assert_eq!(snap.waste_pressure, 0.0);
    }

    #[test]
    fn pressures_stay_in_unit_range() {
        let (grid, queen) = nest(3);
        let mut waste = WasteField::new(40, 40, 6.0);
        for i in 0..10 {
            waste.add(GridPos::new(18 + i, 20), 6.0);
        }
        let mut input = inputs(&grid, &waste, Some(queen));
        input.ant_count = 500;
        input.brood_count = 90;
        input.larva_count = 80;
        let snap = compute_pressures(&PressureSettings::default(), &input);
        for p in [
            snap.space_pressure,
            snap.food_pressure,
            snap.waste_pressure,
            snap.brood_pressure,
            snap.nursery_pressure,
        ] {
            assert!((0.0..=1.0).contains(&p), "pressure out of range: {}", p);
        }
        assert_eq!(snap.nursery_pressure, 1.0);
        assert!(snap.waste_pressure >= 0.4);
    }

    #[test]
    fn single_larva_with_no_nursery_tiles_is_full_pressure() {
        let (grid, queen) = nest(0);
        let waste = WasteField::new(40, 40, 6.0);
        let mut input = inputs(&grid, &waste, Some(queen));
        input.larva_count = 1;
        let snap = compute_pressures(&PressureSettings::default(), &input);
        assert_eq!(snap.nursery_tiles, 0);
        assert_eq!(snap.nursery_pressure, 1.0);
    }

    #[test]
    fn nest_tiles_count_the_whole_square_around_the_queen() {
        let mut grid = TileGrid::new(40, 40, 5, 12.0);
        let queen = GridPos::new(20, 20);
        let reach = PressureSettings::default().queen_room_radius as i32;
        // Corner of the square lies outside the circle of the same radius.
        grid.set(20 + reach, 20 + reach, TileKind::Tunnel);
        grid.set(20 + reach + 1, 20, TileKind::Tunnel);
        let waste = WasteField::new(40, 40, 6.0);
        let snap =
            compute_pressures(&PressureSettings::default(), &inputs(&grid, &waste, Some(queen)));
        assert_eq!(snap.nest_tiles, 1);
    }

    #[test]
    fn model_starts_from_safe_defaults() {
        let model = ColonyPressureModel::new(PressureSettings::default());
        assert_eq!(model.snapshot().space_pressure, 0.3);
        assert_eq!(model.snapshot().waste_pressure, 0.0);
    }
}

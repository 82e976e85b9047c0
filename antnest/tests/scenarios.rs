use antnest::config::{
    BroodSettings, DigSettings, GridConfig, PlannerSettings, SimulationConfig,
};
use antnest::simulation::brood::BroodStage;
use antnest::simulation::excavation::{
    DigState, DigTarget, Digger, ExcavationContext, ExcavationEngine, NoopCollaborators,
};
use antnest::simulation::waste::WasteField;
use antnest::simulation::{
    BroodSystem, ExcavationPlanner, FIXED_DT, PressureSnapshot, Simulation, TileGrid,
};
use glam::Vec2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use shared::{Cardinal, GridPos, TileKind};

fn soil_world(seed: GridPos) -> TileGrid {
    let mut grid = TileGrid::new(40, 60, 5, 12.0);
    grid.set(seed.x, seed.y, TileKind::Tunnel);
    grid.dig_start = seed;
    grid.entrance = seed;
    grid.queen_home = seed;
    grid
}

fn small_sim_config(seed: u64) -> SimulationConfig {
    SimulationConfig {
        seed: Some(seed),
        grid: GridConfig {
            width: 60,
            height: 60,
            region_split: 20,
            ..GridConfig::default()
        },
        ..SimulationConfig::default()
    }
}

/// Lets one agent pick a target through the engine and hits it until it opens.
fn dig_chosen_target(
    engine: &mut ExcavationEngine,
    planner: &mut ExcavationPlanner,
    grid: &mut TileGrid,
    state: &mut DigState,
    from: GridPos,
    rng: &mut StdRng,
) -> DigTarget {
    let pressure = PressureSnapshot::default();
    let mut hooks = NoopCollaborators;
    let mut ctx = ExcavationContext {
        grid,
        air: None,
        waste: None,
        pressure: &pressure,
        planner: Some(planner),
        hooks: &mut hooks,
        queen_pos: None,
        chamber: None,
        nursery_band: (3.0, 6.0),
    };
    let mut agent = Digger {
        pos: ctx.grid.grid_to_world(from),
        carrying: false,
        is_digger: true,
        state,
    };
    let target = engine
        .choose_dig_target(&mut agent, &mut ctx, rng)
        .expect("planner issues a target");
    agent.state.target = Some(target);

    let mut hits = 0;
    while ctx.grid.at(target.pos) == TileKind::Soil {
        assert!(engine.apply_dig_action(&mut agent, &mut ctx, target.pos.x, target.pos.y, rng));
        hits += 1;
        assert!(hits < 20, "tile never gave way");
    }
    target
}

#[test]
fn planner_corridor_stays_single_until_its_branch_cooldown() {
    let seed = GridPos::new(20, 10);
    let mut grid = soil_world(seed);
    let mut rng = StdRng::seed_from_u64(11);
    let mut engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
    engine.reset(&grid);
    let mut planner = ExcavationPlanner::new(PlannerSettings::default());
    planner.reset(&grid, &mut rng);
    let trunk = planner.workfaces()[0].id;
    let cooldown = planner.workfaces()[0].branch_cooldown_steps as usize;
    let steps = cooldown + 2;

    let mut state = DigState::default();
    let mut tip = seed;
    for step in 1..=steps {
        let target =
            dig_chosen_target(&mut engine, &mut planner, &mut grid, &mut state, tip, &mut rng);
        assert_eq!(target.workface, Some(trunk), "step {step} left the trunk");
        assert_eq!(target.pos, seed.offset(0, step as i32), "trunk heads straight down");
        tip = target.pos;

        if step < cooldown {
            assert_eq!(planner.workfaces().len(), 1, "branched early at step {step}");
            for i in 0..=step as i32 {
                let p = seed.offset(0, i);
                let open = p.neighbors4().iter().filter(|n| grid.at(**n).is_open()).count();
                assert!(open <= 2, "side opening at {p:?}");
            }
        } else {
            assert_eq!(planner.workfaces().len(), 2, "no branch after step {step}");
        }
    }
    assert_eq!(grid.tunnel_count(), steps + 1);
    assert_eq!(planner.workfaces()[0].tip, tip);

    let branch = planner.workfaces()[1].clone();
    let junction = seed.offset(0, cooldown as i32 - 1);
    assert_eq!(branch.tip, junction);
    assert_eq!(branch.branch_depth, 1);
    assert!(matches!(branch.heading, Cardinal::East | Cardinal::West));

    // A second digger standing at the junction takes up the branch.
    let mut helper = DigState::default();
    let side =
        dig_chosen_target(&mut engine, &mut planner, &mut grid, &mut helper, junction, &mut rng);
    assert_eq!(side.workface, Some(branch.id));
    assert_eq!(side.pos, junction.step(branch.heading));
    assert_eq!(grid.at(side.pos), TileKind::Tunnel);
    assert_eq!(grid.tunnel_count(), steps + 2);
    assert_eq!(planner.workface(branch.id).map(|w| w.tip), Some(side.pos));
}

#[test]
fn carving_moves_the_frontier_and_pheromone_decays_away() {
    let seed = GridPos::new(15, 10);
    let mut grid = soil_world(seed);
    let mut rng = StdRng::seed_from_u64(5);
    let mut engine = ExcavationEngine::for_grid(&grid, DigSettings::default());
    engine.reset(&grid);

    let target = GridPos::new(15, 11);
    let pressure = PressureSnapshot::default();
    let mut hooks = NoopCollaborators;
    let mut state = DigState::default();
    {
        let mut ctx = ExcavationContext {
            grid: &mut grid,
            air: None,
            waste: None,
            pressure: &pressure,
            planner: None,
            hooks: &mut hooks,
            queen_pos: None,
            chamber: None,
            nursery_band: (3.0, 6.0),
        };
        let mut agent = Digger {
            pos: ctx.grid.grid_to_world(seed),
            carrying: false,
            is_digger: true,
            state: &mut state,
        };
        while ctx.grid.at(target) == TileKind::Soil {
            assert!(engine.apply_dig_action(&mut agent, &mut ctx, target.x, target.y, &mut rng));
        }
    }

    assert!(!engine.is_frontier(target.x, target.y));
    for n in target.neighbors4() {
        if grid.at(n) == TileKind::Soil {
            assert!(engine.is_frontier(n.x, n.y), "{n:?} should be frontier");
        }
    }
    assert!(engine.dig_pheromone().max_value() > 0.0);

    for _ in 0..12000 {
        engine.update_frontier_tiles(&grid);
    }
    assert_eq!(engine.dig_pheromone().max_value(), 0.0);
    assert_eq!(grid.get(target.x, target.y), TileKind::Tunnel);
}

#[test]
fn starved_larva_is_removed_and_never_hatches() {
    let mut brood = BroodSystem::new(30, 30, 12.0, BroodSettings::default());
    let mut waste = WasteField::new(30, 30, 6.0);
    let mut rng = StdRng::seed_from_u64(3);
    let mut food = 0.0;
    let key = brood.spawn_egg(Vec2::new(120.0, 120.0), &mut rng);
    {
        let larva = brood.get_mut(key).expect("entry");
        larva.stage = BroodStage::Larva;
        larva.satiation_timer = 0.0;
        larva.hunger_timer = 20.0;
    }

    let report = brood.update(0.1, None, &mut food, &mut waste, &mut rng);
    assert_eq!(report.starved, 1);
    assert!(report.hatched.is_empty());
    assert!(brood.get(key).is_none());
    assert!(waste.total() > 0.0);

    for _ in 0..100 {
        let report = brood.update(0.5, None, &mut food, &mut waste, &mut rng);
        assert!(report.hatched.is_empty());
    }
}

#[test]
fn queen_does_not_lay_below_the_food_reserve() {
    let mut config = small_sim_config(21);
    config.initial_food = 1.0;
    config.ants.forage_rate = 0.0;
    let mut sim = Simulation::new(&config);

    for _ in 0..(20.0 / FIXED_DT) as usize {
        sim.tick(FIXED_DT);
        assert!(sim.colony.stored_food <= 1.0 + 1e-4);
    }
    assert!(sim.brood.is_empty());
}

#[test]
fn fed_colony_lays_within_a_lay_interval() {
    let mut sim = Simulation::new(&small_sim_config(22));
    let lay_interval = sim.config.brood.lay_interval;
    for _ in 0..((lay_interval + 1.0) / FIXED_DT) as usize {
        sim.tick(FIXED_DT);
    }
    assert!(!sim.brood.is_empty());
    assert!(sim.summary().queen_alive);
}

#[test]
fn long_run_keeps_the_nest_consistent() {
    let mut sim = Simulation::new(&small_sim_config(9));
    for _ in 0..3000 {
        sim.tick(FIXED_DT);
    }
    let summary = sim.summary();
    assert_eq!(summary.tick, 3000);
    assert!(summary.ants > 0);
    assert!(summary.stored_food >= 0.0);
    for ant in sim.colony.ants.values() {
        assert!(ant.pos.is_finite());
        assert!(!sim.grid.blocks_movement(ant.pos) || ant.is_queen());
    }
    for (_, entry) in sim.brood.entries() {
        if let Some(holder) = entry.locked_by {
            assert!(sim.colony.ants.contains_key(holder), "lock held by a dead nurse");
        }
    }
}

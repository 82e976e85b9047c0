use rand::Rng;
use shared::clamp01;

use super::pressure::PressureSnapshot;
use crate::config::RoleSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Queen,
    Nurse,
    Digger,
    Forager,
    Cleaner,
}

/// Target share of the worker force per task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoleFractions {
    pub digger: f32,
    pub cleaner: f32,
    pub forager: f32,
}

/// Current head count of the roles the allocator balances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleCensus {
    pub workers: usize,
    pub diggers: usize,
    pub cleaners: usize,
}

/// Diggers follow space pressure and give way to food pressure; cleaners follow
/// waste pressure and are carved out of the digger share first.
pub fn desired_fractions(settings: &RoleSettings, pressure: &PressureSnapshot) -> RoleFractions {
    let digger = clamp01(
        settings.base_digger_fraction + pressure.space_pressure * 0.45
            - pressure.food_pressure * 0.30,
    )
    .clamp(settings.min_digger_fraction, settings.max_digger_fraction);

    let cleaner = clamp01(
        (settings.base_cleaner_fraction + pressure.waste_pressure * settings.cleaner_pressure_gain)
            .min(settings.max_cleaner_fraction),
    );

    let digger = clamp01(digger * clamp01(1.0 - cleaner));
    let forager = clamp01(1.0 - digger - cleaner);
    RoleFractions {
        digger,
        cleaner,
        forager,
    }
}

/// Role for one more worker given the current census: fill cleaners, then
/// diggers, and send the rest foraging.
pub fn pick_role_for_new_worker(
    settings: &RoleSettings,
    pressure: &PressureSnapshot,
    census: RoleCensus,
) -> Role {
    let desired = desired_fractions(settings, pressure);
    let next = (census.workers + 1) as f32;
    if census.cleaners < (next * desired.cleaner).round() as usize {
        return Role::Cleaner;
    }
    if census.diggers < (next * desired.digger).round() as usize {
        return Role::Digger;
    }
    Role::Forager
}

/// Age polyethism. Young workers nurse, old ones forage, and the middle-aged
/// follow their preference unless they are busy cleaning.
pub fn age_role(settings: &RoleSettings, age_fraction: f32, preference: Role, cleaning: bool) -> Role {
    let age = clamp01(age_fraction);
    if age <= settings.nurse_age_fraction {
        Role::Nurse
    } else if age <= settings.forager_age_fraction {
        if cleaning {
            Role::Cleaner
        } else {
            match preference {
                Role::Cleaner => Role::Cleaner,
                _ => Role::Digger,
            }
        }
    } else {
        Role::Forager
    }
}

/// Personal brood-scent level above which a worker drops its task to nurse.
pub fn random_nurse_threshold(settings: &RoleSettings, rng: &mut impl Rng) -> f32 {
    if settings.nurse_threshold_max <= settings.nurse_threshold_min {
        return settings.nurse_threshold_min;
    }
    rng.random_range(settings.nurse_threshold_min..settings.nurse_threshold_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn pressure(space: f32, food: f32, waste: f32) -> PressureSnapshot {
        PressureSnapshot {
            space_pressure: space,
            food_pressure: food,
            waste_pressure: waste,
            ..PressureSnapshot::default()
        }
    }

    #[test]
    fn fractions_sum_to_one_and_respect_caps() {
        let settings = RoleSettings::default();
        for &(s, f, w) in &[(0.0, 0.0, 0.0), (1.0, 0.0, 1.0), (0.0, 1.0, 0.5), (1.0, 1.0, 1.0)] {
            let d = desired_fractions(&settings, &pressure(s, f, w));
            assert!((d.digger + d.cleaner + d.forager - 1.0).abs() < 1e-5);
            assert!(d.cleaner <= settings.max_cleaner_fraction + 1e-6);
            assert!(d.digger <= settings.max_digger_fraction + 1e-6);
        }
    }

    #[test]
    fn space_pressure_recruits_diggers() {
        let settings = RoleSettings::default();
        let calm = desired_fractions(&settings, &pressure(0.0, 0.0, 0.0));
        let cramped = desired_fractions(&settings, &pressure(1.0, 0.0, 0.0));
        assert!(cramped.digger > calm.digger);
        let hungry = desired_fractions(&settings, &pressure(0.0, 1.0, 0.0));
        assert!((hungry.digger - settings.min_digger_fraction * (1.0 - hungry.cleaner)).abs() < 1e-5);
    }

    #[test]
    fn new_workers_fill_the_largest_gap() {
        let settings = RoleSettings::default();
        let dirty = pressure(0.3, 0.0, 1.0);
        let census = RoleCensus {
            workers: 20,
            diggers: 10,
            cleaners: 0,
        };
        assert_eq!(pick_role_for_new_worker(&settings, &dirty, census), Role::Cleaner);

        let cramped = pressure(1.0, 0.0, 0.0);
        let census = RoleCensus {
            workers: 20,
            diggers: 2,
            cleaners: 2,
        };
        assert_eq!(pick_role_for_new_worker(&settings, &cramped, census), Role::Digger);

        let census = RoleCensus {
            workers: 20,
            diggers: 20,
            cleaners: 5,
        };
        assert_eq!(pick_role_for_new_worker(&settings, &cramped, census), Role::Forager);
    }

    #[test]
    fn age_bands() {
        let settings = RoleSettings::default();
        assert_eq!(age_role(&settings, 0.1, Role::Digger, false), Role::Nurse);
        assert_eq!(age_role(&settings, 0.5, Role::Forager, false), Role::Digger);
        assert_eq!(age_role(&settings, 0.5, Role::Cleaner, false), Role::Cleaner);
        assert_eq!(age_role(&settings, 0.5, Role::Digger, true), Role::Cleaner);
        assert_eq!(age_role(&settings, 0.9, Role::Digger, false), Role::Forager);
    }

    #[test]
    fn nurse_thresholds_stay_in_range() {
        let settings = RoleSettings::default();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            let t = random_nurse_threshold(&settings, &mut rng);
            assert!((0.3..0.8).contains(&t));
        }
    }
}

use glam::Vec2;
use rand::Rng;
use shared::GridPos;
use slotmap::{SlotMap, new_key_type};
use tracing::debug;

use super::Timer;
use super::ant::AntKey;
use super::field::ScalarField;
use super::waste::WasteField;
use crate::config::BroodSettings;

new_key_type! {
    /// Key for brood slotmap.
    pub struct BroodKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroodStage {
    Egg,
    Larva,
    Pupa,
}

/// Jittered per-entry stage lengths, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageDurations {
    pub egg: f32,
    /// Fed seconds a larva needs before pupating.
    pub larva_growth: f32,
    pub pupa: f32,
}

#[derive(Debug, Clone)]
pub struct BroodEntry {
    pub pos: Vec2,
    pub stage: BroodStage,
    pub age: f32,
    /// Seconds spent in the current stage. For larvae this only counts fed time.
    pub stage_timer: f32,
    pub durations: StageDurations,
    pub satiation_timer: f32,
    pub hunger_timer: f32,
    pub is_hungry: bool,
    /// Nurse currently carrying this entry.
    pub locked_by: Option<AntKey>,
}

impl BroodEntry {
    /// How badly the entry needs a nurse, in `[0, 1]`. Only larvae ask for care.
    pub fn care_urgency(&self, settings: &BroodSettings) -> f32 {
        if self.stage != BroodStage::Larva {
            return 0.0;
        }
        let feeding = 1.0 - (self.satiation_timer / settings.satiation_duration.max(1e-3)).min(1.0);
        let hunger = (self.hunger_timer / settings.starvation_time.max(1e-3)).min(1.0);
        feeding.max(hunger).max(0.0)
    }
}

/// The queen as seen by the lay action.
pub struct QueenView<'a> {
    pub pos: Vec2,
    pub energy: &'a mut f32,
    /// Workers within the attendant radius.
    pub attendants: usize,
}

/// What one brood update produced.
#[derive(Debug, Default)]
pub struct BroodReport {
    pub laid: Option<BroodKey>,
    /// Positions of pupae that finished this update.
    pub hatched: Vec<Vec2>,
    pub starved: usize,
}

pub struct BroodSystem {
    settings: BroodSettings,
    cell_size: f32,
    entries: SlotMap<BroodKey, BroodEntry>,
    scent: ScalarField,
    lay_timer: Timer,
}

impl BroodSystem {
    pub fn new(width: usize, height: usize, cell_size: f32, settings: BroodSettings) -> Self {
        let lay_timer = Timer::new(settings.lay_interval, 0.0);
        Self {
            settings,
            cell_size,
            entries: SlotMap::with_key(),
            scent: ScalarField::new(width, height),
            lay_timer,
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.scent.fill(0.0);
        self.lay_timer = Timer::new(self.settings.lay_interval, 0.0);
    }

    pub fn settings(&self) -> &BroodSettings {
        &self.settings
    }

    pub fn entries(&self) -> &SlotMap<BroodKey, BroodEntry> {
        &self.entries
    }

    pub fn get(&self, key: BroodKey) -> Option<&BroodEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: BroodKey) -> Option<&mut BroodEntry> {
        self.entries.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn larva_count(&self) -> usize {
        self.entries
            .values()
            .filter(|b| b.stage == BroodStage::Larva)
            .count()
    }

    pub fn scent(&self) -> &ScalarField {
        &self.scent
    }

    pub fn scent_at(&self, pos: Vec2) -> f32 {
        let (x, y) = self.cell_of(pos);
        self.scent.get(x, y)
    }

    fn cell_of(&self, pos: Vec2) -> (i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
        )
    }

    /// Lay gating: an energetic queen, a food reserve and enough attendants.
    pub fn can_lay(&self, queen: &QueenView, stored_food: f32) -> bool {
        *queen.energy > self.settings.queen_min_energy
            && stored_food >= self.settings.lay_food_reserve
            && queen.attendants >= self.settings.min_attendants
    }

    /// Places a new egg next to the queen. No gating.
    pub fn spawn_egg(&mut self, queen_pos: Vec2, rng: &mut impl Rng) -> BroodKey {
        let s = &self.settings;
        let mut jitter = || (rng.random::<f32>() - 0.5) * 6.0;
        let pos = queen_pos + Vec2::new(jitter(), 6.0 + jitter());
        let mut scale = || 1.0 + (rng.random::<f32>() - 0.5) * s.maturation_jitter;
        let durations = StageDurations {
            egg: s.egg_duration * scale(),
            larva_growth: s.larva_growth_needed * scale(),
            pupa: s.pupa_duration * scale(),
        };
        self.entries.insert(BroodEntry {
            pos,
            stage: BroodStage::Egg,
            age: 0.0,
            stage_timer: 0.0,
            durations,
            satiation_timer: 0.0,
            hunger_timer: 0.0,
            is_hungry: false,
            locked_by: None,
        })
    }

    /// Advances the lay timer, every entry and the scent field by `dt`.
    pub fn update(
        &mut self,
        dt: f32,
        queen: Option<QueenView>,
        stored_food: &mut f32,
        waste: &mut WasteField,
        rng: &mut impl Rng,
    ) -> BroodReport {
        let mut report = BroodReport::default();

        self.lay_timer.update(dt);
        if self.lay_timer.is_ready() {
            self.lay_timer.value = 0.0;
            if let Some(queen) = queen.filter(|q| self.can_lay(q, *stored_food)) {
                if *stored_food >= self.settings.lay_cost {
                    *stored_food -= self.settings.lay_cost;
                    *queen.energy -= self.settings.queen_lay_energy_cost;
                    let key = self.spawn_egg(queen.pos, rng);
                    debug!(brood = self.entries.len(), "queen laid an egg");
                    report.laid = Some(key);
                }
            }
        }

        let s = &self.settings;
        let mut finished = Vec::new();
        for (key, b) in self.entries.iter_mut() {
            b.age += dt;
            match b.stage {
                BroodStage::Egg => {
                    b.stage_timer += dt;
                    if b.stage_timer >= b.durations.egg {
                        b.stage = BroodStage::Larva;
                        b.stage_timer = 0.0;
                        b.satiation_timer = s.satiation_duration;
                    }
                }
                BroodStage::Larva => {
                    b.satiation_timer = (b.satiation_timer - dt).max(0.0);
                    if b.satiation_timer > 0.0 {
                        b.is_hungry = false;
                        b.stage_timer += dt;
                    } else {
                        b.is_hungry = true;
                        b.hunger_timer += dt;
                    }
                    if b.is_hungry && b.hunger_timer > s.starvation_time {
                        finished.push((key, false));
                        continue;
                    }
                    if b.stage_timer >= b.durations.larva_growth {
                        b.stage = BroodStage::Pupa;
                        b.stage_timer = 0.0;
                        b.is_hungry = false;
                        b.hunger_timer = 0.0;
                    }
                }
                BroodStage::Pupa => {
                    b.stage_timer += dt;
                    if b.stage_timer >= b.durations.pupa {
                        finished.push((key, true));
                    }
                }
            }
        }

        for (key, matured) in finished {
            let Some(b) = self.entries.remove(key) else {
                continue;
            };
            let (x, y) = self.cell_of(b.pos);
            if matured {
                report.hatched.push(b.pos);
            } else {
                waste.add(GridPos::new(x, y), self.settings.waste_per_meal * 1.5);
                report.starved += 1;
                debug!(x, y, "larva starved");
            }
        }

        self.emit_scent();
        report
    }

    fn emit_scent(&mut self) {
        let height = self.scent.height;
        self.scent
            .decay_rows(0, height, 0, self.settings.scent_decay, 1e-3);
        for b in self.entries.values() {
            if b.locked_by.is_some() {
                continue;
            }
            let urgency = b.care_urgency(&self.settings);
            if urgency > 0.05 {
                let x = (b.pos.x / self.cell_size).floor() as i32;
                let y = (b.pos.y / self.cell_size).floor() as i32;
                self.scent
                    .add_clamped(x, y, urgency * self.settings.scent_gain, 1.0);
            }
        }
    }

    /// Feeds a larva from the stores. Fails for other stages or when food is short.
    pub fn feed(&mut self, key: BroodKey, stored_food: &mut f32, waste: &mut WasteField) -> bool {
        let s = &self.settings;
        let Some(b) = self.entries.get_mut(key) else {
            return false;
        };
        if b.stage != BroodStage::Larva || *stored_food < s.feed_cost {
            return false;
        }
        *stored_food -= s.feed_cost;
        b.satiation_timer = s.satiation_duration;
        b.hunger_timer = (b.hunger_timer - s.hunger_relief).max(0.0);
        b.is_hungry = false;
        let cell = GridPos::new(
            (b.pos.x / self.cell_size).floor() as i32,
            (b.pos.y / self.cell_size).floor() as i32,
        );
        waste.add(cell, s.waste_per_meal);
        true
    }

    /// Claims an entry for `nurse`. Fails if another nurse already holds it.
    pub fn try_lock(&mut self, key: BroodKey, nurse: AntKey) -> bool {
        match self.entries.get_mut(key) {
            Some(b) if b.locked_by.is_none_or(|holder| holder == nurse) => {
                b.locked_by = Some(nurse);
                true
            }
            _ => false,
        }
    }

    pub fn release(&mut self, key: BroodKey, nurse: AntKey) {
        if let Some(b) = self.entries.get_mut(key) {
            if b.locked_by == Some(nurse) {
                b.locked_by = None;
            }
        }
    }

    /// Drops every lock held by `nurse`, e.g. when it dies.
    pub fn release_all(&mut self, nurse: AntKey) {
        for b in self.entries.values_mut() {
            if b.locked_by == Some(nurse) {
                b.locked_by = None;
            }
        }
    }

    /// Moves an entry. Only its holder may move a locked entry.
    pub fn carry_to(&mut self, key: BroodKey, nurse: AntKey, pos: Vec2) -> bool {
        match self.entries.get_mut(key) {
            Some(b) if b.locked_by == Some(nurse) => {
                b.pos = pos;
                true
            }
            _ => false,
        }
    }

    /// Unlocked larva near `pos` that most needs feeding.
    pub fn neediest_near(&self, pos: Vec2, radius: f32) -> Option<BroodKey> {
        let r2 = radius * radius;
        self.entries
            .iter()
            .filter(|(_, b)| b.locked_by.is_none() && b.pos.distance_squared(pos) <= r2)
            .map(|(k, b)| (k, b.care_urgency(&self.settings)))
            .filter(|(_, urgency)| *urgency > 0.05)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(k, _)| k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use slotmap::KeyData;

    fn system() -> BroodSystem {
        BroodSystem::new(40, 40, 12.0, BroodSettings::default())
    }

    fn queen(energy: &mut f32, attendants: usize) -> QueenView<'_> {
        QueenView {
            pos: Vec2::new(240.0, 240.0),
            energy,
            attendants,
        }
    }

    fn nurse(id: u64) -> AntKey {
        AntKey::from(KeyData::from_ffi(id | (1 << 32)))
    }

    #[test]
    fn laying_needs_food_reserve() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut brood = system();
        let mut waste = WasteField::new(40, 40, 6.0);
        let mut energy = 100.0;
        let mut food = 3.0;
        for _ in 0..100 {
            let report = brood.update(0.5, Some(queen(&mut energy, 5)), &mut food, &mut waste, &mut rng);
            assert!(report.laid.is_none());
        }
        assert!(brood.is_empty());
        assert_eq!(food, 3.0);
    }

    #[test]
    fn laying_needs_attendants_and_energy() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut brood = system();
        let mut waste = WasteField::new(40, 40, 6.0);
        let mut food = 50.0;
        let mut energy = 100.0;
        brood.update(8.0, Some(queen(&mut energy, 2)), &mut food, &mut waste, &mut rng);
        assert!(brood.is_empty());
        let mut tired = 20.0;
        brood.update(8.0, Some(queen(&mut tired, 5)), &mut food, &mut waste, &mut rng);
        assert!(brood.is_empty());
        let report = brood.update(8.0, Some(queen(&mut energy, 5)), &mut food, &mut waste, &mut rng);
        assert!(report.laid.is_some());
        assert_eq!(energy, 85.0);
        assert_eq!(food, 49.75);
    }

    #[test]
    fn fed_brood_hatches_through_every_stage() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut brood = system();
        let mut waste = WasteField::new(40, 40, 6.0);
        let mut food = 100.0;
        let key = brood.spawn_egg(Vec2::new(240.0, 240.0), &mut rng);
        let mut seen = vec![BroodStage::Egg];
        let mut hatched = 0;
        for _ in 0..400 {
            brood.feed(key, &mut food, &mut waste);
            let report = brood.update(0.1, Some(queen(&mut 0.0, 0)), &mut food, &mut waste, &mut rng);
            hatched += report.hatched.len();
            if let Some(b) = brood.get(key) {
                if seen.last() != Some(&b.stage) {
                    seen.push(b.stage);
                }
            }
        }
        assert_eq!(seen, vec![BroodStage::Egg, BroodStage::Larva, BroodStage::Pupa]);
        assert_eq!(hatched, 1);
        assert!(brood.is_empty());
        assert!(waste.total() > 0.0);
    }

    #[test]
    fn starving_larva_is_removed_and_never_hatches() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut brood = system();
        let mut waste = WasteField::new(40, 40, 6.0);
        let mut food = 0.0;
        let key = brood.spawn_egg(Vec2::new(240.0, 240.0), &mut rng);
        if let Some(b) = brood.get_mut(key) {
            b.stage = BroodStage::Larva;
            b.satiation_timer = 0.0;
            b.hunger_timer = 25.0;
        }
        let report = brood.update(0.1, Some(queen(&mut 0.0, 0)), &mut food, &mut waste, &mut rng);
        assert_eq!(report.starved, 1);
        assert!(report.hatched.is_empty());
        assert!(brood.get(key).is_none());
        assert!((waste.total() - 0.18).abs() < 1e-4);
        let report = brood.update(0.1, Some(queen(&mut 0.0, 0)), &mut food, &mut waste, &mut rng);
        assert!(report.hatched.is_empty());
    }

    #[test]
    fn only_one_nurse_may_hold_an_entry() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut brood = system();
        let key = brood.spawn_egg(Vec2::new(100.0, 100.0), &mut rng);
        let (a, b) = (nurse(1), nurse(2));
        assert!(brood.try_lock(key, a));
        assert!(brood.try_lock(key, a));
        assert!(!brood.try_lock(key, b));
        assert!(!brood.carry_to(key, b, Vec2::ZERO));
        assert!(brood.carry_to(key, a, Vec2::new(50.0, 50.0)));
        brood.release(key, b);
        assert_eq!(brood.get(key).and_then(|e| e.locked_by), Some(a));
        brood.release_all(a);
        assert!(brood.try_lock(key, b));
    }

    #[test]
    fn hungry_larvae_emit_scent_and_recruit() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut brood = system();
        let mut waste = WasteField::new(40, 40, 6.0);
        let mut food = 0.0;
        let pos = Vec2::new(120.0, 120.0);
        let key = brood.spawn_egg(pos, &mut rng);
        if let Some(b) = brood.get_mut(key) {
            b.stage = BroodStage::Larva;
            b.satiation_timer = 0.0;
        }
        brood.update(0.1, Some(queen(&mut 0.0, 0)), &mut food, &mut waste, &mut rng);
        let entry_pos = brood.get(key).map(|b| b.pos).unwrap_or(pos);
        assert!(brood.scent_at(entry_pos) > 0.5);
        assert_eq!(brood.neediest_near(entry_pos, 24.0), Some(key));

        // A carried larva does not call for more nurses.
        assert!(brood.try_lock(key, nurse(3)));
        assert_eq!(brood.neediest_near(entry_pos, 24.0), None);
    }
}

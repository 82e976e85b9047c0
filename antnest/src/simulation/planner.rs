use glam::Vec2;
use rand::Rng;
use shared::{Cardinal, GridPos, TileKind};
use tracing::{debug, warn};

use super::map::TileGrid;
use super::pressure::PressureSnapshot;
use crate::config::PlannerSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkfaceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkfaceKind {
    Trunk,
    Branch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkfaceStatus {
    Active,
    Stalled,
}

/// A directed tunnel tip that the planner grows one tile at a time.
#[derive(Debug, Clone)]
pub struct Workface {
    pub id: WorkfaceId,
    pub kind: WorkfaceKind,
    /// Most recently carved tile of this lineage.
    pub tip: GridPos,
    pub heading: Cardinal,
    pub status: WorkfaceStatus,
    pub branch_depth: u32,
    pub branch_cooldown_steps: u32,
    pub steps_since_branch: u32,
    pub steps: u32,
    pub parent: Option<WorkfaceId>,
    pub last_junction: Option<GridPos>,
}

/// A carved tile a branch may later sprout from.
#[derive(Debug, Clone)]
pub struct Junction {
    pub pos: GridPos,
    pub workface: WorkfaceId,
    pub heading: Cardinal,
    pub depth: u32,
    pub exhausted: bool,
}

/// A tile the planner wants dug next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedTarget {
    pub pos: GridPos,
    pub workface: WorkfaceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerDebugState {
    pub total: usize,
    pub active: usize,
}

#[derive(Debug, Clone)]
pub struct ExcavationPlanner {
    settings: PlannerSettings,
    workfaces: Vec<Workface>,
    junctions: Vec<Junction>,
    next_id: u32,
    update_counter: u32,
}

impl ExcavationPlanner {
    pub fn new(settings: PlannerSettings) -> Self {
        Self {
            settings,
            workfaces: Vec::new(),
            junctions: Vec::new(),
            next_id: 0,
            update_counter: 0,
        }
    }

    pub fn workfaces(&self) -> &[Workface] {
        &self.workfaces
    }

    pub fn junctions(&self) -> &[Junction] {
        &self.junctions
    }

    pub fn debug_state(&self) -> PlannerDebugState {
        PlannerDebugState {
            total: self.workfaces.len(),
            active: self
                .workfaces
                .iter()
                .filter(|w| w.status == WorkfaceStatus::Active)
                .count(),
        }
    }

    pub fn workface(&self, id: WorkfaceId) -> Option<&Workface> {
        self.workfaces.iter().find(|w| w.id == id)
    }

    /// Drops every workface and plants a single downward trunk at the nearest
    /// open tile to `grid.dig_start`.
    pub fn reset(&mut self, grid: &TileGrid, rng: &mut impl Rng) {
        self.workfaces.clear();
        self.junctions.clear();
        self.next_id = 0;
        self.update_counter = 0;

        let Some(start) = self.find_starting_tunnel(grid, grid.dig_start) else {
            warn!(x = grid.dig_start.x, y = grid.dig_start.y, "planner found no starting tunnel");
            return;
        };
        let id = self.alloc_id();
        let cooldown = self.random_cooldown(rng);
        self.workfaces.push(Workface {
            id,
            kind: WorkfaceKind::Trunk,
            tip: start,
            heading: Cardinal::South,
            status: WorkfaceStatus::Active,
            branch_depth: 0,
            branch_cooldown_steps: cooldown,
            steps_since_branch: 0,
            steps: 0,
            parent: None,
            last_junction: None,
        });
    }

    fn alloc_id(&mut self) -> WorkfaceId {
        let id = WorkfaceId(self.next_id);
        self.next_id += 1;
        id
    }

    fn random_cooldown(&self, rng: &mut impl Rng) -> u32 {
        let (lo, hi) = (
            self.settings.branch_cooldown_min,
            self.settings.branch_cooldown_max.max(self.settings.branch_cooldown_min),
        );
        rng.random_range(lo..=hi)
    }

    fn find_starting_tunnel(&self, grid: &TileGrid, seed: GridPos) -> Option<GridPos> {
        if grid.at(seed).is_open() {
            return Some(seed);
        }
        let radius = self.settings.start_search_radius;
        let mut best: Option<(GridPos, i32)> = None;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let pos = seed.offset(dx, dy);
                if grid.at(pos) != TileKind::Tunnel {
                    continue;
                }
                let d = dx.abs() + dy.abs();
                if best.is_none_or(|(_, bd)| d < bd) {
                    best = Some((pos, d));
                }
            }
        }
        best.map(|(pos, _)| pos)
    }

    /// Whether carving `target` would extend the corridor ending at `tip`
    /// without touching any other tunnel.
    ///
    /// The target must be soil whose only open 4-neighbour is `tip`. Inside
    /// the `isolation_radius` window, open tiles are allowed only behind the
    /// face and only when they join `tip` through open tiles behind the face,
    /// so a separate corridor running alongside still blocks the step.
    pub fn is_valid_step(&self, grid: &TileGrid, tip: GridPos, target: GridPos) -> bool {
        if grid.at(target) != TileKind::Soil || grid.is_border(target.x, target.y) {
            return false;
        }
        if !grid.is_underground(target.y) {
            return false;
        }
        let Some(dir) = Cardinal::from_delta(target.x - tip.x, target.y - tip.y) else {
            return false;
        };
        if tip.manhattan(target) != 1 {
            return false;
        }
        let open: Vec<GridPos> = target
            .neighbors4()
            .into_iter()
            .filter(|n| grid.at(*n).is_open())
            .collect();
        if open.len() != 1 || open[0] != tip {
            return false;
        }

        let (fx, fy) = dir.delta();
        let r = self.settings.isolation_radius;
        let behind = |cell: GridPos| {
            let (dx, dy) = (cell.x - target.x, cell.y - target.y);
            dx.abs() <= r && dy.abs() <= r && dx * fx + dy * fy < 0 && grid.at(cell).is_open()
        };
        let mut corridor = vec![tip];
        let mut stack = vec![tip];
        while let Some(cell) = stack.pop() {
            for n in cell.neighbors4() {
                if behind(n) && !corridor.contains(&n) {
                    corridor.push(n);
                    stack.push(n);
                }
            }
        }

        for dy in -r..=r {
            for dx in -r..=r {
                let cell = target.offset(dx, dy);
                if grid.at(cell).is_open() && !corridor.contains(&cell) {
                    return false;
                }
            }
        }
        true
    }

    /// Picks the next tile for an agent. Prefers the agent's assigned workface,
    /// otherwise the nearest active one; workfaces with no valid step are
    /// marked stalled.
    pub fn request_dig_target(
        &mut self,
        agent_cell: GridPos,
        assigned: &mut Option<WorkfaceId>,
        grid: &TileGrid,
        rng: &mut impl Rng,
    ) -> Option<PlannedTarget> {
        let mut order: Vec<usize> = (0..self.workfaces.len())
            .filter(|&i| self.workfaces[i].status == WorkfaceStatus::Active)
            .collect();
        order.sort_by_key(|&i| {
            let w = &self.workfaces[i];
            let preferred = Some(w.id) == *assigned;
            (!preferred, w.tip.manhattan(agent_cell))
        });

        for idx in order {
            let tip = self.workfaces[idx].tip;
            let heading = self.workfaces[idx].heading;
            let (hx, hy) = heading.delta();
            let mut best: Option<(GridPos, f32)> = None;
            for dir in Cardinal::ALL {
                let target = tip.step(dir);
                if !self.is_valid_step(grid, tip, target) {
                    continue;
                }
                let score = dir.dot(hx as f32, hy as f32) + rng.random::<f32>() * 0.1;
                if best.is_none_or(|(_, s)| score > s) {
                    best = Some((target, score));
                }
            }
            let workface = &mut self.workfaces[idx];
            match best {
                Some((pos, _)) => {
                    workface.status = WorkfaceStatus::Active;
                    *assigned = Some(workface.id);
                    return Some(PlannedTarget {
                        pos,
                        workface: workface.id,
                    });
                }
                None => {
                    debug!(id = workface.id.0, "workface stalled");
                    workface.status = WorkfaceStatus::Stalled;
                }
            }
        }
        *assigned = None;
        None
    }

    /// Advances a workface after its target was carved.
    pub fn notify_tunnel_dug(
        &mut self,
        pos: GridPos,
        id: WorkfaceId,
        grid: &TileGrid,
        rng: &mut impl Rng,
    ) {
        let Some(idx) = self.workfaces.iter().position(|w| w.id == id) else {
            return;
        };
        let max_history = self.settings.max_junction_history;
        let workface = &mut self.workfaces[idx];
        let prev = workface.tip;
        if prev == pos {
            return;
        }
        if let Some(dir) = Cardinal::from_delta(pos.x - prev.x, pos.y - prev.y) {
            if prev.manhattan(pos) == 1 {
                workface.heading = dir;
            }
        }
        workface.tip = pos;
        workface.steps += 1;
        workface.steps_since_branch += 1;
        workface.status = WorkfaceStatus::Active;
        workface.last_junction = Some(prev);

        let junction = Junction {
            pos: prev,
            workface: workface.id,
            heading: workface.heading,
            depth: workface.branch_depth,
            exhausted: false,
        };
        self.junctions.push(junction);
        if self.junctions.len() > max_history {
            let excess = self.junctions.len() - max_history;
            self.junctions.drain(..excess);
        }

        self.try_branch(idx, grid, rng);
    }

    fn try_branch(&mut self, idx: usize, grid: &TileGrid, rng: &mut impl Rng) {
        let parent = &self.workfaces[idx];
        if parent.steps_since_branch < parent.branch_cooldown_steps
            || parent.branch_depth >= self.settings.max_branch_depth
        {
            return;
        }
        let Some(junction) = parent.last_junction else {
            return;
        };
        let (parent_id, heading, depth) = (parent.id, parent.heading, parent.branch_depth);
        if self.spawn_branch(junction, heading, depth, parent_id, rng, grid) {
            let cooldown = self.random_cooldown(rng);
            let parent = &mut self.workfaces[idx];
            parent.steps_since_branch = 0;
            parent.branch_cooldown_steps = cooldown;
            if let Some(j) = self.junctions.iter_mut().rev().find(|j| j.pos == junction) {
                j.exhausted = true;
            }
        }
    }

    fn spawn_branch(
        &mut self,
        junction: GridPos,
        parent_heading: Cardinal,
        parent_depth: u32,
        parent_id: WorkfaceId,
        rng: &mut impl Rng,
        grid: &TileGrid,
    ) -> bool {
        if parent_depth >= self.settings.max_branch_depth || grid.at(junction) != TileKind::Tunnel {
            return false;
        }
        let mut perps = parent_heading.perpendiculars();
        if rng.random_bool(0.5) {
            perps.swap(0, 1);
        }
        let Some(heading) = perps
            .into_iter()
            .find(|d| self.is_valid_step(grid, junction, junction.step(*d)))
        else {
            return false;
        };
        let id = self.alloc_id();
        let cooldown = self.random_cooldown(rng);
        debug!(
            id = id.0,
            parent = parent_id.0,
            x = junction.x,
            y = junction.y,
            depth = parent_depth + 1,
            "branch spawned"
        );
        self.workfaces.push(Workface {
            id,
            kind: WorkfaceKind::Branch,
            tip: junction,
            heading,
            status: WorkfaceStatus::Active,
            branch_depth: parent_depth + 1,
            branch_cooldown_steps: cooldown,
            steps_since_branch: 0,
            steps: 0,
            parent: Some(parent_id),
            last_junction: None,
        });
        true
    }

    /// Keeps the number of active branches near a space-pressure-driven target.
    /// Runs every `update_interval_ticks` calls and inspects at most
    /// `junction_checks_per_update` junctions, newest first.
    pub fn update(&mut self, grid: &TileGrid, pressure: &PressureSnapshot, rng: &mut impl Rng) {
        self.update_counter += 1;
        if self.update_counter < self.settings.update_interval_ticks.max(1) {
            return;
        }
        self.update_counter = 0;

        let desired = self.settings.base_branch_target
            + (self.settings.extra_branch_target as f32 * pressure.space_pressure).round() as usize;
        let active_branches = self
            .workfaces
            .iter()
            .filter(|w| w.kind == WorkfaceKind::Branch && w.status == WorkfaceStatus::Active)
            .count();
        if active_branches >= desired {
            return;
        }

        let max_depth = self.settings.max_branch_depth;
        let mut checks = 0;
        let mut idx = self.junctions.len();
        while idx > 0 && checks < self.settings.junction_checks_per_update {
            idx -= 1;
            let j = &self.junctions[idx];
            if j.exhausted || j.depth >= max_depth {
                continue;
            }
            checks += 1;
            let (pos, heading, depth, parent) = (j.pos, j.heading, j.depth, j.workface);
            self.junctions[idx].exhausted = true;
            if self.spawn_branch(pos, heading, depth, parent, rng, grid) {
                break;
            }
        }
    }

    /// Heading of a workface as a world-space unit vector.
    pub fn heading_vector(workface: &Workface) -> Vec2 {
        let (x, y) = workface.heading.delta();
        Vec2::new(x as f32, y as f32)
    }
}

pub mod air;
pub mod ant;
pub mod brood;
mod colony;
pub mod excavation;
pub mod field;
pub mod map;
pub mod planner;
pub mod pressure;
pub mod roles;
mod sim;
mod timer;
pub mod waste;

// Re-export key types for easier imports
pub use ant::{Ant, AntKey};
pub use brood::{BroodKey, BroodStage, BroodSystem};
pub use colony::Colony;
pub use excavation::{DigMode, DigTarget, ExcavationCollaborators, ExcavationEngine};
pub use map::TileGrid;
pub use planner::ExcavationPlanner;
pub use pressure::{ColonyPressureModel, PressureSnapshot};
pub use roles::Role;
pub use sim::{DigEvents, Simulation, TickSummary};
pub use timer::Timer;

/// Fixed simulation step, in seconds.
pub const FIXED_DT: f32 = 1.0 / 60.0;

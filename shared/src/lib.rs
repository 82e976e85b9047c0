pub mod tile;
pub mod util;

pub use tile::{Cardinal, GridPos, TileKind};
pub use util::{clamp01, fast_sin_cos, seeded_noise};

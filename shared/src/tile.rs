use serde::{Deserialize, Serialize};

/// Kind of a single grid tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TileKind {
    Grass,
    #[default]
    Soil,
    Tunnel,
    Bedrock,
    Air,
}

impl TileKind {
    /// Open space an ant can stand in and dig from.
    #[inline(always)]
    pub fn is_open(self) -> bool {
        matches!(self, TileKind::Tunnel | TileKind::Air)
    }

    /// Blocks movement and air.
    #[inline(always)]
    pub fn is_solid(self) -> bool {
        matches!(self, TileKind::Soil | TileKind::Bedrock)
    }
}

/// Integer tile coordinate. Signed so neighbour probes near the edge never underflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline(always)]
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    #[inline(always)]
    pub fn step(self, dir: Cardinal) -> Self {
        let (dx, dy) = dir.delta();
        self.offset(dx, dy)
    }

    /// The four orthogonal neighbours, in N/E/S/W order.
    pub fn neighbors4(self) -> [GridPos; 4] {
        Cardinal::ALL.map(|d| self.step(d))
    }

    pub fn manhattan(self, other: GridPos) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn distance(self, other: GridPos) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Orthogonal grid direction. `y` grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinal {
    North,
    East,
    South,
    West,
}

impl Cardinal {
    pub const ALL: [Cardinal; 4] = [
        Cardinal::North,
        Cardinal::East,
        Cardinal::South,
        Cardinal::West,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Cardinal::North => (0, -1),
            Cardinal::East => (1, 0),
            Cardinal::South => (0, 1),
            Cardinal::West => (-1, 0),
        }
    }

    pub fn from_delta(dx: i32, dy: i32) -> Option<Cardinal> {
        match (dx.signum(), dy.signum()) {
            (0, -1) => Some(Cardinal::North),
            (1, 0) => Some(Cardinal::East),
            (0, 1) => Some(Cardinal::South),
            (-1, 0) => Some(Cardinal::West),
            _ => None,
        }
    }

    /// Closest cardinal to an arbitrary direction vector.
    pub fn nearest(dx: f32, dy: f32) -> Cardinal {
        if dx.abs() > dy.abs() {
            if dx >= 0.0 { Cardinal::East } else { Cardinal::West }
        } else if dy >= 0.0 {
            Cardinal::South
        } else {
            Cardinal::North
        }
    }

    pub fn opposite(self) -> Cardinal {
        match self {
            Cardinal::North => Cardinal::South,
            Cardinal::East => Cardinal::West,
            Cardinal::South => Cardinal::North,
            Cardinal::West => Cardinal::East,
        }
    }

    /// Both directions at a right angle to this one.
    pub fn perpendiculars(self) -> [Cardinal; 2] {
        match self {
            Cardinal::North | Cardinal::South => [Cardinal::East, Cardinal::West],
            Cardinal::East | Cardinal::West => [Cardinal::North, Cardinal::South],
        }
    }

    /// Dot product of the unit step with a direction vector.
    pub fn dot(self, dx: f32, dy: f32) -> f32 {
        let (sx, sy) = self.delta();
        sx as f32 * dx + sy as f32 * dy
    }
}

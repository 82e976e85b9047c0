use glam::Vec2;
use shared::{GridPos, TileKind};

use super::field::ScalarField;
use crate::config::GridConfig;

/// The nest world: surface above `region_split`, soil below, bedrock border.
///
/// Tile kinds are only flipped `Soil -> Tunnel` during a run, by the excavation
/// engine. [`TileGrid::set`] exists for world generation and test setup.
#[derive(Clone, Debug)]
pub struct TileGrid {
    pub width: usize,
    pub height: usize,
    pub region_split: usize,
    pub cell_size: f32,
    tiles: Vec<Vec<TileKind>>,
    /// Render-only soil texture in `[0, 1]`, also read as "hardness" by target scoring.
    pub texture: ScalarField,
    /// Tile diggers plan from while they are above ground.
    pub dig_start: GridPos,
    pub entrance: GridPos,
    pub queen_home: GridPos,
}

impl TileGrid {
    /// Plain layered world: grass over soil inside a bedrock frame.
    pub fn new(width: usize, height: usize, region_split: usize, cell_size: f32) -> Self {
        let mut tiles = vec![vec![TileKind::Soil; width]; height];
        let mut texture = ScalarField::new(width, height);
        for (y, row) in tiles.iter_mut().enumerate() {
            for (x, tile) in row.iter_mut().enumerate() {
                *tile = if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
                    TileKind::Bedrock
                } else if y < region_split {
                    TileKind::Grass
                } else {
                    TileKind::Soil
                };
                let (fx, fy) = (x as f32, y as f32);
                texture.data[y][x] = (fx * 0.27).sin() * (fy * 0.29).cos() * 0.5 + 0.5;
            }
        }

        let center = GridPos::new(width as i32 / 2, region_split as i32);
        Self {
            width,
            height,
            region_split,
            cell_size,
            tiles,
            texture,
            dig_start: center,
            entrance: center,
            queen_home: center,
        }
    }

    /// Starting world: entrance band at the split, a three-wide corridor down to
    /// a pre-carved queen chamber.
    pub fn generate(config: &GridConfig) -> Self {
        let mut grid = Self::new(
            config.width,
            config.height,
            config.region_split,
            config.cell_size,
        );
        let split = config.region_split as i32;
        let cx = config.width as i32 / 2;
        let cy = split + config.queen_depth;

        let r = config.entrance_radius;
        grid.carve_rect(cx - r, split, cx + r, split + 2);
        grid.carve_rect(cx - 1, cy - config.entrance_corridor_depth, cx + 1, cy);

        let (hw, hh) = (
            config.queen_chamber_half_width,
            config.queen_chamber_half_height,
        );
        grid.carve_rect(cx - hw, cy - hh, cx + hw, cy + hh);

        grid.entrance = GridPos::new(cx, split);
        grid.queen_home = GridPos::new(cx, cy);
        let bottom = (cy + hh).min(grid.height as i32 - 2);
        grid.dig_start = GridPos::new(cx, bottom);
        grid
    }

    fn carve_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) {
        let split = self.region_split as i32;
        for y in y0.max(split)..=y1 {
            for x in x0..=x1 {
                self.set(x, y, TileKind::Tunnel);
            }
        }
    }

    #[inline(always)]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    #[inline(always)]
    pub fn is_border(&self, x: i32, y: i32) -> bool {
        x <= 0 || y <= 0 || x >= self.width as i32 - 1 || y >= self.height as i32 - 1
    }

    #[inline(always)]
    pub fn is_underground(&self, y: i32) -> bool {
        y >= self.region_split as i32
    }

    /// Tile kind, `Bedrock` outside the grid.
    #[inline(always)]
    pub fn get(&self, x: i32, y: i32) -> TileKind {
        if self.in_bounds(x, y) {
            self.tiles[y as usize][x as usize]
        } else {
            TileKind::Bedrock
        }
    }

    #[inline(always)]
    pub fn at(&self, pos: GridPos) -> TileKind {
        self.get(pos.x, pos.y)
    }

    /// Overwrites a tile. Border tiles stay bedrock; returns whether the write happened.
    pub fn set(&mut self, x: i32, y: i32, kind: TileKind) -> bool {
        if !self.in_bounds(x, y) || self.is_border(x, y) {
            return false;
        }
        self.tiles[y as usize][x as usize] = kind;
        true
    }

    pub fn open_neighbors4(&self, x: i32, y: i32) -> usize {
        GridPos::new(x, y)
            .neighbors4()
            .iter()
            .filter(|n| self.at(**n).is_open())
            .count()
    }

    /// Open tiles in the 3x3 block around `(x, y)`, the centre excluded.
    pub fn open_neighbors8(&self, x: i32, y: i32) -> usize {
        let mut count = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if (dx != 0 || dy != 0) && self.get(x + dx, y + dy).is_open() {
                    count += 1;
                }
            }
        }
        count
    }

    /// Tunnel tiles within a euclidean radius (in tiles) of `center`.
    pub fn count_tunnels_within(&self, center: GridPos, radius: f32) -> usize {
        self.count_tunnels_in_band(center, 0.0, radius)
    }

    /// Tunnel tiles in the `(2·reach+1)²` square around `center`.
    pub fn count_tunnels_in_square(&self, center: GridPos, reach: i32) -> usize {
        let mut count = 0;
        for y in center.y - reach..=center.y + reach {
            for x in center.x - reach..=center.x + reach {
                if self.get(x, y) == TileKind::Tunnel {
                    count += 1;
                }
            }
        }
        count
    }

    /// Tunnel tiles whose squared distance to `center` lies in `[inner², outer²]`.
    pub fn count_tunnels_in_band(&self, center: GridPos, inner: f32, outer: f32) -> usize {
        let reach = outer.ceil() as i32;
        let (inner_sq, outer_sq) = (inner * inner, outer * outer);
        let mut count = 0;
        for y in center.y - reach..=center.y + reach {
            for x in center.x - reach..=center.x + reach {
                if self.get(x, y) != TileKind::Tunnel {
                    continue;
                }
                let (dx, dy) = ((x - center.x) as f32, (y - center.y) as f32);
                let d_sq = dx * dx + dy * dy;
                if d_sq >= inner_sq && d_sq <= outer_sq {
                    count += 1;
                }
            }
        }
        count
    }

    pub fn tunnel_count(&self) -> usize {
        self.tiles
            .iter()
            .flat_map(|row| row.iter())
            .filter(|t| **t == TileKind::Tunnel)
            .count()
    }

    pub fn world_to_grid(&self, pos: Vec2) -> GridPos {
        GridPos::new(
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
        )
    }

    /// World-space centre of a tile.
    pub fn grid_to_world(&self, cell: GridPos) -> Vec2 {
        Vec2::new(
            (cell.x as f32 + 0.5) * self.cell_size,
            (cell.y as f32 + 0.5) * self.cell_size,
        )
    }

    /// Movement collision: solid tiles and anything outside the grid block.
    pub fn blocks_movement(&self, pos: Vec2) -> bool {
        let cell = self.world_to_grid(pos);
        self.at(cell).is_solid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layered_world_has_bedrock_frame() {
        let grid = TileGrid::new(10, 12, 4, 12.0);
        for x in 0..10 {
            assert_eq!(grid.get(x, 0), TileKind::Bedrock);
            assert_eq!(grid.get(x, 11), TileKind::Bedrock);
        }
        for y in 0..12 {
            assert_eq!(grid.get(0, y), TileKind::Bedrock);
            assert_eq!(grid.get(9, y), TileKind::Bedrock);
        }
        assert_eq!(grid.get(5, 3), TileKind::Grass);
        assert_eq!(grid.get(5, 4), TileKind::Soil);
        assert_eq!(grid.get(-3, 40), TileKind::Bedrock);
    }

    #[test]
    fn border_cannot_be_overwritten() {
        let mut grid = TileGrid::new(10, 10, 3, 12.0);
        assert!(!grid.set(0, 5, TileKind::Tunnel));
        assert!(!grid.set(20, 5, TileKind::Tunnel));
        assert!(grid.set(4, 5, TileKind::Tunnel));
        assert_eq!(grid.get(4, 5), TileKind::Tunnel);
    }

    #[test]
    fn generated_world_connects_entrance_to_chamber() {
        let config = GridConfig::default();
        let grid = TileGrid::generate(&config);
        let split = config.region_split as i32;
        let cx = config.width as i32 / 2;
        for y in split..=split + config.queen_depth {
            assert_eq!(grid.get(cx, y), TileKind::Tunnel, "corridor gap at row {}", y);
        }
        assert_eq!(grid.at(grid.dig_start), TileKind::Tunnel);
        assert_eq!(grid.dig_start.y, split + config.queen_depth + config.queen_chamber_half_height);
        let chamber = (2 * config.queen_chamber_half_width + 1)
            * (2 * config.queen_chamber_half_height + 1);
        assert!(grid.tunnel_count() >= chamber as usize);
        // Nothing above ground was carved.
        assert_eq!(grid.get(cx, split - 1), TileKind::Grass);
    }

    #[test]
    fn texture_stays_in_unit_range() {
        let grid = TileGrid::new(30, 30, 8, 12.0);
        for row in &grid.texture.data {
            for v in row {
                assert!((0.0..=1.0).contains(v));
            }
        }
    }

    #[test]
    fn neighbor_counts_and_bands() {
        let mut grid = TileGrid::new(12, 12, 2, 12.0);
        grid.set(5, 5, TileKind::Tunnel);
        grid.set(6, 5, TileKind::Tunnel);
        grid.set(6, 6, TileKind::Tunnel);
        assert_eq!(grid.open_neighbors4(5, 6), 2);
        assert_eq!(grid.open_neighbors8(5, 6), 3);
        let c = GridPos::new(5, 5);
        assert_eq!(grid.count_tunnels_within(c, 1.0), 2);
        assert_eq!(grid.count_tunnels_in_band(c, 1.2, 2.0), 1);
        assert_eq!(grid.count_tunnels_in_square(c, 1), 3);
    }

    #[test]
    fn world_grid_conversion() {
        let grid = TileGrid::new(10, 10, 3, 12.0);
        let cell = GridPos::new(4, 7);
        assert_eq!(grid.world_to_grid(grid.grid_to_world(cell)), cell);
        assert!(grid.blocks_movement(Vec2::new(-5.0, 30.0)));
        assert!(!grid.blocks_movement(grid.grid_to_world(GridPos::new(4, 1))));
    }
}

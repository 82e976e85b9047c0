use shared::{GridPos, TileKind};

use super::field::ScalarField;
use super::map::TileGrid;

/// Per-tile waste with a running total.
#[derive(Clone, Debug)]
pub struct WasteField {
    field: ScalarField,
    total: f32,
    max_tile: f32,
}

impl WasteField {
    pub fn new(width: usize, height: usize, max_tile: f32) -> Self {
        Self {
            field: ScalarField::new(width, height),
            total: 0.0,
            max_tile,
        }
    }

    pub fn clear(&mut self) {
        self.field.fill(0.0);
        self.total = 0.0;
    }

    pub fn get(&self, x: i32, y: i32) -> f32 {
        self.field.get(x, y)
    }

    pub fn total(&self) -> f32 {
        self.total
    }

    pub fn field(&self) -> &ScalarField {
        &self.field
    }

    /// Adds waste to a tile, capped per tile. Returns the amount accepted.
    pub fn add(&mut self, pos: GridPos, amount: f32) -> f32 {
        if amount <= 0.0 {
            return 0.0;
        }
        let added = self.field.add_clamped(pos.x, pos.y, amount, self.max_tile);
        self.total += added;
        added
    }

    /// Removes up to `amount` from a tile. Returns the amount taken.
    pub fn take(&mut self, pos: GridPos, amount: f32) -> f32 {
        if amount <= 0.0 {
            return 0.0;
        }
        let taken = -self.field.add_clamped(pos.x, pos.y, -amount, self.max_tile);
        self.total = (self.total - taken).max(0.0);
        taken
    }

    /// Mean waste over the in-bounds square window of half-size `radius`.
    pub fn local_average(&self, center: GridPos, radius: i32) -> f32 {
        let mut sum = 0.0;
        let mut cells = 0usize;
        for y in center.y - radius..=center.y + radius {
            for x in center.x - radius..=center.x + radius {
                if self.field.in_bounds(x, y) {
                    sum += self.field.get(x, y);
                    cells += 1;
                }
            }
        }
        if cells == 0 { 0.0 } else { sum / cells as f32 }
    }

    /// Dirtiest open tile within `radius` holding at least `min_amount`.
    pub fn find_dirtiest(
        &self,
        grid: &TileGrid,
        center: GridPos,
        radius: i32,
        min_amount: f32,
    ) -> Option<GridPos> {
        let mut best: Option<(GridPos, f32)> = None;
        for y in center.y - radius..=center.y + radius {
            for x in center.x - radius..=center.x + radius {
                let amount = self.field.get(x, y);
                if amount < min_amount || grid.get(x, y) != TileKind::Tunnel {
                    continue;
                }
                let pos = GridPos::new(x, y);
                let score = amount / (1.0 + center.manhattan(pos) as f32 * 0.1);
                if best.is_none_or(|(_, s)| score > s) {
                    best = Some((pos, score));
                }
            }
        }
        best.map(|(pos, _)| pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_tracks_capped_adds_and_takes() {
        let mut waste = WasteField::new(8, 8, 6.0);
        let p = GridPos::new(3, 3);
        assert_eq!(waste.add(p, 4.0), 4.0);
        assert_eq!(waste.add(p, 4.0), 2.0);
        assert_eq!(waste.total(), 6.0);
        assert_eq!(waste.take(p, 1.5), 1.5);
        assert_eq!(waste.take(p, 10.0), 4.5);
        assert_eq!(waste.total(), 0.0);
        assert_eq!(waste.add(GridPos::new(-1, 0), 1.0), 0.0);
    }

    #[test]
    fn dirtiest_prefers_tunnel_tiles() {
        let mut grid = TileGrid::new(10, 10, 2, 12.0);
        grid.set(4, 4, TileKind::Tunnel);
        let mut waste = WasteField::new(10, 10, 6.0);
        waste.add(GridPos::new(4, 4), 1.0);
        waste.add(GridPos::new(5, 5), 5.0);
        assert_eq!(
            waste.find_dirtiest(&grid, GridPos::new(4, 5), 3, 0.2),
            Some(GridPos::new(4, 4))
        );
        assert_eq!(waste.find_dirtiest(&grid, GridPos::new(4, 5), 3, 2.0), None);
    }

    #[test]
    fn local_average_ignores_out_of_bounds() {
        let mut waste = WasteField::new(4, 4, 6.0);
        waste.add(GridPos::new(0, 0), 4.0);
        // Window around the corner covers 4 in-bounds cells.
        assert_eq!(waste.local_average(GridPos::new(0, 0), 1), 1.0);
    }
}

/// Dense per-tile float grid. Every scalar layer of the nest (dig pheromone,
/// dig hit-points, air, waste, brood scent, soil texture) is one of these.
///
/// Reads outside the grid return `0.0` and writes outside are dropped, so
/// scoring code can probe neighbours near the border without bounds checks.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarField {
    pub width: usize,
    pub height: usize,
    pub data: Vec<Vec<f32>>,
}

impl ScalarField {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![vec![0.0; width]; height],
        }
    }

    #[inline(always)]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    #[inline(always)]
    pub fn get(&self, x: i32, y: i32) -> f32 {
        if self.in_bounds(x, y) {
            self.data[y as usize][x as usize]
        } else {
            0.0
        }
    }

    #[inline(always)]
    pub fn set(&mut self, x: i32, y: i32, value: f32) {
        if self.in_bounds(x, y) {
            self.data[y as usize][x as usize] = value;
        }
    }

    /// Max-assign: the cell keeps whichever of its value and `value` is larger.
    #[inline(always)]
    pub fn raise_to(&mut self, x: i32, y: i32, value: f32) {
        if self.in_bounds(x, y) {
            let cell = &mut self.data[y as usize][x as usize];
            if value > *cell {
                *cell = value;
            }
        }
    }

    /// Adds `amount` (may be negative) keeping the cell in `[0, max]`.
    /// Returns the change actually applied.
    pub fn add_clamped(&mut self, x: i32, y: i32, amount: f32, max: f32) -> f32 {
        if !self.in_bounds(x, y) {
            return 0.0;
        }
        let cell = &mut self.data[y as usize][x as usize];
        let before = *cell;
        *cell = (before + amount).clamp(0.0, max);
        *cell - before
    }

    pub fn fill(&mut self, value: f32) {
        for row in &mut self.data {
            row.fill(value);
        }
    }

    /// Multiplies rows `start..start + count` (wrapping inside `[wrap_from, height)`)
    /// by `rate`, snapping values at or below `min` to zero. Returns the row after
    /// the last one processed so callers can keep a cursor.
    pub fn decay_rows(
        &mut self,
        start: usize,
        count: usize,
        wrap_from: usize,
        rate: f32,
        min: f32,
    ) -> usize {
        if wrap_from >= self.height {
            return start;
        }
        let mut y = start.clamp(wrap_from, self.height - 1);
        for _ in 0..count {
            for value in &mut self.data[y] {
                if *value > min {
                    *value *= rate;
                } else {
                    *value = 0.0;
                }
            }
            y += 1;
            if y >= self.height {
                y = wrap_from;
            }
        }
        y
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().map(|row| row.iter().sum::<f32>()).sum()
    }

    pub fn max_value(&self) -> f32 {
        self.data
            .iter()
            .flat_map(|row| row.iter().copied())
            .fold(0.0, f32::max)
    }
}

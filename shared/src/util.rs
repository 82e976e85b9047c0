use once_cell::sync::Lazy;
use std::f32;

const LOOKUP_TABLE_SIZE: usize = 360;

/// Precomputed sine and cosine values for equally spaced angles around the circle.
static SIN_COS_TABLE: Lazy<[(f32, f32); LOOKUP_TABLE_SIZE]> = Lazy::new(|| {
    let mut arr = [(0.0f32, 0.0f32); LOOKUP_TABLE_SIZE];
    let step = std::f32::consts::TAU / LOOKUP_TABLE_SIZE as f32;
    for (i, entry) in arr.iter_mut().enumerate() {
        let angle = i as f32 * step;
        *entry = (angle.sin(), angle.cos());
    }
    arr
});

/// Fast sine and cosine using lookup table, rounded to the nearest degree.
/// Heading angles feed tile rounding, so one degree of error is harmless.
#[inline(always)]
pub fn fast_sin_cos(angle: f32) -> (f32, f32) {
    if !angle.is_finite() {
        return (0.0, 1.0);
    }
    let frac = angle.rem_euclid(std::f32::consts::TAU) / std::f32::consts::TAU;
    let idx = ((frac * LOOKUP_TABLE_SIZE as f32).round() as usize) % LOOKUP_TABLE_SIZE;
    SIN_COS_TABLE[idx]
}

#[inline(always)]
pub fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// Stable per-tile hash in `[0, 1)`. Same inputs always give the same value.
pub fn seeded_noise(x: i32, y: i32) -> f32 {
    let s = ((x as f64) * 12.9898 + (y as f64) * 78.233 + 0.5).sin() * 43758.5453;
    (s - s.floor()) as f32
}

//! Synthetic fields for transform and store tests.
//!
//! Every generator returns a row-major `height x width` field.

fn field(width: usize, height: usize, value: impl Fn(usize, usize) -> f32) -> Vec<f32> {
    (0..height)
        .flat_map(|row| (0..width).map(move |col| (col, row)))
        .map(|(col, row)| value(col, row))
        .collect()
}

/// `col * 1000 + row` at every point, so a misplaced value names its origin.
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    field(width, height, |col, row| (col * 1000 + row) as f32)
}

/// 2 m temperature in Kelvin, rising from 250 K in the north-west corner
/// towards 310 K in the south-east.
pub fn create_temperature_grid(width: usize, height: usize) -> Vec<f32> {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    field(width, height, |col, row| {
        250.0 + 30.0 * col as f32 / w + 30.0 * row as f32 / h
    })
}

/// Integer mixing for repeatable noise.
fn mix(col: u32, row: u32, seed: u32) -> u32 {
    let mut h = seed
        .wrapping_mul(31)
        .wrapping_add(col)
        .wrapping_mul(31)
        .wrapping_add(row);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}

/// Mean sea level pressure in Pascals between 98000 and 104000: a
/// north-south gradient plus noise that depends only on `seed`.
pub fn create_pressure_grid(width: usize, height: usize, seed: u32) -> Vec<f32> {
    let h = height.max(1) as f32;
    field(width, height, |col, row| {
        let noise = mix(col as u32, row as u32, seed) % 2000;
        98000.0 + row as f32 / h * 4000.0 + noise as f32
    })
}

pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Zeros, with NaN at each in-bounds `(col, row)` of `missing`.
pub fn create_grid_with_nans(width: usize, height: usize, missing: &[(usize, usize)]) -> Vec<f32> {
    let mut data = create_constant_grid(width, height, 0.0);
    for &(col, row) in missing.iter().filter(|&&(c, r)| c < width && r < height) {
        data[row * width + col] = f32::NAN;
    }
    data
}

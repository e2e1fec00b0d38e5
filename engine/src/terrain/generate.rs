//! Procedural Height Fields
//!
//! Value-noise fBm used by the flyover demo and the randomized tests.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::heightfield::HeightField;

/// Parameters for [`fbm_field`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FbmParams {
    /// Number of noise octaves
    pub octaves: u32,
    /// Base frequency in cycles per grid cell
    pub frequency: f32,
    /// Frequency multiplier between octaves
    pub lacunarity: f32,
    /// Amplitude multiplier between octaves
    pub gain: f32,
    /// Peak-to-valley world height
    pub amplitude: f32,
    /// Offset into noise space; different offsets give different terrain
    pub offset: Vec2,
}

impl Default for FbmParams {
    fn default() -> Self {
        Self {
            octaves: 5,
            frequency: 0.02,
            lacunarity: 2.0,
            gain: 0.5,
            amplitude: 30.0,
            offset: Vec2::ZERO,
        }
    }
}

// ============================================================================
// Noise Functions
// ============================================================================

/// Lattice value in `[0, 1)` for an integer cell.
fn lattice(x: i32, y: i32) -> f32 {
    let mut h = (x as u32).wrapping_mul(0x27d4_eb2d) ^ (y as u32).wrapping_mul(0x1656_67b1);
    h ^= h >> 15;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    (h >> 8) as f32 / (1u32 << 24) as f32
}

/// Smoothly interpolated value noise in `[0, 1)`.
fn value_noise(p: Vec2) -> f32 {
    let cell = p.floor();
    let (x, y) = (cell.x as i32, cell.y as i32);
    let t = p - cell;
    // Quintic fade keeps the slope continuous across cells.
    let fade = t * t * t * (t * (t * 6.0 - Vec2::splat(15.0)) + Vec2::splat(10.0));

    let bottom = lattice(x, y) + (lattice(x + 1, y) - lattice(x, y)) * fade.x;
    let top = lattice(x, y + 1) + (lattice(x + 1, y + 1) - lattice(x, y + 1)) * fade.x;
    bottom + (top - bottom) * fade.y
}

/// Fractal sum of value noise, normalized to `[0, 1)`.
pub fn fbm(p: Vec2, params: &FbmParams) -> f32 {
    let mut sum = 0.0;
    let mut weight = 0.0;
    let mut amplitude = 1.0;
    let mut p = p;

    for _ in 0..params.octaves.max(1) {
        sum += amplitude * value_noise(p);
        weight += amplitude;
        p *= params.lacunarity;
        amplitude *= params.gain;
    }

    if weight > 0.0 { sum / weight } else { 0.0 }
}

/// Build a height field from fBm noise.
///
/// World heights land in `[0, params.amplitude)`; the field uses base `0`
/// and scale `params.amplitude` so the full raw range is available.
pub fn fbm_field(rows: usize, cols: usize, params: &FbmParams) -> HeightField {
    let scale = params.amplitude.abs().max(f32::EPSILON);
    HeightField::from_fn(rows, cols, 0.0, scale, |row, col| {
        let p = Vec2::new(row as f32, col as f32) * params.frequency + params.offset;
        fbm(p, params) * params.amplitude
    })
}

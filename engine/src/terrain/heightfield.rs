//! Height Field
//!
//! Regular grid of quantized elevation samples. Each sample is an `i16`
//! and maps to world height as `base + scale * raw / 32767`.
//!
//! Grid axes follow the mesh convention: `row` is world X, `col` is world Z,
//! with one world unit between adjacent samples.

use glam::Vec3;

use super::error::{Result, TerrainError};

/// Largest magnitude of a raw sample.
pub const RAW_HEIGHT_MAX: i16 = i16::MAX;

/// Quantized elevation grid.
#[derive(Clone, Debug)]
pub struct HeightField {
    rows: usize,
    cols: usize,
    base: f32,
    scale: f32,
    samples: Vec<i16>,
}

impl HeightField {
    /// Create a flat field with every raw sample at zero (world height `base`).
    pub fn new(rows: usize, cols: usize, base: f32, scale: f32) -> Self {
        Self {
            rows,
            cols,
            base,
            scale,
            samples: vec![0; rows * cols],
        }
    }

    /// Create a field from row-major raw samples.
    pub fn from_samples(rows: usize, cols: usize, base: f32, scale: f32, samples: Vec<i16>) -> Result<Self> {
        if samples.len() != rows * cols {
            return Err(TerrainError::SampleCount {
                expected: rows * cols,
                actual: samples.len(),
            });
        }
        Ok(Self {
            rows,
            cols,
            base,
            scale,
            samples,
        })
    }

    /// Create a field by sampling a world-height function at every grid point.
    ///
    /// Heights outside `base ± scale` are clamped.
    pub fn from_fn<F>(rows: usize, cols: usize, base: f32, scale: f32, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f32,
    {
        let mut field = Self::new(rows, cols, base, scale);
        for row in 0..rows {
            for col in 0..cols {
                let raw = field.to_raw(f(row, col));
                field.samples[row * cols + col] = raw;
            }
        }
        field
    }

    /// Number of sample rows (world X extent + 1).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of sample columns (world Z extent + 1).
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn base(&self) -> f32 {
        self.base
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Raw samples in row-major order.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Raw sample at a grid point.
    pub fn height(&self, row: usize, col: usize) -> Result<i16> {
        let index = self.index(row, col)?;
        Ok(self.samples[index])
    }

    /// Overwrite the raw sample at a grid point.
    pub fn set_height(&mut self, row: usize, col: usize, raw: i16) -> Result<()> {
        let index = self.index(row, col)?;
        self.samples[index] = raw;
        Ok(())
    }

    /// World height at a grid point.
    pub fn world_height(&self, row: usize, col: usize) -> Result<f32> {
        Ok(self.to_world(self.height(row, col)?))
    }

    /// Convert a raw sample to world height.
    #[inline]
    pub fn to_world(&self, raw: i16) -> f32 {
        self.base + self.scale * raw as f32 / RAW_HEIGHT_MAX as f32
    }

    /// Convert a world height to the nearest raw sample, clamped to ±32767.
    #[inline]
    pub fn to_raw(&self, world: f32) -> i16 {
        if self.scale == 0.0 {
            return 0;
        }
        let raw = ((world - self.base) / self.scale * RAW_HEIGHT_MAX as f32).round();
        raw.clamp(-(RAW_HEIGHT_MAX as f32), RAW_HEIGHT_MAX as f32) as i16
    }

    /// Smallest and largest raw sample, or `None` for an empty field.
    pub fn min_max(&self) -> Option<(i16, i16)> {
        let mut iter = self.samples.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), h| (lo.min(h), hi.max(h))))
    }

    /// Surface normal at a grid point from central differences.
    ///
    /// Border samples fall back to one-sided differences. `spacing` is the
    /// world distance between adjacent samples.
    pub fn vertex_normal(&self, row: usize, col: usize, spacing: f32) -> Result<Vec3> {
        self.index(row, col)?;

        let r0 = row.saturating_sub(1);
        let r1 = (row + 1).min(self.rows - 1);
        let c0 = col.saturating_sub(1);
        let c1 = (col + 1).min(self.cols - 1);

        let dx = if r1 > r0 {
            (self.world_at(r1, col) - self.world_at(r0, col)) / ((r1 - r0) as f32 * spacing)
        } else {
            0.0
        };
        let dz = if c1 > c0 {
            (self.world_at(row, c1) - self.world_at(row, c0)) / ((c1 - c0) as f32 * spacing)
        } else {
            0.0
        };

        Ok(Vec3::new(-dx, 1.0, -dz).normalize())
    }

    #[inline]
    fn world_at(&self, row: usize, col: usize) -> f32 {
        self.to_world(self.samples[row * self.cols + col])
    }

    fn index(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.rows || col >= self.cols {
            return Err(TerrainError::OutOfRange {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_conversion() {
        let field = HeightField::new(3, 3, 10.0, 100.0);
        assert_eq!(field.to_world(0), 10.0);
        assert!((field.to_world(RAW_HEIGHT_MAX) - 110.0).abs() < 1e-4);
        assert!((field.to_world(-RAW_HEIGHT_MAX) + 90.0).abs() < 1e-4);
        assert_eq!(field.to_raw(110.0), RAW_HEIGHT_MAX);
        assert_eq!(field.to_raw(10.0), 0);
    }

    #[test]
    fn test_to_raw_clamps() {
        let field = HeightField::new(2, 2, 0.0, 1.0);
        assert_eq!(field.to_raw(5.0), RAW_HEIGHT_MAX);
        assert_eq!(field.to_raw(-5.0), -RAW_HEIGHT_MAX);
    }

    #[test]
    fn test_out_of_range() {
        let mut field = HeightField::new(4, 5, 0.0, 1.0);
        assert!(field.height(3, 4).is_ok());
        assert!(matches!(
            field.height(4, 0),
            Err(TerrainError::OutOfRange { row: 4, col: 0, rows: 4, cols: 5 })
        ));
        assert!(field.set_height(0, 5, 1).is_err());
    }

    #[test]
    fn test_set_and_min_max() {
        let mut field = HeightField::new(4, 4, 0.0, 1.0);
        field.set_height(1, 2, 300).unwrap();
        field.set_height(3, 3, -20).unwrap();
        assert_eq!(field.height(1, 2).unwrap(), 300);
        assert_eq!(field.min_max(), Some((-20, 300)));
    }

    #[test]
    fn test_from_samples_checks_length() {
        assert!(matches!(
            HeightField::from_samples(2, 2, 0.0, 1.0, vec![0; 3]),
            Err(TerrainError::SampleCount { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_from_fn_row_major() {
        let field = HeightField::from_fn(3, 4, 0.0, 10.0, |row, col| (row * 4 + col) as f32 * 0.5);
        assert!((field.world_height(2, 3).unwrap() - 5.5).abs() < 1e-3);
        assert!((field.world_height(0, 1).unwrap() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_vertex_normal_slope() {
        // Height rises one unit per row: normal tilts toward -X.
        let field = HeightField::from_fn(5, 5, 0.0, 10.0, |row, _| row as f32);
        let n = field.vertex_normal(2, 2, 1.0).unwrap();
        let expected = Vec3::new(-1.0, 1.0, 0.0).normalize();
        assert!((n - expected).length() < 1e-3);

        let edge = field.vertex_normal(0, 4, 1.0).unwrap();
        assert!((edge - expected).length() < 1e-3);

        let flat = HeightField::new(3, 3, 0.0, 1.0);
        assert_eq!(flat.vertex_normal(1, 1, 1.0).unwrap(), Vec3::Y);
    }
}

//! Mesh Configuration
//!
//! Detail budgets, clip distances and tuning knobs for [`TileMeshManager`](super::TileMeshManager).
//! Loadable from JSON; missing fields fall back to `Default`.

use serde::{Deserialize, Serialize};

use super::error::{Result, TerrainError};

/// Largest supported tile edge (in cells).
pub const MAX_TILE_SIZE: u32 = 1024;

/// Balance iterations allowed per budgeted triangle when no cap is configured.
/// A split at the frustum border can add no visible triangle, so one per
/// triangle is not enough for a rebuild.
const DEFAULT_ITERATIONS_PER_TRIANGLE: usize = 4;

/// Configuration for a tiled bintree terrain mesh.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Cells along one tile edge; must be a power of two
    pub tile_size: u32,
    /// Lower bound of the visible triangle budget
    pub min_detail: usize,
    /// Upper bound of the visible triangle budget
    pub max_detail: usize,
    /// Hard ceiling on active triangles, including invisible ones
    pub abs_max_detail: usize,
    /// Near clip distance (world units)
    pub near_clip: f32,
    /// Far clip distance (world units)
    pub far_clip: f32,
    /// Number of buckets in each priority queue
    pub priority_resolution: u16,
    /// Split head must beat the merge head by more than this many buckets
    pub merge_slack: u16,
    /// Balance loop iteration cap per frame (`None` uses `4 * max_detail`)
    pub balance_iteration_cap: Option<usize>,
    /// Rebuild from scratch when the cosine between old and new view directions drops below this
    pub rebuild_cos_threshold: f32,
    /// Rebuild from scratch when the camera moves further than this in one frame
    pub rebuild_distance: f32,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            tile_size: 32,
            min_detail: 3000,
            max_detail: 3300,
            abs_max_detail: 50_000,
            near_clip: 1.0,
            far_clip: 150.0,
            priority_resolution: 256,
            merge_slack: 10,
            balance_iteration_cap: None,
            rebuild_cos_threshold: 0.1,
            rebuild_distance: 150.0,
        }
    }
}

impl MeshConfig {
    /// Parse a config from JSON and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MeshConfig = serde_json::from_str(json)?;
        config.validate()?;
        log::info!(
            "Loaded mesh config: tile_size={}, detail={}..{}",
            config.tile_size,
            config.min_detail,
            config.max_detail
        );
        Ok(config)
    }

    /// Load a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| TerrainError::ConfigFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check tile size, budgets and clip distances.
    pub fn validate(&self) -> Result<()> {
        if self.tile_size < 2 || !self.tile_size.is_power_of_two() || self.tile_size > MAX_TILE_SIZE {
            return Err(TerrainError::InvalidTileSize(self.tile_size));
        }
        if self.max_detail == 0 {
            return Err(TerrainError::budget("max_detail must be positive"));
        }
        if self.min_detail > self.max_detail {
            return Err(TerrainError::budget(format!(
                "min_detail {} exceeds max_detail {}",
                self.min_detail, self.max_detail
            )));
        }
        if self.max_detail > self.abs_max_detail {
            return Err(TerrainError::budget(format!(
                "max_detail {} exceeds abs_max_detail {}",
                self.max_detail, self.abs_max_detail
            )));
        }
        if !(self.near_clip > 0.0) || !(self.far_clip > self.near_clip) {
            return Err(TerrainError::budget(format!(
                "clip range {}..{} is empty",
                self.near_clip, self.far_clip
            )));
        }
        if self.priority_resolution < 2 {
            return Err(TerrainError::budget("priority_resolution must be at least 2"));
        }
        Ok(())
    }

    /// Effective per-frame balance iteration cap.
    pub fn iteration_cap(&self) -> usize {
        self.balance_iteration_cap
            .unwrap_or(DEFAULT_ITERATIONS_PER_TRIANGLE * self.max_detail)
            .max(1)
    }

    /// Leaf level of the bintree for this tile size (`2 * log2(tile_size)`).
    pub fn leaf_level(&self) -> u32 {
        2 * self.tile_size.trailing_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = MeshConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.leaf_level(), 10);
        assert_eq!(config.iteration_cap(), 4 * config.max_detail);
    }

    #[test]
    fn test_rejects_bad_tile_size() {
        for size in [0, 1, 3, 48, 2048] {
            let config = MeshConfig { tile_size: size, ..Default::default() };
            assert!(matches!(config.validate(), Err(TerrainError::InvalidTileSize(s)) if s == size));
        }
    }

    #[test]
    fn test_rejects_inverted_budget() {
        let config = MeshConfig { min_detail: 500, max_detail: 100, ..Default::default() };
        assert!(matches!(config.validate(), Err(TerrainError::InvalidBudget(_))));

        let config = MeshConfig { max_detail: 60_000, ..Default::default() };
        assert!(matches!(config.validate(), Err(TerrainError::InvalidBudget(_))));
    }

    #[test]
    fn test_json_partial_uses_defaults() {
        let config = MeshConfig::from_json_str(r#"{ "tile_size": 16, "min_detail": 100, "max_detail": 200 }"#)
            .unwrap();
        assert_eq!(config.tile_size, 16);
        assert_eq!(config.min_detail, 100);
        assert_eq!(config.far_clip, MeshConfig::default().far_clip);
    }

    #[test]
    fn test_json_round_trip() {
        let config = MeshConfig { merge_slack: 4, balance_iteration_cap: Some(64), ..Default::default() };
        let json = config.to_json_string().unwrap();
        assert_eq!(MeshConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = MeshConfig::from_json_file("/nonexistent/terrain/mesh.json");
        match result {
            Err(TerrainError::ConfigFile { path, .. }) => assert!(path.ends_with("mesh.json")),
            other => panic!("expected ConfigFile error, got {:?}", other),
        }
    }

    #[test]
    fn test_json_garbage_is_config_error() {
        assert!(matches!(MeshConfig::from_json_str("{ nope"), Err(TerrainError::Config(_))));
    }
}

//! Terrain Errors
//!
//! Construction and query failures for the terrain mesh. Soft runtime limits
//! (detail ceiling, balance iteration cap) are not errors; they are counted in
//! [`MeshStats`](super::MeshStats) instead.

/// Errors produced while building or querying a terrain mesh.
#[derive(thiserror::Error, Debug)]
pub enum TerrainError {
    #[error("Tile size {0} is not a power of two >= 2")]
    InvalidTileSize(u32),

    #[error("Heightfield of {rows}x{cols} samples cannot be tiled with tile size {tile_size}")]
    FieldNotTileable {
        rows: usize,
        cols: usize,
        tile_size: u32,
    },

    #[error("Invalid detail budget: {0}")]
    InvalidBudget(String),

    #[error("Expected {expected} height samples, got {actual}")]
    SampleCount { expected: usize, actual: usize },

    #[error("Grid point ({row}, {col}) is outside the {rows}x{cols} heightfield")]
    OutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("World position ({x}, {z}) is off the terrain")]
    OffTerrain { x: f32, z: f32 },

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Cannot read {path}: {source}")]
    ConfigFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl TerrainError {
    pub fn budget<T: ToString>(msg: T) -> Self {
        TerrainError::InvalidBudget(msg.to_string())
    }
}

/// Result alias used throughout the terrain module.
pub type Result<T> = std::result::Result<T, TerrainError>;

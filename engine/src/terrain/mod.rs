//! Terrain Module
//!
//! Continuous level-of-detail terrain over a tiled height field.
//!
//! - [`heightfield`] - Quantized height samples and world-space conversion
//! - [`triangle_table`] - Shared bintree layout (split points, vertices, neighbours)
//! - [`bintree`] - One triangle tree per half tile with per-triangle errors
//! - [`priority_queue`] - Bucketed split and merge queues
//! - [`mesh`] - The tile mesh manager and its per-frame split/merge loop

pub mod bintree;
pub mod cache;
pub mod config;
pub mod error;
pub mod generate;
pub mod heightfield;
pub mod mesh;
pub mod priority_queue;
pub mod stats;
pub mod triangle_table;

pub use bintree::{ActiveTriangles, BinTriTree, TreeIndex, TreeNeighbours, TriRef};
pub use cache::{TriangleCache, TriangleNode};
pub use config::MeshConfig;
pub use error::{Result, TerrainError};
pub use generate::{FbmParams, fbm_field};
pub use heightfield::HeightField;
pub use mesh::{ConsistencyViolation, RenderTriangle, TerrainMeshData, TerrainVertex, TileMeshManager};
pub use priority_queue::{BucketQueue, QueueHandle, QueueOrder};
pub use stats::{FrameReport, MeshStats};
pub use triangle_table::{EdgeKind, ROOT, TriIndex, TriangleTable};

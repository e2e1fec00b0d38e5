//! ROAM Terrain Engine Library
//!
//! Real-time continuous level-of-detail terrain: a tiled height field is
//! covered by right-isosceles triangle bintrees that are split and merged
//! every frame so the visible triangle count stays inside a budget while
//! detail goes where the screen-space error is largest.
//!
//! # Modules
//!
//! - [`camera`] - View frustum and AABB visibility classification
//! - [`terrain`] - Height field, triangle bintrees, priority queues and the tile mesh manager
//!
//! # Example
//!
//! ```ignore
//! use glam::Vec3;
//! use roam_terrain_engine::camera::ViewFrustum;
//! use roam_terrain_engine::terrain::{fbm_field, FbmParams, MeshConfig, TileMeshManager};
//!
//! // 4x4 tiles of 32 cells
//! let field = fbm_field(129, 129, &FbmParams::default());
//! let mut mesh = TileMeshManager::new(field, MeshConfig::default())?;
//!
//! let frustum = ViewFrustum::perspective(
//!     Vec3::new(10.0, 40.0, 10.0),
//!     Vec3::new(1.0, -0.3, 1.0),
//!     Vec3::Y,
//!     60f32.to_radians(),
//!     16.0 / 9.0,
//!     1.0,
//!     150.0,
//! );
//! let report = mesh.calculate(&frustum);
//! let batch = mesh.vertex_batch(true);
//! ```

pub mod camera;
pub mod terrain;

// Re-export the main entry points at crate level for convenience
pub use camera::{ViewFrustum, VisState};
pub use terrain::{HeightField, MeshConfig, TerrainError, TileMeshManager};

//! Camera Module
//!
//! View frustum and visibility classification for the terrain mesh. Frustums
//! are plain plane sets built from a pose and projection; nothing here owns a
//! window or a camera controller.

pub mod frustum;

pub use frustum::{Plane, ViewFrustum, VisState};

//! Mesh Statistics
//!
//! Cumulative counters kept by [`TileMeshManager`](super::TileMeshManager)
//! and the per-frame summary returned by `calculate`.

use serde::Serialize;

/// Cumulative counters since construction (or the last `reset`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MeshStats {
    /// Visible active triangles after the last frame
    pub visible: usize,
    /// Active triangles (visible or not) after the last frame
    pub active: usize,
    /// Priority computations
    pub priority_updates: u64,
    /// Split queue insertions
    pub queue_inserts: u64,
    /// Split queue removals
    pub queue_removes: u64,
    /// Split and merge queue repositions
    pub queue_moves: u64,
    /// Frustum classifications
    pub visibility_tests: u64,
    /// Balance loop iterations
    pub balance_iterations: u64,
    pub splits: u64,
    pub merges: u64,
    /// Splits refused for lack of head-room under `abs_max_detail`
    pub detail_limit_hits: u64,
    /// Frames whose balance loop stopped at the iteration cap
    pub iteration_cap_hits: u64,
    pub full_rebuilds: u64,
    pub frames: u64,
}

impl MeshStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// What one `calculate` call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    /// The mesh was rebuilt from the roots
    pub rebuilt: bool,
    pub splits: u32,
    pub merges: u32,
    pub iterations: u32,
    /// Visible active triangles at the end of the frame
    pub visible: usize,
    /// Active triangles at the end of the frame
    pub active: usize,
    /// A split was refused for lack of head-room
    pub detail_limit_hit: bool,
    /// The balance loop ran out of iterations
    pub iteration_cap_hit: bool,
}

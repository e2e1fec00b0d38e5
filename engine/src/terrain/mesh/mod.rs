//! Tile Mesh Manager
//!
//! Owns every tree of a tiled terrain, the shared triangle table and the
//! split and merge queues, and drives the per-frame update.
//!
//! Each frame `calculate` either rebuilds the mesh from the roots (first
//! frame, large camera jumps) or revalidates visibility and priorities of
//! the existing mesh, then runs the balance loop until the visible triangle
//! count sits inside `[min_detail, max_detail]` and no queued split above the
//! configured slack is left that the budget could pay for.
//!
//! Within one frame a triangle that was merged is never picked for a split
//! again, and while a split is pending no diamond split in the same frame is
//! merged to make room for it. Every frame therefore ends after a bounded
//! number of operations.
//!
//! ## Tiling
//!
//! A field of `R * N + 1` by `C * N + 1` samples is cut into `R x C` tiles.
//! Tile `(i, j)` owns tree `2 (i C + j)` (normal, apex at `(iN, jN)`) and tree
//! `2 (i C + j) + 1` (mirrored, apex at `((i+1)N, (j+1)N)`). Normal trees
//! border the mirrored trees above, to the left and across the diagonal;
//! mirrored trees border the normal trees below, to the right and across
//! the diagonal.
//!
//! # Example
//!
//! ```ignore
//! use roam_terrain_engine::camera::ViewFrustum;
//! use roam_terrain_engine::terrain::{fbm_field, FbmParams, MeshConfig, TileMeshManager};
//!
//! let field = fbm_field(129, 129, &FbmParams::default());
//! let mut mesh = TileMeshManager::new(field, MeshConfig::default())?;
//!
//! let frustum = ViewFrustum::perspective(eye, forward, Vec3::Y, fov, aspect, 1.0, 150.0);
//! let report = mesh.calculate(&frustum);
//! for tri in mesh.render_triangles().filter(|t| t.vis.is_visible()) {
//!     // submit tri.vertices
//! }
//! ```

mod consistency;
mod output;
mod split_merge;

pub use consistency::ConsistencyViolation;
pub use output::{RenderTriangle, TerrainMeshData, TerrainVertex};

use std::collections::HashSet;
use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::camera::{VisState, ViewFrustum};

use super::bintree::{BinTriTree, TreeIndex, TreeNeighbours, TriRef};
use super::cache::TriangleNode;
use super::config::MeshConfig;
use super::error::{Result, TerrainError};
use super::heightfield::HeightField;
use super::priority_queue::{BucketQueue, QueueOrder};
use super::stats::{FrameReport, MeshStats};
use super::triangle_table::{ROOT, TriangleTable};

/// Camera state derived once per frame for visibility and priority.
#[derive(Clone, Debug)]
struct FrameView {
    frustum: ViewFrustum,
    /// Camera position projected to XZ
    eye: Vec2,
    /// View direction projected to XZ (zero when looking straight down)
    forward: Vec2,
    near: f32,
    far: f32,
    /// Maps `error * depth` onto the priority buckets
    variance_scale: f32,
}

/// Tiled bintree terrain mesh.
#[derive(Debug)]
pub struct TileMeshManager {
    config: MeshConfig,
    field: HeightField,
    table: Arc<TriangleTable>,
    trees: Vec<BinTriTree>,
    tile_rows: usize,
    tile_cols: usize,
    split_queue: BucketQueue<TriRef>,
    merge_queue: BucketQueue<TriRef>,
    view: FrameView,
    /// Position and direction of the last calculated frame
    last_pose: Option<(Vec3, Vec3)>,
    active_count: usize,
    visible_count: usize,
    abs_min_height: f32,
    abs_max_height: f32,
    abs_max_error: f32,
    stats: MeshStats,
    frame: FrameReport,
    /// Triangles split during the current frame, cascades included
    frame_splits: HashSet<TriRef>,
    /// Diamond halves merged during the current frame
    frame_merges: HashSet<TriRef>,
}

impl TileMeshManager {
    /// Build the trees for `field` and seed every root as active.
    ///
    /// # Errors
    ///
    /// Fails if the config is invalid or if the field is not
    /// `k * tile_size + 1` samples along both axes.
    pub fn new(field: HeightField, config: MeshConfig) -> Result<Self> {
        config.validate()?;
        let n = config.tile_size as usize;
        let tileable = |samples: usize| samples > n && (samples - 1) % n == 0;
        if !tileable(field.rows()) || !tileable(field.cols()) {
            return Err(TerrainError::FieldNotTileable {
                rows: field.rows(),
                cols: field.cols(),
                tile_size: config.tile_size,
            });
        }

        let table = Arc::new(TriangleTable::build(config.tile_size)?);
        let tile_rows = (field.rows() - 1) / n;
        let tile_cols = (field.cols() - 1) / n;
        let normal = |i: usize, j: usize| 2 * (i * tile_cols + j);
        let mirrored = |i: usize, j: usize| 2 * (i * tile_cols + j) + 1;

        let mut trees = Vec::with_capacity(2 * tile_rows * tile_cols);
        for i in 0..tile_rows {
            for j in 0..tile_cols {
                let (row, col) = ((i * n) as u32, (j * n) as u32);
                let size = n as u32;

                let neighbours = TreeNeighbours {
                    top: (i > 0).then(|| mirrored(i - 1, j)),
                    left: (j > 0).then(|| mirrored(i, j - 1)),
                    diagonal: Some(mirrored(i, j)),
                };
                trees.push(BinTriTree::new(
                    normal(i, j),
                    (i, j),
                    false,
                    (row, col),
                    neighbours,
                    Arc::clone(&table),
                    &field,
                )?);

                let neighbours = TreeNeighbours {
                    top: (i + 1 < tile_rows).then(|| normal(i + 1, j)),
                    left: (j + 1 < tile_cols).then(|| normal(i, j + 1)),
                    diagonal: Some(normal(i, j)),
                };
                trees.push(BinTriTree::new(
                    mirrored(i, j),
                    (i, j),
                    true,
                    (row + size, col + size),
                    neighbours,
                    Arc::clone(&table),
                    &field,
                )?);
            }
        }

        let resolution = config.priority_resolution;
        let view = FrameView {
            frustum: ViewFrustum::default(),
            eye: Vec2::ZERO,
            forward: Vec2::X,
            near: config.near_clip,
            far: config.far_clip,
            variance_scale: 1.0,
        };

        let mut mesh = Self {
            config,
            field,
            table,
            trees,
            tile_rows,
            tile_cols,
            split_queue: BucketQueue::new(resolution, QueueOrder::HighestFirst),
            merge_queue: BucketQueue::new(resolution, QueueOrder::LowestFirst),
            view,
            last_pose: None,
            active_count: 0,
            visible_count: 0,
            abs_min_height: 0.0,
            abs_max_height: 0.0,
            abs_max_error: 0.0,
            stats: MeshStats::new(),
            frame: FrameReport::default(),
            frame_splits: HashSet::new(),
            frame_merges: HashSet::new(),
        };
        mesh.refresh_extents();
        mesh.view.variance_scale = mesh.variance_scale();
        mesh.reset();

        log::info!(
            "Created terrain mesh: {}x{} tiles of {} cells, {} trees, heights {:.2}..{:.2}, max error {:.3}",
            mesh.tile_rows,
            mesh.tile_cols,
            n,
            mesh.trees.len(),
            mesh.abs_min_height,
            mesh.abs_max_height,
            mesh.abs_max_error
        );
        Ok(mesh)
    }

    /// Drop all refinement and return to one active triangle per tree.
    ///
    /// Roots are marked fully visible; the next `calculate` rebuilds.
    pub fn reset(&mut self) {
        self.clear_mesh();
        for tree in 0..self.trees.len() {
            self.activate(tree, ROOT, None, VisState::In);
        }
        self.last_pose = None;
    }

    fn clear_mesh(&mut self) {
        self.split_queue.clear();
        self.merge_queue.clear();
        for tree in &mut self.trees {
            tree.cache.clear();
        }
        self.active_count = 0;
        self.visible_count = 0;
        self.frame_splits.clear();
        self.frame_merges.clear();
    }

    // ========================================================================
    // Frame update
    // ========================================================================

    /// Update the mesh for a new view and rebalance it.
    pub fn calculate(&mut self, frustum: &ViewFrustum) -> FrameReport {
        self.frame = FrameReport::default();
        self.frame_splits.clear();
        self.frame_merges.clear();
        self.stats.frames += 1;

        let rebuild = self.needs_rebuild(frustum);
        self.set_view(frustum);

        if rebuild {
            self.rebuild();
        } else {
            self.revalidate();
        }
        self.balance();

        self.last_pose = Some((frustum.position, frustum.forward));
        self.frame.rebuilt = rebuild;
        self.frame.visible = self.visible_count;
        self.frame.active = self.active_count;
        self.stats.visible = self.visible_count;
        self.stats.active = self.active_count;

        log::debug!(
            "Frame {}: {} visible / {} active, {} splits, {} merges, {} iterations{}",
            self.stats.frames,
            self.frame.visible,
            self.frame.active,
            self.frame.splits,
            self.frame.merges,
            self.frame.iterations,
            if rebuild { " (rebuilt)" } else { "" }
        );
        self.frame
    }

    fn needs_rebuild(&self, frustum: &ViewFrustum) -> bool {
        match self.last_pose {
            None => true,
            Some((position, forward)) => {
                forward.dot(frustum.forward) < self.config.rebuild_cos_threshold
                    || position.distance(frustum.position) > self.config.rebuild_distance
            }
        }
    }

    fn set_view(&mut self, frustum: &ViewFrustum) {
        self.view = FrameView {
            frustum: frustum.clone(),
            eye: Vec2::new(frustum.position.x, frustum.position.z),
            forward: Vec2::new(frustum.forward.x, frustum.forward.z).normalize_or_zero(),
            near: self.config.near_clip,
            far: self.config.far_clip,
            variance_scale: self.variance_scale(),
        };
    }

    fn variance_scale(&self) -> f32 {
        let denom = self.abs_max_error * 2.0 * self.config.far_clip;
        if denom > 0.0 {
            self.config.priority_resolution as f32 / denom
        } else {
            1.0
        }
    }

    /// Clear everything and reinsert the roots against the current view.
    fn rebuild(&mut self) {
        self.clear_mesh();
        for tree in 0..self.trees.len() {
            self.insert_visible(tree, ROOT, None, VisState::Partial);
        }
        self.stats.full_rebuilds += 1;
        log::debug!("Rebuilt mesh: {} visible roots", self.visible_count);
    }

    /// Rescore the existing mesh: frontier first, then every queued diamond.
    fn revalidate(&mut self) {
        for tree in 0..self.trees.len() {
            self.update_split(tree, ROOT, VisState::Partial, None);
        }
        let diamonds: Vec<TriRef> = self.merge_queue.iter().map(|(_, diamond, _)| diamond).collect();
        for diamond in diamonds {
            self.update_merge(diamond.tree, diamond.tri);
        }
    }

    /// Split and merge until the visible count is within budget.
    ///
    /// Below `max_detail` any split above the slack is taken. At the ceiling a
    /// split only happens after a merge that ranks more than the slack below
    /// it. Diamonds with nothing to refine are merged while the count stays at
    /// or above `min_detail`.
    fn balance(&mut self) {
        let cap = self.config.iteration_cap();
        let (min, max) = (self.config.min_detail, self.config.max_detail);
        let slack = self.config.merge_slack;

        loop {
            if self.frame.iterations as usize >= cap {
                self.frame.iteration_cap_hit = true;
                self.stats.iteration_cap_hits += 1;
                log::debug!("Balance loop stopped at {} iterations", cap);
                break;
            }
            self.frame.iterations += 1;
            self.stats.balance_iterations += 1;

            let visible = self.visible_count;

            if visible > max {
                // A failed merge still drops its stale entry, so keep going.
                match self.merge_candidate(true).or_else(|| self.merge_candidate(false)) {
                    Some((diamond, _)) => {
                        self.force_merge(diamond.tree, diamond.tri);
                        continue;
                    }
                    None => break,
                }
            }

            let split = self.split_candidate();
            if visible < min {
                match split {
                    Some((tri, _)) if self.force_split(tri.tree, tri.tri) => continue,
                    _ => break,
                }
            }

            let pending = split.filter(|&(_, priority)| priority > slack);
            if let Some((tri, priority)) = pending {
                if visible + 2 <= max {
                    if self.force_split(tri.tree, tri.tri) {
                        continue;
                    }
                    break;
                }
                // At the ceiling: trade a clearly cheaper diamond for the split.
                if let Some((diamond, merge)) = self.merge_candidate(true) {
                    if merge.saturating_add(slack) < priority
                        && visible >= min + 2
                        && self.force_merge(diamond.tree, diamond.tri)
                    {
                        continue;
                    }
                }
            }

            if let Some((diamond, 0)) = self.merge_candidate(pending.is_some()) {
                let idle = visible >= min + 2 && visible.saturating_sub(self.merge_visible_delta(diamond)) >= min;
                if idle && self.force_merge(diamond.tree, diamond.tri) {
                    continue;
                }
            }

            break;
        }
    }

    /// Best split queue entry not merged earlier in this frame.
    fn split_candidate(&self) -> Option<(TriRef, u16)> {
        self.split_queue
            .iter()
            .find(|(_, tri, _)| !self.frame_merges.contains(tri))
            .map(|(_, tri, bucket)| (tri, bucket))
    }

    /// Cheapest merge queue entry, skipping diamonds split in this frame when
    /// `skip_fresh` is set.
    fn merge_candidate(&self, skip_fresh: bool) -> Option<(TriRef, u16)> {
        self.merge_queue
            .iter()
            .find(|&(_, diamond, _)| {
                !skip_fresh
                    || !(self.frame_splits.contains(&diamond)
                        || self.trees[diamond.tree]
                            .neighbour_of(diamond.tri)
                            .is_some_and(|n| self.frame_splits.contains(&n)))
            })
            .map(|(_, diamond, bucket)| (diamond, bucket))
    }

    /// Visible triangles removed by merging `diamond`, net of the parents it restores.
    fn merge_visible_delta(&self, diamond: TriRef) -> usize {
        let sides = [Some(diamond), self.trees[diamond.tree].neighbour_of(diamond.tri)];
        let (mut children, mut parents) = (0usize, 0usize);
        for side in sides.into_iter().flatten() {
            let tree = &self.trees[side.tree];
            for child in [TriangleTable::first_child(side.tri), TriangleTable::second_child(side.tri)] {
                if tree.node(child).is_some_and(|n| n.vis.is_visible()) {
                    children += 1;
                }
            }
            if tree.node(side.tri).is_some_and(|n| n.vis.is_visible()) {
                parents += 1;
            }
        }
        children.saturating_sub(parents)
    }

    // ========================================================================
    // Height queries
    // ========================================================================

    /// Full-resolution terrain height at world `(x, z)`.
    pub fn height(&self, x: f32, z: f32) -> Result<f32> {
        let (tree, local) = self.map_position(x, z)?;
        Ok(self.trees[tree].local_height(local))
    }

    /// Height of the current (possibly coarse) mesh surface at world `(x, z)`.
    pub fn mesh_height(&self, x: f32, z: f32) -> Result<f32> {
        let (tree, local) = self.map_position(x, z)?;
        Ok(self.trees[tree].mesh_height(local))
    }

    /// Active triangle covering world `(x, z)`.
    pub fn triangle_at(&self, x: f32, z: f32) -> Result<TriRef> {
        let (tree, local) = self.map_position(x, z)?;
        Ok(TriRef::new(tree, self.trees[tree].locate(local)))
    }

    /// Move the grid point nearest to `(x, z)` to height `y`.
    ///
    /// Bounds and errors of every tree touching the point are recomputed;
    /// priorities follow on the next `calculate`.
    pub fn set_height(&mut self, x: f32, y: f32, z: f32) -> Result<()> {
        let (row, col) = (x.round(), z.round());
        let inside = |v: f32, samples: usize| v >= 0.0 && v <= (samples - 1) as f32;
        if !inside(row, self.field.rows()) || !inside(col, self.field.cols()) {
            return Err(TerrainError::OffTerrain { x, z });
        }
        let (row, col) = (row as usize, col as usize);
        let raw = self.field.to_raw(y);
        self.field.set_height(row, col, raw)?;

        let point = Vec2::new(row as f32, col as f32);
        for tree in &mut self.trees {
            if tree.contains_local(tree.to_local(point)) {
                tree.refresh_heights(&self.field)?;
            }
        }
        self.refresh_extents();
        log::trace!("Set height at ({}, {}) to {:.3}", row, col, self.field.to_world(raw));
        Ok(())
    }

    /// Tree and local position for world `(x, z)`.
    pub fn map_position(&self, x: f32, z: f32) -> Result<(TreeIndex, Vec2)> {
        let n = self.config.tile_size as f32;
        let (max_x, max_z) = ((self.tile_rows as f32) * n, (self.tile_cols as f32) * n);
        if !(0.0..=max_x).contains(&x) || !(0.0..=max_z).contains(&z) {
            return Err(TerrainError::OffTerrain { x, z });
        }

        let i = ((x / n) as usize).min(self.tile_rows - 1);
        let j = ((z / n) as usize).min(self.tile_cols - 1);
        let local = Vec2::new(x - i as f32 * n, z - j as f32 * n);
        let base = 2 * (i * self.tile_cols + j);
        if local.x + local.y <= n {
            Ok((base, local))
        } else {
            Ok((base + 1, Vec2::splat(n) - local))
        }
    }

    fn refresh_extents(&mut self) {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        let mut error = 0.0f32;
        for tree in &self.trees {
            lo = lo.min(tree.min_height());
            hi = hi.max(tree.max_height());
            error = error.max(tree.max_error());
        }
        self.abs_min_height = lo;
        self.abs_max_height = hi;
        self.abs_max_error = error;
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn field(&self) -> &HeightField {
        &self.field
    }

    pub fn table(&self) -> &TriangleTable {
        &self.table
    }

    pub fn trees(&self) -> &[BinTriTree] {
        &self.trees
    }

    pub fn tree(&self, index: TreeIndex) -> Option<&BinTriTree> {
        self.trees.get(index)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn tile_rows(&self) -> usize {
        self.tile_rows
    }

    pub fn tile_cols(&self) -> usize {
        self.tile_cols
    }

    /// Tree index of the normal half of tile `(i, j)`.
    pub fn normal_tree(&self, i: usize, j: usize) -> TreeIndex {
        2 * (i * self.tile_cols + j)
    }

    /// Tree index of the mirrored half of tile `(i, j)`.
    pub fn mirrored_tree(&self, i: usize, j: usize) -> TreeIndex {
        2 * (i * self.tile_cols + j) + 1
    }

    pub fn stats(&self) -> &MeshStats {
        &self.stats
    }

    /// Report of the last `calculate`.
    pub fn last_frame(&self) -> &FrameReport {
        &self.frame
    }

    /// Active triangles not classified `Out`.
    pub fn visible_count(&self) -> usize {
        self.visible_count
    }

    /// All active triangles.
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn split_queue_len(&self) -> usize {
        self.split_queue.len()
    }

    pub fn merge_queue_len(&self) -> usize {
        self.merge_queue.len()
    }

    pub fn abs_min_height(&self) -> f32 {
        self.abs_min_height
    }

    pub fn abs_max_height(&self) -> f32 {
        self.abs_max_height
    }

    pub fn abs_max_error(&self) -> f32 {
        self.abs_max_error
    }

    pub fn node(&self, tri: TriRef) -> Option<&TriangleNode> {
        self.trees.get(tri.tree)?.node(tri.tri)
    }

    pub fn is_active(&self, tri: TriRef) -> bool {
        self.node(tri).is_some_and(|n| n.is_active())
    }

    pub fn is_split(&self, tri: TriRef) -> bool {
        self.node(tri).is_some_and(|n| n.split)
    }
}

//! Split and merge operations.
//!
//! Every operation keeps the diamond invariant: an active triangle's
//! hypotenuse neighbour is either active itself or the child of an active
//! triangle. Splits cascade across the hypotenuse (into other trees when the
//! hypotenuse lies on a tile edge); merges only happen when both halves of a
//! diamond are down to their two active children.

use glam::Vec2;

use crate::camera::VisState;
use crate::terrain::bintree::{TreeIndex, TriRef};
use crate::terrain::cache::TriangleNode;
use crate::terrain::triangle_table::{ROOT, TriIndex, TriangleTable};

use super::TileMeshManager;

impl TileMeshManager {
    // ========================================================================
    // Visibility and priority
    // ========================================================================

    /// Visibility of `t`, inherited when the parent is decided.
    pub(super) fn classify(&mut self, tree: TreeIndex, t: TriIndex, parent_vis: VisState) -> VisState {
        if parent_vis != VisState::Partial || self.table.is_leaf(t) {
            return parent_vis;
        }
        self.stats.visibility_tests += 1;

        let (lo, hi) = self.trees[tree].bounds(t);
        let eye = self.view.eye;
        let far_sq = self.view.far * self.view.far;
        let (lo2, hi2) = (Vec2::new(lo.x, lo.z), Vec2::new(hi.x, hi.z));

        if eye.clamp(lo2, hi2).distance_squared(eye) > far_sq {
            return VisState::Out;
        }
        let reach = (eye - lo2).abs().max((eye - hi2).abs());
        let by_distance = if reach.length_squared() <= far_sq {
            VisState::In
        } else {
            VisState::Partial
        };
        by_distance.combine(self.view.frustum.classify_aabb(lo, hi))
    }

    /// Uncapped priority bucket of `t` for the current view.
    pub(super) fn priority_calc(&mut self, tree: TreeIndex, t: TriIndex) -> u16 {
        self.stats.priority_updates += 1;
        let tree = &self.trees[tree];
        let error = tree.error(t);
        if error <= 0.0 {
            return 0;
        }

        let depth = self.view.forward.dot(tree.centre_xz(t) - self.view.eye);
        let z = (2.0 * self.view.far - depth).max(self.view.near);
        let top = (self.config.priority_resolution - 1) as f32;
        (error * self.view.variance_scale * z).clamp(0.0, top) as u16
    }

    /// Priority of `t`, kept below its parent's so children never outrank it.
    pub(super) fn score(&mut self, tree: TreeIndex, t: TriIndex, cap: Option<u16>) -> u16 {
        let priority = self.priority_calc(tree, t);
        match cap {
            Some(parent) => priority.min(parent.saturating_sub(1)),
            None => priority,
        }
    }

    // ========================================================================
    // Frontier bookkeeping
    // ========================================================================

    /// Put `t` on the frontier and queue it for splitting if it is visible.
    pub(super) fn activate(&mut self, tree: TreeIndex, t: TriIndex, cap: Option<u16>, vis: VisState) {
        let priority = self.score(tree, t, cap);
        let mut node = TriangleNode::new(t, priority, vis);
        if vis.is_visible() && !self.table.is_leaf(t) {
            node.split_handle = Some(self.split_queue.insert(TriRef::new(tree, t), priority));
            self.stats.queue_inserts += 1;
        }
        self.trees[tree].cache.insert(node);

        self.active_count += 1;
        if vis.is_visible() {
            self.visible_count += 1;
        }
    }

    /// Take `t` off the frontier, dropping its split entry. The node stays cached.
    fn leave_frontier(&mut self, tree: TreeIndex, t: TriIndex) -> Option<TriangleNode> {
        let node = *self.trees[tree].cache.get(t)?;
        if node.split {
            return None;
        }
        if let Some(handle) = node.split_handle {
            self.split_queue.remove(handle);
            self.stats.queue_removes += 1;
        }
        if let Some(entry) = self.trees[tree].cache.get_mut(t) {
            entry.split_handle = None;
        }

        self.active_count -= 1;
        if node.vis.is_visible() {
            self.visible_count -= 1;
        }
        Some(TriangleNode {
            split_handle: None,
            ..node
        })
    }

    // ========================================================================
    // Incremental updates
    // ========================================================================

    /// Add `t` (or, if it is split, its frontier descendants) to the mesh.
    pub fn insert_visible(&mut self, tree: TreeIndex, t: TriIndex, cap: Option<u16>, parent_vis: VisState) {
        let vis = self.classify(tree, t, parent_vis);
        if self.trees[tree].is_split(t) {
            let priority = self.score(tree, t, cap);
            if let Some(node) = self.trees[tree].cache.get_mut(t) {
                node.vis = vis;
                node.priority = priority;
            }
            self.insert_visible(tree, TriangleTable::first_child(t), Some(priority), vis);
            self.insert_visible(tree, TriangleTable::second_child(t), Some(priority), vis);
        } else if !self.trees[tree].is_active(t) {
            self.activate(tree, t, cap, vis);
        }
    }

    /// Revalidate visibility and priority of `t` and the frontier below it.
    pub fn update_split(&mut self, tree: TreeIndex, t: TriIndex, parent_vis: VisState, cap: Option<u16>) {
        let Some(node) = self.trees[tree].node(t).copied() else {
            return;
        };
        let vis = self.classify(tree, t, parent_vis);
        let priority = self.score(tree, t, cap);

        if node.split {
            if let Some(entry) = self.trees[tree].cache.get_mut(t) {
                entry.vis = vis;
                entry.priority = priority;
            }
            self.update_split(tree, TriangleTable::first_child(t), vis, Some(priority));
            self.update_split(tree, TriangleTable::second_child(t), vis, Some(priority));
            return;
        }

        match (node.vis.is_visible(), vis.is_visible()) {
            (true, false) => self.visible_count -= 1,
            (false, true) => self.visible_count += 1,
            _ => {}
        }

        let queued = vis.is_visible() && !self.table.is_leaf(t);
        let split_handle = match (node.split_handle, queued) {
            (Some(handle), true) => {
                if self.split_queue.bucket(handle) != Some(priority) {
                    self.split_queue.move_to(handle, priority);
                    self.stats.queue_moves += 1;
                }
                Some(handle)
            }
            (Some(handle), false) => {
                self.split_queue.remove(handle);
                self.stats.queue_removes += 1;
                None
            }
            (None, true) => {
                self.stats.queue_inserts += 1;
                Some(self.split_queue.insert(TriRef::new(tree, t), priority))
            }
            (None, false) => None,
        };

        if let Some(entry) = self.trees[tree].cache.get_mut(t) {
            entry.vis = vis;
            entry.priority = priority;
            entry.split_handle = split_handle;
        }
    }

    /// Whether `p` and its neighbour are split with all children active.
    pub fn is_mergeable(&self, tree: TreeIndex, p: TriIndex) -> bool {
        let sides = [Some(TriRef::new(tree, p)), self.trees[tree].neighbour_of(p)];
        sides.into_iter().flatten().all(|side| {
            let tree = &self.trees[side.tree];
            tree.is_split(side.tri)
                && tree.is_active(TriangleTable::first_child(side.tri))
                && tree.is_active(TriangleTable::second_child(side.tri))
        })
    }

    /// Merge priority of the diamond owned by `p`: the larger stored priority
    /// of the halves that still have a visible child, or 0 when neither does.
    ///
    /// Stored priorities carry the same parent cap as split priorities, so
    /// both queues rank on one scale.
    fn merge_priority(&self, tree: TreeIndex, p: TriIndex) -> u16 {
        let sides = [Some(TriRef::new(tree, p)), self.trees[tree].neighbour_of(p)];
        sides
            .into_iter()
            .flatten()
            .filter_map(|side| {
                let t = &self.trees[side.tree];
                let visible = [TriangleTable::first_child(side.tri), TriangleTable::second_child(side.tri)]
                    .into_iter()
                    .any(|child| t.node(child).is_some_and(|n| n.vis.is_visible()));
                if visible { t.node(side.tri).map(|n| n.priority) } else { None }
            })
            .max()
            .unwrap_or(0)
    }

    /// Insert, reposition or drop the merge entry of the diamond owned by `p`.
    pub fn update_merge(&mut self, tree: TreeIndex, p: TriIndex) {
        let existing = self.trees[tree].node(p).and_then(|n| n.merge_handle);
        if !self.is_mergeable(tree, p) {
            if existing.is_some() {
                self.remove_merge(tree, p);
            }
            return;
        }

        let priority = self.merge_priority(tree, p);
        match existing {
            Some(handle) if self.merge_queue.contains(handle) => {
                if self.merge_queue.bucket(handle) != Some(priority) {
                    self.merge_queue.move_to(handle, priority);
                    self.stats.queue_moves += 1;
                }
            }
            _ => {
                let handle = self.merge_queue.insert(TriRef::new(tree, p), priority);
                let sides = [Some(TriRef::new(tree, p)), self.trees[tree].neighbour_of(p)];
                for side in sides.into_iter().flatten() {
                    if let Some(node) = self.trees[side.tree].cache.get_mut(side.tri) {
                        node.merge_handle = Some(handle);
                    }
                }
            }
        }
    }

    /// Drop the merge entry of the diamond owned by `p`, on both halves.
    fn remove_merge(&mut self, tree: TreeIndex, p: TriIndex) {
        let Some(handle) = self.trees[tree].node(p).and_then(|n| n.merge_handle) else {
            return;
        };
        self.merge_queue.remove(handle);

        let sides = [Some(TriRef::new(tree, p)), self.trees[tree].neighbour_of(p)];
        for side in sides.into_iter().flatten() {
            if let Some(node) = self.trees[side.tree].cache.get_mut(side.tri) {
                if node.merge_handle == Some(handle) {
                    node.merge_handle = None;
                }
            }
        }
    }

    // ========================================================================
    // Split
    // ========================================================================

    /// Active triangles a single forced split may add in the worst case.
    fn split_reserve(&self) -> usize {
        4 * (self.table.leaf_level() as usize + 1)
    }

    /// Split `t`, first splitting whatever it takes to keep the mesh crack-free.
    ///
    /// Returns `false` without changing anything for leaves, already split
    /// triangles, or when the split could push the active count past
    /// `abs_max_detail`.
    pub fn force_split(&mut self, tree: TreeIndex, t: TriIndex) -> bool {
        if tree >= self.trees.len()
            || !self.table.is_triangle(t)
            || self.table.is_leaf(t)
            || self.trees[tree].is_split(t)
        {
            return false;
        }
        if self.active_count + self.split_reserve() > self.config.abs_max_detail {
            self.stats.detail_limit_hits += 1;
            self.frame.detail_limit_hit = true;
            log::debug!(
                "Split of tree {} triangle {} refused: {} active, limit {}",
                tree,
                t,
                self.active_count,
                self.config.abs_max_detail
            );
            return false;
        }

        self.split_recursive(tree, t);
        self.stats.splits += 1;
        self.frame.splits += 1;
        true
    }

    fn split_recursive(&mut self, tree: TreeIndex, t: TriIndex) {
        if self.trees[tree].is_split(t) || self.table.is_leaf(t) {
            return;
        }
        if !self.trees[tree].is_active(t) {
            // Below the frontier: open up the parent first.
            if t == ROOT {
                return;
            }
            self.split_recursive(tree, TriangleTable::parent(t));
            if !self.trees[tree].is_active(t) {
                return;
            }
        }

        // The diamond `t` belonged to is no longer made of active triangles.
        if t > ROOT {
            self.remove_merge(tree, TriangleTable::parent(t));
        }
        let Some(node) = self.leave_frontier(tree, t) else {
            return;
        };
        if let Some(entry) = self.trees[tree].cache.get_mut(t) {
            entry.split = true;
        }
        self.frame_splits.insert(TriRef::new(tree, t));
        log::trace!("Split tree {} triangle {} (priority {})", tree, t, node.priority);

        for child in [TriangleTable::first_child(t), TriangleTable::second_child(t)] {
            let vis = self.classify(tree, child, node.vis);
            self.activate(tree, child, Some(node.priority), vis);
        }

        if let Some(neighbour) = self.trees[tree].neighbour_of(t) {
            self.split_recursive(neighbour.tree, neighbour.tri);
        }
        self.update_merge(tree, t);
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Merge the diamond owned by `p` back into `p` and its neighbour.
    ///
    /// Returns `false` without changing the mesh unless both halves are split
    /// with active children.
    pub fn force_merge(&mut self, tree: TreeIndex, p: TriIndex) -> bool {
        if tree >= self.trees.len() || !self.table.is_triangle(p) {
            return false;
        }
        if !self.is_mergeable(tree, p) {
            self.remove_merge(tree, p);
            return false;
        }

        self.remove_merge(tree, p);
        let neighbour = self.trees[tree].neighbour_of(p);
        self.frame_merges.insert(TriRef::new(tree, p));
        self.frame_merges.extend(neighbour);
        self.merge_side(tree, p);
        if let Some(n) = neighbour {
            self.merge_side(n.tree, n.tri);
        }
        log::trace!("Merged tree {} triangle {} with {:?}", tree, p, neighbour);

        if p > ROOT {
            self.update_merge(tree, TriangleTable::parent(p));
        }
        if let Some(n) = neighbour {
            if n.tri > ROOT {
                self.update_merge(n.tree, TriangleTable::parent(n.tri));
            }
        }

        self.stats.merges += 1;
        self.frame.merges += 1;
        true
    }

    /// Replace the two active children of `p` with `p` itself.
    fn merge_side(&mut self, tree: TreeIndex, p: TriIndex) {
        for child in [TriangleTable::first_child(p), TriangleTable::second_child(p)] {
            if self.leave_frontier(tree, child).is_some() {
                self.trees[tree].cache.remove(child);
            }
        }

        let parent = (p > ROOT)
            .then(|| self.trees[tree].node(TriangleTable::parent(p)).copied())
            .flatten();
        let parent_vis = parent.map_or(VisState::Partial, |n| n.vis);
        let vis = self.classify(tree, p, parent_vis);
        self.activate(tree, p, parent.map(|n| n.priority), vis);
    }
}

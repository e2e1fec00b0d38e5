//! Binary Triangle Tree
//!
//! Mutable state of one half-tile: cached heights, nested error bounds and
//! the node cache describing which triangles are split and which form the
//! active frontier. The layout itself lives in the shared
//! [`TriangleTable`].
//!
//! A square tile holds two trees. The normal tree has its root apex at the
//! tile's top-left corner; the mirrored tree has its apex at the
//! bottom-right corner and maps local `(row, col)` to `origin - (row, col)`.
//! Split/merge operations span trees and live on
//! [`TileMeshManager`](super::TileMeshManager).

use std::sync::Arc;

use glam::{Vec2, Vec3};

use super::cache::{TriangleCache, TriangleNode};
use super::error::Result;
use super::heightfield::HeightField;
use super::triangle_table::{EdgeKind, ROOT, TriIndex, TriangleTable};

/// Index of a tree in the mesh.
pub type TreeIndex = usize;

/// A triangle of a specific tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriRef {
    pub tree: TreeIndex,
    pub tri: TriIndex,
}

impl TriRef {
    pub fn new(tree: TreeIndex, tri: TriIndex) -> Self {
        Self { tree, tri }
    }
}

/// Trees across each tile edge of a tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeNeighbours {
    pub top: Option<TreeIndex>,
    pub left: Option<TreeIndex>,
    pub diagonal: Option<TreeIndex>,
}

/// Per-tree split/merge state and height cache.
#[derive(Clone, Debug)]
pub struct BinTriTree {
    index: TreeIndex,
    tile: (usize, usize),
    mirrored: bool,
    /// Global grid point of local `(0, 0)`
    origin: (u32, u32),
    neighbours: TreeNeighbours,
    table: Arc<TriangleTable>,
    base: f32,
    scale: f32,
    /// Raw height per vertex slot; unused for leaves
    raw_height: Vec<i16>,
    /// Raw height bounds of each triangle's region
    min_raw: Vec<i16>,
    max_raw: Vec<i16>,
    /// Nested world-space interpolation error
    error: Vec<f32>,
    pub(crate) cache: TriangleCache,
}

impl BinTriTree {
    /// Create a tree and load its heights from `field`.
    pub fn new(
        index: TreeIndex,
        tile: (usize, usize),
        mirrored: bool,
        origin: (u32, u32),
        neighbours: TreeNeighbours,
        table: Arc<TriangleTable>,
        field: &HeightField,
    ) -> Result<Self> {
        let len = table.len();
        let mut tree = Self {
            index,
            tile,
            mirrored,
            origin,
            neighbours,
            table,
            base: field.base(),
            scale: field.scale(),
            raw_height: vec![0; len],
            min_raw: vec![0; len],
            max_raw: vec![0; len],
            error: vec![0.0; len],
            cache: TriangleCache::new(len),
        };
        tree.refresh_heights(field)?;
        Ok(tree)
    }

    /// Reload heights and recompute bounds and errors bottom-up.
    pub fn refresh_heights(&mut self, field: &HeightField) -> Result<()> {
        let table = Arc::clone(&self.table);
        let end = table.triangle_end();

        for v in 0..table.len() as TriIndex {
            if table.is_triangle(v) && table.is_leaf(v) {
                continue;
            }
            let (row, col) = self.global_point(table.grid_point(v));
            self.raw_height[v as usize] = field.height(row as usize, col as usize)?;
        }

        for t in (ROOT..end).rev() {
            let i = t as usize;
            if table.is_leaf(t) {
                let [a, b, c] = table.vertices(t).map(|v| self.raw_height[v as usize]);
                self.min_raw[i] = a.min(b).min(c);
                self.max_raw[i] = a.max(b).max(c);
                self.error[i] = 0.0;
            } else {
                let (first, second) = (2 * i, 2 * i + 1);
                self.min_raw[i] = self.min_raw[first].min(self.min_raw[second]);
                self.max_raw[i] = self.max_raw[first].max(self.max_raw[second]);

                let mid = self.height_of(t);
                let lerp = 0.5 * (self.height_of(table.v0(t)) + self.height_of(table.v1(t)));
                self.error[i] = (mid - lerp).abs().max(self.error[first]).max(self.error[second]);
            }
        }
        Ok(())
    }

    pub fn index(&self) -> TreeIndex {
        self.index
    }

    /// Tile `(row, col)` this tree belongs to.
    pub fn tile(&self) -> (usize, usize) {
        self.tile
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    pub fn origin(&self) -> (u32, u32) {
        self.origin
    }

    pub fn neighbours(&self) -> TreeNeighbours {
        self.neighbours
    }

    pub fn table(&self) -> &TriangleTable {
        &self.table
    }

    /// Tree across the hypotenuse of an edge triangle.
    pub fn neighbour_tree(&self, edge: EdgeKind) -> Option<TreeIndex> {
        match edge {
            EdgeKind::Inner => Some(self.index),
            EdgeKind::Top => self.neighbours.top,
            EdgeKind::Left => self.neighbours.left,
            EdgeKind::Diagonal => self.neighbours.diagonal,
        }
    }

    /// Triangle across the hypotenuse of `t`, possibly in another tree.
    pub fn neighbour_of(&self, t: TriIndex) -> Option<TriRef> {
        let tree = self.neighbour_tree(self.table.edge(t))?;
        Some(TriRef::new(tree, self.table.neighbour(t)))
    }

    // ------------------------------------------------------------------------
    // Coordinates and heights
    // ------------------------------------------------------------------------

    /// Local grid point to global grid point.
    #[inline]
    pub fn global_point(&self, (row, col): (u32, u32)) -> (u32, u32) {
        if self.mirrored {
            (self.origin.0 - row, self.origin.1 - col)
        } else {
            (self.origin.0 + row, self.origin.1 + col)
        }
    }

    /// Local position to world XZ.
    #[inline]
    pub fn to_world_xz(&self, local: Vec2) -> Vec2 {
        let origin = Vec2::new(self.origin.0 as f32, self.origin.1 as f32);
        if self.mirrored { origin - local } else { origin + local }
    }

    /// World XZ to local position (the mapping is its own inverse).
    #[inline]
    pub fn to_local(&self, world_xz: Vec2) -> Vec2 {
        let origin = Vec2::new(self.origin.0 as f32, self.origin.1 as f32);
        if self.mirrored { origin - world_xz } else { world_xz - origin }
    }

    /// Whether a local position lies inside this tree's triangle.
    pub fn contains_local(&self, local: Vec2) -> bool {
        const EPS: f32 = 1e-4;
        let n = self.table.tile_size() as f32;
        local.x >= -EPS && local.y >= -EPS && local.x + local.y <= n + EPS
    }

    #[inline]
    fn to_world(&self, raw: i16) -> f32 {
        self.base + self.scale * raw as f32 / i16::MAX as f32
    }

    /// Cached raw height of a vertex slot.
    #[inline]
    pub fn raw_height(&self, v: TriIndex) -> i16 {
        self.raw_height[v as usize]
    }

    /// World height of a vertex slot.
    #[inline]
    pub fn height_of(&self, v: TriIndex) -> f32 {
        self.to_world(self.raw_height[v as usize])
    }

    /// World position of a vertex slot.
    pub fn vertex_world(&self, v: TriIndex) -> Vec3 {
        let (row, col) = self.global_point(self.table.grid_point(v));
        Vec3::new(row as f32, self.height_of(v), col as f32)
    }

    /// Apex, v0 and v1 of `t` in world space.
    pub fn triangle_world(&self, t: TriIndex) -> [Vec3; 3] {
        self.table.vertices(t).map(|v| self.vertex_world(v))
    }

    /// World XZ of the split point of `t`.
    pub fn centre_xz(&self, t: TriIndex) -> Vec2 {
        self.to_world_xz(self.table.centre(t))
    }

    /// World-space bounding box of `t` and everything below it.
    pub fn bounds(&self, t: TriIndex) -> (Vec3, Vec3) {
        let [a, b, c] = self.table.vertices(t).map(|v| {
            let (row, col) = self.global_point(self.table.grid_point(v));
            Vec2::new(row as f32, col as f32)
        });
        let lo = a.min(b).min(c);
        let hi = a.max(b).max(c);
        (
            Vec3::new(lo.x, self.to_world(self.min_raw[t as usize]), lo.y),
            Vec3::new(hi.x, self.to_world(self.max_raw[t as usize]), hi.y),
        )
    }

    /// Nested interpolation error of `t` (world units).
    #[inline]
    pub fn error(&self, t: TriIndex) -> f32 {
        self.error[t as usize]
    }

    /// Lowest world height in the tree.
    pub fn min_height(&self) -> f32 {
        self.to_world(self.min_raw[ROOT as usize])
    }

    /// Highest world height in the tree.
    pub fn max_height(&self) -> f32 {
        self.to_world(self.max_raw[ROOT as usize])
    }

    /// Largest interpolation error in the tree.
    pub fn max_error(&self) -> f32 {
        self.error[ROOT as usize]
    }

    /// Full-resolution height at a local position inside the tree.
    pub fn local_height(&self, local: Vec2) -> f32 {
        let mut t = ROOT;
        while !self.table.is_leaf(t) {
            t = self.child_containing(t, local);
        }
        self.interpolate(t, local)
    }

    /// Height at a local position on the current (possibly coarse) mesh.
    pub fn mesh_height(&self, local: Vec2) -> f32 {
        let t = self.locate(local);
        self.interpolate(t, local)
    }

    /// Active triangle containing a local position.
    pub fn locate(&self, local: Vec2) -> TriIndex {
        let mut t = ROOT;
        while self.is_split(t) && !self.table.is_leaf(t) {
            t = self.child_containing(t, local);
        }
        t
    }

    fn local_vertex(&self, v: TriIndex) -> Vec2 {
        let (row, col) = self.table.grid_point(v);
        Vec2::new(row as f32, col as f32)
    }

    fn child_containing(&self, t: TriIndex, p: Vec2) -> TriIndex {
        let apex = self.local_vertex(TriangleTable::apex(t));
        let v0 = self.local_vertex(self.table.v0(t));
        let centre = self.table.centre(t);
        let axis = centre - apex;
        let side = axis.perp_dot(p - apex);
        let v0_side = axis.perp_dot(v0 - apex);
        if side * v0_side >= 0.0 {
            TriangleTable::first_child(t)
        } else {
            TriangleTable::second_child(t)
        }
    }

    /// Barycentric height interpolation over the plane of `t`.
    fn interpolate(&self, t: TriIndex, p: Vec2) -> f32 {
        let [a, b, c] = self.table.vertices(t);
        let (pa, pb, pc) = (self.local_vertex(a), self.local_vertex(b), self.local_vertex(c));
        let det = (pb - pa).perp_dot(pc - pa);
        if det.abs() < f32::EPSILON {
            return self.height_of(a);
        }
        let wb = (p - pa).perp_dot(pc - pa) / det;
        let wc = (pb - pa).perp_dot(p - pa) / det;
        let wa = 1.0 - wb - wc;
        wa * self.height_of(a) + wb * self.height_of(b) + wc * self.height_of(c)
    }

    // ------------------------------------------------------------------------
    // Node state
    // ------------------------------------------------------------------------

    #[inline]
    pub fn node(&self, t: TriIndex) -> Option<&TriangleNode> {
        self.cache.get(t)
    }

    /// On the active frontier.
    #[inline]
    pub fn is_active(&self, t: TriIndex) -> bool {
        self.cache.get(t).is_some_and(|n| n.is_active())
    }

    /// Above the active frontier.
    #[inline]
    pub fn is_split(&self, t: TriIndex) -> bool {
        self.cache.get(t).is_some_and(|n| n.split)
    }

    /// Nodes on or above the frontier.
    pub fn node_count(&self) -> usize {
        self.cache.len()
    }

    /// Depth-first walk of the active frontier.
    pub fn active_triangles(&self) -> ActiveTriangles<'_> {
        let stack = if self.cache.contains(ROOT) { vec![ROOT] } else { Vec::new() };
        ActiveTriangles { tree: self, stack }
    }
}

/// Iterator over the active triangles of one tree, in depth-first order.
pub struct ActiveTriangles<'a> {
    tree: &'a BinTriTree,
    stack: Vec<TriIndex>,
}

impl<'a> Iterator for ActiveTriangles<'a> {
    type Item = &'a TriangleNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(t) = self.stack.pop() {
            let Some(node) = self.tree.cache.get(t) else {
                continue;
            };
            if node.split {
                self.stack.push(TriangleTable::second_child(t));
                self.stack.push(TriangleTable::first_child(t));
            } else {
                return Some(node);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::VisState;

    fn slope_field() -> HeightField {
        // 2x1 tiles of 8 cells, height = row + 2 * col.
        HeightField::from_fn(17, 9, 0.0, 100.0, |row, col| row as f32 + 2.0 * col as f32)
    }

    fn tree(mirrored: bool) -> BinTriTree {
        let table = Arc::new(TriangleTable::build(8).unwrap());
        let origin = if mirrored { (16, 8) } else { (8, 0) };
        BinTriTree::new(3, (1, 0), mirrored, origin, TreeNeighbours::default(), table, &slope_field()).unwrap()
    }

    #[test]
    fn test_global_mapping() {
        let normal = tree(false);
        assert_eq!(normal.global_point((0, 0)), (8, 0));
        assert_eq!(normal.global_point((3, 5)), (11, 5));

        let mirrored = tree(true);
        assert_eq!(mirrored.global_point((0, 0)), (16, 8));
        assert_eq!(mirrored.global_point((3, 5)), (13, 3));
        assert_eq!(mirrored.to_local(mirrored.to_world_xz(Vec2::new(1.5, 2.0))), Vec2::new(1.5, 2.0));
    }

    #[test]
    fn test_planar_field_has_no_error() {
        let t = tree(false);
        assert!(t.max_error() < 0.01);
        assert!((t.min_height() - 8.0).abs() < 0.01);
        assert!((t.max_height() - 24.0).abs() < 0.01);
    }

    #[test]
    fn test_spike_error_propagates_to_root() {
        let mut field = HeightField::new(9, 9, 0.0, 100.0);
        field.set_height(2, 3, field.to_raw(50.0)).unwrap();
        let table = Arc::new(TriangleTable::build(8).unwrap());
        let t = BinTriTree::new(0, (0, 0), false, (0, 0), TreeNeighbours::default(), table, &field).unwrap();

        assert!(t.max_error() > 20.0);
        assert!((t.max_height() - 50.0).abs() < 0.01);
        // The spike sits above the root's split line, in the second child.
        assert!(t.error(3) > 20.0);
        assert!(t.error(2) < 1e-3);
    }

    #[test]
    fn test_local_height_matches_samples() {
        let t = tree(true);
        let field = slope_field();
        for (row, col) in [(0u32, 0u32), (2, 3), (5, 3), (0, 8)] {
            let (gr, gc) = t.global_point((row, col));
            let expected = field.world_height(gr as usize, gc as usize).unwrap();
            let got = t.local_height(Vec2::new(row as f32, col as f32));
            assert!((got - expected).abs() < 0.02, "({}, {}): {} vs {}", row, col, got, expected);
        }
        // Between samples a planar field interpolates exactly.
        let p = Vec2::new(2.25, 3.5);
        let world = t.to_world_xz(p);
        assert!((t.local_height(p) - (world.x + 2.0 * world.y)).abs() < 0.02);
    }

    #[test]
    fn test_bounds_cover_vertices() {
        let t = tree(false);
        for tri in [ROOT, 2, 3, 17, 100] {
            let (lo, hi) = t.bounds(tri);
            for v in t.triangle_world(tri) {
                assert!(v.cmpge(lo - Vec3::splat(1e-3)).all() && v.cmple(hi + Vec3::splat(1e-3)).all());
            }
        }
    }

    #[test]
    fn test_active_walk_follows_splits() {
        let mut t = tree(false);
        t.cache.insert(TriangleNode { split: true, ..TriangleNode::new(ROOT, 0, VisState::In) });
        t.cache.insert(TriangleNode::new(2, 0, VisState::In));
        t.cache.insert(TriangleNode { split: true, ..TriangleNode::new(3, 0, VisState::In) });
        t.cache.insert(TriangleNode::new(6, 0, VisState::In));
        t.cache.insert(TriangleNode::new(7, 0, VisState::Out));

        let order: Vec<TriIndex> = t.active_triangles().map(|n| n.tri).collect();
        assert_eq!(order, vec![2, 6, 7]);
        assert!(t.is_split(3));
        assert!(t.is_active(6));
        assert!(!t.is_active(4));
        assert_eq!(t.locate(Vec2::new(0.5, 6.0)), 6);
    }
}

//! Triangle Table
//!
//! Static layout of the implicit binary triangle tree for one tile size.
//! Built once and shared read-only by every tree of that size.
//!
//! ## Indexing
//!
//! For a tile of `N = 2^k` cells the leaf level is `L = 2k` and the table
//! holds `2^(L+1) + 2` slots:
//!
//! - `0` is the apex corner of the root, grid point `(0, 0)`
//! - `1` is the root; the children of `t` are `2t` and `2t + 1`
//! - the apex vertex of `t` is the split point of `t / 2`
//! - `2^(L+1)` is the corner `(0, N)` and `2^(L+1) + 1` the corner `(N, 0)`
//!
//! The root spans `(0, 0)`, `(N, 0)`, `(0, N)` with its hypotenuse on the
//! tile diagonal. Split points are stored in half-cell units because the
//! split points of leaves fall between grid samples; leaves are never split.
//!
//! ## Neighbours
//!
//! Interior neighbours come from a single top-down pass that inherits base,
//! left and right neighbours from the parent. A triangle whose hypotenuse
//! lies on a tile edge has its neighbour in the adjacent tree; that index is
//! found by reflecting the split point across the edge.

use glam::Vec2;

use super::error::{Result, TerrainError};

/// Index of a triangle (or corner vertex) in a [`TriangleTable`].
pub type TriIndex = u32;

/// Index of the root triangle.
pub const ROOT: TriIndex = 1;

/// Index of the root's apex corner.
pub const APEX_CORNER: TriIndex = 0;

/// Where a triangle's hypotenuse lies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Interior of the tile; neighbour is in the same tree
    Inner,
    /// Local row 0; neighbour is in the tree's top neighbour
    Top,
    /// Local column 0; neighbour is in the tree's left neighbour
    Left,
    /// Local `row + col = N`; neighbour is in the tree across the diagonal
    Diagonal,
}

/// One entry of the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriangleSlot {
    /// Split point row, in half cells
    pub row2: u32,
    /// Split point column, in half cells
    pub col2: u32,
    /// First wing vertex (end of the hypotenuse)
    pub v0: TriIndex,
    /// Second wing vertex (other end of the hypotenuse)
    pub v1: TriIndex,
    /// Triangle across the hypotenuse
    pub neighbour: TriIndex,
    pub edge: EdgeKind,
}

impl TriangleSlot {
    /// Grid row of the split point (exact for vertices and non-leaf triangles).
    #[inline]
    pub fn row(&self) -> u32 {
        self.row2 / 2
    }

    /// Grid column of the split point (exact for vertices and non-leaf triangles).
    #[inline]
    pub fn col(&self) -> u32 {
        self.col2 / 2
    }
}

/// Implicit bintree layout for a square tile.
#[derive(Clone, Debug)]
pub struct TriangleTable {
    tile_size: u32,
    leaf_level: u32,
    slots: Vec<TriangleSlot>,
    /// Grid point -> triangle (or corner) whose split point it is
    grid: Vec<TriIndex>,
}

impl TriangleTable {
    /// Build the table for a tile of `tile_size` cells.
    pub fn build(tile_size: u32) -> Result<Self> {
        if tile_size < 2 || !tile_size.is_power_of_two() || tile_size > super::config::MAX_TILE_SIZE {
            return Err(TerrainError::InvalidTileSize(tile_size));
        }

        let n2 = tile_size * 2;
        let leaf_level = 2 * tile_size.trailing_zeros();
        let end = 1u32 << (leaf_level + 1);
        let corner_right = end;
        let corner_bottom = end + 1;

        let blank = TriangleSlot {
            row2: 0,
            col2: 0,
            v0: 0,
            v1: 0,
            neighbour: 0,
            edge: EdgeKind::Inner,
        };
        let mut slots = vec![blank; end as usize + 2];
        slots[corner_right as usize].col2 = n2;
        slots[corner_bottom as usize].row2 = n2;

        // Geometry, top-down: the children's wings are the parent's apex and wings.
        slots[ROOT as usize].v0 = corner_bottom;
        slots[ROOT as usize].v1 = corner_right;
        for t in ROOT..end {
            let slot = slots[t as usize];
            let a = slots[slot.v0 as usize];
            let b = slots[slot.v1 as usize];
            let row2 = (a.row2 + b.row2) / 2;
            let col2 = (a.col2 + b.col2) / 2;
            let edge = if a.row2 == 0 && b.row2 == 0 {
                EdgeKind::Top
            } else if a.col2 == 0 && b.col2 == 0 {
                EdgeKind::Left
            } else if a.row2 + a.col2 == n2 && b.row2 + b.col2 == n2 {
                EdgeKind::Diagonal
            } else {
                EdgeKind::Inner
            };
            let entry = &mut slots[t as usize];
            entry.row2 = row2;
            entry.col2 = col2;
            entry.edge = edge;

            if t < end / 2 {
                let apex = t >> 1;
                slots[(2 * t) as usize].v0 = apex;
                slots[(2 * t) as usize].v1 = slot.v0;
                slots[(2 * t + 1) as usize].v0 = slot.v1;
                slots[(2 * t + 1) as usize].v1 = apex;
            }
        }

        // Boundary lookups, indexed by the split point's position along the edge.
        let mut top = vec![0 as TriIndex; n2 as usize + 1];
        let mut left = vec![0 as TriIndex; n2 as usize + 1];
        let mut diagonal = vec![0 as TriIndex; n2 as usize + 1];
        for t in ROOT..end {
            let slot = slots[t as usize];
            match slot.edge {
                EdgeKind::Top => top[slot.col2 as usize] = t,
                EdgeKind::Left => left[slot.row2 as usize] = t,
                EdgeKind::Diagonal => diagonal[slot.row2 as usize] = t,
                EdgeKind::Inner => {}
            }
        }

        // Neighbours, top-down. `left`/`right` are the triangles across the
        // apex-v0 and apex-v1 legs at the same level.
        let mut base_of: Vec<Option<TriIndex>> = vec![None; end as usize];
        let mut left_of: Vec<Option<TriIndex>> = vec![None; end as usize];
        let mut right_of: Vec<Option<TriIndex>> = vec![None; end as usize];
        for t in ROOT..end / 2 {
            let (base, l, r) = (base_of[t as usize], left_of[t as usize], right_of[t as usize]);
            let (first, second) = (2 * t as usize, 2 * t as usize + 1);

            base_of[first] = l.map(|x| 2 * x + 1);
            left_of[first] = Some(2 * t + 1);
            right_of[first] = base.map(|b| 2 * b + 1);

            base_of[second] = r.map(|x| 2 * x);
            left_of[second] = base.map(|b| 2 * b);
            right_of[second] = Some(2 * t);
        }

        for t in ROOT..end {
            let slot = slots[t as usize];
            let neighbour = match slot.edge {
                EdgeKind::Inner => base_of[t as usize].unwrap_or(0),
                EdgeKind::Top => top[(n2 - slot.col2) as usize],
                EdgeKind::Left => left[(n2 - slot.row2) as usize],
                EdgeKind::Diagonal => diagonal[slot.col2 as usize],
            };
            slots[t as usize].neighbour = neighbour;
        }

        // Grid point lookup; the shallowest triangle wins for shared split points.
        let side = tile_size as usize + 1;
        let mut grid = vec![0 as TriIndex; side * side];
        grid[side - 1] = corner_right;
        grid[(side - 1) * side] = corner_bottom;
        for t in (ROOT..end / 2).rev() {
            let slot = slots[t as usize];
            grid[slot.row() as usize * side + slot.col() as usize] = t;
        }

        Ok(Self {
            tile_size,
            leaf_level,
            slots,
            grid,
        })
    }

    /// Cells along one tile edge.
    #[inline]
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Level of the leaf triangles.
    #[inline]
    pub fn leaf_level(&self) -> u32 {
        self.leaf_level
    }

    /// One past the last triangle index.
    #[inline]
    pub fn triangle_end(&self) -> TriIndex {
        1 << (self.leaf_level + 1)
    }

    /// Number of slots, including the three corner vertices.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the corner `(0, N)`.
    #[inline]
    pub fn corner_right(&self) -> TriIndex {
        self.triangle_end()
    }

    /// Index of the corner `(N, 0)`.
    #[inline]
    pub fn corner_bottom(&self) -> TriIndex {
        self.triangle_end() + 1
    }

    #[inline]
    pub fn slot(&self, t: TriIndex) -> &TriangleSlot {
        &self.slots[t as usize]
    }

    #[inline]
    pub fn is_triangle(&self, t: TriIndex) -> bool {
        t >= ROOT && t < self.triangle_end()
    }

    /// Depth of `t` below the root (root is level 0).
    #[inline]
    pub fn level(t: TriIndex) -> u32 {
        31 - t.leading_zeros()
    }

    #[inline]
    pub fn is_leaf(&self, t: TriIndex) -> bool {
        Self::level(t) == self.leaf_level
    }

    #[inline]
    pub fn parent(t: TriIndex) -> TriIndex {
        t >> 1
    }

    #[inline]
    pub fn first_child(t: TriIndex) -> TriIndex {
        t << 1
    }

    #[inline]
    pub fn second_child(t: TriIndex) -> TriIndex {
        (t << 1) + 1
    }

    /// Apex vertex of `t` (the split point of its parent, or the apex corner).
    #[inline]
    pub fn apex(t: TriIndex) -> TriIndex {
        t >> 1
    }

    #[inline]
    pub fn v0(&self, t: TriIndex) -> TriIndex {
        self.slots[t as usize].v0
    }

    #[inline]
    pub fn v1(&self, t: TriIndex) -> TriIndex {
        self.slots[t as usize].v1
    }

    #[inline]
    pub fn neighbour(&self, t: TriIndex) -> TriIndex {
        self.slots[t as usize].neighbour
    }

    #[inline]
    pub fn edge(&self, t: TriIndex) -> EdgeKind {
        self.slots[t as usize].edge
    }

    /// Grid point of a vertex (corner or non-leaf split point).
    #[inline]
    pub fn grid_point(&self, v: TriIndex) -> (u32, u32) {
        let slot = &self.slots[v as usize];
        (slot.row(), slot.col())
    }

    /// Exact split point in tile-local grid units.
    #[inline]
    pub fn centre(&self, t: TriIndex) -> Vec2 {
        let slot = &self.slots[t as usize];
        Vec2::new(slot.row2 as f32 * 0.5, slot.col2 as f32 * 0.5)
    }

    /// Apex, v0 and v1 of `t` as vertex indices.
    #[inline]
    pub fn vertices(&self, t: TriIndex) -> [TriIndex; 3] {
        [Self::apex(t), self.v0(t), self.v1(t)]
    }

    /// Triangle (or corner) whose split point is the grid point `(row, col)`.
    ///
    /// Only points on or above the tile diagonal (`row + col <= N`) belong
    /// to this tree.
    pub fn lookup(&self, row: u32, col: u32) -> Option<TriIndex> {
        if row + col > self.tile_size {
            return None;
        }
        let side = self.tile_size as usize + 1;
        Some(self.grid[row as usize * side + col as usize])
    }
}

//! Structural self-check of the mesh, used by tests and debug builds.

use std::fmt;

use crate::terrain::bintree::TriRef;
use crate::terrain::priority_queue::QueueHandle;
use crate::terrain::triangle_table::{ROOT, TriangleTable};

use super::TileMeshManager;

/// A broken mesh invariant found by [`TileMeshManager::check_consistency`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsistencyViolation {
    /// Active triangle whose hypotenuse neighbour is neither active nor the child of an active triangle
    Crack { triangle: TriRef, neighbour: TriRef },
    /// Cached triangle without a split parent
    MissingParent { triangle: TriRef },
    /// A running counter disagrees with a recount
    CountMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Merge queue entry for a diamond that cannot be merged
    StaleMergeEntry { diamond: TriRef },
    /// Mergeable diamond missing from the merge queue
    MissingMergeEntry { diamond: TriRef },
    /// Split queue entry for an invisible, inactive or leaf triangle
    StaleSplitEntry { triangle: TriRef },
}

impl fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crack { triangle, neighbour } => write!(
                f,
                "crack between tree {} triangle {} and tree {} triangle {}",
                triangle.tree, triangle.tri, neighbour.tree, neighbour.tri
            ),
            Self::MissingParent { triangle } => write!(
                f,
                "tree {} triangle {} has no split parent",
                triangle.tree, triangle.tri
            ),
            Self::CountMismatch { what, expected, actual } => {
                write!(f, "{} count is {} but recount gives {}", what, expected, actual)
            }
            Self::StaleMergeEntry { diamond } => write!(
                f,
                "merge queue holds unmergeable diamond tree {} triangle {}",
                diamond.tree, diamond.tri
            ),
            Self::MissingMergeEntry { diamond } => write!(
                f,
                "mergeable diamond tree {} triangle {} is not queued",
                diamond.tree, diamond.tri
            ),
            Self::StaleSplitEntry { triangle } => write!(
                f,
                "split queue holds tree {} triangle {} which cannot split",
                triangle.tree, triangle.tri
            ),
        }
    }
}

impl TileMeshManager {
    /// Walk every cached triangle and both queues, reporting broken invariants.
    ///
    /// An empty result means the mesh is crack-free and every counter and
    /// queue entry agrees with the trees.
    pub fn check_consistency(&self) -> Vec<ConsistencyViolation> {
        let mut violations = Vec::new();
        let (mut active, mut visible) = (0usize, 0usize);

        for tree in &self.trees {
            for node in tree.cache.iter() {
                let here = TriRef::new(tree.index(), node.tri);

                if node.tri > ROOT && !tree.is_split(TriangleTable::parent(node.tri)) {
                    violations.push(ConsistencyViolation::MissingParent { triangle: here });
                }

                if node.split {
                    if self.is_mergeable(here.tree, here.tri) {
                        let queued = self.diamond_handle(here).is_some_and(|h| self.merge_queue.contains(h));
                        if !queued {
                            violations.push(ConsistencyViolation::MissingMergeEntry { diamond: here });
                        }
                    }
                    continue;
                }

                active += 1;
                if node.vis.is_visible() {
                    visible += 1;
                }

                if let Some(neighbour) = tree.neighbour_of(node.tri) {
                    let other = &self.trees[neighbour.tree];
                    let joined = other.is_active(neighbour.tri)
                        || (neighbour.tri > ROOT && other.is_active(TriangleTable::parent(neighbour.tri)));
                    if !joined {
                        violations.push(ConsistencyViolation::Crack { triangle: here, neighbour });
                    }
                }
            }
        }

        if active != self.active_count {
            violations.push(ConsistencyViolation::CountMismatch {
                what: "active",
                expected: self.active_count,
                actual: active,
            });
        }
        if visible != self.visible_count {
            violations.push(ConsistencyViolation::CountMismatch {
                what: "visible",
                expected: self.visible_count,
                actual: visible,
            });
        }

        for (_, diamond, _) in self.merge_queue.iter() {
            if !self.is_mergeable(diamond.tree, diamond.tri) {
                violations.push(ConsistencyViolation::StaleMergeEntry { diamond });
            }
        }

        for (_, triangle, _) in self.split_queue.iter() {
            let ok = self.trees[triangle.tree]
                .node(triangle.tri)
                .is_some_and(|n| n.is_active() && n.vis.is_visible())
                && !self.table.is_leaf(triangle.tri);
            if !ok {
                violations.push(ConsistencyViolation::StaleSplitEntry { triangle });
            }
        }

        for violation in &violations {
            log::warn!("Mesh inconsistency: {}", violation);
        }
        violations
    }

    /// Merge handle of the diamond `p` belongs to, from either half.
    fn diamond_handle(&self, p: TriRef) -> Option<QueueHandle> {
        let own = self.trees[p.tree].node(p.tri).and_then(|n| n.merge_handle);
        own.or_else(|| {
            let n = self.trees[p.tree].neighbour_of(p.tri)?;
            self.trees[n.tree].node(n.tri).and_then(|node| node.merge_handle)
        })
    }
}

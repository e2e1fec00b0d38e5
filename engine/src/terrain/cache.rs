//! Triangle Cache
//!
//! Per-tree arena of the triangles currently in the mesh tree: the active
//! frontier plus the split triangles above it. Nodes are reused through a
//! free list; a slot table maps triangle indices to nodes.

use crate::camera::VisState;

use super::priority_queue::QueueHandle;
use super::triangle_table::TriIndex;

/// Arena index of a [`TriangleNode`].
pub type NodeId = u32;

/// Per-triangle mesh state.
///
/// A node exists for every triangle on or above the active frontier. A
/// frontier node may sit in the split queue; a split node may own a merge
/// queue entry for the diamond it forms with its neighbour.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleNode {
    pub tri: TriIndex,
    /// Last computed priority bucket
    pub priority: u16,
    pub vis: VisState,
    /// Split into two children (not part of the rendered frontier)
    pub split: bool,
    pub split_handle: Option<QueueHandle>,
    pub merge_handle: Option<QueueHandle>,
}

impl TriangleNode {
    pub fn new(tri: TriIndex, priority: u16, vis: VisState) -> Self {
        Self {
            tri,
            priority,
            vis,
            split: false,
            split_handle: None,
            merge_handle: None,
        }
    }

    /// On the frontier: rendered and eligible for splitting.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.split
    }
}

/// Node arena with a free list.
#[derive(Clone, Debug, Default)]
pub struct TriangleCache {
    nodes: Vec<TriangleNode>,
    free: Vec<NodeId>,
    slots: Vec<Option<NodeId>>,
    live: usize,
}

impl TriangleCache {
    /// Create a cache addressing `slot_count` triangle indices.
    pub fn new(slot_count: usize) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            slots: vec![None; slot_count],
            live: 0,
        }
    }

    /// Store a node for `node.tri`, replacing any existing one.
    pub fn insert(&mut self, node: TriangleNode) -> NodeId {
        if let Some(id) = self.slots[node.tri as usize] {
            self.nodes[id as usize] = node;
            return id;
        }

        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id as usize] = node;
                id
            }
            None => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as NodeId
            }
        };
        self.slots[node.tri as usize] = Some(id);
        self.live += 1;
        id
    }

    /// Free the node of `tri`, returning its last state.
    pub fn remove(&mut self, tri: TriIndex) -> Option<TriangleNode> {
        let id = self.slots.get_mut(tri as usize)?.take()?;
        self.free.push(id);
        self.live -= 1;
        Some(self.nodes[id as usize])
    }

    #[inline]
    pub fn get(&self, tri: TriIndex) -> Option<&TriangleNode> {
        let id = (*self.slots.get(tri as usize)?)?;
        Some(&self.nodes[id as usize])
    }

    #[inline]
    pub fn get_mut(&mut self, tri: TriIndex) -> Option<&mut TriangleNode> {
        let id = (*self.slots.get(tri as usize)?)?;
        Some(&mut self.nodes[id as usize])
    }

    #[inline]
    pub fn contains(&self, tri: TriIndex) -> bool {
        self.get(tri).is_some()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Nodes ever allocated (live plus free).
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.slots.fill(None);
        self.live = 0;
    }

    /// Live nodes in arena order.
    pub fn iter(&self) -> impl Iterator<Item = &TriangleNode> + '_ {
        self.slots.iter().filter_map(|id| id.map(|id| &self.nodes[id as usize]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut cache = TriangleCache::new(16);
        cache.insert(TriangleNode::new(3, 7, VisState::In));
        assert!(cache.contains(3));
        assert_eq!(cache.get(3).map(|n| n.priority), Some(7));
        assert_eq!(cache.len(), 1);

        let node = cache.remove(3).unwrap();
        assert_eq!(node.tri, 3);
        assert!(!cache.contains(3));
        assert!(cache.remove(3).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reuses_freed_nodes() {
        let mut cache = TriangleCache::new(16);
        let a = cache.insert(TriangleNode::new(1, 0, VisState::In));
        cache.insert(TriangleNode::new(2, 0, VisState::In));
        cache.remove(1);
        let c = cache.insert(TriangleNode::new(5, 0, VisState::Out));
        assert_eq!(a, c);
        assert_eq!(cache.capacity(), 2);
        assert_eq!(cache.get(5).map(|n| n.vis), Some(VisState::Out));
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut cache = TriangleCache::new(8);
        let a = cache.insert(TriangleNode::new(4, 1, VisState::In));
        let b = cache.insert(TriangleNode::new(4, 9, VisState::Partial));
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(4).map(|n| n.priority), Some(9));
    }

    #[test]
    fn test_get_mut_and_out_of_range() {
        let mut cache = TriangleCache::new(4);
        cache.insert(TriangleNode::new(2, 0, VisState::In));
        if let Some(node) = cache.get_mut(2) {
            node.split = true;
        }
        assert!(!cache.get(2).unwrap().is_active());
        assert!(cache.get(100).is_none());
    }
}

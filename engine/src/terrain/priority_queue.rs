//! Bucketed Priority Queue
//!
//! Fixed-resolution priority queue used for the split and merge queues.
//! Each bucket is an intrusive doubly linked FIFO list over a slot arena,
//! so insert, remove and move are O(1). The head bucket is tracked
//! incrementally; removing the last entry of the head bucket scans to the
//! next non-empty one.
//!
//! Entries are addressed by [`QueueHandle`]s that carry a generation, so a
//! handle kept after its entry was removed is rejected instead of aliasing
//! a newer entry in the same slot.
//!
//! # Example
//!
//! ```ignore
//! use roam_terrain_engine::terrain::{BucketQueue, QueueOrder};
//!
//! let mut queue = BucketQueue::new(256, QueueOrder::HighestFirst);
//! let low = queue.insert("low", 3);
//! let high = queue.insert("high", 200);
//! assert_eq!(queue.head().map(|(_, e, _)| e), Some("high"));
//!
//! queue.move_to(low, 250);
//! assert_eq!(queue.head().map(|(_, e, _)| e), Some("low"));
//! queue.remove(high);
//! ```

/// Which end of the bucket range is served first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueOrder {
    /// Split queue: largest priority first
    HighestFirst,
    /// Merge queue: smallest priority first
    LowestFirst,
}

/// Generational reference to a queue entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueueHandle {
    slot: u32,
    generation: u32,
}

#[derive(Clone, Debug)]
struct Slot<T> {
    entry: Option<T>,
    bucket: u16,
    prev: Option<u32>,
    next: Option<u32>,
    generation: u32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Bucket {
    head: Option<u32>,
    tail: Option<u32>,
    len: u32,
}

/// Priority queue with `resolution` discrete buckets.
#[derive(Clone, Debug)]
pub struct BucketQueue<T> {
    order: QueueOrder,
    buckets: Vec<Bucket>,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    /// Bucket served by `head`, if any entry exists
    cursor: Option<u16>,
}

impl<T: Copy> BucketQueue<T> {
    /// Create an empty queue with `resolution` buckets (at least one).
    pub fn new(resolution: u16, order: QueueOrder) -> Self {
        Self {
            order,
            buckets: vec![Bucket::default(); resolution.max(1) as usize],
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            cursor: None,
        }
    }

    pub fn order(&self) -> QueueOrder {
        self.order
    }

    /// Number of buckets.
    pub fn resolution(&self) -> u16 {
        self.buckets.len() as u16
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert at the tail of `bucket` (clamped to the resolution).
    pub fn insert(&mut self, entry: T, bucket: u16) -> QueueHandle {
        let bucket = self.clamp(bucket);
        let slot = match self.free.pop() {
            Some(slot) => {
                let s = &mut self.slots[slot as usize];
                s.entry = Some(entry);
                s.bucket = bucket;
                slot
            }
            None => {
                self.slots.push(Slot {
                    entry: Some(entry),
                    bucket,
                    prev: None,
                    next: None,
                    generation: 0,
                });
                (self.slots.len() - 1) as u32
            }
        };

        self.link(slot, bucket);
        self.len += 1;
        QueueHandle {
            slot,
            generation: self.slots[slot as usize].generation,
        }
    }

    /// Remove an entry, returning it. Stale handles return `None`.
    pub fn remove(&mut self, handle: QueueHandle) -> Option<T> {
        if !self.contains(handle) {
            return None;
        }
        let bucket = self.slots[handle.slot as usize].bucket;
        self.unlink(handle.slot);

        let slot = &mut self.slots[handle.slot as usize];
        let entry = slot.entry.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.slot);
        self.len -= 1;

        self.settle_cursor(bucket);
        entry
    }

    /// First entry of the best bucket: `(handle, entry, bucket)`.
    pub fn head(&self) -> Option<(QueueHandle, T, u16)> {
        let bucket = self.cursor?;
        let slot = self.buckets[bucket as usize].head?;
        let s = &self.slots[slot as usize];
        let entry = s.entry?;
        Some((
            QueueHandle {
                slot,
                generation: s.generation,
            },
            entry,
            bucket,
        ))
    }

    /// Bucket of the head entry.
    pub fn head_bucket(&self) -> Option<u16> {
        self.cursor
    }

    /// Move an entry to another bucket. Moving to its current bucket keeps
    /// its FIFO position. Returns `false` for stale handles.
    pub fn move_to(&mut self, handle: QueueHandle, bucket: u16) -> bool {
        if !self.contains(handle) {
            return false;
        }
        let bucket = self.clamp(bucket);
        let old = self.slots[handle.slot as usize].bucket;
        if old == bucket {
            return true;
        }

        self.unlink(handle.slot);
        self.slots[handle.slot as usize].bucket = bucket;
        self.link(handle.slot, bucket);
        self.settle_cursor(old);
        true
    }

    /// Current bucket of an entry.
    pub fn bucket(&self, handle: QueueHandle) -> Option<u16> {
        self.contains(handle).then(|| self.slots[handle.slot as usize].bucket)
    }

    /// Copy of an entry.
    pub fn get(&self, handle: QueueHandle) -> Option<T> {
        if !self.contains(handle) {
            return None;
        }
        self.slots[handle.slot as usize].entry
    }

    pub fn contains(&self, handle: QueueHandle) -> bool {
        self.slots
            .get(handle.slot as usize)
            .is_some_and(|s| s.generation == handle.generation && s.entry.is_some())
    }

    /// Drop every entry. Outstanding handles become stale.
    pub fn clear(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            slot.prev = None;
            slot.next = None;
            self.free.push(index as u32);
        }
        self.buckets.fill(Bucket::default());
        self.len = 0;
        self.cursor = None;
    }

    /// Entries in service order: best bucket first, FIFO within a bucket.
    pub fn iter(&self) -> impl Iterator<Item = (QueueHandle, T, u16)> + '_ {
        let count = self.buckets.len();
        let order = self.order;
        (0..count)
            .map(move |i| match order {
                QueueOrder::HighestFirst => count - 1 - i,
                QueueOrder::LowestFirst => i,
            })
            .flat_map(move |bucket| BucketIter {
                queue: self,
                next: self.buckets[bucket].head,
            })
    }

    fn clamp(&self, bucket: u16) -> u16 {
        bucket.min(self.buckets.len() as u16 - 1)
    }

    fn link(&mut self, slot: u32, bucket: u16) {
        let b = &mut self.buckets[bucket as usize];
        let tail = b.tail;
        b.tail = Some(slot);
        if b.head.is_none() {
            b.head = Some(slot);
        }
        b.len += 1;

        if let Some(tail) = tail {
            self.slots[tail as usize].next = Some(slot);
        }
        let s = &mut self.slots[slot as usize];
        s.prev = tail;
        s.next = None;

        self.cursor = Some(match (self.cursor, self.order) {
            (None, _) => bucket,
            (Some(c), QueueOrder::HighestFirst) => c.max(bucket),
            (Some(c), QueueOrder::LowestFirst) => c.min(bucket),
        });
    }

    fn unlink(&mut self, slot: u32) {
        let (prev, next, bucket) = {
            let s = &self.slots[slot as usize];
            (s.prev, s.next, s.bucket)
        };
        match prev {
            Some(p) => self.slots[p as usize].next = next,
            None => self.buckets[bucket as usize].head = next,
        }
        match next {
            Some(n) => self.slots[n as usize].prev = prev,
            None => self.buckets[bucket as usize].tail = prev,
        }
        self.buckets[bucket as usize].len -= 1;

        let s = &mut self.slots[slot as usize];
        s.prev = None;
        s.next = None;
    }

    /// Re-point the cursor after `emptied` may have lost its last entry.
    fn settle_cursor(&mut self, emptied: u16) {
        if self.cursor != Some(emptied) || self.buckets[emptied as usize].len > 0 {
            return;
        }
        self.cursor = match self.order {
            QueueOrder::HighestFirst => (0..emptied).rev().find(|&b| self.buckets[b as usize].len > 0),
            QueueOrder::LowestFirst => {
                ((emptied + 1)..self.buckets.len() as u16).find(|&b| self.buckets[b as usize].len > 0)
            }
        };
    }
}

struct BucketIter<'a, T> {
    queue: &'a BucketQueue<T>,
    next: Option<u32>,
}

impl<T: Copy> Iterator for BucketIter<'_, T> {
    type Item = (QueueHandle, T, u16);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.next?;
        let s = &self.queue.slots[slot as usize];
        self.next = s.next;
        let handle = QueueHandle {
            slot,
            generation: s.generation,
        };
        Some((handle, s.entry?, s.bucket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_first_head() {
        let mut queue = BucketQueue::new(16, QueueOrder::HighestFirst);
        assert!(queue.head().is_none());
        queue.insert('a', 3);
        queue.insert('b', 9);
        queue.insert('c', 1);
        assert_eq!(queue.head().map(|(_, e, b)| (e, b)), Some(('b', 9)));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_lowest_first_head() {
        let mut queue = BucketQueue::new(16, QueueOrder::LowestFirst);
        queue.insert('a', 3);
        let b = queue.insert('b', 0);
        queue.insert('c', 7);
        assert_eq!(queue.head().map(|(_, e, _)| e), Some('b'));
        queue.remove(b);
        assert_eq!(queue.head().map(|(_, e, b)| (e, b)), Some(('a', 3)));
    }

    #[test]
    fn test_fifo_within_bucket() {
        let mut queue = BucketQueue::new(8, QueueOrder::HighestFirst);
        let first = queue.insert(1, 5);
        queue.insert(2, 5);
        queue.insert(3, 5);
        assert_eq!(queue.head().map(|(_, e, _)| e), Some(1));
        queue.remove(first);
        assert_eq!(queue.head().map(|(_, e, _)| e), Some(2));
    }

    #[test]
    fn test_clamps_bucket() {
        let mut queue = BucketQueue::new(4, QueueOrder::HighestFirst);
        let h = queue.insert(7u32, 1000);
        assert_eq!(queue.bucket(h), Some(3));
    }

    #[test]
    fn test_move_updates_cursor() {
        let mut queue = BucketQueue::new(32, QueueOrder::HighestFirst);
        let a = queue.insert('a', 10);
        let b = queue.insert('b', 20);
        assert!(queue.move_to(a, 30));
        assert_eq!(queue.head().map(|(_, e, _)| e), Some('a'));
        assert!(queue.move_to(a, 2));
        assert_eq!(queue.head().map(|(h, _, _)| h), Some(b));
        assert_eq!(queue.bucket(a), Some(2));
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut queue = BucketQueue::new(8, QueueOrder::LowestFirst);
        let old = queue.insert('x', 4);
        assert_eq!(queue.remove(old), Some('x'));
        let new = queue.insert('y', 4);
        // Same slot, new generation.
        assert_ne!(old, new);
        assert_eq!(queue.remove(old), None);
        assert!(!queue.move_to(old, 1));
        assert_eq!(queue.get(old), None);
        assert_eq!(queue.get(new), Some('y'));
    }

    #[test]
    fn test_clear_invalidates() {
        let mut queue = BucketQueue::new(8, QueueOrder::HighestFirst);
        let h = queue.insert(1, 1);
        queue.insert(2, 6);
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.head().is_none());
        assert!(!queue.contains(h));
        let again = queue.insert(3, 2);
        assert_eq!(queue.head().map(|(h, e, _)| (h, e)), Some((again, 3)));
    }

    #[test]
    fn test_iter_service_order() {
        let mut queue = BucketQueue::new(8, QueueOrder::HighestFirst);
        queue.insert('a', 1);
        queue.insert('b', 6);
        queue.insert('c', 1);
        queue.insert('d', 4);
        let order: Vec<char> = queue.iter().map(|(_, e, _)| e).collect();
        assert_eq!(order, vec!['b', 'd', 'a', 'c']);
    }

    #[test]
    fn test_drain_matches_sorted_order() {
        let mut rng = fastrand::Rng::with_seed(7);
        let mut queue = BucketQueue::new(64, QueueOrder::LowestFirst);
        let mut expected = Vec::new();
        for i in 0..500u32 {
            let bucket = rng.u16(0..64);
            queue.insert(i, bucket);
            expected.push((bucket, i));
        }
        expected.sort();

        let mut drained = Vec::new();
        while let Some((handle, entry, bucket)) = queue.head() {
            queue.remove(handle);
            drained.push((bucket, entry));
        }
        assert_eq!(drained, expected);
    }
}

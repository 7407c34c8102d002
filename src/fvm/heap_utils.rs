//! This module contains the priority structures that pick the cell with the largest out-radius.

use std::cmp::{Ordering, Reverse};
use ordered_float::OrderedFloat; // For using f64 keys in a heap

use super::bucket_queue::BucketQueue;
use super::params::TreeParameters;

/// Selects items (cell ids) by a floating point key.
///
/// Keys are owned by the caller: whenever an item's key changes outside the
/// selector, `change_priority` must be called with the new value.
pub trait PrioritySelector {
    fn insert(&mut self, item: usize, key: f64);

    /// The item with the largest key, without removing it.
    fn find_max(&self) -> Option<usize>;

    /// Re-key `item`. Items that were never inserted are inserted.
    fn change_priority(&mut self, item: usize, key: f64);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An element of the heap. Larger keys win; among equal keys the smaller item wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapElement {
    key: OrderedFloat<f64>,
    item: usize,
}

impl PartialOrd for HeapElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapElement {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.key, Reverse(self.item)).cmp(&(other.key, Reverse(other.item)))
    }
}

/// Indexed binary max-heap: every item has a known slot, so a priority change
/// is a single sift instead of a rebuild.
#[derive(Debug, Default, Clone)]
pub struct MaxHeap {
    heap: Vec<HeapElement>,
    positions: Vec<Option<usize>>, // item -> slot in `heap`
}

impl MaxHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&self, item: usize) -> Option<f64> {
        self.slot(item).map(|slot| self.heap[slot].key.0)
    }

    pub fn contains(&self, item: usize) -> bool {
        self.slot(item).is_some()
    }

    /// Removes and returns the item with the largest key.
    pub fn pop_max(&mut self) -> Option<(usize, f64)> {
        let last = self.heap.len().checked_sub(1)?;
        self.swap(0, last);
        let top = self.heap.pop()?;
        self.positions[top.item] = None;
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some((top.item, top.key.0))
    }

    fn slot(&self, item: usize) -> Option<usize> {
        self.positions.get(item).copied().flatten()
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.positions[self.heap[a].item] = Some(a);
        self.positions[self.heap[b].item] = Some(b);
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.heap[slot] <= self.heap[parent] {
                break;
            }
            self.swap(slot, parent);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut largest = slot;
            if left < len && self.heap[left] > self.heap[largest] {
                largest = left;
            }
            if right < len && self.heap[right] > self.heap[largest] {
                largest = right;
            }
            if largest == slot {
                break;
            }
            self.swap(slot, largest);
            slot = largest;
        }
    }
}

impl PrioritySelector for MaxHeap {
    fn insert(&mut self, item: usize, key: f64) {
        if self.contains(item) {
            self.change_priority(item, key);
            return;
        }
        if self.positions.len() <= item {
            self.positions.resize(item + 1, None);
        }
        let slot = self.heap.len();
        self.heap.push(HeapElement { key: OrderedFloat(key), item });
        self.positions[item] = Some(slot);
        self.sift_up(slot);
    }

    fn find_max(&self) -> Option<usize> {
        self.heap.first().map(|top| top.item)
    }

    fn change_priority(&mut self, item: usize, key: f64) {
        let Some(slot) = self.slot(item) else {
            self.insert(item, key);
            return;
        };
        let old = self.heap[slot].key;
        self.heap[slot].key = OrderedFloat(key);
        if OrderedFloat(key) > old {
            self.sift_up(slot);
        } else {
            self.sift_down(slot);
        }
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

/// The selector used by a neighbor graph: exact when `bucket_size <= 1`.
#[derive(Debug, Clone)]
pub enum CellQueue {
    Exact(MaxHeap),
    Bucketed(BucketQueue),
}

impl CellQueue {
    pub fn for_params(params: &TreeParameters) -> Self {
        if params.uses_bucket_queue() {
            CellQueue::Bucketed(BucketQueue::new(params.bucket_size))
        } else {
            CellQueue::Exact(MaxHeap::new())
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, CellQueue::Exact(_))
    }
}

impl PrioritySelector for CellQueue {
    fn insert(&mut self, item: usize, key: f64) {
        match self {
            CellQueue::Exact(heap) => heap.insert(item, key),
            CellQueue::Bucketed(queue) => queue.insert(item, key),
        }
    }

    fn find_max(&self) -> Option<usize> {
        match self {
            CellQueue::Exact(heap) => heap.find_max(),
            CellQueue::Bucketed(queue) => queue.find_max(),
        }
    }

    fn change_priority(&mut self, item: usize, key: f64) {
        match self {
            CellQueue::Exact(heap) => heap.change_priority(item, key),
            CellQueue::Bucketed(queue) => queue.change_priority(item, key),
        }
    }

    fn len(&self) -> usize {
        match self {
            CellQueue::Exact(heap) => heap.len(),
            CellQueue::Bucketed(queue) => queue.len(),
        }
    }
}

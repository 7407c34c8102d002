//! Approximate max-priority queue.
//!
//! Keys are grouped into geometric bands `[b^k, b^(k+1))` with `b` the bucket
//! size. `find_max` returns some item of the highest non-empty band, so the
//! returned key is within a factor `b` of the true maximum. Moving an item
//! between bands is cheap, which is the point of using it over the exact heap.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::heap_utils::PrioritySelector;

/// Band for keys that are negative or NaN.
const FLOOR_BUCKET: i64 = i64::MIN;
/// Band for a key of exactly zero, above the floor and below every positive key.
const ZERO_BUCKET: i64 = i64::MIN + 1;

#[derive(Debug, Clone)]
pub struct BucketQueue {
    log_base: f64,
    buckets: BTreeMap<i64, BTreeSet<usize>>,
    placed: HashMap<usize, i64>, // item -> band
}

impl BucketQueue {
    /// `bucket_size` is expected to exceed 1; smaller values are clamped just above 1.
    pub fn new(bucket_size: f64) -> Self {
        let base = if bucket_size > 1.0 { bucket_size } else { 1.0 + 1e-9 };
        BucketQueue {
            log_base: base.ln(),
            buckets: BTreeMap::new(),
            placed: HashMap::new(),
        }
    }

    pub fn bucket_of(&self, key: f64) -> i64 {
        if key.is_nan() || key < 0.0 {
            return FLOOR_BUCKET;
        }
        if key == 0.0 {
            return ZERO_BUCKET;
        }
        // `as` saturates, so an infinite key lands in the top band.
        (key.ln() / self.log_base).floor() as i64
    }

    pub fn contains(&self, item: usize) -> bool {
        self.placed.contains_key(&item)
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    fn detach(&mut self, item: usize) {
        let Some(bucket) = self.placed.remove(&item) else { return };
        if let Some(members) = self.buckets.get_mut(&bucket) {
            members.remove(&item);
            if members.is_empty() {
                self.buckets.remove(&bucket);
            }
        }
    }
}

impl PrioritySelector for BucketQueue {
    fn insert(&mut self, item: usize, key: f64) {
        self.detach(item);
        let bucket = self.bucket_of(key);
        self.buckets.entry(bucket).or_default().insert(item);
        self.placed.insert(item, bucket);
    }

    fn find_max(&self) -> Option<usize> {
        let (_, members) = self.buckets.last_key_value()?;
        members.first().copied()
    }

    fn change_priority(&mut self, item: usize, key: f64) {
        let bucket = self.bucket_of(key);
        if self.placed.get(&item) == Some(&bucket) {
            return;
        }
        self.insert(item, key);
    }

    fn len(&self) -> usize {
        self.placed.len()
    }
}

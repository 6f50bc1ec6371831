//! Coarse spatial hash mapping buckets to the partitions overlapping them.

use gridforge_core::{BoundingArea, PartitionHandle, SpatialKey, Vector3d};
use hashbrown::HashMap;

/// Uniform bucket grid over world space.
///
/// Each bucket lists, in registration order, the partitions whose bounds
/// overlap it. That order is the tie-break when partitions overlap.
#[derive(Debug)]
pub(crate) struct SpatialHash {
    bucket_size: i32,
    buckets: HashMap<SpatialKey, Vec<PartitionHandle>>,
}

impl SpatialHash {
    /// Create an empty hash. `bucket_size` must be positive.
    pub fn new(bucket_size: i32) -> Self {
        debug_assert!(bucket_size > 0);
        Self {
            bucket_size,
            buckets: HashMap::new(),
        }
    }

    #[inline]
    pub const fn key_for(&self, pos: Vector3d) -> SpatialKey {
        SpatialKey::from_position(pos, self.bucket_size)
    }

    /// Every bucket key an area overlaps.
    fn keys_for(&self, area: &BoundingArea) -> impl Iterator<Item = SpatialKey> {
        let lo = self.key_for(area.min);
        let hi = self.key_for(area.max);
        (lo.z..=hi.z).flat_map(move |z| {
            (lo.y..=hi.y).flat_map(move |y| (lo.x..=hi.x).map(move |x| SpatialKey::new(x, y, z)))
        })
    }

    /// Number of buckets an area overlaps.
    pub fn bucket_span(&self, area: &BoundingArea) -> u64 {
        let lo = self.key_for(area.min);
        let hi = self.key_for(area.max);
        let axis = |a: i32, b: i32| (i64::from(b) - i64::from(a) + 1).max(0).unsigned_abs();
        axis(lo.x, hi.x)
            .saturating_mul(axis(lo.y, hi.y))
            .saturating_mul(axis(lo.z, hi.z))
    }

    /// Register a partition in every bucket its bounds overlap.
    pub fn insert(&mut self, handle: PartitionHandle, bounds: &BoundingArea) {
        for key in self.keys_for(bounds).collect::<Vec<_>>() {
            let bucket = self.buckets.entry(key).or_default();
            if !bucket.contains(&handle) {
                bucket.push(handle);
            }
        }
    }

    /// Drop a partition from every bucket its bounds overlap.
    pub fn remove(&mut self, handle: PartitionHandle, bounds: &BoundingArea) {
        for key in self.keys_for(bounds).collect::<Vec<_>>() {
            if let Some(bucket) = self.buckets.get_mut(&key) {
                bucket.retain(|h| *h != handle);
                if bucket.is_empty() {
                    self.buckets.remove(&key);
                }
            }
        }
    }

    /// Candidate partitions for a point, in registration order.
    pub fn candidates(&self, pos: Vector3d) -> &[PartitionHandle] {
        self.buckets
            .get(&self.key_for(pos))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Candidate partitions for an area, sorted and deduplicated.
    pub fn candidates_in_area(&self, area: &BoundingArea) -> Vec<PartitionHandle> {
        let mut handles: Vec<PartitionHandle> = self
            .keys_for(area)
            .filter_map(|key| self.buckets.get(&key))
            .flatten()
            .copied()
            .collect();
        handles.sort_unstable();
        handles.dedup();
        handles
    }

    /// Number of non-empty buckets
    #[cfg(test)]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(min: (i32, i32, i32), max: (i32, i32, i32)) -> BoundingArea {
        BoundingArea::new(
            Vector3d::from_ints(min.0, min.1, min.2),
            Vector3d::from_ints(max.0, max.1, max.2),
        )
    }

    #[test]
    fn insert_spans_every_overlapped_bucket() {
        let mut hash = SpatialHash::new(10);
        hash.insert(PartitionHandle(0), &area((0, 0, 0), (25, 0, 5)));
        assert_eq!(hash.bucket_count(), 3);
        assert_eq!(
            hash.candidates(Vector3d::from_ints(21, 0, 1)),
            &[PartitionHandle(0)]
        );
        assert!(hash.candidates(Vector3d::from_ints(31, 0, 1)).is_empty());
    }

    #[test]
    fn bucket_span_counts_overlapped_buckets() {
        let hash = SpatialHash::new(10);
        assert_eq!(hash.bucket_span(&area((0, 0, 0), (25, 0, 5))), 3);
        assert_eq!(hash.bucket_span(&area((-1, 0, -1), (10, 9, 10))), 9);
        let fine = SpatialHash::new(1);
        assert_eq!(
            fine.bucket_span(&area((0, 0, 0), (100_000, 0, 100_000))),
            100_001 * 100_001
        );
    }

    #[test]
    fn candidates_keep_registration_order() {
        let mut hash = SpatialHash::new(50);
        hash.insert(PartitionHandle(4), &area((0, 0, 0), (10, 0, 10)));
        hash.insert(PartitionHandle(1), &area((5, 0, 5), (15, 0, 15)));
        assert_eq!(
            hash.candidates(Vector3d::from_ints(6, 0, 6)),
            &[PartitionHandle(4), PartitionHandle(1)]
        );
    }

    #[test]
    fn remove_clears_empty_buckets() {
        let mut hash = SpatialHash::new(10);
        let bounds = area((0, 0, 0), (15, 0, 0));
        hash.insert(PartitionHandle(2), &bounds);
        hash.insert(PartitionHandle(3), &area((0, 0, 0), (5, 0, 0)));
        hash.remove(PartitionHandle(2), &bounds);
        assert_eq!(hash.bucket_count(), 1);
        assert_eq!(
            hash.candidates_in_area(&area((0, 0, 0), (20, 0, 0))),
            vec![PartitionHandle(3)]
        );
    }
}

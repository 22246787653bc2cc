//! Single fixed-capacity cuckoo filter
//!
//! Slot memory is one contiguous byte array of `num_buckets * bucket_size`
//! fingerprints. The array is allocated once and never resized, so dump
//! cursors into it stay valid while the owning chain grows.

use super::CuckooError;
use super::bucket::Bucket;
use super::hash::{Fingerprint, alt_hash, bucket_index};
use super::scalable::filter_memory;

/// A single Cuckoo Filter with fixed capacity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuckooFilter {
    /// Number of buckets (power of 2)
    num_buckets: u64,
    /// Slots per bucket
    bucket_size: usize,
    /// Max kicks during insertion
    max_iterations: usize,
    /// Number of items stored
    num_items: u64,
    /// Number of successful deletions
    num_deletes: u64,
    /// Bucket memory, `bucket_size` bytes per bucket
    data: Vec<u8>,
}

impl CuckooFilter {
    /// Create an empty filter. `num_buckets` must be a power of two and the
    /// bucket memory must have been checked with `filter_memory`.
    pub(super) fn new(num_buckets: u64, bucket_size: usize, max_iterations: usize) -> Self {
        debug_assert!(num_buckets.is_power_of_two());
        debug_assert!(bucket_size > 0);
        debug_assert!(filter_memory(num_buckets, bucket_size).is_some());
        Self {
            num_buckets,
            bucket_size,
            max_iterations,
            num_items: 0,
            num_deletes: 0,
            data: vec![0u8; num_buckets as usize * bucket_size],
        }
    }

    /// Rebuild a filter whose bucket memory will be filled in afterwards
    pub(super) fn with_counters(
        num_buckets: u64,
        bucket_size: usize,
        max_iterations: usize,
        num_items: u64,
        num_deletes: u64,
    ) -> Self {
        let mut filter = Self::new(num_buckets, bucket_size, max_iterations);
        filter.num_items = num_items;
        filter.num_deletes = num_deletes;
        filter
    }

    #[inline]
    fn bucket(&self, index: usize) -> Bucket<&[u8]> {
        let start = index * self.bucket_size;
        Bucket::new(&self.data[start..start + self.bucket_size])
    }

    #[inline]
    fn bucket_mut(&mut self, index: usize) -> Bucket<&mut [u8]> {
        let start = index * self.bucket_size;
        Bucket::new(&mut self.data[start..start + self.bucket_size])
    }

    /// Insert a fingerprint into one of its candidate buckets, relocating
    /// existing fingerprints if both are full.
    pub fn insert(&mut self, fp: Fingerprint, i1: usize, i2: usize) -> Result<(), CuckooError> {
        if self.bucket_mut(i1).insert(fp) || self.bucket_mut(i2).insert(fp) {
            self.num_items += 1;
            return Ok(());
        }

        if self.cuckoo_insert(i1, fp) {
            self.num_items += 1;
            Ok(())
        } else {
            Err(CuckooError::Full)
        }
    }

    /// Cuckoo insertion with deterministic kicks.
    /// Uses rotating victim slot selection to allow rollback on failure
    fn cuckoo_insert(&mut self, start_index: usize, start_fp: Fingerprint) -> bool {
        let mut index = start_index;
        let mut fp = start_fp;
        let mut victim_slot = 0usize;

        for _ in 0..self.max_iterations {
            fp = self.bucket_mut(index).swap(victim_slot, fp);
            index = bucket_index(alt_hash(index as u64, fp), self.num_buckets);

            if self.bucket_mut(index).insert(fp) {
                return true;
            }

            victim_slot = (victim_slot + 1) % self.bucket_size;
        }

        // Replay the kicks backwards so no stored fingerprint is lost
        for _ in 0..self.max_iterations {
            victim_slot = (victim_slot + self.bucket_size - 1) % self.bucket_size;
            index = bucket_index(alt_hash(index as u64, fp), self.num_buckets);
            fp = self.bucket_mut(index).swap(victim_slot, fp);
        }
        debug_assert_eq!(fp, start_fp);
        debug_assert_eq!(index, start_index);

        false
    }

    /// Check if the fingerprint is in either candidate bucket
    #[inline]
    pub fn contains(&self, fp: Fingerprint, i1: usize, i2: usize) -> bool {
        self.bucket(i1).contains(fp) || self.bucket(i2).contains(fp)
    }

    /// Count occurrences of the fingerprint in its candidate buckets
    #[inline]
    pub fn count(&self, fp: Fingerprint, i1: usize, i2: usize) -> usize {
        if i1 == i2 {
            self.bucket(i1).count(fp)
        } else {
            self.bucket(i1).count(fp) + self.bucket(i2).count(fp)
        }
    }

    /// Remove one occurrence of the fingerprint.
    /// Returns false if it is in neither candidate bucket
    pub fn delete(&mut self, fp: Fingerprint, i1: usize, i2: usize) -> bool {
        if self.bucket_mut(i1).remove(fp) || self.bucket_mut(i2).remove(fp) {
            self.num_items = self.num_items.saturating_sub(1);
            self.num_deletes += 1;
            return true;
        }
        false
    }

    #[inline]
    pub fn num_buckets(&self) -> u64 {
        self.num_buckets
    }

    #[inline]
    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    #[inline]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    #[inline]
    pub fn num_items(&self) -> u64 {
        self.num_items
    }

    #[inline]
    pub fn num_deletes(&self) -> u64 {
        self.num_deletes
    }

    /// Slot capacity (buckets * bucket_size)
    #[inline]
    pub fn max_capacity(&self) -> u64 {
        self.num_buckets * self.bucket_size as u64
    }

    /// Raw bucket memory
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub(super) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Memory used by the bucket array and bookkeeping
    pub fn size_bytes(&self) -> usize {
        self.data.len() + std::mem::size_of::<Self>()
    }
}

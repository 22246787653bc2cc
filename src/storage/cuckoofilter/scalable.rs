//! Scalable Cuckoo Filter
//!
//! A chain of [`CuckooFilter`]s, oldest first. Inserts always target the
//! newest filter; when it cannot place an item a larger filter is appended
//! and the insert is retried there. Existing filters are never resized or
//! removed.

use super::CuckooError;
use super::filter::CuckooFilter;
use super::hash::CuckooHash;

/// Largest accepted bucket size
pub const MAX_BUCKET_SIZE: usize = 255;
/// Largest accepted MAXITERATIONS value
pub const MAX_ITERATIONS: usize = u16::MAX as usize;
/// Largest accepted EXPANSION value
pub const MAX_EXPANSION: u32 = 32768;
/// Upper bound on the bucket memory of one chain, in bytes
pub const MAX_FILTER_MEMORY: u64 = 1 << 32;

/// Bucket memory of a sub-filter, or `None` if it does not fit the limit
pub(super) fn filter_memory(num_buckets: u64, bucket_size: usize) -> Option<u64> {
    num_buckets
        .checked_mul(bucket_size as u64)
        .filter(|&bytes| bytes <= MAX_FILTER_MEMORY && usize::try_from(bytes).is_ok())
}

/// Configuration for Cuckoo Filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuckooFilterConfig {
    /// Initial capacity (bucket count is rounded to power of 2)
    pub capacity: usize,
    /// Number of entries per bucket (default: 2)
    pub bucket_size: usize,
    /// Maximum number of kicks before declaring filter full (default: 500)
    pub max_iterations: usize,
    /// Growth factor for new sub-filters (default: 1 = same size, 0 = never grow)
    pub expansion: u32,
    /// Upper bound on the number of sub-filters in one chain
    pub max_filters: usize,
}

impl Default for CuckooFilterConfig {
    /// RedisBloom CF module defaults
    fn default() -> Self {
        Self {
            capacity: 1024,
            bucket_size: 2,
            max_iterations: 500,
            expansion: 1,
            max_filters: 1024,
        }
    }
}

impl CuckooFilterConfig {
    /// Calculate number of buckets needed for capacity.
    /// Returns power of 2 for efficient modulo via bitwise AND, or `None`
    /// when the bucket memory would exceed [`MAX_FILTER_MEMORY`]
    #[inline]
    pub fn num_buckets(capacity: usize, bucket_size: usize) -> Option<u64> {
        let bucket_size = bucket_size.max(1);
        let num_buckets = (capacity.div_ceil(bucket_size) as u64)
            .max(1)
            .checked_next_power_of_two()?;
        filter_memory(num_buckets, bucket_size).map(|_| num_buckets)
    }

    /// Expansion actually applied on growth: rounded up to a power of two so
    /// every sub-filter keeps a power of two bucket count.
    #[inline]
    pub fn effective_expansion(&self) -> u64 {
        if self.expansion == 0 {
            0
        } else {
            (self.expansion as u64).next_power_of_two()
        }
    }
}

/// A scalable Cuckoo Filter that grows by adding sub-filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalableCuckooFilter {
    /// Stack of filters (newest last, never empty)
    pub(super) filters: Vec<CuckooFilter>,
    /// Configuration
    pub config: CuckooFilterConfig,
    /// Total items across all filters
    pub(super) num_items: u64,
    /// Total successful deletions across all filters
    pub(super) num_deletes: u64,
    /// Next expected bucket-memory offset while a chunked load is in progress
    pub(super) loading: Option<u64>,
}

impl ScalableCuckooFilter {
    /// Create a new scalable Cuckoo Filter.
    /// Fails with [`CuckooError::TooLarge`] if the capacity needs more bucket
    /// memory than [`MAX_FILTER_MEMORY`]
    pub fn new(config: CuckooFilterConfig) -> Result<Self, CuckooError> {
        let num_buckets = CuckooFilterConfig::num_buckets(config.capacity, config.bucket_size)
            .ok_or(CuckooError::TooLarge)?;
        let initial_filter =
            CuckooFilter::new(num_buckets, config.bucket_size, config.max_iterations);
        Ok(Self {
            filters: vec![initial_filter],
            config,
            num_items: 0,
            num_deletes: 0,
            loading: None,
        })
    }

    #[inline]
    fn newest(&self) -> &CuckooFilter {
        &self.filters[self.filters.len() - 1]
    }

    #[inline]
    fn newest_mut(&mut self) -> &mut CuckooFilter {
        let last = self.filters.len() - 1;
        &mut self.filters[last]
    }

    /// Add an item
    pub fn add(&mut self, item: &[u8]) -> Result<(), CuckooError> {
        self.insert_hash(&CuckooHash::new(item))
    }

    fn insert_hash(&mut self, hash: &CuckooHash) -> Result<(), CuckooError> {
        let current = self.newest_mut();
        let (i1, i2) = hash.indices(current.num_buckets());
        match current.insert(hash.fp, i1, i2) {
            Ok(()) => {
                self.num_items += 1;
                return Ok(());
            }
            Err(CuckooError::Full) => {}
            Err(e) => return Err(e),
        }

        self.grow()?;

        let fresh = self.newest_mut();
        let (i1, i2) = hash.indices(fresh.num_buckets());
        fresh
            .insert(hash.fp, i1, i2)
            .map_err(|_| CuckooError::CapacityExceeded)?;
        self.num_items += 1;
        Ok(())
    }

    /// Append a new sub-filter sized from the newest one
    fn grow(&mut self) -> Result<(), CuckooError> {
        let expansion = self.config.effective_expansion();
        if expansion == 0 || self.filters.len() >= self.config.max_filters {
            log::warn!(
                "cuckoo filter cannot grow past {} sub-filters (expansion {})",
                self.filters.len(),
                self.config.expansion
            );
            return Err(CuckooError::Full);
        }

        let used = self.dump_len();
        let Some(num_buckets) = self
            .newest()
            .num_buckets()
            .checked_mul(expansion)
            .filter(|&n| {
                filter_memory(n, self.config.bucket_size)
                    .and_then(|bytes| bytes.checked_add(used))
                    .is_some_and(|total| total <= MAX_FILTER_MEMORY)
            })
        else {
            log::warn!(
                "cuckoo filter cannot grow: bucket memory would exceed {} bytes",
                MAX_FILTER_MEMORY
            );
            return Err(CuckooError::Full);
        };

        log::debug!(
            "cuckoo filter growing: sub-filter #{} with {} buckets",
            self.filters.len(),
            num_buckets
        );
        self.filters.push(CuckooFilter::new(
            num_buckets,
            self.config.bucket_size,
            self.config.max_iterations,
        ));
        Ok(())
    }

    /// Add item only if it doesn't exist.
    /// Returns true if added, false if it was already present
    pub fn add_nx(&mut self, item: &[u8]) -> Result<bool, CuckooError> {
        let hash = CuckooHash::new(item);
        if self.contains_hash(&hash) {
            return Ok(false);
        }
        self.insert_hash(&hash)?;
        Ok(true)
    }

    fn contains_hash(&self, hash: &CuckooHash) -> bool {
        self.filters.iter().rev().any(|f| {
            let (i1, i2) = hash.indices(f.num_buckets());
            f.contains(hash.fp, i1, i2)
        })
    }

    /// Check if item might exist
    pub fn exists(&self, item: &[u8]) -> bool {
        self.contains_hash(&CuckooHash::new(item))
    }

    /// Check multiple items at once
    pub fn exists_many(&self, items: &[&[u8]]) -> Vec<bool> {
        items.iter().map(|item| self.exists(item)).collect()
    }

    /// Count estimated occurrences across all filters
    pub fn count_item(&self, item: &[u8]) -> usize {
        let hash = CuckooHash::new(item);
        self.filters
            .iter()
            .map(|f| {
                let (i1, i2) = hash.indices(f.num_buckets());
                f.count(hash.fp, i1, i2)
            })
            .sum()
    }

    /// Delete one occurrence of an item, searching newest filter first
    pub fn delete(&mut self, item: &[u8]) -> bool {
        let hash = CuckooHash::new(item);
        for filter in self.filters.iter_mut().rev() {
            let (i1, i2) = hash.indices(filter.num_buckets());
            if filter.delete(hash.fp, i1, i2) {
                self.num_items = self.num_items.saturating_sub(1);
                self.num_deletes += 1;
                return true;
            }
        }
        false
    }

    /// Get total item count
    #[inline]
    pub fn len(&self) -> u64 {
        self.num_items
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_items == 0
    }

    #[inline]
    pub fn num_deletes(&self) -> u64 {
        self.num_deletes
    }

    /// Get configured initial capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Get number of sub-filters
    #[inline]
    pub fn num_filters(&self) -> usize {
        self.filters.len()
    }

    /// Sub-filters, oldest first
    #[inline]
    pub fn filters(&self) -> &[CuckooFilter] {
        &self.filters
    }

    /// Bucket count of the first sub-filter
    #[inline]
    pub fn num_buckets(&self) -> u64 {
        self.filters[0].num_buckets()
    }

    #[inline]
    pub fn bucket_size(&self) -> usize {
        self.config.bucket_size
    }

    #[inline]
    pub fn max_iterations(&self) -> usize {
        self.config.max_iterations
    }

    #[inline]
    pub fn expansion(&self) -> u32 {
        self.config.expansion
    }

    /// Get total size in bytes
    pub fn size_bytes(&self) -> usize {
        self.filters.iter().map(|f| f.size_bytes()).sum::<usize>() + std::mem::size_of::<Self>()
    }

    /// True while a chunked load has not yet received all bucket memory
    #[inline]
    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    /// One-line state summary used by CF.DEBUG
    pub fn debug_string(&self) -> String {
        format!(
            "bktsize:{} buckets:{} items:{} deletes:{} filters:{} max_iterations:{}",
            self.bucket_size(),
            self.num_buckets(),
            self.num_items,
            self.num_deletes,
            self.num_filters(),
            self.max_iterations()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_capacity(capacity: usize) -> ScalableCuckooFilter {
        ScalableCuckooFilter::new(CuckooFilterConfig {
            capacity,
            ..Default::default()
        })
        .unwrap()
    }

    fn config(capacity: usize, expansion: u32) -> CuckooFilterConfig {
        CuckooFilterConfig {
            capacity,
            expansion,
            ..Default::default()
        }
    }

    #[test]
    fn test_bucket_count_rounding() {
        assert_eq!(CuckooFilterConfig::num_buckets(10, 2), Some(8));
        assert_eq!(CuckooFilterConfig::num_buckets(10000, 2), Some(8192));
        assert_eq!(CuckooFilterConfig::num_buckets(1024, 2), Some(512));
        assert_eq!(CuckooFilterConfig::num_buckets(1, 2), Some(1));
        assert_eq!(CuckooFilterConfig::num_buckets(2, 2), Some(1));
        assert_eq!(CuckooFilterConfig::num_buckets(7, 4), Some(2));
    }

    #[test]
    fn test_oversized_capacity_rejected() {
        assert_eq!(CuckooFilterConfig::num_buckets(usize::MAX, 1), None);
        assert_eq!(CuckooFilterConfig::num_buckets(usize::MAX, 2), None);
        assert_eq!(CuckooFilterConfig::num_buckets(1_000_000_000_000, 2), None);
        assert_eq!(
            CuckooFilterConfig::num_buckets(MAX_FILTER_MEMORY as usize, 1),
            Some(MAX_FILTER_MEMORY)
        );
        assert_eq!(
            CuckooFilterConfig::num_buckets(MAX_FILTER_MEMORY as usize + 1, 1),
            None
        );

        let result = ScalableCuckooFilter::new(CuckooFilterConfig {
            capacity: usize::MAX,
            bucket_size: 1,
            ..Default::default()
        });
        assert_eq!(result, Err(CuckooError::TooLarge));
    }

    #[test]
    fn test_growth_stops_at_memory_limit() {
        // 1 bucket, then 32768, then 2^30 buckets of 4 bytes which is over the limit
        let mut scf = ScalableCuckooFilter::new(CuckooFilterConfig {
            capacity: 4,
            bucket_size: 4,
            max_iterations: 50,
            expansion: MAX_EXPANSION,
            ..Default::default()
        })
        .unwrap();
        let mut result = Ok(());
        for i in 0..200_000 {
            result = scf.add(format!("m{}", i).as_bytes());
            if result.is_err() {
                break;
            }
        }
        assert_eq!(result, Err(CuckooError::Full));
        assert_eq!(scf.num_filters(), 2);
        assert_eq!(scf.filters()[1].num_buckets(), 32768);
    }

    #[test]
    fn test_debug_string() {
        let scf = with_capacity(10);
        assert_eq!(
            scf.debug_string(),
            "bktsize:2 buckets:8 items:0 deletes:0 filters:1 max_iterations:500"
        );
    }

    #[test]
    fn test_scalable_grows_on_full() {
        let mut scf = ScalableCuckooFilter::new(config(2, 2)).unwrap();

        for i in 0..1000 {
            scf.add(format!("item{}", i).as_bytes()).unwrap();
        }

        assert_eq!(scf.len(), 1000);
        assert!(scf.num_filters() > 1);
        assert_eq!(scf.num_buckets(), 1);
        for i in 0..1000 {
            assert!(
                scf.exists(format!("item{}", i).as_bytes()),
                "Item {} not found",
                i
            );
        }

        // Each sub-filter doubles the previous one
        let sizes: Vec<u64> = scf.filters().iter().map(|f| f.num_buckets()).collect();
        for pair in sizes.windows(2) {
            assert_eq!(pair[1], pair[0] * 2);
        }
    }

    #[test]
    fn test_same_size_growth_with_default_expansion() {
        let mut scf = with_capacity(2);
        for i in 0..1000 {
            scf.add(format!("{}", i).as_bytes()).unwrap();
        }
        assert!(scf.filters().iter().all(|f| f.num_buckets() == 1));
        for i in 0..1000 {
            assert!(scf.exists(format!("{}", i).as_bytes()));
        }
    }

    #[test]
    fn test_no_expansion_reports_full() {
        let mut scf = ScalableCuckooFilter::new(CuckooFilterConfig {
            capacity: 2,
            expansion: 0,
            max_iterations: 20,
            ..Default::default()
        })
        .unwrap();
        assert!(scf.add(b"a").is_ok());
        assert!(scf.add(b"b").is_ok());
        assert!(matches!(scf.add(b"c"), Err(CuckooError::Full)));
        assert_eq!(scf.len(), 2);
        assert_eq!(scf.num_filters(), 1);
    }

    #[test]
    fn test_max_filters_bound() {
        let mut scf = ScalableCuckooFilter::new(CuckooFilterConfig {
            capacity: 2,
            max_filters: 3,
            ..Default::default()
        })
        .unwrap();
        let mut added = 0;
        let mut result = Ok(());
        for i in 0..100 {
            result = scf.add(format!("x{}", i).as_bytes());
            if result.is_err() {
                break;
            }
            added += 1;
        }
        assert!(matches!(result, Err(CuckooError::Full)));
        assert_eq!(scf.num_filters(), 3);
        assert_eq!(scf.len(), added);
    }

    #[test]
    fn test_non_power_of_two_expansion_rounds_up() {
        let cfg = config(2, 3);
        assert_eq!(cfg.effective_expansion(), 4);
        assert_eq!(config(2, 0).effective_expansion(), 0);
        assert_eq!(config(2, 1).effective_expansion(), 1);
    }

    #[test]
    fn test_add_nx() {
        let mut scf = with_capacity(1000);
        assert!(scf.add_nx(b"k1").unwrap());
        assert!(!scf.add_nx(b"k1").unwrap());
        assert_eq!(scf.count_item(b"k1"), 1);
        scf.add(b"k1").unwrap();
        assert_eq!(scf.count_item(b"k1"), 2);
    }

    #[test]
    fn test_count_and_delete() {
        let mut scf = with_capacity(1000);
        scf.add(b"k1").unwrap();
        scf.add(b"k1").unwrap();
        assert_eq!(scf.count_item(b"k1"), 2);

        assert!(scf.delete(b"k1"));
        assert_eq!(scf.count_item(b"k1"), 1);
        assert!(scf.delete(b"k1"));
        assert_eq!(scf.count_item(b"k1"), 0);
        assert!(!scf.delete(b"k1"));

        assert_eq!(scf.len(), 0);
        assert_eq!(scf.num_deletes(), 2);
    }

    #[test]
    fn test_delete_across_sub_filters() {
        let mut scf = ScalableCuckooFilter::new(config(4, 2)).unwrap();
        for i in 0..200 {
            scf.add(format!("item{}", i).as_bytes()).unwrap();
        }
        assert!(scf.num_filters() > 1);

        for i in 0..100 {
            assert!(scf.delete(format!("item{}", i).as_bytes()));
        }
        assert_eq!(scf.len(), 100);
        assert_eq!(scf.num_deletes(), 100);
        let per_filter: u64 = scf.filters().iter().map(|f| f.num_deletes()).sum();
        assert_eq!(per_filter, 100);

        for i in 100..200 {
            assert!(scf.exists(format!("item{}", i).as_bytes()));
        }
        // Structure is kept even after deletions
        let filters = scf.num_filters();
        for i in 100..200 {
            scf.delete(format!("item{}", i).as_bytes());
        }
        assert_eq!(scf.num_filters(), filters);
        assert!(scf.is_empty());
    }

    #[test]
    fn test_exists_many() {
        let mut scf = with_capacity(100);
        scf.add(b"foo").unwrap();
        scf.add(b"bar").unwrap();
        let items: Vec<&[u8]> = vec![&b"foo"[..], &b"bar"[..]];
        assert_eq!(scf.exists_many(&items), vec![true, true]);
    }
}

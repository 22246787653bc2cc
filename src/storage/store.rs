use ahash::RandomState;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::mapref::one::Ref;

use super::cuckoofilter::CuckooFilterConfig;
use super::types::Entry;

/// Concurrent key-value store.
///
/// Each key is locked for the duration of a single operation, which is what
/// serializes access to a filter. Type-specific operations are implemented in
/// separate modules under `ops/`
pub struct Store {
    /// The main data store - sharded concurrent hash map
    pub(crate) data: DashMap<Bytes, Entry, RandomState>,
    /// Parameters for filters created implicitly by CF.ADD / CF.INSERT
    pub(crate) cf_defaults: CuckooFilterConfig,
    /// Largest bucket chunk returned by CF.SCANDUMP
    pub(crate) scandump_chunk_size: usize,
}

impl Store {
    // ==================== Core Generic Operations ====================

    /// Create a new store with default settings
    pub fn new() -> Self {
        Self::with_config(&crate::config::ServerConfig::default())
    }

    /// Create a new store using the filter defaults of a server config
    pub fn with_config(config: &crate::config::ServerConfig) -> Self {
        Self {
            data: DashMap::with_hasher(RandomState::new()),
            cf_defaults: config.cuckoo.clone(),
            scandump_chunk_size: config.scandump_chunk_size,
        }
    }

    /// Check if key exists
    #[inline]
    pub fn exists(&self, key: &[u8]) -> bool {
        self.data.contains_key(key)
    }

    /// Delete a key
    #[inline]
    pub fn del(&self, key: &[u8]) -> bool {
        self.data_remove(key).is_some()
    }

    /// Get number of keys
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if store is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remove every key
    pub fn flush(&self) {
        self.data.clear();
    }

    /// Get key version for WATCH (None if key doesn't exist)
    #[inline]
    pub fn get_version(&self, key: &[u8]) -> Option<u64> {
        self.data.get(key).map(|e| e.version())
    }

    /// Get the type name of a key
    pub fn key_type(&self, key: &[u8]) -> Option<&'static str> {
        self.data.get(key).map(|e| e.data.type_name())
    }

    /// Iterate over all keys and their entries
    #[inline]
    pub fn for_each_entry<F>(&self, mut f: F)
    where
        F: FnMut(&Bytes, &Entry),
    {
        for kv in self.data.iter() {
            f(kv.key(), kv.value());
        }
    }

    // ==================== Map Helpers ====================

    #[inline]
    pub(crate) fn data_get(&self, key: &[u8]) -> Option<Ref<'_, Bytes, Entry>> {
        self.data.get(key)
    }

    #[inline]
    pub(crate) fn data_entry(&self, key: &Bytes) -> MapEntry<'_, Bytes, Entry> {
        self.data.entry(key.clone())
    }

    #[inline]
    pub(crate) fn data_remove(&self, key: &[u8]) -> Option<(Bytes, Entry)> {
        self.data.remove(key)
    }

    #[inline]
    pub(crate) fn data_insert(&self, key: Bytes, entry: Entry) -> Option<Entry> {
        self.data.insert(key, entry)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

//! Cuckoo Filter storage operations
//!
//! Implements CF.* commands for probabilistic set membership with deletion support.

use bytes::Bytes;
use dashmap::mapref::entry::Entry as MapEntry;

use crate::error::{Error, Result};
use crate::storage::cuckoofilter::{CuckooFilterConfig, HEADER_CURSOR, ScalableCuckooFilter};
use crate::storage::{DataType, Entry, Store};

/// Per-item result of CF.INSERT / CF.INSERTNX
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// NX only: the item was already present
    Exists,
    /// The filter could not take the item
    Full,
}

impl InsertOutcome {
    /// Reply integer: 1, 0 or -1
    #[inline]
    pub fn as_int(self) -> i64 {
        match self {
            Self::Inserted => 1,
            Self::Exists => 0,
            Self::Full => -1,
        }
    }
}

/// Snapshot of CF.INFO fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuckooInfo {
    pub size: usize,
    pub num_buckets: u64,
    pub num_filters: usize,
    pub num_items: u64,
    pub num_deletes: u64,
    pub bucket_size: usize,
    pub expansion: u32,
    pub max_iterations: usize,
}

/// Refuse to touch a filter whose bucket memory is still arriving via LOADCHUNK
fn loaded(cf: &mut ScalableCuckooFilter) -> Result<&mut ScalableCuckooFilter> {
    if cf.is_loading() {
        return Err(Error::Loading);
    }
    Ok(cf)
}

fn insert_items(cf: &mut ScalableCuckooFilter, items: &[&[u8]], nx: bool) -> Vec<InsertOutcome> {
    items
        .iter()
        .map(|item| {
            let result = if nx {
                cf.add_nx(item)
            } else {
                cf.add(item).map(|()| true)
            };
            match result {
                Ok(true) => InsertOutcome::Inserted,
                Ok(false) => InsertOutcome::Exists,
                Err(_) => InsertOutcome::Full,
            }
        })
        .collect()
}

/// Cuckoo Filter storage operations
impl Store {
    /// Filter parameters used when a command creates a filter implicitly
    #[inline]
    pub fn cf_defaults(&self) -> &CuckooFilterConfig {
        &self.cf_defaults
    }

    /// CF.RESERVE - Create a new Cuckoo Filter with specified parameters
    ///
    /// Follows Redis/RedisBloom CF.RESERVE conventions:
    /// - capacity: Number of items the filter is expected to hold
    /// - bucket_size: Number of items per bucket (default: 2 per RedisBloom)
    /// - max_iterations: Maximum cuckoo kicks before giving up (default: 500)
    /// - expansion: Expansion factor for sub-filters when scaling (default: 1)
    pub fn cf_reserve(
        &self,
        key: Bytes,
        capacity: usize,
        bucket_size: Option<usize>,
        max_iterations: Option<usize>,
        expansion: Option<u32>,
    ) -> Result<()> {
        let defaults = &self.cf_defaults;
        let config = CuckooFilterConfig {
            capacity,
            bucket_size: bucket_size.unwrap_or(defaults.bucket_size),
            max_iterations: max_iterations.unwrap_or(defaults.max_iterations),
            expansion: expansion.unwrap_or(defaults.expansion),
            max_filters: defaults.max_filters,
        };

        match self.data_entry(&key) {
            MapEntry::Occupied(_) => Err(Error::KeyExists),
            MapEntry::Vacant(e) => {
                let cf = ScalableCuckooFilter::new(config)?;
                e.insert(Entry::new(DataType::CuckooFilter(Box::new(cf))));
                Ok(())
            }
        }
    }

    /// CF.ADD - Add an item to the Cuckoo Filter
    /// Creates filter with defaults if it doesn't exist
    pub fn cf_add(&self, key: &Bytes, item: &[u8]) -> Result<()> {
        match self.data_entry(key) {
            MapEntry::Occupied(mut e) => {
                let entry = e.get_mut();
                let cf = loaded(entry.data.as_cuckoofilter_mut().ok_or(Error::WrongType)?)?;
                cf.add(item)?;
                entry.bump_version();
                Ok(())
            }
            MapEntry::Vacant(e) => {
                let mut cf = ScalableCuckooFilter::new(self.cf_defaults.clone())?;
                cf.add(item)?;
                e.insert(Entry::new(DataType::CuckooFilter(Box::new(cf))));
                Ok(())
            }
        }
    }

    /// CF.ADDNX - Add an item only if it doesn't already exist
    /// Returns true if added, false if already exists
    pub fn cf_addnx(&self, key: &Bytes, item: &[u8]) -> Result<bool> {
        match self.data_entry(key) {
            MapEntry::Occupied(mut e) => {
                let entry = e.get_mut();
                let cf = loaded(entry.data.as_cuckoofilter_mut().ok_or(Error::WrongType)?)?;
                let added = cf.add_nx(item)?;
                if added {
                    entry.bump_version();
                }
                Ok(added)
            }
            MapEntry::Vacant(e) => {
                let mut cf = ScalableCuckooFilter::new(self.cf_defaults.clone())?;
                let added = cf.add_nx(item)?;
                e.insert(Entry::new(DataType::CuckooFilter(Box::new(cf))));
                Ok(added)
            }
        }
    }

    fn cf_insert_impl(
        &self,
        key: &Bytes,
        items: &[&[u8]],
        capacity: Option<usize>,
        nocreate: bool,
        nx: bool,
    ) -> Result<Vec<InsertOutcome>> {
        match self.data_entry(key) {
            MapEntry::Occupied(mut e) => {
                let entry = e.get_mut();
                let cf = loaded(entry.data.as_cuckoofilter_mut().ok_or(Error::WrongType)?)?;
                let results = insert_items(cf, items, nx);
                if results.contains(&InsertOutcome::Inserted) {
                    entry.bump_version();
                }
                Ok(results)
            }
            MapEntry::Vacant(e) => {
                if nocreate {
                    return Err(Error::NotFound);
                }

                let config = CuckooFilterConfig {
                    capacity: capacity.unwrap_or(self.cf_defaults.capacity),
                    ..self.cf_defaults.clone()
                };
                let mut cf = ScalableCuckooFilter::new(config)?;
                let results = insert_items(&mut cf, items, nx);
                e.insert(Entry::new(DataType::CuckooFilter(Box::new(cf))));
                Ok(results)
            }
        }
    }

    /// CF.INSERT - Batch add items with options.
    /// `capacity` only applies when the filter is created by this call
    pub fn cf_insert(
        &self,
        key: &Bytes,
        items: &[&[u8]],
        capacity: Option<usize>,
        nocreate: bool,
    ) -> Result<Vec<InsertOutcome>> {
        self.cf_insert_impl(key, items, capacity, nocreate, false)
    }

    /// CF.INSERTNX - Batch add items only if they don't exist
    pub fn cf_insertnx(
        &self,
        key: &Bytes,
        items: &[&[u8]],
        capacity: Option<usize>,
        nocreate: bool,
    ) -> Result<Vec<InsertOutcome>> {
        self.cf_insert_impl(key, items, capacity, nocreate, true)
    }

    /// Run `f` against the filter at `key`, or return `missing` if there is none
    fn with_cf<T>(
        &self,
        key: &[u8],
        missing: impl FnOnce() -> Result<T>,
        f: impl FnOnce(&ScalableCuckooFilter) -> T,
    ) -> Result<T> {
        match self.data_get(key) {
            Some(entry) => entry.data.as_cuckoofilter().map(f).ok_or(Error::WrongType),
            None => missing(),
        }
    }

    /// CF.EXISTS - Check if an item exists in the Cuckoo Filter
    pub fn cf_exists(&self, key: &[u8], item: &[u8]) -> Result<bool> {
        self.with_cf(key, || Ok(false), |cf| cf.exists(item))
    }

    /// CF.MEXISTS - Check if multiple items exist
    pub fn cf_mexists(&self, key: &[u8], items: &[&[u8]]) -> Result<Vec<bool>> {
        self.with_cf(key, || Ok(vec![false; items.len()]), |cf| cf.exists_many(items))
    }

    /// CF.COUNT - Returns estimated count of item occurrences
    pub fn cf_count(&self, key: &[u8], item: &[u8]) -> Result<usize> {
        self.with_cf(key, || Ok(0), |cf| cf.count_item(item))
    }

    /// CF.DEL - Delete one occurrence of an item
    pub fn cf_del(&self, key: &Bytes, item: &[u8]) -> Result<bool> {
        match self.data_entry(key) {
            MapEntry::Occupied(mut e) => {
                let entry = e.get_mut();
                let cf = loaded(entry.data.as_cuckoofilter_mut().ok_or(Error::WrongType)?)?;
                let deleted = cf.delete(item);
                if deleted {
                    entry.bump_version();
                }
                Ok(deleted)
            }
            MapEntry::Vacant(_) => Err(Error::NotFound),
        }
    }

    /// CF.INFO - Get information about the Cuckoo Filter
    pub fn cf_info(&self, key: &[u8]) -> Result<CuckooInfo> {
        self.with_cf(
            key,
            || Err(Error::NotFound),
            |cf| CuckooInfo {
                size: cf.size_bytes(),
                num_buckets: cf.num_buckets(),
                num_filters: cf.num_filters(),
                num_items: cf.len(),
                num_deletes: cf.num_deletes(),
                bucket_size: cf.bucket_size(),
                expansion: cf.expansion(),
                max_iterations: cf.max_iterations(),
            },
        )
    }

    /// CF.DEBUG - One-line internal state summary
    pub fn cf_debug(&self, key: &[u8]) -> Result<String> {
        self.with_cf(key, || Err(Error::NotFound), |cf| cf.debug_string())
    }

    /// CF.SCANDUMP - Get the chunk following `iterator`.
    /// `(0, empty)` marks the end of the dump
    pub fn cf_scandump(&self, key: &[u8], iterator: u64) -> Result<(u64, Bytes)> {
        let entry = self.data_get(key).ok_or(Error::NotFound)?;
        let cf = entry.data.as_cuckoofilter().ok_or(Error::WrongType)?;
        if cf.is_loading() {
            return Err(Error::Loading);
        }
        Ok(cf.scandump(iterator, self.scandump_chunk_size))
    }

    /// CF.LOADCHUNK - Replay a chunk produced by CF.SCANDUMP.
    ///
    /// The header chunk creates the filter and fails if the key exists;
    /// every later chunk must arrive in dump order.
    pub fn cf_loadchunk(&self, key: &Bytes, iterator: u64, data: &[u8]) -> Result<()> {
        if iterator == 0 {
            return Err(Error::BadIterator);
        }

        match self.data_entry(key) {
            MapEntry::Occupied(mut e) => {
                if iterator == HEADER_CURSOR {
                    return Err(Error::KeyExists);
                }
                let entry = e.get_mut();
                let cf = entry.data.as_cuckoofilter_mut().ok_or(Error::WrongType)?;
                cf.load_chunk(iterator, data)?;
                entry.bump_version();
                Ok(())
            }
            MapEntry::Vacant(e) => {
                if iterator != HEADER_CURSOR {
                    return Err(Error::NotFound);
                }
                let cf = ScalableCuckooFilter::from_header(data)?;
                log::debug!(
                    "cuckoo filter '{}' restoring {} sub-filters",
                    String::from_utf8_lossy(key),
                    cf.num_filters()
                );
                e.insert(Entry::new(DataType::CuckooFilter(Box::new(cf))));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::cuckoofilter::CuckooError;

    fn key(k: &'static str) -> Bytes {
        Bytes::from_static(k.as_bytes())
    }

    fn items<'a>(xs: &[&'a str]) -> Vec<&'a [u8]> {
        xs.iter().map(|x| x.as_bytes()).collect()
    }

    #[test]
    fn test_reserve_existing_key() {
        let store = Store::new();
        store.cf_reserve(key("cf"), 1000, None, None, None).unwrap();
        assert!(matches!(
            store.cf_reserve(key("cf"), 1000, None, None, None),
            Err(Error::KeyExists)
        ));
        store.cf_reserve(key("tiny"), 1, None, None, None).unwrap();
        assert_eq!(
            store.cf_debug(b"tiny").unwrap(),
            "bktsize:2 buckets:1 items:0 deletes:0 filters:1 max_iterations:500"
        );
    }

    #[test]
    fn test_add_autocreates_with_defaults() {
        let store = Store::new();
        store.cf_add(&key("f1"), b"foo").unwrap();
        let outcomes = store.cf_insert(&key("f2"), &items(&["foo"]), None, false).unwrap();
        assert_eq!(outcomes, vec![InsertOutcome::Inserted]);
        assert_eq!(store.cf_debug(b"f1").unwrap(), store.cf_debug(b"f2").unwrap());
        assert_eq!(
            store.cf_debug(b"f1").unwrap(),
            "bktsize:2 buckets:512 items:1 deletes:0 filters:1 max_iterations:500"
        );
    }

    #[test]
    fn test_wrong_type() {
        let store = Store::new();
        store.set(key("s"), key("value"));
        assert!(matches!(store.cf_add(&key("s"), b"x"), Err(Error::WrongType)));
        assert!(matches!(store.cf_del(&key("s"), b"x"), Err(Error::WrongType)));
        assert!(matches!(store.cf_exists(b"s", b"x"), Err(Error::WrongType)));
        assert!(matches!(store.cf_debug(b"s"), Err(Error::WrongType)));
        assert!(matches!(
            store.cf_insert(&key("s"), &items(&["x"]), None, false),
            Err(Error::WrongType)
        ));
    }

    #[test]
    fn test_missing_key_reads() {
        let store = Store::new();
        assert!(!store.cf_exists(b"nope", b"x").unwrap());
        assert_eq!(store.cf_count(b"nope", b"x").unwrap(), 0);
        assert_eq!(
            store.cf_mexists(b"nope", &items(&["a", "b"])).unwrap(),
            vec![false, false]
        );
        assert!(matches!(store.cf_del(&key("nope"), b"x"), Err(Error::NotFound)));
        assert!(matches!(store.cf_debug(b"nope"), Err(Error::NotFound)));
        assert!(matches!(store.cf_info(b"nope"), Err(Error::NotFound)));
        assert!(matches!(store.cf_scandump(b"nope", 0), Err(Error::NotFound)));
        assert!(!store.exists(b"nope"));
    }

    #[test]
    fn test_insert_nocreate() {
        let store = Store::new();
        assert!(matches!(
            store.cf_insert(&key("f4"), &items(&["foo"]), None, true),
            Err(Error::NotFound)
        ));
        assert!(!store.exists(b"f4"));
        store.cf_insert(&key("f4"), &items(&["foo"]), None, false).unwrap();
        store.cf_insert(&key("f4"), &items(&["foo"]), None, true).unwrap();
        assert_eq!(store.cf_count(b"f4", b"foo").unwrap(), 2);
    }

    #[test]
    fn test_insertnx_per_item() {
        let store = Store::new();
        store
            .cf_insert(&key("f3"), &items(&["foo"]), Some(10000), false)
            .unwrap();
        assert_eq!(
            store.cf_debug(b"f3").unwrap(),
            "bktsize:2 buckets:8192 items:1 deletes:0 filters:1 max_iterations:500"
        );
        let outcomes = store
            .cf_insertnx(&key("f3"), &items(&["foo", "bar", "baz"]), None, false)
            .unwrap();
        let ints: Vec<i64> = outcomes.into_iter().map(InsertOutcome::as_int).collect();
        assert_eq!(ints, vec![0, 1, 1]);
    }

    #[test]
    fn test_insert_reports_full_positionally() {
        let store = Store::new();
        store
            .cf_reserve(key("small"), 2, None, Some(5), Some(0))
            .unwrap();
        let outcomes = store
            .cf_insert(&key("small"), &items(&["a", "b", "c", "d"]), None, false)
            .unwrap();
        assert_eq!(&outcomes[..2], &[InsertOutcome::Inserted; 2]);
        assert_eq!(&outcomes[2..], &[InsertOutcome::Full; 2]);
        assert!(matches!(store.cf_add(&key("small"), b"e"), Err(Error::FilterFull)));
    }

    #[test]
    fn test_addnx_after_delete() {
        let store = Store::new();
        assert!(store.cf_addnx(&key("nx"), b"foo").unwrap());
        assert!(!store.cf_addnx(&key("nx"), b"foo").unwrap());
        assert!(store.cf_del(&key("nx"), b"foo").unwrap());
        assert!(!store.cf_exists(b"nx", b"foo").unwrap());
        assert!(store.cf_addnx(&key("nx"), b"foo").unwrap());
        assert_eq!(store.cf_count(b"nx", b"foo").unwrap(), 1);
    }

    #[test]
    fn test_capacity_too_large() {
        let store = Store::new();
        assert!(matches!(
            store.cf_reserve(key("big"), usize::MAX, Some(1), None, None),
            Err(Error::BadCapacity)
        ));
        assert!(matches!(
            store.cf_reserve(key("big"), 1_000_000_000_000, None, None, None),
            Err(Error::BadCapacity)
        ));
        assert!(matches!(
            store.cf_insert(&key("big"), &items(&["x"]), Some(usize::MAX), false),
            Err(Error::BadCapacity)
        ));
        assert!(!store.exists(b"big"));
    }

    #[test]
    fn test_version_bumps_on_mutation() {
        let store = Store::new();
        store.cf_add(&key("v"), b"a").unwrap();
        let v1 = store.get_version(b"v").unwrap();
        store.cf_add(&key("v"), b"b").unwrap();
        let v2 = store.get_version(b"v").unwrap();
        assert!(v2 > v1);
        assert!(!store.cf_addnx(&key("v"), b"a").unwrap());
        assert_eq!(store.get_version(b"v"), Some(v2));
    }

    #[test]
    fn test_info() {
        let store = Store::new();
        store
            .cf_reserve(key("cf"), 1000, Some(4), Some(20), Some(2))
            .unwrap();
        store.cf_add(&key("cf"), b"a").unwrap();
        store.cf_add(&key("cf"), b"b").unwrap();
        assert!(store.cf_del(&key("cf"), b"a").unwrap());

        let info = store.cf_info(b"cf").unwrap();
        assert_eq!(info.num_buckets, 256);
        assert_eq!(info.num_filters, 1);
        assert_eq!(info.num_items, 1);
        assert_eq!(info.num_deletes, 1);
        assert_eq!(info.bucket_size, 4);
        assert_eq!(info.expansion, 2);
        assert_eq!(info.max_iterations, 20);
        assert!(info.size >= 1024);
    }

    #[test]
    fn test_scandump_loadchunk_round_trip() {
        let store = Store::new();
        store.cf_reserve(key("cf"), 125, None, None, None).unwrap();
        for i in 0..500 {
            store.cf_add(&key("cf"), format!("{}", i).as_bytes()).unwrap();
        }
        for i in 0..50 {
            assert!(store.cf_del(&key("cf"), format!("{}", i).as_bytes()).unwrap());
        }
        let before = store.cf_debug(b"cf").unwrap();

        let mut chunks = Vec::new();
        let mut cursor = 0;
        loop {
            let (next, data) = store.cf_scandump(b"cf", cursor).unwrap();
            if next == 0 {
                break;
            }
            chunks.push((next, data));
            cursor = next;
        }

        // loading over an existing key is refused
        assert!(matches!(
            store.cf_loadchunk(&key("cf"), chunks[0].0, &chunks[0].1),
            Err(Error::KeyExists)
        ));

        assert!(store.del(b"cf"));
        assert!(matches!(
            store.cf_loadchunk(&key("cf"), chunks[1].0, &chunks[1].1),
            Err(Error::NotFound)
        ));
        for (cursor, data) in &chunks {
            store.cf_loadchunk(&key("cf"), *cursor, data).unwrap();
        }

        assert_eq!(store.cf_debug(b"cf").unwrap(), before);
        for i in 50..500 {
            assert!(store.cf_exists(b"cf", format!("{}", i).as_bytes()).unwrap());
        }
    }

    #[test]
    fn test_partial_load_refuses_mutation_and_dump() {
        let store = Store::new();
        store.cf_reserve(key("src"), 100, None, None, None).unwrap();
        store.cf_add(&key("src"), b"early").unwrap();
        let (cursor, header) = store.cf_scandump(b"src", 0).unwrap();
        let (next, data) = store.cf_scandump(b"src", cursor).unwrap();

        store.cf_loadchunk(&key("cf"), cursor, &header).unwrap();
        assert!(matches!(store.cf_add(&key("cf"), b"late"), Err(Error::Loading)));
        assert!(matches!(store.cf_addnx(&key("cf"), b"late"), Err(Error::Loading)));
        assert!(matches!(
            store.cf_insert(&key("cf"), &items(&["late"]), None, true),
            Err(Error::Loading)
        ));
        assert!(matches!(store.cf_del(&key("cf"), b"early"), Err(Error::Loading)));
        assert!(matches!(store.cf_scandump(b"cf", 0), Err(Error::Loading)));

        store.cf_loadchunk(&key("cf"), next, &data).unwrap();
        assert!(store.cf_exists(b"cf", b"early").unwrap());
        store.cf_add(&key("cf"), b"late").unwrap();
        assert!(store.cf_exists(b"cf", b"late").unwrap());
        assert_eq!(store.cf_info(b"cf").unwrap().num_items, 2);
    }

    #[test]
    fn test_loadchunk_bad_data() {
        let store = Store::new();
        assert!(matches!(
            store.cf_loadchunk(&key("cf"), HEADER_CURSOR, b"garbage"),
            Err(Error::BadChunk(CuckooError::BadHeader(_)))
        ));
        assert!(!store.exists(b"cf"));
        assert!(matches!(
            store.cf_loadchunk(&key("cf"), 0, b""),
            Err(Error::BadIterator)
        ));
    }
}

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};

use super::cuckoofilter::ScalableCuckooFilter;

/// Redis data types held by the keyspace
#[derive(Debug, Clone)]
pub enum DataType {
    /// String - raw bytes
    String(Bytes),
    /// Cuckoo Filter - scalable approximate membership with deletion
    CuckooFilter(Box<ScalableCuckooFilter>),
}

impl DataType {
    #[inline]
    pub fn type_name(&self) -> &'static str {
        match self {
            DataType::String(_) => "string",
            DataType::CuckooFilter(_) => "MBbloomCF",
        }
    }

    #[inline]
    pub fn as_string(&self) -> Option<&Bytes> {
        match self {
            DataType::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_cuckoofilter(&self) -> Option<&ScalableCuckooFilter> {
        match self {
            DataType::CuckooFilter(cf) => Some(&**cf),
            _ => None,
        }
    }

    #[inline]
    pub fn as_cuckoofilter_mut(&mut self) -> Option<&mut ScalableCuckooFilter> {
        match self {
            DataType::CuckooFilter(cf) => Some(&mut **cf),
            _ => None,
        }
    }
}

/// Entry stored in the main database
#[derive(Debug)]
pub struct Entry {
    pub data: DataType,
    /// Version number for optimistic locking (WATCH)
    version: AtomicU64,
}

impl Entry {
    #[inline]
    pub fn new(data: DataType) -> Self {
        Self {
            data,
            version: AtomicU64::new(1),
        }
    }

    /// Get current version
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Relaxed)
    }

    /// Increment version (call after any modification)
    #[inline]
    pub fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::Relaxed);
    }
}

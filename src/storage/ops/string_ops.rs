//! Plain string values
//!
//! Only what the keyspace needs to hold non-filter keys.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::storage::{DataType, Entry, Store};

impl Store {
    /// Get string value (None if missing or not a string)
    #[inline]
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.data_get(key).and_then(|e| e.data.as_string().cloned())
    }

    /// Get string value, returning WRONGTYPE error if key exists but is not a string
    #[inline]
    pub fn get_or_wrongtype(&self, key: &[u8]) -> Result<Option<Bytes>> {
        match self.data_get(key) {
            Some(e) => match &e.data {
                DataType::String(s) => Ok(Some(s.clone())),
                _ => Err(Error::WrongType),
            },
            None => Ok(None),
        }
    }

    /// Set a string value, replacing whatever the key held
    #[inline]
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.data_insert(key, Entry::new(DataType::String(value)));
    }
}

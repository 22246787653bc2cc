//! Fixed-capacity fingerprint slots
//!
//! A bucket is a view over `bucket_size` consecutive bytes of a filter's slot
//! memory. Read-only views wrap `&[u8]`, mutable views wrap `&mut [u8]`.

use super::hash::{EMPTY_SLOT, Fingerprint};

/// A bucket holding multiple fingerprints
#[derive(Debug)]
pub struct Bucket<S> {
    /// Fingerprints stored in this bucket (0 = empty slot)
    slots: S,
}

impl<S: AsRef<[u8]>> Bucket<S> {
    #[inline]
    pub fn new(slots: S) -> Self {
        Self { slots }
    }

    /// Number of slots
    #[inline]
    pub fn size(&self) -> usize {
        self.slots.as_ref().len()
    }

    /// Check if bucket contains the fingerprint
    #[inline]
    pub fn contains(&self, fp: Fingerprint) -> bool {
        self.slots.as_ref().contains(&fp)
    }

    /// Count occurrences of fingerprint in bucket
    #[inline]
    pub fn count(&self, fp: Fingerprint) -> usize {
        self.slots.as_ref().iter().filter(|&&f| f == fp).count()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        !self.slots.as_ref().contains(&EMPTY_SLOT)
    }

    /// Get fingerprint at specific slot
    #[inline]
    pub fn get(&self, slot: usize) -> Fingerprint {
        self.slots.as_ref()[slot]
    }
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> Bucket<S> {
    /// Insert fingerprint into the first empty slot.
    /// Returns true if inserted
    #[inline]
    pub fn insert(&mut self, fp: Fingerprint) -> bool {
        match self.slots.as_mut().iter_mut().find(|slot| **slot == EMPTY_SLOT) {
            Some(slot) => {
                *slot = fp;
                true
            }
            None => false,
        }
    }

    /// Clear the first slot holding the fingerprint.
    /// Returns true if one was found
    #[inline]
    pub fn remove(&mut self, fp: Fingerprint) -> bool {
        match self.slots.as_mut().iter_mut().find(|slot| **slot == fp) {
            Some(slot) => {
                *slot = EMPTY_SLOT;
                true
            }
            None => false,
        }
    }

    /// Replace the content of a slot, returning the previous fingerprint
    #[inline]
    pub fn swap(&mut self, slot: usize, fp: Fingerprint) -> Fingerprint {
        std::mem::replace(&mut self.slots.as_mut()[slot], fp)
    }
}

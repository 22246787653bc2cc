//! Fingerprint and bucket index derivation
//!
//! An item is hashed once into a 64-bit value. The fingerprint is a non-zero
//! byte derived from that hash, and both candidate indices are kept as full
//! 64-bit values so every sub-filter in a chain can reduce them against its
//! own (power of two) bucket count.

/// Fingerprint stored in a bucket slot. Zero marks an empty slot.
pub type Fingerprint = u8;

/// The empty slot marker
pub const EMPTY_SLOT: Fingerprint = 0;

/// MurmurHash3 finalizer - excellent mixing for fingerprints
#[inline(always)]
fn murmur_mix(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51afd7ed558ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ceb9fe1a85ec53);
    h ^= h >> 33;
    h
}

/// Primary hash function for items - uses MurmurHash64A-style processing
#[inline]
pub fn item_hash(data: &[u8]) -> u64 {
    const M: u64 = 0xc6a4a7935bd1e995;
    const R: u32 = 47;
    const SEED: u64 = 0x5bd1e995;

    let len = data.len();
    let mut h: u64 = SEED ^ ((len as u64).wrapping_mul(M));

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let mut k = u64::from_le_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
        ]);

        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h ^= k;
        h = h.wrapping_mul(M);
    }

    let remaining = chunks.remainder();
    if !remaining.is_empty() {
        for (i, &byte) in remaining.iter().enumerate() {
            h ^= (byte as u64) << (i * 8);
        }
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;

    h
}

/// Extract a fingerprint from a hash. Never returns [`EMPTY_SLOT`].
#[inline(always)]
pub fn fingerprint_from_hash(hash: u64) -> Fingerprint {
    ((hash % 255) + 1) as Fingerprint
}

/// Partial-key cuckoo hashing: `alt(alt(i, fp), fp) == i`.
///
/// The XOR is applied before masking, which keeps the relation an involution
/// for any power of two bucket count.
#[inline(always)]
pub fn alt_hash(index: u64, fp: Fingerprint) -> u64 {
    index ^ murmur_mix(fp as u64)
}

/// Reduce a 64-bit index into a bucket position for `num_buckets` buckets
#[inline(always)]
pub fn bucket_index(hash: u64, num_buckets: u64) -> usize {
    debug_assert!(num_buckets.is_power_of_two());
    (hash & (num_buckets - 1)) as usize
}

/// Pre-computed fingerprint and candidate hashes for a single item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CuckooHash {
    pub fp: Fingerprint,
    pub h1: u64,
    pub h2: u64,
}

impl CuckooHash {
    pub fn new(item: &[u8]) -> Self {
        let hash = item_hash(item);
        let fp = fingerprint_from_hash(hash >> 32);
        Self {
            fp,
            h1: hash,
            h2: alt_hash(hash, fp),
        }
    }

    /// Both candidate bucket positions for a filter with `num_buckets` buckets
    #[inline]
    pub fn indices(&self, num_buckets: u64) -> (usize, usize) {
        (
            bucket_index(self.h1, num_buckets),
            bucket_index(self.h2, num_buckets),
        )
    }
}

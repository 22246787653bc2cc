//! Ultra-high-performance Cuckoo Filter implementation
//!
//! Features:
//! - O(1) lookups, insertions, and deletions
//! - Supports deletion (unlike Bloom filters) with deletion accounting
//! - Configurable bucket size, 8-bit fingerprints
//! - Automatic expansion with sub-filters
//! - Chunked, resumable dump/load of the complete state
//!
//! Based on "Cuckoo Filter: Practically Better Than Bloom" by Fan et al.

mod bucket;
mod dump;
mod filter;
mod hash;
mod scalable;

pub use dump::{DEFAULT_CHUNK_SIZE, HEADER_CURSOR};
pub use filter::CuckooFilter;
pub use hash::Fingerprint;
pub use scalable::{
    CuckooFilterConfig, MAX_BUCKET_SIZE, MAX_EXPANSION, MAX_FILTER_MEMORY, MAX_ITERATIONS,
    ScalableCuckooFilter,
};

use thiserror::Error;

/// Errors raised by the filter engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CuckooError {
    /// Kick loop exhausted and the chain may not grow any further
    #[error("filter is full")]
    Full,

    /// A freshly appended sub-filter could not take the item
    #[error("filter capacity exceeded")]
    CapacityExceeded,

    /// Requested capacity needs more bucket memory than allowed
    #[error("capacity too large")]
    TooLarge,

    /// Header chunk could not be decoded
    #[error("invalid filter header: {0}")]
    BadHeader(&'static str),

    /// Bucket chunk does not fit the filter layout
    #[error("invalid chunk: {0}")]
    BadChunk(&'static str),

    /// Chunk received at an unexpected position
    #[error("chunk out of order")]
    OutOfOrder,
}

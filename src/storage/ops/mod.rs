//! Storage operations organized by data type
//!
//! Each module adds methods to [`Store`](super::Store) via `impl` blocks.

pub mod cuckoo_ops;
pub mod string_ops;

pub use cuckoo_ops::{CuckooInfo, InsertOutcome};

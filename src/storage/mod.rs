//! Storage layer module
//!
//! This module provides the core Store implementation and all type-specific operations.
//! Operations are organized into separate modules by data type.

mod store;
mod types;

// Scalable cuckoo filter engine
pub mod cuckoofilter;

// Import all operation modules - each adds methods to Store via impl blocks
pub mod ops;

// Re-export the main Store struct
pub use store::Store;

// Re-export commonly used types
pub use cuckoofilter::{CuckooFilterConfig, ScalableCuckooFilter};
pub use ops::{CuckooInfo, InsertOutcome};
pub use types::{DataType, Entry};

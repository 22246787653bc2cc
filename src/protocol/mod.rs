//! Reply model returned by command handlers

mod types;

pub use types::RespValue;

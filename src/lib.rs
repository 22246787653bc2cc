#![allow(clippy::large_enum_variant)]

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod rdb;
pub mod storage;

pub use commands::Dispatcher;
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use storage::Store;

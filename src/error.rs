use thiserror::Error;

use crate::storage::cuckoofilter::CuckooError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("ERR syntax error")]
    Syntax,

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR item exists")]
    KeyExists,

    #[error("ERR not found")]
    NotFound,

    #[error("ERR bad capacity")]
    BadCapacity,

    #[error("ERR bad bucket size")]
    BadBucketSize,

    #[error("ERR bad max iterations")]
    BadMaxIterations,

    #[error("ERR bad expansion")]
    BadExpansion,

    #[error("ERR invalid iterator")]
    BadIterator,

    #[error("ERR Filter is full")]
    FilterFull,

    #[error("ERR filter is still being loaded")]
    Loading,

    #[error("ERR received bad data: {0}")]
    BadChunk(CuckooError),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR Protocol error: {0}")]
    Protocol(String),

    #[error("ERR {0}")]
    Config(String),

    #[error("ERR Bad snapshot: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<CuckooError> for Error {
    fn from(e: CuckooError) -> Self {
        match e {
            CuckooError::Full | CuckooError::CapacityExceeded => Error::FilterFull,
            CuckooError::TooLarge => Error::BadCapacity,
            e => Error::BadChunk(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

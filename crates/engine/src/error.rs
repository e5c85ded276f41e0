//! The engine's error surface.
//!
//! Recoverable user-input errors (`KeyIsEmpty`, `KeyNotFound`, the merge
//! preconditions) return without side effects; IO and corruption errors
//! propagate after the engine has been left in a consistent state.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Record-level failure: corruption (`InvalidCrc`, `InvalidSize`) or an
    /// unexpected end-of-log surfaced outside a scan.
    #[error(transparent)]
    Record(#[from] datafile::RecordError),

    #[error("failed to update index: {0}")]
    Index(#[from] index::IndexError),

    #[error("invalid configuration: {0}")]
    Config(&'static str),

    #[error("the key is empty")]
    KeyIsEmpty,

    #[error("key not found in database")]
    KeyNotFound,

    #[error("data file is not found")]
    DataFileNotFound,

    #[error("the database directory maybe corrupted")]
    DataDirectoryCorrupted,

    #[error("failed to update index")]
    IndexUpdateFailed,

    #[error("exceed the max batch num")]
    ExceedMaxBatchNum,

    #[error("merge is in progress, try again later")]
    MergeInProgress,

    #[error("the merge ratio does not reach the configured threshold")]
    MergeRatioUnreached,

    #[error("not enough disk space for merge")]
    NoEnoughSpaceForMerge,

    #[error("database directory is used by another process")]
    DatabaseInUse,
}

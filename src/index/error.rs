use std::path::PathBuf;

use crate::mztab::MzTabError;

/// Errors that can occur while building, opening or querying an index
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from the Arrow library
    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    /// Error from the Parquet library
    #[error("Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),

    /// Manifest could not be (de)serialized
    #[error("manifest error: {0}")]
    ManifestError(#[from] serde_json::Error),

    /// Source file could not be read or parsed (under the abort policy)
    #[error(transparent)]
    Source(#[from] MzTabError),

    /// Build target is a non-empty store and overwrite was not requested
    #[error("index already exists at {0} (use overwrite to rebuild)")]
    AlreadyExists(PathBuf),

    /// The store's lock file exists: another build is running, or an
    /// interrupted one left it behind
    #[error(
        "lock file {0} exists: another build is writing this index, or an interrupted \
         build left it behind (delete the lock file to rebuild)"
    )]
    Locked(PathBuf),

    /// Overwrite was requested, but the directory holds files that are not
    /// part of an index
    #[error("refusing to overwrite {path}: {entry} is not part of an index")]
    NotAnIndex {
        /// Requested store location
        path: PathBuf,
        /// First entry that does not belong to an index
        entry: PathBuf,
    },

    /// No store at the given location
    #[error("no index found at {0}")]
    NotFound(PathBuf),

    /// Store exists but has no manifest (interrupted build)
    #[error("index at {0} is incomplete (no manifest); rebuild it")]
    Incomplete(PathBuf),

    /// Store was written by an incompatible engine or format version
    #[error("incompatible index: found {found}, expected {expected}")]
    Incompatible {
        /// Engine and version recorded in the store
        found: String,
        /// Engine and version this build reads
        expected: String,
    },

    /// Required column missing from an index table
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// Index table content is not what this engine writes
    #[error("invalid index table: {0}")]
    InvalidFormat(String),

    /// Lookup thread pool could not be created
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

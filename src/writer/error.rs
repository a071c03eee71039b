/// Errors that can occur during writing
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from the Arrow library during array operations
    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    /// Error from the Parquet library during file writing
    #[error("Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),

    /// Invalid data provided to the writer
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Partition field that the record shape does not expose
    #[error("cannot partition {kind} output by unknown field '{field}'")]
    UnknownPartitionField {
        /// Requested field
        field: String,
        /// Record kind being written
        kind: &'static str,
    },

    /// Destination already holds an output
    #[error("output already exists: {0}")]
    AlreadyExists(std::path::PathBuf),
}

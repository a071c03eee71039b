use crate::index::IndexError;
use crate::loaders::UnresolvedSampleError;

/// Errors that can occur during the join-transform pass
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Reading the index failed
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// A record references a run or channel absent from the sample sheet
    #[error(transparent)]
    UnresolvedSample(#[from] UnresolvedSampleError),
}

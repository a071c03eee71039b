use crate::aggregate::AggregateError;
use crate::index::IndexError;
use crate::loaders::LoaderError;
use crate::mztab::MzTabError;
use crate::transform::TransformError;
use crate::writer::WriterError;

/// Errors that can occur during conversion, tagged by pipeline stage
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// The identification file could not be read
    #[error("[read] {0}")]
    Read(MzTabError),

    /// Index lifecycle or storage failure
    #[error("[index] {0}")]
    Index(IndexError),

    /// The quantification table could not be loaded
    #[error("[load-quant] {0}")]
    LoadQuant(LoaderError),

    /// The sample sheet could not be loaded
    #[error("[load-samples] {0}")]
    LoadSamples(LoaderError),

    /// Join or filtering failure, including unresolved samples
    #[error("[transform] {0}")]
    Transform(#[from] TransformError),

    /// Protein-level aggregation failure
    #[error("[aggregate] {0}")]
    Aggregate(#[from] AggregateError),

    /// Output could not be written
    #[error("[write] {0}")]
    Write(#[from] WriterError),

    /// Unusable conversion settings
    #[error("[config] {0}")]
    Config(String),

    /// Stopped between batches on request
    #[error("[{stage}] conversion cancelled")]
    Cancelled {
        /// Stage that observed the request
        stage: &'static str,
    },
}

impl ConversionError {
    /// Name of the pipeline stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            ConversionError::Read(_) => "read",
            ConversionError::Index(_) => "index",
            ConversionError::LoadQuant(_) => "load-quant",
            ConversionError::LoadSamples(_) => "load-samples",
            ConversionError::Transform(_) => "transform",
            ConversionError::Aggregate(_) => "aggregate",
            ConversionError::Write(_) => "write",
            ConversionError::Config(_) => "config",
            ConversionError::Cancelled { stage } => *stage,
        }
    }

    /// Whether the failure is a row-level parse problem that a skip policy
    /// would have tolerated
    pub fn is_recoverable(&self) -> bool {
        match self {
            ConversionError::Read(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

impl From<IndexError> for ConversionError {
    fn from(error: IndexError) -> Self {
        match error {
            IndexError::Source(e) => ConversionError::Read(e),
            other => ConversionError::Index(other),
        }
    }
}

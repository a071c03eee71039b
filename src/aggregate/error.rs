use crate::loaders::UnresolvedSampleError;

/// Errors that can occur during protein-level aggregation
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// Unusable configuration
    #[error("invalid aggregation config: {0}")]
    InvalidConfig(String),

    /// iBAQ requested without a theoretical peptide counter
    #[error("iBAQ is enabled but no theoretical peptide counter was supplied")]
    MissingPeptideCounter,

    /// Record reached the aggregator without a resolved sample
    #[error("record {psm_id} has no resolved sample")]
    MissingSample {
        /// PSM identifier of the record
        psm_id: String,
    },

    /// A quant entry's channel is not a sample of its run
    #[error(transparent)]
    UnresolvedSample(#[from] UnresolvedSampleError),

    /// I/O error reading a protein database
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Protein database content could not be parsed
    #[error("invalid FASTA at line {line}: {reason}")]
    InvalidFasta {
        /// 1-based line number
        line: u64,
        /// What was wrong
        reason: String,
    },
}

use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregationConfig, DigestParameters, QuantMode};
use crate::index::IndexConfig;
use crate::mztab::{IdentificationRecord, ParsePolicy};
use crate::transform::{
    AcceptAll, ConfidencePolicy, PepCutoff, QValueCutoff, ScoreCutoff, ScoreDirection,
};
use crate::writer::WriterConfig;

/// Confidence filter applied before records reach an output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceThreshold {
    /// Keep `q_value <= max`
    QValue(f64),
    /// Keep `posterior_error_probability <= max`
    Pep(f64),
    /// Keep search engine scores on the good side of a threshold
    Score {
        /// Threshold value
        threshold: f64,
        /// Which side is kept
        direction: ScoreDirection,
    },
    /// Keep everything
    None,
}

impl Default for ConfidenceThreshold {
    fn default() -> Self {
        ConfidenceThreshold::QValue(0.01)
    }
}

impl ConfidenceThreshold {
    /// Policy object for the threshold
    pub fn to_policy(self) -> Box<dyn ConfidencePolicy> {
        match self {
            ConfidenceThreshold::QValue(max) => Box::new(QValueCutoff::new(max)),
            ConfidenceThreshold::Pep(max) => Box::new(PepCutoff::new(max)),
            ConfidenceThreshold::Score {
                threshold,
                direction,
            } => Box::new(ScoreCutoff {
                threshold,
                direction,
                keep_missing: false,
            }),
            ConfidenceThreshold::None => Box::new(AcceptAll),
        }
    }
}

/// A confidence policy plus decoy handling
pub(crate) struct ConversionPolicy {
    inner: Box<dyn ConfidencePolicy>,
    include_decoys: bool,
}

impl ConversionPolicy {
    pub(crate) fn new(inner: Box<dyn ConfidencePolicy>, include_decoys: bool) -> Self {
        Self {
            inner,
            include_decoys,
        }
    }
}

impl ConfidencePolicy for ConversionPolicy {
    fn accepts(&self, record: &IdentificationRecord) -> bool {
        (self.include_decoys || !record.is_decoy) && self.inner.accepts(record)
    }

    fn describe(&self) -> String {
        if self.include_decoys {
            format!("{}, decoys kept", self.inner.describe())
        } else {
            format!("{}, decoys dropped", self.inner.describe())
        }
    }
}

/// Configuration for mzTab to QPX conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Records per transform batch
    pub batch_size: usize,

    /// Output fields to partition by; empty writes one file
    pub partition_fields: Vec<String>,

    /// Prefix of output file names
    pub output_prefix: String,

    /// Malformed mzTab rows: abort or skip
    pub parse_policy: ParsePolicy,

    /// Confidence filter
    pub confidence: ConfidenceThreshold,

    /// Keep decoy matches in the outputs
    pub include_decoys: bool,

    /// Label-free or labeled quantification
    pub quant_mode: QuantMode,

    /// Index resource limits
    pub index: IndexConfig,

    /// Output file settings
    pub writer: WriterConfig,

    /// Protein-level intensities
    pub aggregation: AggregationConfig,

    /// In-silico digestion for iBAQ
    pub digest: DigestParameters,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            partition_fields: Vec::new(),
            output_prefix: "qpx".to_string(),
            parse_policy: ParsePolicy::Abort,
            confidence: ConfidenceThreshold::default(),
            include_decoys: false,
            quant_mode: QuantMode::LabelFree,
            index: IndexConfig::default(),
            writer: WriterConfig::default(),
            aggregation: AggregationConfig::default(),
            digest: DigestParameters::default(),
        }
    }
}

impl ConversionConfig {
    /// Defaults for a quantification mode (labeled runs disable iBAQ)
    pub fn for_mode(mode: QuantMode) -> Self {
        Self {
            quant_mode: mode,
            aggregation: AggregationConfig::for_mode(mode),
            ..Self::default()
        }
    }

    /// Configuration optimized for maximum compression (slower conversion)
    pub fn max_compression() -> Self {
        Self {
            writer: WriterConfig::max_compression(),
            ..Self::default()
        }
    }

    /// Configuration optimized for fast conversion (larger files)
    pub fn fast_write() -> Self {
        Self {
            writer: WriterConfig::fast_write(),
            batch_size: 50_000,
            ..Self::default()
        }
    }

    /// Small batches and a single index thread
    pub fn low_memory() -> Self {
        Self {
            batch_size: 1_000,
            index: IndexConfig::low_memory(),
            writer: WriterConfig {
                flush_rows: 1_024,
                max_open_partitions: 16,
                ..WriterConfig::default()
            },
            ..Self::default()
        }
    }

    /// Balanced configuration (default)
    pub fn balanced() -> Self {
        Self::default()
    }

    pub(crate) fn policy(&self) -> ConversionPolicy {
        ConversionPolicy::new(self.confidence.to_policy(), self.include_decoys)
    }
}

use serde::{Deserialize, Serialize};

use super::AggregateError;

/// Quantification strategy of the experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuantMode {
    /// One sample per run
    #[default]
    LabelFree,
    /// Isobaric or isotopic labels: several samples (channels) per run
    Labeled,
}

impl QuantMode {
    /// Name used in file metadata
    pub fn as_str(self) -> &'static str {
        match self {
            QuantMode::LabelFree => "label-free",
            QuantMode::Labeled => "labeled",
        }
    }
}

/// Which protein-level intensities to compute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Number of most intense peptides averaged for TopN
    pub topn: usize,
    /// Compute TopN intensity
    pub topn_enabled: bool,
    /// Compute iBAQ intensity (needs a theoretical peptide counter)
    pub ibaq_enabled: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            topn: 3,
            topn_enabled: true,
            ibaq_enabled: true,
        }
    }
}

impl AggregationConfig {
    /// Conventional settings for a quantification mode.
    ///
    /// Labeled runs disable iBAQ: channel intensities are not comparable as
    /// absolute abundances.
    pub fn for_mode(mode: QuantMode) -> Self {
        match mode {
            QuantMode::LabelFree => Self::default(),
            QuantMode::Labeled => Self {
                ibaq_enabled: false,
                ..Self::default()
            },
        }
    }

    /// Reject settings that cannot produce a value
    pub fn validate(&self) -> Result<(), AggregateError> {
        if self.topn_enabled && self.topn == 0 {
            return Err(AggregateError::InvalidConfig(
                "topn must be at least 1".to_string(),
            ));
        }
        self.topn_label()?;
        Ok(())
    }

    /// `topn` as stored in the protein group output
    pub(crate) fn topn_label(&self) -> Result<u32, AggregateError> {
        u32::try_from(self.topn).map_err(|_| {
            AggregateError::InvalidConfig(format!(
                "topn {} exceeds the largest storable value {}",
                self.topn,
                u32::MAX
            ))
        })
    }
}

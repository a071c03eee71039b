use std::sync::Arc;

use crate::loaders::{Intensity, QuantEntry, Sample, SampleDescriptor};
use crate::mztab::IdentificationRecord;

/// Sample side of a join
#[derive(Debug, Clone, PartialEq)]
pub enum SampleMatch {
    /// Run resolved against the sample sheet
    Resolved(Arc<SampleDescriptor>),
    /// No sample sheet was supplied for this conversion
    Unmatched,
}

impl SampleMatch {
    /// The descriptor, when resolved
    pub fn descriptor(&self) -> Option<&SampleDescriptor> {
        match self {
            SampleMatch::Resolved(descriptor) => Some(descriptor),
            SampleMatch::Unmatched => None,
        }
    }
}

/// An identification record joined with its quantification and sample data.
///
/// Lives only for the batch that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedFeatureRecord {
    /// Source identification
    pub identification: IdentificationRecord,
    /// Matching quantification entries, in table order (possibly none)
    pub quant: Vec<QuantEntry>,
    /// Resolved sample descriptor
    pub sample: SampleMatch,
}

impl UnifiedFeatureRecord {
    /// Summed intensity over all present quant entries; missing if none is present
    pub fn intensity(&self) -> Intensity {
        let mut total = None;
        for entry in &self.quant {
            if let Intensity::Value(v) = entry.intensity {
                *total.get_or_insert(0.0) += v;
            }
        }
        Intensity::from_option(total)
    }

    /// Whether any quantification entry matched
    pub fn has_quant(&self) -> bool {
        !self.quant.is_empty()
    }

    /// Sample a quant entry belongs to
    pub fn sample_for(&self, entry: &QuantEntry) -> Option<&Sample> {
        self.sample
            .descriptor()?
            .sample_for_channel(entry.channel.as_deref())
    }

    /// Sample of a single-sample run
    pub fn single_sample(&self) -> Option<&Sample> {
        self.sample.descriptor()?.single_sample()
    }
}

use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::index::{Index, TableScan};
use crate::loaders::{QuantEntry, QuantMap, SampleDescriptor, SampleMap, UnresolvedSampleError};
use crate::mztab::IdentificationRecord;

use super::policy::ConfidencePolicy;
use super::record::{SampleMatch, UnifiedFeatureRecord};
use super::TransformError;

/// Counters for one transform pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformStats {
    /// Identification records read from the index
    pub records_in: u64,
    /// Records dropped by the confidence policy
    pub records_filtered: u64,
    /// Unified records emitted
    pub records_out: u64,
    /// Emitted records with no matching quant entry
    pub records_without_quant: u64,
    /// Non-empty batches emitted
    pub batches: u64,
}

impl fmt::Display for TransformStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records in, {} filtered, {} out ({} without quantification) in {} batches",
            self.records_in,
            self.records_filtered,
            self.records_out,
            self.records_without_quant,
            self.batches
        )
    }
}

/// Streaming join of the index scan against the loaders' maps.
///
/// Yields batches of [`UnifiedFeatureRecord`] in index insertion order. Every
/// record that passes the policy is emitted exactly once, with or without
/// quantification. After the first error the iterator is exhausted.
pub struct JoinTransform<'a> {
    scan: TableScan<IdentificationRecord>,
    quant: &'a QuantMap,
    samples: Option<&'a SampleMap>,
    policy: &'a dyn ConfidencePolicy,
    stats: TransformStats,
    failed: bool,
}

impl JoinTransform<'_> {
    /// Counters so far
    pub fn stats(&self) -> &TransformStats {
        &self.stats
    }

    fn join(
        &mut self,
        batch: Vec<IdentificationRecord>,
    ) -> Result<Vec<UnifiedFeatureRecord>, TransformError> {
        let mut out = Vec::with_capacity(batch.len());
        for record in batch {
            self.stats.records_in += 1;
            if !self.policy.accepts(&record) {
                self.stats.records_filtered += 1;
                continue;
            }

            let quant = self.quant.lookup(&record).to_vec();
            if quant.is_empty() {
                self.stats.records_without_quant += 1;
            }

            let sample = match self.samples {
                Some(samples) => {
                    let descriptor = samples.resolve(record.run())?;
                    check_channels(descriptor, &quant)?;
                    SampleMatch::Resolved(Arc::clone(descriptor))
                }
                None => SampleMatch::Unmatched,
            };

            out.push(UnifiedFeatureRecord {
                identification: record,
                quant,
                sample,
            });
        }
        self.stats.records_out += out.len() as u64;
        Ok(out)
    }
}

/// Every quant entry of a multiplexed run must name a channel the sheet describes
fn check_channels(
    descriptor: &SampleDescriptor,
    quant: &[QuantEntry],
) -> Result<(), UnresolvedSampleError> {
    if !descriptor.is_multiplexed() {
        return Ok(());
    }
    for entry in quant {
        if descriptor.sample_for_channel(entry.channel.as_deref()).is_none() {
            return Err(UnresolvedSampleError {
                run: descriptor.run.clone(),
                channel: Some(entry.channel.clone().unwrap_or_default()),
            });
        }
    }
    Ok(())
}

impl Iterator for JoinTransform<'_> {
    type Item = Result<Vec<UnifiedFeatureRecord>, TransformError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let batch = match self.scan.next()? {
                Ok(batch) => batch,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            };
            match self.join(batch) {
                Ok(out) if out.is_empty() => continue,
                Ok(out) => {
                    self.stats.batches += 1;
                    debug!("Transform batch {}: {} records", self.stats.batches, out.len());
                    return Some(Ok(out));
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Start a join-transform pass over `index`.
///
/// Batches hold at most `batch_size` records. When `samples` is `None` every
/// record is emitted with [`SampleMatch::Unmatched`]; otherwise a run absent
/// from the sheet fails with [`TransformError::UnresolvedSample`].
pub fn transform<'a>(
    index: &Index,
    quant: &'a QuantMap,
    samples: Option<&'a SampleMap>,
    batch_size: usize,
    policy: &'a dyn ConfidencePolicy,
) -> Result<JoinTransform<'a>, TransformError> {
    debug!("Transform with {}, batch size {}", policy.describe(), batch_size);
    Ok(JoinTransform {
        scan: index.scan_with_batch_size(batch_size)?,
        quant,
        samples,
        policy,
        stats: TransformStats::default(),
        failed: false,
    })
}

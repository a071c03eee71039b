use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::loaders::{Intensity, Sample, UnresolvedSampleError};
use crate::transform::UnifiedFeatureRecord;

use super::{AggregateError, AggregationConfig, QuantMode, TheoreticalPeptideCounter};

/// Protein-level intensities for one (protein group, sample) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProteinGroupAggregate {
    /// Normalized group key (`;`-joined sorted accessions)
    pub protein_group: String,
    /// Accessions of the group, sorted
    pub protein_accessions: Vec<String>,
    /// Description of the lead accession, when the source has one
    pub description: Option<String>,
    /// Sample accession
    pub sample_accession: String,
    /// Condition of the sample
    pub condition: Option<String>,
    /// Biological replicate of the sample
    pub biological_replicate: Option<String>,
    /// Technical replicate of the sample
    pub technical_replicate: Option<String>,
    /// Distinct peptides observed for the pair
    pub peptide_count: u32,
    /// Distinct peptides with a measured intensity
    pub quantified_peptide_count: u32,
    /// Mean of the top N peptide intensities; `None` when TopN is disabled
    pub topn_intensity: Option<Intensity>,
    /// Total intensity over theoretical peptide count; `None` when iBAQ is disabled
    pub ibaq_intensity: Option<Intensity>,
    /// Sum of all measured peptide intensities
    pub total_intensity: Intensity,
    /// Theoretical peptide count used for iBAQ
    pub theoretical_peptides: Option<u32>,
    /// N used for TopN
    pub topn: u32,
}

#[derive(Debug, Default)]
struct PeptideState {
    /// Quant entries by id, so PSMs sharing a quant key count once
    entries: BTreeMap<u64, Intensity>,
}

impl PeptideState {
    fn intensity(&self) -> Intensity {
        let mut total = None;
        for intensity in self.entries.values() {
            if let Intensity::Value(v) = intensity {
                *total.get_or_insert(0.0) += v;
            }
        }
        Intensity::from_option(total)
    }
}

#[derive(Debug)]
struct GroupState {
    protein_group: String,
    sample: Sample,
    peptides: BTreeMap<String, PeptideState>,
}

/// Incremental protein-group aggregation.
///
/// Records are pushed batch by batch in transform order; [`finish`](Self::finish)
/// emits one aggregate per (protein group, sample) pair in first-seen order.
pub struct Aggregator<'a> {
    config: AggregationConfig,
    topn: u32,
    mode: QuantMode,
    counter: Option<&'a dyn TheoreticalPeptideCounter>,
    descriptions: HashMap<String, String>,
    groups: Vec<GroupState>,
    slots: HashMap<(String, String), usize>,
}

impl<'a> Aggregator<'a> {
    /// Create an aggregator; iBAQ requires `counter`
    pub fn new(
        config: AggregationConfig,
        mode: QuantMode,
        counter: Option<&'a dyn TheoreticalPeptideCounter>,
    ) -> Result<Self, AggregateError> {
        config.validate()?;
        let topn = config.topn_label()?;
        if config.ibaq_enabled && counter.is_none() {
            return Err(AggregateError::MissingPeptideCounter);
        }
        if mode == QuantMode::Labeled && config.ibaq_enabled {
            debug!("iBAQ enabled for labeled quantification");
        }
        Ok(Self {
            config,
            topn,
            mode,
            counter,
            descriptions: HashMap::new(),
            groups: Vec::new(),
            slots: HashMap::new(),
        })
    }

    /// Protein descriptions attached to the output, by accession
    pub fn with_descriptions(mut self, descriptions: HashMap<String, String>) -> Self {
        self.descriptions = descriptions;
        self
    }

    /// Quantification mode
    pub fn mode(&self) -> QuantMode {
        self.mode
    }

    /// Add one unified record
    pub fn push(&mut self, record: &UnifiedFeatureRecord) -> Result<(), AggregateError> {
        let identification = &record.identification;
        let descriptor = record
            .sample
            .descriptor()
            .ok_or_else(|| AggregateError::MissingSample {
                psm_id: identification.psm_id.clone(),
            })?;

        let group = identification.protein_group();
        if group.is_empty() {
            debug!("PSM {} has no protein accession; not aggregated", identification.psm_id);
            return Ok(());
        }

        if record.quant.is_empty() {
            // Observed but unquantified: counts as a peptide with no intensity
            for sample in &descriptor.channels {
                self.peptide(&group, sample, &identification.sequence);
            }
            return Ok(());
        }

        for entry in &record.quant {
            let sample = descriptor
                .sample_for_channel(entry.channel.as_deref())
                .ok_or_else(|| UnresolvedSampleError {
                    run: descriptor.run.clone(),
                    channel: entry.channel.clone(),
                })?;
            self.peptide(&group, sample, &identification.sequence)
                .entries
                .insert(entry.entry_id, entry.intensity);
        }
        Ok(())
    }

    /// Add a batch of unified records
    pub fn push_batch(&mut self, records: &[UnifiedFeatureRecord]) -> Result<(), AggregateError> {
        records.iter().try_for_each(|r| self.push(r))
    }

    fn peptide(&mut self, group: &str, sample: &Sample, sequence: &str) -> &mut PeptideState {
        let key = (group.to_string(), sample.sample_accession.clone());
        let slot = match self.slots.get(&key) {
            Some(&slot) => slot,
            None => {
                self.groups.push(GroupState {
                    protein_group: key.0.clone(),
                    sample: sample.clone(),
                    peptides: BTreeMap::new(),
                });
                self.slots.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[slot]
            .peptides
            .entry(sequence.to_string())
            .or_default()
    }

    /// Number of (protein group, sample) pairs seen so far
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Compute the aggregates
    pub fn finish(self) -> Vec<ProteinGroupAggregate> {
        let mut out = Vec::with_capacity(self.groups.len());
        for group in self.groups {
            if group.peptides.is_empty() {
                continue;
            }
            let peptides: Vec<(&str, Intensity)> = group
                .peptides
                .iter()
                .map(|(sequence, state)| (sequence.as_str(), state.intensity()))
                .collect();

            let accessions: Vec<String> = group
                .protein_group
                .split(';')
                .map(str::to_string)
                .collect();
            let lead = accessions.first().map(String::as_str).unwrap_or("");

            let total_intensity = total_intensity(&peptides);
            let topn_intensity = self
                .config
                .topn_enabled
                .then(|| topn_intensity(&peptides, self.config.topn));

            let mut theoretical_peptides = None;
            let ibaq_intensity = match (self.config.ibaq_enabled, self.counter) {
                (true, Some(counter)) => match counter.theoretical_peptide_count(lead) {
                    Some(count) => {
                        theoretical_peptides = Some(count.get());
                        Some(Intensity::from_option(
                            total_intensity.value().map(|t| t / count.get() as f64),
                        ))
                    }
                    None => {
                        warn!("No theoretical peptide count for {}; iBAQ is missing", lead);
                        Some(Intensity::Missing)
                    }
                },
                _ => None,
            };

            out.push(ProteinGroupAggregate {
                description: self.descriptions.get(lead).cloned(),
                protein_accessions: accessions.clone(),
                protein_group: group.protein_group.clone(),
                sample_accession: group.sample.sample_accession.clone(),
                condition: group.sample.condition.clone(),
                biological_replicate: group.sample.biological_replicate.clone(),
                technical_replicate: group.sample.technical_replicate.clone(),
                peptide_count: peptides.len() as u32,
                quantified_peptide_count: peptides.iter().filter(|(_, i)| !i.is_missing()).count()
                    as u32,
                topn_intensity,
                ibaq_intensity,
                total_intensity,
                theoretical_peptides,
                topn: self.topn,
            });
        }
        out
    }
}

/// Mean of the `n` highest measured intensities.
///
/// Sorted descending, ties broken by ascending peptide sequence. Fewer than
/// `n` measured peptides average what exists; none at all is missing.
pub fn topn_intensity(peptides: &[(&str, Intensity)], n: usize) -> Intensity {
    let mut measured: Vec<(&str, f64)> = peptides
        .iter()
        .filter_map(|(sequence, intensity)| intensity.value().map(|v| (*sequence, v)))
        .collect();
    if measured.is_empty() || n == 0 {
        return Intensity::Missing;
    }
    measured.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let top = &measured[..n.min(measured.len())];
    Intensity::Value(top.iter().map(|(_, v)| v).sum::<f64>() / top.len() as f64)
}

/// Sum of measured intensities; missing when none is measured
pub fn total_intensity(peptides: &[(&str, Intensity)]) -> Intensity {
    let values: Vec<f64> = peptides.iter().filter_map(|(_, i)| i.value()).collect();
    if values.is_empty() {
        Intensity::Missing
    } else {
        Intensity::Value(values.iter().sum())
    }
}

/// Aggregate a complete set of unified records
pub fn aggregate(
    records: impl IntoIterator<Item = UnifiedFeatureRecord>,
    mode: QuantMode,
    config: AggregationConfig,
    counter: Option<&dyn TheoreticalPeptideCounter>,
) -> Result<Vec<ProteinGroupAggregate>, AggregateError> {
    let mut aggregator = Aggregator::new(config, mode, counter)?;
    for record in records {
        aggregator.push(&record)?;
    }
    Ok(aggregator.finish())
}

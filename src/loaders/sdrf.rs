//! SDRF sample sheet loader

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::mztab::run_identifier_from_location;

use super::{LoaderError, UnresolvedSampleError};

/// SDRF-Proteomics column names used for the experimental design
///
/// Reference: <https://github.com/bigbio/proteomics-sample-metadata>
pub mod columns {
    /// Sample accession
    pub const SOURCE_NAME: &str = "source name";
    /// Raw file name
    pub const DATA_FILE: &str = "comment[data file]";
    /// Biological replicate
    pub const BIO_REPLICATE: &str = "characteristics[biological replicate]";
    /// Technical replicate
    pub const TECH_REPLICATE: &str = "comment[technical replicate]";
    /// Fraction
    pub const FRACTION: &str = "comment[fraction identifier]";
    /// Channel label (`label free sample`, `TMT126`, ...)
    pub const LABEL: &str = "comment[label]";
    /// Prefix of condition columns
    pub const FACTOR_VALUE_PREFIX: &str = "factor value[";
}

/// One sample measured in a run (one per channel for labeled runs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Sample accession (`source name`)
    pub sample_accession: String,
    /// Channel label
    pub label: Option<String>,
    /// Factor values joined with `|`, in column order
    pub condition: Option<String>,
    /// Biological replicate label
    pub biological_replicate: Option<String>,
    /// Technical replicate label
    pub technical_replicate: Option<String>,
    /// Fraction identifier
    pub fraction: Option<String>,
}

/// Everything the sample sheet says about one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDescriptor {
    /// Run identifier (data file stem)
    pub run: String,
    /// Data file as written in the sheet
    pub data_file: String,
    /// Samples measured in this run, in sheet order
    pub channels: Vec<Sample>,
}

impl SampleDescriptor {
    /// Whether the run multiplexes several samples
    pub fn is_multiplexed(&self) -> bool {
        self.channels.len() > 1
    }

    /// The sample for a channel label.
    ///
    /// Single-sample runs always return their sample; multiplexed runs match
    /// the label case-insensitively.
    pub fn sample_for_channel(&self, channel: Option<&str>) -> Option<&Sample> {
        if self.channels.len() == 1 {
            return self.channels.first();
        }
        let channel = channel?;
        self.channels.iter().find(|s| {
            s.label
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(channel))
        })
    }

    /// The only sample of a single-sample run
    pub fn single_sample(&self) -> Option<&Sample> {
        match self.channels.as_slice() {
            [sample] => Some(sample),
            _ => None,
        }
    }
}

/// Sample descriptors keyed by run identifier
#[derive(Debug, Clone, Default)]
pub struct SampleMap {
    runs: HashMap<String, Arc<SampleDescriptor>>,
}

impl SampleMap {
    /// Load an SDRF sheet from a TSV file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoaderError> {
        let path = path.as_ref();
        let map = Self::from_reader(BufReader::new(File::open(path)?))?;
        info!("Loaded {} runs from sample sheet {}", map.len(), path.display());
        Ok(map)
    }

    /// Parse an SDRF sheet from a reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, LoaderError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|s| s.to_lowercase().trim().to_string())
            .collect();

        let find = |name: &str| headers.iter().position(|h| h == name);
        let source_name = find(columns::SOURCE_NAME)
            .ok_or_else(|| LoaderError::MissingColumn(columns::SOURCE_NAME.to_string()))?;
        let data_file = find(columns::DATA_FILE)
            .ok_or_else(|| LoaderError::MissingColumn(columns::DATA_FILE.to_string()))?;
        let bio_replicate = find(columns::BIO_REPLICATE);
        let tech_replicate = find(columns::TECH_REPLICATE);
        let fraction = find(columns::FRACTION);
        let label = find(columns::LABEL);
        let factors: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.starts_with(columns::FACTOR_VALUE_PREFIX))
            .map(|(i, _)| i)
            .collect();

        let mut descriptors: Vec<SampleDescriptor> = Vec::new();
        let mut by_run: HashMap<String, usize> = HashMap::new();

        for (row, record) in csv_reader.records().enumerate() {
            let record = record?;
            let line = row as u64 + 2;
            let value = |i: usize| {
                record
                    .get(i)
                    .map(str::trim)
                    .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("not available"))
            };
            let optional = |i: Option<usize>| i.and_then(value).map(str::to_string);

            let Some(file) = value(data_file) else {
                return Err(LoaderError::InvalidRow {
                    line,
                    reason: "empty data file".to_string(),
                });
            };
            let Some(accession) = value(source_name) else {
                return Err(LoaderError::InvalidRow {
                    line,
                    reason: "empty source name".to_string(),
                });
            };

            let condition: Vec<&str> = factors.iter().filter_map(|&i| value(i)).collect();
            let sample = Sample {
                sample_accession: accession.to_string(),
                label: optional(label),
                condition: (!condition.is_empty()).then(|| condition.join("|")),
                biological_replicate: optional(bio_replicate),
                technical_replicate: optional(tech_replicate),
                fraction: optional(fraction),
            };

            let run = run_identifier_from_location(file);
            let slot = *by_run.entry(run.clone()).or_insert_with(|| {
                descriptors.push(SampleDescriptor {
                    run: run.clone(),
                    data_file: file.to_string(),
                    channels: Vec::new(),
                });
                descriptors.len() - 1
            });

            let descriptor = &mut descriptors[slot];
            if descriptor.channels.iter().any(|s| s.label == sample.label) {
                return Err(LoaderError::DuplicateSample {
                    run,
                    label: sample.label.unwrap_or_default(),
                });
            }
            descriptor.channels.push(sample);
        }

        Ok(Self::from_descriptors(descriptors))
    }

    /// Build directly from descriptors
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = SampleDescriptor>) -> Self {
        let runs = descriptors
            .into_iter()
            .map(|d| (d.run.clone(), Arc::new(d)))
            .collect();
        Self { runs }
    }

    /// Resolve a run identifier to its descriptor
    pub fn resolve(&self, run: &str) -> Result<&Arc<SampleDescriptor>, UnresolvedSampleError> {
        self.runs.get(run).ok_or_else(|| UnresolvedSampleError {
            run: run.to_string(),
            channel: None,
        })
    }

    /// Number of runs
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether the sheet describes no runs
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Run identifiers, sorted
    pub fn runs(&self) -> Vec<&str> {
        let mut runs: Vec<&str> = self.runs.keys().map(String::as_str).collect();
        runs.sort_unstable();
        runs
    }
}

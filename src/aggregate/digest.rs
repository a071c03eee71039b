//! Theoretical peptide counts for iBAQ
//!
//! iBAQ divides a protein's summed intensity by the number of peptides the
//! protein could produce. Counts come from a [`TheoreticalPeptideCounter`];
//! [`FastaDigestCounter`] computes them by in-silico digestion of a FASTA
//! database.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufRead;
use std::num::NonZeroU32;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::mztab::open_maybe_gzip;

use super::AggregateError;

/// Source of theoretical observable peptide counts, always at least 1
pub trait TheoreticalPeptideCounter: Send + Sync {
    /// Count for a protein accession, or `None` if the protein is unknown
    fn theoretical_peptide_count(&self, accession: &str) -> Option<NonZeroU32>;
}

impl TheoreticalPeptideCounter for HashMap<String, NonZeroU32> {
    fn theoretical_peptide_count(&self, accession: &str) -> Option<NonZeroU32> {
        self.get(accession).copied()
    }
}

/// Cleavage rule: cut C-terminal to any residue in `cleave_at`, unless the
/// next residue is `restrict`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protease {
    /// Residues after which the chain is cut
    pub cleave_at: String,
    /// Residue that blocks cleavage when it follows a site
    pub restrict: Option<char>,
}

impl Protease {
    /// Trypsin: K/R, not before P
    pub fn trypsin() -> Self {
        Self {
            cleave_at: "KR".to_string(),
            restrict: Some('P'),
        }
    }

    /// Trypsin/P: K/R, including before P
    pub fn trypsin_p() -> Self {
        Self {
            cleave_at: "KR".to_string(),
            restrict: None,
        }
    }

    /// Lys-C: K, not before P
    pub fn lys_c() -> Self {
        Self {
            cleave_at: "K".to_string(),
            restrict: Some('P'),
        }
    }

    /// Look up a protease by name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "trypsin" => Some(Self::trypsin()),
            "trypsin/p" | "trypsin_p" => Some(Self::trypsin_p()),
            "lys-c" | "lysc" => Some(Self::lys_c()),
            _ => None,
        }
    }

    /// End offsets (exclusive) of the fragments of `sequence`
    fn cut_sites(&self, sequence: &[u8]) -> Vec<usize> {
        let mut sites = Vec::new();
        for (i, &residue) in sequence.iter().enumerate() {
            if !self.cleave_at.contains(residue as char) {
                continue;
            }
            let blocked = match (self.restrict, sequence.get(i + 1)) {
                (Some(r), Some(&next)) => next as char == r,
                _ => false,
            };
            if !blocked {
                sites.push(i + 1);
            }
        }
        if sites.last() != Some(&sequence.len()) {
            sites.push(sequence.len());
        }
        sites
    }
}

/// In-silico digestion settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestParameters {
    /// Cleavage rule
    pub protease: Protease,
    /// Missed cleavages allowed per peptide
    pub missed_cleavages: usize,
    /// Minimum peptide length (inclusive)
    pub min_length: usize,
    /// Maximum peptide length (inclusive)
    pub max_length: usize,
}

impl Default for DigestParameters {
    fn default() -> Self {
        Self {
            protease: Protease::trypsin(),
            missed_cleavages: 0,
            min_length: 7,
            max_length: 30,
        }
    }
}

impl DigestParameters {
    /// Distinct peptides of `sequence` within the length bounds
    pub fn digest<'s>(&self, sequence: &'s str) -> HashSet<&'s str> {
        let bytes = sequence.as_bytes();
        let mut starts = vec![0];
        starts.extend(self.protease.cut_sites(bytes));

        let mut peptides = HashSet::new();
        for i in 0..starts.len().saturating_sub(1) {
            for missed in 0..=self.missed_cleavages {
                let Some(&end) = starts.get(i + 1 + missed) else {
                    break;
                };
                let start = starts[i];
                let length = end - start;
                if (self.min_length..=self.max_length).contains(&length) {
                    peptides.insert(&sequence[start..end]);
                }
            }
        }
        peptides
    }
}

/// Theoretical peptide counts from a FASTA database
#[derive(Debug, Clone, Default)]
pub struct FastaDigestCounter {
    counts: HashMap<String, NonZeroU32>,
}

impl FastaDigestCounter {
    /// Digest every protein of a FASTA file (optionally gzip-compressed)
    pub fn from_fasta<P: AsRef<Path>>(
        path: P,
        params: &DigestParameters,
    ) -> Result<Self, AggregateError> {
        let path = path.as_ref();
        let reader = open_maybe_gzip(File::open(path)?)?;
        let counter = Self::from_reader(reader, params)?;
        info!(
            "Digested {} proteins from {}",
            counter.len(),
            path.display()
        );
        Ok(counter)
    }

    /// Digest every protein of a FASTA stream
    pub fn from_reader<R: BufRead>(
        reader: R,
        params: &DigestParameters,
    ) -> Result<Self, AggregateError> {
        let mut counter = Self::default();
        let mut header: Option<String> = None;
        let mut sequence = String::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if let Some(rest) = line.strip_prefix('>') {
                if let Some(previous) = header.take() {
                    counter.insert(&previous, &sequence, params);
                }
                sequence.clear();
                header = Some(rest.to_string());
            } else if !line.is_empty() {
                if header.is_none() {
                    return Err(AggregateError::InvalidFasta {
                        line: i as u64 + 1,
                        reason: "sequence before the first header".to_string(),
                    });
                }
                sequence.extend(line.chars().map(|c| c.to_ascii_uppercase()));
            }
        }
        if let Some(previous) = header {
            counter.insert(&previous, &sequence, params);
        }
        Ok(counter)
    }

    /// Digest (accession, sequence) pairs
    pub fn from_sequences<'s>(
        proteins: impl IntoIterator<Item = (&'s str, &'s str)>,
        params: &DigestParameters,
    ) -> Self {
        let mut counter = Self::default();
        for (accession, sequence) in proteins {
            counter.insert(accession, sequence, params);
        }
        counter
    }

    fn insert(&mut self, header: &str, sequence: &str, params: &DigestParameters) {
        let count = params.digest(sequence).len().clamp(1, u32::MAX as usize) as u32;
        let count = NonZeroU32::new(count).unwrap_or(NonZeroU32::MIN);

        let token = header.split_whitespace().next().unwrap_or(header);
        self.counts.insert(token.to_string(), count);
        // UniProt headers: db|ACCESSION|ENTRY_NAME
        if let Some(accession) = token.split('|').nth(1) {
            self.counts.insert(accession.to_string(), count);
        }
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether no protein was read
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl TheoreticalPeptideCounter for FastaDigestCounter {
    fn theoretical_peptide_count(&self, accession: &str) -> Option<NonZeroU32> {
        self.counts.get(accession).copied()
    }
}

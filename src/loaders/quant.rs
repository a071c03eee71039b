//! MSstats-style quantification table loader

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::mztab::{normalize_protein_group, run_identifier_from_location, IdentificationRecord};

use super::LoaderError;

/// An intensity that is either measured or explicitly missing.
///
/// Missing is never collapsed to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Intensity {
    /// Measured non-negative intensity
    Value(f64),
    /// No usable measurement
    Missing,
}

impl Intensity {
    /// Build from an optional value; negatives and NaN become missing
    pub fn from_option(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() && v >= 0.0 => Intensity::Value(v),
            _ => Intensity::Missing,
        }
    }

    /// The value, if present
    pub fn value(self) -> Option<f64> {
        match self {
            Intensity::Value(v) => Some(v),
            Intensity::Missing => None,
        }
    }

    /// Whether the intensity is missing
    pub fn is_missing(self) -> bool {
        matches!(self, Intensity::Missing)
    }
}

/// Column names of the MSstats input table
pub mod columns {
    /// Protein (group) name
    pub const PROTEIN: &str = "proteinname";
    /// Modified peptide sequence
    pub const PEPTIDE: &str = "peptidesequence";
    /// Precursor charge
    pub const CHARGE: &str = "precursorcharge";
    /// Intensity
    pub const INTENSITY: &str = "intensity";
    /// Raw file reference
    pub const REFERENCE: &str = "reference";
    /// Run label
    pub const RUN: &str = "run";
    /// TMT/iTRAQ channel
    pub const CHANNEL: &str = "channel";
    /// Label type (L/H for label-free/SILAC)
    pub const ISOTOPE_LABEL: &str = "isotopelabeltype";
    /// Condition
    pub const CONDITION: &str = "condition";
    /// Biological replicate
    pub const BIO_REPLICATE: &str = "bioreplicate";
}

/// Composite join key: (protein group, bare peptide, charge, run)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuantKey {
    /// Normalized protein group
    pub protein: String,
    /// Bare peptide sequence
    pub peptide: String,
    /// Precursor charge
    pub charge: i32,
    /// Run identifier
    pub run: String,
}

impl QuantKey {
    /// Key of an identification record
    pub fn for_record(record: &IdentificationRecord) -> Self {
        Self {
            protein: record.protein_group(),
            peptide: record.sequence.clone(),
            charge: record.charge,
            run: record.run().to_string(),
        }
    }
}

/// One row of the quantification table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantEntry {
    /// Row number in the source table, unique per entry
    pub entry_id: u64,
    /// Normalized protein group
    pub protein: String,
    /// Bare peptide sequence
    pub peptide: String,
    /// Peptide sequence as written in the table
    pub modified_peptide: String,
    /// Precursor charge
    pub charge: i32,
    /// Run identifier
    pub run: String,
    /// Channel label, for labeled experiments
    pub channel: Option<String>,
    /// Condition label
    pub condition: Option<String>,
    /// Biological replicate label
    pub biological_replicate: Option<String>,
    /// Measured intensity
    pub intensity: Intensity,
}

/// Quantification entries keyed by [`QuantKey`], in file order per key
#[derive(Debug, Clone, Default)]
pub struct QuantMap {
    entries: HashMap<QuantKey, Vec<QuantEntry>>,
    len: usize,
}

struct QuantColumns {
    protein: usize,
    peptide: usize,
    charge: usize,
    intensity: usize,
    run: usize,
    run_is_reference: bool,
    channel: Option<usize>,
    condition: Option<usize>,
    biological_replicate: Option<usize>,
}

impl QuantColumns {
    fn from_headers(headers: &[String]) -> Result<Self, LoaderError> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require =
            |name: &str| find(name).ok_or_else(|| LoaderError::MissingColumn(name.to_string()));

        let (run, run_is_reference) = match (find(columns::REFERENCE), find(columns::RUN)) {
            (Some(i), _) => (i, true),
            (None, Some(i)) => (i, false),
            (None, None) => return Err(LoaderError::MissingColumn(columns::REFERENCE.to_string())),
        };

        Ok(Self {
            protein: require(columns::PROTEIN)?,
            peptide: require(columns::PEPTIDE)?,
            charge: require(columns::CHARGE)?,
            intensity: require(columns::INTENSITY)?,
            run,
            run_is_reference,
            channel: find(columns::CHANNEL).or_else(|| find(columns::ISOTOPE_LABEL)),
            condition: find(columns::CONDITION),
            biological_replicate: find(columns::BIO_REPLICATE),
        })
    }
}

impl QuantMap {
    /// Empty map: every lookup misses
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a comma- or tab-delimited quantification table
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoaderError> {
        let path = path.as_ref();
        let map = Self::from_reader(BufReader::new(File::open(path)?))?;
        info!(
            "Loaded {} quantification entries ({} keys) from {}",
            map.len(),
            map.key_count(),
            path.display()
        );
        Ok(map)
    }

    /// Load from a reader; the delimiter is sniffed from the header line
    pub fn from_reader<R: BufRead>(mut reader: R) -> Result<Self, LoaderError> {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let delimiter = if header.matches('\t').count() >= header.matches(',').count() {
            b'\t'
        } else {
            b','
        };

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .has_headers(true)
            .from_reader(Cursor::new(header.into_bytes()).chain(reader));

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|s| s.trim().to_lowercase())
            .collect();
        let cols = QuantColumns::from_headers(&headers)?;

        let mut map = Self::default();
        for (row, record) in csv_reader.records().enumerate() {
            let record = record?;
            let line = row as u64 + 2;
            let field = |i: usize| record.get(i).map(str::trim).unwrap_or("");
            let optional = |i: Option<usize>| {
                i.map(field)
                    .filter(|v| !v.is_empty() && !is_na(v))
                    .map(str::to_string)
            };

            let modified_peptide = field(cols.peptide).to_string();
            let peptide = strip_peptide(&modified_peptide);
            if peptide.is_empty() {
                return Err(LoaderError::InvalidRow {
                    line,
                    reason: format!("peptide '{}' has no residues", modified_peptide),
                });
            }

            let charge_raw = field(cols.charge);
            let charge = charge_raw
                .parse::<f64>()
                .ok()
                .filter(|c| c.fract() == 0.0 && *c > 0.0)
                .map(|c| c as i32)
                .ok_or_else(|| LoaderError::InvalidRow {
                    line,
                    reason: format!("invalid charge '{}'", charge_raw),
                })?;

            let run_raw = field(cols.run);
            if run_raw.is_empty() {
                return Err(LoaderError::InvalidRow {
                    line,
                    reason: "empty run".to_string(),
                });
            }
            let run = if cols.run_is_reference {
                run_identifier_from_location(run_raw)
            } else {
                run_raw.to_string()
            };

            let intensity = parse_intensity(field(cols.intensity), line)?;

            let entry = QuantEntry {
                entry_id: row as u64,
                protein: normalize_protein_group([field(cols.protein)]),
                peptide,
                modified_peptide,
                charge,
                run,
                channel: optional(cols.channel),
                condition: optional(cols.condition),
                biological_replicate: optional(cols.biological_replicate),
                intensity,
            };
            map.insert(entry);
        }

        Ok(map)
    }

    /// Add an entry under its key
    pub fn insert(&mut self, entry: QuantEntry) {
        let key = QuantKey {
            protein: entry.protein.clone(),
            peptide: entry.peptide.clone(),
            charge: entry.charge,
            run: entry.run.clone(),
        };
        self.entries.entry(key).or_default().push(entry);
        self.len += 1;
    }

    /// Entries for a key, in file order
    pub fn get(&self, key: &QuantKey) -> &[QuantEntry] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entries matching an identification record
    pub fn lookup(&self, record: &IdentificationRecord) -> &[QuantEntry] {
        self.get(&QuantKey::for_record(record))
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct keys
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}

fn is_na(value: &str) -> bool {
    value.eq_ignore_ascii_case("na")
        || value.eq_ignore_ascii_case("nan")
        || value.eq_ignore_ascii_case("null")
}

fn parse_intensity(value: &str, line: u64) -> Result<Intensity, LoaderError> {
    if value.is_empty() || is_na(value) {
        return Ok(Intensity::Missing);
    }
    let parsed: f64 = value.parse().map_err(|_| LoaderError::InvalidRow {
        line,
        reason: format!("invalid intensity '{}'", value),
    })?;
    if parsed < 0.0 {
        warn!("Line {}: negative intensity {} treated as missing", line, parsed);
    }
    Ok(Intensity::from_option(Some(parsed)))
}

/// Strip modification annotations and flanking characters from a peptide.
///
/// `.(Acetyl)PEPM(Oxidation)TIDEK.`, `_PEPM[+15.99]TIDEK_` and `PEPMTIDEK`
/// all become `PEPMTIDEK`.
pub fn strip_peptide(peptide: &str) -> String {
    let mut depth = 0usize;
    let mut out = String::with_capacity(peptide.len());
    for c in peptide.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if depth == 0 && c.is_ascii_uppercase() => out.push(c),
            _ => {}
        }
    }
    out
}

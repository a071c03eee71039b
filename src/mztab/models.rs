use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference to the spectrum a PSM was identified from.
///
/// mzTab encodes this as `ms_run[n]:<native id>`; the `ms_run[n]` part is
/// resolved against the `MTD ms_run[n]-location` entries so that `run` holds
/// the run identifier (the file stem of the raw/mzML location).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpectrumRef {
    /// Run identifier, e.g. `"a05058"`
    pub run: String,
    /// Native spectrum identifier, e.g. `"controllerType=0 controllerNumber=1 scan=123"`
    pub native_id: String,
}

impl SpectrumRef {
    /// Create a new spectrum reference
    pub fn new(run: impl Into<String>, native_id: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            native_id: native_id.into(),
        }
    }

    /// Scan number extracted from the native id (`scan=`, `index=` or `spectrum=` token)
    pub fn scan(&self) -> Option<i64> {
        for token in self.native_id.split_whitespace() {
            for prefix in ["scan=", "index=", "spectrum="] {
                if let Some(value) = token.strip_prefix(prefix) {
                    if let Ok(scan) = value.parse() {
                        return Some(scan);
                    }
                }
            }
        }
        // Bare numeric native ids (MGF-style titles)
        self.native_id.trim().parse().ok()
    }

    /// Lookup key used by the index: `"{run}:{native_id}"`
    pub fn key(&self) -> String {
        format!("{}:{}", self.run, self.native_id)
    }
}

impl fmt::Display for SpectrumRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.run, self.native_id)
    }
}

/// A single residue modification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    /// 1-based positions; 0 is the N-terminus. Empty when the position is unknown.
    /// More than one position means the site is ambiguous.
    pub positions: Vec<u32>,
    /// Modification accession, e.g. `"UNIMOD:35"` or `"CHEMMOD:+15.9949"`
    pub accession: String,
    /// Monoisotopic mass delta in Daltons, when known
    pub mass_delta: Option<f64>,
}

impl Modification {
    /// First (or only) position of the modification
    pub fn position(&self) -> Option<u32> {
        self.positions.first().copied()
    }
}

/// Identification record: one peptide-spectrum match from the PSM section.
///
/// Rows mapping the same PSM to several proteins are merged by the indexer, so
/// `protein_accessions` may hold more than one accession.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentificationRecord {
    /// mzTab `PSM_ID`
    pub psm_id: String,
    /// Source spectrum
    pub spectrum_ref: SpectrumRef,
    /// Bare amino acid sequence (upper case, no modifications)
    pub sequence: String,
    /// Ordered list of modifications
    pub modifications: Vec<Modification>,
    /// Precursor charge (> 0)
    pub charge: i32,
    /// Retention time in seconds
    pub retention_time: Option<f64>,
    /// Theoretical precursor m/z
    pub calc_mass_to_charge: Option<f64>,
    /// Observed precursor m/z
    pub exp_mass_to_charge: Option<f64>,
    /// Protein accessions this peptide maps to, in file order
    pub protein_accessions: Vec<String>,
    /// Primary search engine score (`search_engine_score[1]`)
    pub search_engine_score: Option<f64>,
    /// PSM-level q-value in `[0, 1]`
    pub q_value: Option<f64>,
    /// Posterior error probability
    pub posterior_error_probability: Option<f64>,
    /// Whether the match is against a decoy sequence
    pub is_decoy: bool,
}

impl IdentificationRecord {
    /// Run identifier of the source spectrum
    pub fn run(&self) -> &str {
        &self.spectrum_ref.run
    }

    /// Protein group key: sorted, de-duplicated accessions joined by `;`
    pub fn protein_group(&self) -> String {
        normalize_protein_group(self.protein_accessions.iter().map(String::as_str))
    }

    /// Sequence with bracketed modification accessions, e.g. `"PEPM[UNIMOD:35]TIDE"`
    ///
    /// N-terminal modifications (position 0) are written before the first
    /// residue followed by `-`; unlocalized ones are omitted.
    pub fn peptidoform(&self) -> String {
        let mut by_position: Vec<Vec<&str>> = vec![Vec::new(); self.sequence.len() + 2];
        for modification in &self.modifications {
            if modification.positions.len() == 1 {
                let position = (modification.positions[0] as usize).min(self.sequence.len() + 1);
                by_position[position].push(&modification.accession);
            }
        }

        let mut out = String::with_capacity(self.sequence.len() + 16);
        for accession in &by_position[0] {
            out.push('[');
            out.push_str(accession);
            out.push(']');
        }
        if !by_position[0].is_empty() {
            out.push('-');
        }
        for (i, residue) in self.sequence.chars().enumerate() {
            out.push(residue);
            for accession in &by_position[i + 1] {
                out.push('[');
                out.push_str(accession);
                out.push(']');
            }
        }
        let c_term = &by_position[self.sequence.len() + 1];
        if !c_term.is_empty() {
            out.push('-');
            for accession in c_term {
                out.push('[');
                out.push_str(accession);
                out.push(']');
            }
        }
        out
    }

    /// Check the record invariants: non-empty sequence, positive charge, q-value in `[0, 1]`
    pub fn validate(&self) -> Result<(), String> {
        if self.sequence.is_empty() {
            return Err("peptide sequence is empty".to_string());
        }
        if self.charge <= 0 {
            return Err(format!("charge must be positive, got {}", self.charge));
        }
        if let Some(q) = self.q_value {
            if !(0.0..=1.0).contains(&q) {
                return Err(format!("q-value {} is outside [0, 1]", q));
            }
        }
        Ok(())
    }
}

/// Row of the protein section (`PRT`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProteinRow {
    /// Protein accession
    pub accession: String,
    /// Free-text description
    pub description: Option<String>,
    /// Accessions indistinguishable from this one
    pub ambiguity_members: Vec<String>,
    /// Best search engine score for the protein
    pub best_search_engine_score: Option<f64>,
}

/// Row of the peptide section (`PEP`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeptideRow {
    /// Bare amino acid sequence
    pub sequence: String,
    /// Protein accessions
    pub protein_accessions: Vec<String>,
    /// Modifications
    pub modifications: Vec<Modification>,
    /// Precursor charge
    pub charge: Option<i32>,
    /// Retention time in seconds
    pub retention_time: Option<f64>,
    /// Precursor m/z
    pub mass_to_charge: Option<f64>,
    /// Best search engine score
    pub best_search_engine_score: Option<f64>,
}

/// A classified logical line of an mzTab file
#[derive(Debug, Clone, PartialEq)]
pub enum MzTabLine {
    /// `MTD` key/value pair
    Metadata {
        /// Metadata key, e.g. `ms_run[1]-location`
        key: String,
        /// Metadata value
        value: String,
    },
    /// Protein section row
    Protein(ProteinRow),
    /// Peptide section row
    Peptide(PeptideRow),
    /// PSM section row
    Psm(IdentificationRecord),
}

/// Policy for malformed rows encountered while reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParsePolicy {
    /// Stop at the first malformed row
    #[default]
    Abort,
    /// Log, count and skip malformed rows
    Skip,
}

/// Normalize a set of protein accessions into a group key.
///
/// Accessions are trimmed, sorted and de-duplicated, then joined with `;`, so
/// `"P2;P1"` and `"P1; P2"` produce the same key.
pub fn normalize_protein_group<'a>(accessions: impl IntoIterator<Item = &'a str>) -> String {
    let mut accessions: Vec<&str> = accessions
        .into_iter()
        .flat_map(|a| a.split(';'))
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect();
    accessions.sort_unstable();
    accessions.dedup();
    accessions.join(";")
}

const RUN_EXTENSIONS: &[&str] = &[
    ".gz", ".bz2", ".zip", ".mzml", ".mzxml", ".mzdata", ".raw", ".d", ".mgf", ".wiff",
];

/// Derive the run identifier from a file location or URI.
///
/// `file:///data/a05058.mzML` and `C:\raw\a05058.raw` both yield `a05058`.
pub fn run_identifier_from_location(location: &str) -> String {
    let location = location.trim();
    let name = location
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(location);

    let mut stem = name;
    loop {
        let lower = stem.to_ascii_lowercase();
        match RUN_EXTENSIONS.iter().find(|ext| lower.ends_with(*ext)) {
            Some(ext) if stem.len() > ext.len() => stem = &stem[..stem.len() - ext.len()],
            _ => break,
        }
    }
    stem.to_string()
}

//! Row-level parsing of mzTab section lines

use std::collections::{BTreeMap, HashMap};

use super::error::MzTabError;
use super::models::*;
use super::modifications::parse_modifications;

/// Column names used by the PSM section
pub mod psm_columns {
    /// Peptide sequence
    pub const SEQUENCE: &str = "sequence";
    /// PSM identifier
    pub const PSM_ID: &str = "PSM_ID";
    /// Protein accession
    pub const ACCESSION: &str = "accession";
    /// Modifications
    pub const MODIFICATIONS: &str = "modifications";
    /// Retention time (seconds)
    pub const RETENTION_TIME: &str = "retention_time";
    /// Precursor charge
    pub const CHARGE: &str = "charge";
    /// Observed m/z
    pub const EXP_MZ: &str = "exp_mass_to_charge";
    /// Theoretical m/z
    pub const CALC_MZ: &str = "calc_mass_to_charge";
    /// Spectrum reference
    pub const SPECTRA_REF: &str = "spectra_ref";
    /// Primary search engine score
    pub const SEARCH_ENGINE_SCORE: &str = "search_engine_score[1]";
    /// q-value, as written by OpenMS-based pipelines
    pub const Q_VALUE: &[&str] = &["opt_global_q-value", "opt_global_q-value_score"];
    /// Posterior error probability
    pub const PEP: &[&str] = &[
        "opt_global_Posterior_Error_Probability_score",
        "opt_global_Posterior_Error_Probability",
    ];
    /// Decoy flag
    pub const DECOY: &str = "opt_global_cv_MS:1002217_decoy_peptide";
}

/// Column lookup for one section, built from its header line (`PSH`, `PRH`, `PEH`)
#[derive(Debug, Clone, Default)]
pub struct SectionHeader {
    columns: HashMap<String, usize>,
}

impl SectionHeader {
    /// Build from the tab-separated header fields, excluding the line prefix
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        let columns = fields
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        Self { columns }
    }

    /// Index of a column by name
    pub fn index(&self, name: &str) -> Option<usize> {
        self.columns.get(name).copied()
    }

    /// Whether the header declares a column
    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    fn get<'a>(&self, fields: &[&'a str], name: &str) -> Option<&'a str> {
        let value = fields.get(self.index(name)?)?.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("null") {
            None
        } else {
            Some(value)
        }
    }

    fn get_any<'a>(&self, fields: &[&'a str], names: &[&str]) -> Option<&'a str> {
        names.iter().find_map(|name| self.get(fields, name))
    }
}

/// Per-row parse context
pub(crate) struct RowContext<'a> {
    pub line: u64,
    pub raw: &'a str,
}

impl RowContext<'_> {
    fn error(&self, reason: impl Into<String>) -> MzTabError {
        MzTabError::parse(self.line, self.raw, reason)
    }

    fn float(&self, value: Option<&str>, column: &str) -> Result<Option<f64>, MzTabError> {
        match value {
            None => Ok(None),
            // Multi-valued cells ("12.3|12.9") keep the first value
            Some(v) => {
                let first = v.split('|').next().unwrap_or(v).trim();
                if first.eq_ignore_ascii_case("nan") {
                    return Ok(None);
                }
                first
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| self.error(format!("invalid {} '{}'", column, v)))
            }
        }
    }
}

/// Parse a PSM data row (fields exclude the `PSM` prefix)
pub(crate) fn parse_psm(
    ctx: &RowContext<'_>,
    header: &SectionHeader,
    fields: &[&str],
    ms_runs: &BTreeMap<u32, String>,
) -> Result<IdentificationRecord, MzTabError> {
    use psm_columns::*;

    let sequence = header
        .get(fields, SEQUENCE)
        .ok_or_else(|| ctx.error("missing sequence"))?
        .to_ascii_uppercase();
    if !sequence.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ctx.error(format!("invalid peptide sequence '{}'", sequence)));
    }

    let psm_id = header
        .get(fields, PSM_ID)
        .ok_or_else(|| ctx.error("missing PSM_ID"))?
        .to_string();

    let charge_raw = header
        .get(fields, CHARGE)
        .ok_or_else(|| ctx.error("missing charge"))?;
    let charge = charge_raw
        .parse::<f64>()
        .ok()
        .filter(|c| c.fract() == 0.0)
        .map(|c| c as i32)
        .ok_or_else(|| ctx.error(format!("invalid charge '{}'", charge_raw)))?;

    let spectra_ref = header
        .get(fields, SPECTRA_REF)
        .ok_or_else(|| ctx.error("missing spectra_ref"))?;
    let spectrum_ref = resolve_spectra_ref(spectra_ref, ms_runs).map_err(|r| ctx.error(r))?;

    let modifications = parse_modifications(header.get(fields, MODIFICATIONS).unwrap_or(""))
        .map_err(|r| ctx.error(r))?;

    let protein_accessions = header
        .get(fields, ACCESSION)
        .map(split_accessions)
        .unwrap_or_default();

    let is_decoy = header
        .get(fields, DECOY)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let record = IdentificationRecord {
        psm_id,
        spectrum_ref,
        sequence,
        modifications,
        charge,
        retention_time: ctx.float(header.get(fields, RETENTION_TIME), RETENTION_TIME)?,
        calc_mass_to_charge: ctx.float(header.get(fields, CALC_MZ), CALC_MZ)?,
        exp_mass_to_charge: ctx.float(header.get(fields, EXP_MZ), EXP_MZ)?,
        protein_accessions,
        search_engine_score: ctx.float(header.get(fields, SEARCH_ENGINE_SCORE), SEARCH_ENGINE_SCORE)?,
        q_value: ctx.float(header.get_any(fields, Q_VALUE), "q-value")?,
        posterior_error_probability: ctx.float(header.get_any(fields, PEP), "PEP")?,
        is_decoy,
    };
    record.validate().map_err(|r| ctx.error(r))?;
    Ok(record)
}

/// Parse a protein data row (fields exclude the `PRT` prefix)
pub(crate) fn parse_protein(
    ctx: &RowContext<'_>,
    header: &SectionHeader,
    fields: &[&str],
) -> Result<ProteinRow, MzTabError> {
    let accession = header
        .get(fields, "accession")
        .ok_or_else(|| ctx.error("missing accession"))?
        .to_string();

    Ok(ProteinRow {
        accession,
        description: header.get(fields, "description").map(str::to_string),
        ambiguity_members: header
            .get(fields, "ambiguity_members")
            .map(split_accessions)
            .unwrap_or_default(),
        best_search_engine_score: ctx.float(
            header.get_any(
                fields,
                &["best_search_engine_score[1]", "search_engine_score[1]"],
            ),
            "best_search_engine_score[1]",
        )?,
    })
}

/// Parse a peptide data row (fields exclude the `PEP` prefix)
pub(crate) fn parse_peptide(
    ctx: &RowContext<'_>,
    header: &SectionHeader,
    fields: &[&str],
) -> Result<PeptideRow, MzTabError> {
    let sequence = header
        .get(fields, "sequence")
        .ok_or_else(|| ctx.error("missing sequence"))?
        .to_ascii_uppercase();

    let charge = match ctx.float(header.get(fields, "charge"), "charge")? {
        Some(c) if c.fract() == 0.0 && c > 0.0 => Some(c as i32),
        Some(c) => return Err(ctx.error(format!("invalid charge '{}'", c))),
        None => None,
    };

    Ok(PeptideRow {
        sequence,
        protein_accessions: header
            .get(fields, "accession")
            .map(split_accessions)
            .unwrap_or_default(),
        modifications: parse_modifications(header.get(fields, "modifications").unwrap_or(""))
            .map_err(|r| ctx.error(r))?,
        charge,
        retention_time: ctx.float(header.get(fields, "retention_time"), "retention_time")?,
        mass_to_charge: ctx.float(header.get(fields, "mass_to_charge"), "mass_to_charge")?,
        best_search_engine_score: ctx.float(
            header.get(fields, "best_search_engine_score[1]"),
            "best_search_engine_score[1]",
        )?,
    })
}

/// Resolve `ms_run[n]:native id` to a [`SpectrumRef`].
///
/// Several references separated by `|` keep the first one.
pub fn resolve_spectra_ref(
    value: &str,
    ms_runs: &BTreeMap<u32, String>,
) -> Result<SpectrumRef, String> {
    let value = value.split('|').next().unwrap_or(value).trim();
    let (run_part, native_id) = value
        .split_once(':')
        .ok_or_else(|| format!("spectra_ref '{}' is not of the form ms_run[n]:id", value))?;

    let run_index = run_part
        .trim()
        .strip_prefix("ms_run[")
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(|n| n.parse::<u32>().ok())
        .ok_or_else(|| format!("spectra_ref '{}' has no ms_run[n] prefix", value))?;

    let run = ms_runs
        .get(&run_index)
        .ok_or_else(|| format!("spectra_ref references undeclared ms_run[{}]", run_index))?;

    Ok(SpectrumRef::new(run.clone(), native_id.trim()))
}

/// Parse `ms_run[n]-location` metadata keys, returning `n`
pub fn ms_run_location_index(key: &str) -> Option<u32> {
    key.strip_prefix("ms_run[")?
        .strip_suffix("]-location")?
        .parse()
        .ok()
}

fn split_accessions(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(str::trim)
        .filter(|a| !a.is_empty() && !a.eq_ignore_ascii_case("null"))
        .map(str::to_string)
        .collect()
}

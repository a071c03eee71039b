//! Index table layouts and record <-> Arrow conversion
//!
//! Three tables live in the store: `psms.parquet`, `proteins.parquet` and
//! `peptides.parquet`. Modifications are stored as JSON text and accession
//! lists as `;`-joined text; these tables are private to the index, so the
//! flat encoding keeps lookups simple.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::mztab::{IdentificationRecord, Modification, PeptideRow, ProteinRow, SpectrumRef};

use super::IndexError;

/// PSM table file name
pub const PSM_TABLE: &str = "psms.parquet";
/// Protein table file name
pub const PROTEIN_TABLE: &str = "proteins.parquet";
/// Peptide table file name
pub const PEPTIDE_TABLE: &str = "peptides.parquet";

/// Column names of the index tables
pub mod columns {
    /// PSM identifier
    pub const PSM_ID: &str = "psm_id";
    /// Run identifier
    pub const RUN: &str = "run";
    /// Native spectrum id
    pub const NATIVE_ID: &str = "native_id";
    /// `run:native_id` point-lookup key
    pub const SPECTRUM_KEY: &str = "spectrum_key";
    /// Scan number parsed from the native id
    pub const SCAN: &str = "scan";
    /// Bare sequence
    pub const SEQUENCE: &str = "sequence";
    /// Modifications as JSON
    pub const MODIFICATIONS: &str = "modifications";
    /// Precursor charge
    pub const CHARGE: &str = "charge";
    /// Retention time (s)
    pub const RETENTION_TIME: &str = "retention_time";
    /// Theoretical m/z
    pub const CALC_MZ: &str = "calc_mass_to_charge";
    /// Observed m/z
    pub const EXP_MZ: &str = "exp_mass_to_charge";
    /// `;`-joined accessions in source order
    pub const ACCESSIONS: &str = "protein_accessions";
    /// Search engine score
    pub const SCORE: &str = "search_engine_score";
    /// q-value
    pub const Q_VALUE: &str = "q_value";
    /// Posterior error probability
    pub const PEP: &str = "posterior_error_probability";
    /// Decoy flag
    pub const IS_DECOY: &str = "is_decoy";
    /// Protein accession
    pub const ACCESSION: &str = "accession";
    /// Protein description
    pub const DESCRIPTION: &str = "description";
    /// `;`-joined ambiguity members
    pub const AMBIGUITY_MEMBERS: &str = "ambiguity_members";
    /// Best search engine score
    pub const BEST_SCORE: &str = "best_search_engine_score";
    /// Peptide m/z
    pub const MZ: &str = "mass_to_charge";
}

/// Float columns of the PSM table
pub(crate) const PSM_FLOAT_COLUMNS: &[&str] = &[
    columns::RETENTION_TIME,
    columns::CALC_MZ,
    columns::EXP_MZ,
    columns::SCORE,
    columns::Q_VALUE,
    columns::PEP,
];

/// Arrow schema of the PSM table
pub fn psm_schema() -> SchemaRef {
    use columns::*;
    Arc::new(Schema::new(vec![
        Field::new(PSM_ID, DataType::Utf8, false),
        Field::new(RUN, DataType::Utf8, false),
        Field::new(NATIVE_ID, DataType::Utf8, false),
        Field::new(SPECTRUM_KEY, DataType::Utf8, false),
        Field::new(SCAN, DataType::Int64, true),
        Field::new(SEQUENCE, DataType::Utf8, false),
        Field::new(MODIFICATIONS, DataType::Utf8, false),
        Field::new(CHARGE, DataType::Int32, false),
        Field::new(RETENTION_TIME, DataType::Float64, true),
        Field::new(CALC_MZ, DataType::Float64, true),
        Field::new(EXP_MZ, DataType::Float64, true),
        Field::new(ACCESSIONS, DataType::Utf8, false),
        Field::new(SCORE, DataType::Float64, true),
        Field::new(Q_VALUE, DataType::Float64, true),
        Field::new(PEP, DataType::Float64, true),
        Field::new(IS_DECOY, DataType::Boolean, false),
    ]))
}

/// Arrow schema of the protein table
pub fn protein_schema() -> SchemaRef {
    use columns::*;
    Arc::new(Schema::new(vec![
        Field::new(ACCESSION, DataType::Utf8, false),
        Field::new(DESCRIPTION, DataType::Utf8, true),
        Field::new(AMBIGUITY_MEMBERS, DataType::Utf8, false),
        Field::new(BEST_SCORE, DataType::Float64, true),
    ]))
}

/// Arrow schema of the peptide table
pub fn peptide_schema() -> SchemaRef {
    use columns::*;
    Arc::new(Schema::new(vec![
        Field::new(SEQUENCE, DataType::Utf8, false),
        Field::new(ACCESSIONS, DataType::Utf8, false),
        Field::new(MODIFICATIONS, DataType::Utf8, false),
        Field::new(CHARGE, DataType::Int32, true),
        Field::new(RETENTION_TIME, DataType::Float64, true),
        Field::new(MZ, DataType::Float64, true),
        Field::new(BEST_SCORE, DataType::Float64, true),
    ]))
}

fn modifications_json(modifications: &[Modification]) -> Result<String, IndexError> {
    Ok(serde_json::to_string(modifications)?)
}

fn parse_modifications_json(value: &str) -> Result<Vec<Modification>, IndexError> {
    Ok(serde_json::from_str(value)?)
}

fn split_joined(value: &str) -> Vec<String> {
    value
        .split(';')
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

/// Encode identification records as a PSM table batch
pub fn psms_to_batch(records: &[IdentificationRecord]) -> Result<RecordBatch, IndexError> {
    let modifications = records
        .iter()
        .map(|r| modifications_json(&r.modifications))
        .collect::<Result<Vec<_>, _>>()?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.psm_id.as_str()))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.spectrum_ref.run.as_str()))),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.spectrum_ref.native_id.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.spectrum_ref.key()))),
        Arc::new(Int64Array::from_iter(records.iter().map(|r| r.spectrum_ref.scan()))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.sequence.as_str()))),
        Arc::new(StringArray::from_iter_values(modifications)),
        Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.charge))),
        Arc::new(Float64Array::from_iter(records.iter().map(|r| r.retention_time))),
        Arc::new(Float64Array::from_iter(records.iter().map(|r| r.calc_mass_to_charge))),
        Arc::new(Float64Array::from_iter(records.iter().map(|r| r.exp_mass_to_charge))),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.protein_accessions.join(";")),
        )),
        Arc::new(Float64Array::from_iter(records.iter().map(|r| r.search_engine_score))),
        Arc::new(Float64Array::from_iter(records.iter().map(|r| r.q_value))),
        Arc::new(Float64Array::from_iter(records.iter().map(|r| r.posterior_error_probability))),
        Arc::new(BooleanArray::from_iter(records.iter().map(|r| Some(r.is_decoy)))),
    ];

    Ok(RecordBatch::try_new(psm_schema(), columns)?)
}

/// Decode a PSM table batch into identification records
pub fn batch_to_psms(batch: &RecordBatch) -> Result<Vec<IdentificationRecord>, IndexError> {
    use columns::*;
    let psm_id = string_column(batch, PSM_ID)?;
    let run = string_column(batch, RUN)?;
    let native_id = string_column(batch, NATIVE_ID)?;
    let sequence = string_column(batch, SEQUENCE)?;
    let modifications = string_column(batch, MODIFICATIONS)?;
    let charge = int32_column(batch, CHARGE)?;
    let retention_time = float64_column(batch, RETENTION_TIME)?;
    let calc_mz = float64_column(batch, CALC_MZ)?;
    let exp_mz = float64_column(batch, EXP_MZ)?;
    let accessions = string_column(batch, ACCESSIONS)?;
    let score = float64_column(batch, SCORE)?;
    let q_value = float64_column(batch, Q_VALUE)?;
    let pep = float64_column(batch, PEP)?;
    let is_decoy = boolean_column(batch, IS_DECOY)?;

    (0..batch.num_rows())
        .map(|i| {
            Ok(IdentificationRecord {
                psm_id: psm_id.value(i).to_string(),
                spectrum_ref: SpectrumRef::new(run.value(i), native_id.value(i)),
                sequence: sequence.value(i).to_string(),
                modifications: parse_modifications_json(modifications.value(i))?,
                charge: charge.value(i),
                retention_time: opt_f64(retention_time, i),
                calc_mass_to_charge: opt_f64(calc_mz, i),
                exp_mass_to_charge: opt_f64(exp_mz, i),
                protein_accessions: split_joined(accessions.value(i)),
                search_engine_score: opt_f64(score, i),
                q_value: opt_f64(q_value, i),
                posterior_error_probability: opt_f64(pep, i),
                is_decoy: is_decoy.value(i),
            })
        })
        .collect()
}

/// Encode protein rows
pub fn proteins_to_batch(rows: &[ProteinRow]) -> Result<RecordBatch, IndexError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.accession.as_str()))),
        Arc::new(StringArray::from_iter(rows.iter().map(|r| r.description.as_deref()))),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.ambiguity_members.join(";")),
        )),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.best_search_engine_score))),
    ];
    Ok(RecordBatch::try_new(protein_schema(), columns)?)
}

/// Decode protein rows
pub fn batch_to_proteins(batch: &RecordBatch) -> Result<Vec<ProteinRow>, IndexError> {
    use columns::*;
    let accession = string_column(batch, ACCESSION)?;
    let description = string_column(batch, DESCRIPTION)?;
    let members = string_column(batch, AMBIGUITY_MEMBERS)?;
    let score = float64_column(batch, BEST_SCORE)?;

    Ok((0..batch.num_rows())
        .map(|i| ProteinRow {
            accession: accession.value(i).to_string(),
            description: (!description.is_null(i)).then(|| description.value(i).to_string()),
            ambiguity_members: split_joined(members.value(i)),
            best_search_engine_score: opt_f64(score, i),
        })
        .collect())
}

/// Encode peptide rows
pub fn peptides_to_batch(rows: &[PeptideRow]) -> Result<RecordBatch, IndexError> {
    let modifications = rows
        .iter()
        .map(|r| modifications_json(&r.modifications))
        .collect::<Result<Vec<_>, _>>()?;
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.sequence.as_str()))),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.protein_accessions.join(";")),
        )),
        Arc::new(StringArray::from_iter_values(modifications)),
        Arc::new(Int32Array::from_iter(rows.iter().map(|r| r.charge))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.retention_time))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.mass_to_charge))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.best_search_engine_score))),
    ];
    Ok(RecordBatch::try_new(peptide_schema(), columns)?)
}

/// Decode peptide rows
pub fn batch_to_peptides(batch: &RecordBatch) -> Result<Vec<PeptideRow>, IndexError> {
    use columns::*;
    let sequence = string_column(batch, SEQUENCE)?;
    let accessions = string_column(batch, ACCESSIONS)?;
    let modifications = string_column(batch, MODIFICATIONS)?;
    let charge = int32_column(batch, CHARGE)?;
    let retention_time = float64_column(batch, RETENTION_TIME)?;
    let mz = float64_column(batch, MZ)?;
    let score = float64_column(batch, BEST_SCORE)?;

    (0..batch.num_rows())
        .map(|i| {
            Ok(PeptideRow {
                sequence: sequence.value(i).to_string(),
                protein_accessions: split_joined(accessions.value(i)),
                modifications: parse_modifications_json(modifications.value(i))?,
                charge: (!charge.is_null(i)).then(|| charge.value(i)),
                retention_time: opt_f64(retention_time, i),
                mass_to_charge: opt_f64(mz, i),
                best_search_engine_score: opt_f64(score, i),
            })
        })
        .collect()
}

fn opt_f64(array: &Float64Array, i: usize) -> Option<f64> {
    (!array.is_null(i)).then(|| array.value(i))
}

/// Get a required Utf8 column by name.
pub(super) fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a StringArray, IndexError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| IndexError::ColumnNotFound(name.to_string()))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| IndexError::InvalidFormat(format!("{} is not Utf8", name)))
}

fn int32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array, IndexError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| IndexError::ColumnNotFound(name.to_string()))?
        .as_any()
        .downcast_ref::<Int32Array>()
        .ok_or_else(|| IndexError::InvalidFormat(format!("{} is not Int32", name)))
}

fn float64_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a Float64Array, IndexError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| IndexError::ColumnNotFound(name.to_string()))?
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| IndexError::InvalidFormat(format!("{} is not Float64", name)))
}

fn boolean_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a BooleanArray, IndexError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| IndexError::ColumnNotFound(name.to_string()))?
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| IndexError::InvalidFormat(format!("{} is not Boolean", name)))
}

//! Output record shapes
//!
//! Each conversion writes one of three shapes. A [`RecordShape`] knows its
//! Arrow schema, how to encode a slice of records as a batch, and which
//! fields it can be partitioned by.

use std::fmt;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::aggregate::ProteinGroupAggregate;
use crate::mztab::IdentificationRecord;
use crate::transform::UnifiedFeatureRecord;

use super::arrays::{self, IntensityCell};
use super::WriterError;

/// Kind of output record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Peptide-spectrum matches
    Psm,
    /// Quantified peptide features
    Feature,
    /// Protein group aggregates
    ProteinGroup,
}

impl RecordKind {
    /// Name stored in file metadata
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Psm => "psm",
            RecordKind::Feature => "feature",
            RecordKind::ProteinGroup => "protein_group",
        }
    }

    /// Short name used in output file names
    pub fn extension(self) -> &'static str {
        match self {
            RecordKind::Psm => "psm",
            RecordKind::Feature => "feature",
            RecordKind::ProteinGroup => "pg",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column names of the output files
pub mod columns {
    /// PSM identifier
    pub const PSM_ID: &str = "psm_id";
    /// Run identifier (reference file name)
    pub const RUN: &str = "run";
    /// Native spectrum id
    pub const NATIVE_ID: &str = "native_id";
    /// Scan number
    pub const SCAN: &str = "scan";
    /// Bare sequence
    pub const SEQUENCE: &str = "sequence";
    /// ProForma-style modified sequence
    pub const PEPTIDOFORM: &str = "peptidoform";
    /// Modification list
    pub const MODIFICATIONS: &str = "modifications";
    /// Precursor charge
    pub const CHARGE: &str = "precursor_charge";
    /// Retention time (s)
    pub const RETENTION_TIME: &str = "rt";
    /// Theoretical m/z
    pub const CALC_MZ: &str = "calculated_mz";
    /// Observed m/z
    pub const EXP_MZ: &str = "observed_mz";
    /// Protein accessions
    pub const ACCESSIONS: &str = "protein_accessions";
    /// Normalized protein group key
    pub const PROTEIN_GROUP: &str = "protein_group";
    /// Search engine score
    pub const SCORE: &str = "search_engine_score";
    /// q-value
    pub const Q_VALUE: &str = "q_value";
    /// Posterior error probability
    pub const PEP: &str = "posterior_error_probability";
    /// Decoy flag
    pub const IS_DECOY: &str = "is_decoy";
    /// Summed feature intensity
    pub const INTENSITY: &str = "intensity";
    /// Per-sample intensities
    pub const INTENSITIES: &str = "intensities";
    /// Whether any quantification entry matched
    pub const QUANTIFIED: &str = "quantified";
    /// Sample accession
    pub const SAMPLE_ACCESSION: &str = "sample_accession";
    /// Experimental condition
    pub const CONDITION: &str = "condition";
    /// Biological replicate
    pub const BIO_REPLICATE: &str = "biological_replicate";
    /// Technical replicate
    pub const TECH_REPLICATE: &str = "technical_replicate";
    /// Fraction identifier
    pub const FRACTION: &str = "fraction";
    /// Lead protein description
    pub const DESCRIPTION: &str = "description";
    /// Distinct peptides observed
    pub const PEPTIDE_COUNT: &str = "peptide_count";
    /// Distinct peptides with a measured intensity
    pub const QUANTIFIED_PEPTIDE_COUNT: &str = "quantified_peptide_count";
    /// TopN intensity
    pub const TOPN_INTENSITY: &str = "topn_intensity";
    /// iBAQ intensity
    pub const IBAQ_INTENSITY: &str = "ibaq_intensity";
    /// Sum of all valid peptide intensities
    pub const TOTAL_INTENSITY: &str = "total_all_peptides_intensity";
    /// Theoretical peptide count used for iBAQ
    pub const THEORETICAL_PEPTIDES: &str = "theoretical_peptides";
    /// N used for TopN
    pub const TOPN: &str = "topn";
}

/// An output record layout
pub trait RecordShape {
    /// Record type this shape encodes
    type Record;

    /// Kind tag written to metadata and file names
    fn kind(&self) -> RecordKind;

    /// Arrow schema of the output
    fn schema(&self) -> SchemaRef;

    /// Floating-point columns (written with BYTE_STREAM_SPLIT)
    fn float_columns(&self) -> &'static [&'static str];

    /// Encode records as one batch
    fn to_batch(&self, records: &[Self::Record]) -> Result<RecordBatch, WriterError>;

    /// Fields the output can be partitioned by
    fn partition_fields(&self) -> &'static [&'static str];

    /// Value of a partition field for one record; `None` is null
    fn partition_value(&self, record: &Self::Record, field: &str) -> Option<String>;

    /// Fail on fields outside [`partition_fields`](Self::partition_fields)
    fn check_partition_fields(&self, fields: &[String]) -> Result<(), WriterError> {
        let supported = self.partition_fields();
        match fields.iter().find(|f| !supported.contains(&f.as_str())) {
            Some(field) => Err(WriterError::UnknownPartitionField {
                field: field.clone(),
                kind: self.kind().as_str(),
            }),
            None => Ok(()),
        }
    }
}

fn identification_fields() -> Vec<Field> {
    use columns::*;
    vec![
        Field::new(PSM_ID, DataType::Utf8, false),
        Field::new(RUN, DataType::Utf8, false),
        Field::new(NATIVE_ID, DataType::Utf8, false),
        Field::new(SCAN, DataType::Int64, true),
        Field::new(SEQUENCE, DataType::Utf8, false),
        Field::new(PEPTIDOFORM, DataType::Utf8, false),
        Field::new(MODIFICATIONS, arrays::modification_list_type(), false),
        Field::new(CHARGE, DataType::Int32, false),
        Field::new(RETENTION_TIME, DataType::Float64, true),
        Field::new(CALC_MZ, DataType::Float64, true),
        Field::new(EXP_MZ, DataType::Float64, true),
        Field::new(ACCESSIONS, arrays::string_list_type(), false),
        Field::new(PROTEIN_GROUP, DataType::Utf8, false),
        Field::new(SCORE, DataType::Float64, true),
        Field::new(Q_VALUE, DataType::Float64, true),
        Field::new(PEP, DataType::Float64, true),
        Field::new(IS_DECOY, DataType::Boolean, false),
    ]
}

fn identification_columns<'a>(
    r: impl Iterator<Item = &'a IdentificationRecord> + Clone,
) -> Result<Vec<ArrayRef>, WriterError> {
    Ok(vec![
        arrays::strings(r.clone().map(|x| x.psm_id.as_str())),
        arrays::strings(r.clone().map(|x| x.spectrum_ref.run.as_str())),
        arrays::strings(r.clone().map(|x| x.spectrum_ref.native_id.as_str())),
        arrays::optional_int64s(r.clone().map(|x| x.spectrum_ref.scan())),
        arrays::strings(r.clone().map(|x| x.sequence.as_str())),
        arrays::strings(r.clone().map(|x| x.peptidoform())),
        arrays::modification_lists(r.clone().map(|x| x.modifications.as_slice()))?,
        arrays::int32s(r.clone().map(|x| x.charge)),
        arrays::optional_float64s(r.clone().map(|x| x.retention_time)),
        arrays::optional_float64s(r.clone().map(|x| x.calc_mass_to_charge)),
        arrays::optional_float64s(r.clone().map(|x| x.exp_mass_to_charge)),
        arrays::string_lists(r.clone().map(|x| x.protein_accessions.as_slice())),
        arrays::strings(r.clone().map(|x| x.protein_group())),
        arrays::optional_float64s(r.clone().map(|x| x.search_engine_score)),
        arrays::optional_float64s(r.clone().map(|x| x.q_value)),
        arrays::optional_float64s(r.clone().map(|x| x.posterior_error_probability)),
        arrays::booleans(r.map(|x| x.is_decoy)),
    ])
}

fn identification_partition(record: &IdentificationRecord, field: &str) -> Option<Option<String>> {
    match field {
        columns::RUN => Some(Some(record.spectrum_ref.run.clone())),
        columns::CHARGE => Some(Some(record.charge.to_string())),
        columns::IS_DECOY => Some(Some(record.is_decoy.to_string())),
        columns::PROTEIN_GROUP => Some(Some(record.protein_group())),
        _ => None,
    }
}

const IDENTIFICATION_FLOAT_COLUMNS: &[&str] = &[
    columns::RETENTION_TIME,
    columns::CALC_MZ,
    columns::EXP_MZ,
    columns::SCORE,
    columns::Q_VALUE,
    columns::PEP,
];

/// PSM output: one row per identification record
#[derive(Debug, Clone, Copy, Default)]
pub struct PsmShape;

impl RecordShape for PsmShape {
    type Record = IdentificationRecord;

    fn kind(&self) -> RecordKind {
        RecordKind::Psm
    }

    fn schema(&self) -> SchemaRef {
        Arc::new(Schema::new(identification_fields()))
    }

    fn float_columns(&self) -> &'static [&'static str] {
        IDENTIFICATION_FLOAT_COLUMNS
    }

    fn to_batch(&self, records: &[IdentificationRecord]) -> Result<RecordBatch, WriterError> {
        let columns = identification_columns(records.iter())?;
        Ok(RecordBatch::try_new(self.schema(), columns)?)
    }

    fn partition_fields(&self) -> &'static [&'static str] {
        &[
            columns::RUN,
            columns::CHARGE,
            columns::IS_DECOY,
            columns::PROTEIN_GROUP,
        ]
    }

    fn partition_value(&self, record: &IdentificationRecord, field: &str) -> Option<String> {
        identification_partition(record, field).flatten()
    }
}

/// Feature output: one row per unified record, with its quantification.
///
/// The flat sample columns are filled only when the run maps to a single
/// sample; multiplexed runs carry their samples in the `intensities` list.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureShape;

const FEATURE_FLOAT_COLUMNS: &[&str] = &[
    columns::RETENTION_TIME,
    columns::CALC_MZ,
    columns::EXP_MZ,
    columns::SCORE,
    columns::Q_VALUE,
    columns::PEP,
    columns::INTENSITY,
];

fn intensity_cells(record: &UnifiedFeatureRecord) -> Vec<IntensityCell<'_>> {
    record
        .quant
        .iter()
        .map(|entry| IntensityCell {
            sample_accession: record
                .sample_for(entry)
                .map(|s| s.sample_accession.as_str()),
            channel: entry.channel.as_deref(),
            intensity: entry.intensity,
        })
        .collect()
}

impl RecordShape for FeatureShape {
    type Record = UnifiedFeatureRecord;

    fn kind(&self) -> RecordKind {
        RecordKind::Feature
    }

    fn schema(&self) -> SchemaRef {
        use columns::*;
        let mut fields = identification_fields();
        fields.extend([
            Field::new(INTENSITY, DataType::Float64, true),
            Field::new(INTENSITIES, arrays::intensity_list_type(), false),
            Field::new(QUANTIFIED, DataType::Boolean, false),
            Field::new(SAMPLE_ACCESSION, DataType::Utf8, true),
            Field::new(CONDITION, DataType::Utf8, true),
            Field::new(BIO_REPLICATE, DataType::Utf8, true),
            Field::new(TECH_REPLICATE, DataType::Utf8, true),
            Field::new(FRACTION, DataType::Utf8, true),
        ]);
        Arc::new(Schema::new(fields))
    }

    fn float_columns(&self) -> &'static [&'static str] {
        FEATURE_FLOAT_COLUMNS
    }

    fn to_batch(&self, records: &[UnifiedFeatureRecord]) -> Result<RecordBatch, WriterError> {
        let mut columns = identification_columns(records.iter().map(|r| &r.identification))?;
        let samples: Vec<_> = records.iter().map(|r| r.single_sample()).collect();

        columns.push(arrays::intensities(
            records.iter().map(|r| Some(r.intensity())),
        ));
        columns.push(arrays::intensity_lists(records.iter().map(intensity_cells))?);
        columns.push(arrays::booleans(records.iter().map(|r| r.has_quant())));
        columns.push(arrays::optional_strings(
            samples.iter().map(|s| s.map(|s| s.sample_accession.as_str())),
        ));
        columns.push(arrays::optional_strings(
            samples.iter().map(|s| s.and_then(|s| s.condition.as_deref())),
        ));
        columns.push(arrays::optional_strings(
            samples.iter().map(|s| s.and_then(|s| s.biological_replicate.as_deref())),
        ));
        columns.push(arrays::optional_strings(
            samples.iter().map(|s| s.and_then(|s| s.technical_replicate.as_deref())),
        ));
        columns.push(arrays::optional_strings(
            samples.iter().map(|s| s.and_then(|s| s.fraction.as_deref())),
        ));

        Ok(RecordBatch::try_new(self.schema(), columns)?)
    }

    fn partition_fields(&self) -> &'static [&'static str] {
        &[
            columns::RUN,
            columns::CHARGE,
            columns::IS_DECOY,
            columns::PROTEIN_GROUP,
            columns::SAMPLE_ACCESSION,
            columns::CONDITION,
            columns::BIO_REPLICATE,
        ]
    }

    fn partition_value(&self, record: &UnifiedFeatureRecord, field: &str) -> Option<String> {
        if let Some(value) = identification_partition(&record.identification, field) {
            return value;
        }
        let sample = record.single_sample()?;
        match field {
            columns::SAMPLE_ACCESSION => Some(sample.sample_accession.clone()),
            columns::CONDITION => sample.condition.clone(),
            columns::BIO_REPLICATE => sample.biological_replicate.clone(),
            _ => None,
        }
    }
}

/// Protein group output: one row per (protein group, sample)
#[derive(Debug, Clone, Copy, Default)]
pub struct ProteinGroupShape;

impl RecordShape for ProteinGroupShape {
    type Record = ProteinGroupAggregate;

    fn kind(&self) -> RecordKind {
        RecordKind::ProteinGroup
    }

    fn schema(&self) -> SchemaRef {
        use columns::*;
        Arc::new(Schema::new(vec![
            Field::new(PROTEIN_GROUP, DataType::Utf8, false),
            Field::new(ACCESSIONS, arrays::string_list_type(), false),
            Field::new(DESCRIPTION, DataType::Utf8, true),
            Field::new(SAMPLE_ACCESSION, DataType::Utf8, false),
            Field::new(CONDITION, DataType::Utf8, true),
            Field::new(BIO_REPLICATE, DataType::Utf8, true),
            Field::new(TECH_REPLICATE, DataType::Utf8, true),
            Field::new(PEPTIDE_COUNT, DataType::Int32, false),
            Field::new(QUANTIFIED_PEPTIDE_COUNT, DataType::Int32, false),
            Field::new(TOPN_INTENSITY, DataType::Float64, true),
            Field::new(IBAQ_INTENSITY, DataType::Float64, true),
            Field::new(TOTAL_INTENSITY, DataType::Float64, true),
            Field::new(THEORETICAL_PEPTIDES, DataType::Int32, true),
            Field::new(TOPN, DataType::Int32, false),
        ]))
    }

    fn float_columns(&self) -> &'static [&'static str] {
        &[
            columns::TOPN_INTENSITY,
            columns::IBAQ_INTENSITY,
            columns::TOTAL_INTENSITY,
        ]
    }

    fn to_batch(&self, records: &[ProteinGroupAggregate]) -> Result<RecordBatch, WriterError> {
        let count = |v: u32| {
            i32::try_from(v)
                .map_err(|_| WriterError::InvalidData(format!("count {} out of range", v)))
        };
        let peptide_counts = records
            .iter()
            .map(|r| count(r.peptide_count))
            .collect::<Result<Vec<_>, _>>()?;
        let quantified_counts = records
            .iter()
            .map(|r| count(r.quantified_peptide_count))
            .collect::<Result<Vec<_>, _>>()?;
        let theoretical = records
            .iter()
            .map(|r| r.theoretical_peptides.map(count).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        let topn = records
            .iter()
            .map(|r| count(r.topn))
            .collect::<Result<Vec<_>, _>>()?;

        let r = records.iter();
        let columns = vec![
            arrays::strings(r.clone().map(|x| x.protein_group.as_str())),
            arrays::string_lists(r.clone().map(|x| x.protein_accessions.as_slice())),
            arrays::optional_strings(r.clone().map(|x| x.description.as_deref())),
            arrays::strings(r.clone().map(|x| x.sample_accession.as_str())),
            arrays::optional_strings(r.clone().map(|x| x.condition.as_deref())),
            arrays::optional_strings(r.clone().map(|x| x.biological_replicate.as_deref())),
            arrays::optional_strings(r.clone().map(|x| x.technical_replicate.as_deref())),
            arrays::int32s(peptide_counts.into_iter()),
            arrays::int32s(quantified_counts.into_iter()),
            arrays::intensities(r.clone().map(|x| x.topn_intensity)),
            arrays::intensities(r.clone().map(|x| x.ibaq_intensity)),
            arrays::intensities(r.map(|x| Some(x.total_intensity))),
            arrays::optional_int32s(theoretical.into_iter()),
            arrays::int32s(topn.into_iter()),
        ];
        Ok(RecordBatch::try_new(self.schema(), columns)?)
    }

    fn partition_fields(&self) -> &'static [&'static str] {
        &[
            columns::SAMPLE_ACCESSION,
            columns::CONDITION,
            columns::BIO_REPLICATE,
            columns::TECH_REPLICATE,
        ]
    }

    fn partition_value(&self, record: &ProteinGroupAggregate, field: &str) -> Option<String> {
        match field {
            columns::SAMPLE_ACCESSION => Some(record.sample_accession.clone()),
            columns::CONDITION => record.condition.clone(),
            columns::BIO_REPLICATE => record.biological_replicate.clone(),
            columns::TECH_REPLICATE => record.technical_replicate.clone(),
            _ => None,
        }
    }
}

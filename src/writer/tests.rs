use std::collections::HashMap;
use std::fs::File;
use std::sync::Arc;

use arrow::array::{Array, AsArray};
use arrow::datatypes::{Float64Type, Int32Type};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::tempdir;

use super::*;
use crate::aggregate::ProteinGroupAggregate;
use crate::fixtures::*;
use crate::loaders::{Intensity, SampleDescriptor};
use crate::mztab::Modification;
use crate::transform::{SampleMatch, UnifiedFeatureRecord};

fn psms() -> Vec<crate::mztab::IdentificationRecord> {
    let mut first = record("PEPTIDEK", &["P2", "P1"], "A", 1);
    first.modifications = vec![Modification {
        positions: vec![3],
        accession: "UNIMOD:35".to_string(),
        mass_delta: Some(15.9949),
    }];
    vec![
        first,
        record("ELVISK", &["P3"], "A", 2),
        record("LIVESK", &["P3"], "B", 3),
    ]
}

fn row_count(batches: &[arrow::record_batch::RecordBatch]) -> usize {
    batches.iter().map(|b| b.num_rows()).sum()
}

fn aggregate_row(sample: &str, topn: Option<Intensity>) -> ProteinGroupAggregate {
    ProteinGroupAggregate {
        protein_group: "P1".to_string(),
        protein_accessions: vec!["P1".to_string()],
        description: None,
        sample_accession: sample.to_string(),
        condition: Some("ctrl".to_string()),
        biological_replicate: None,
        technical_replicate: None,
        peptide_count: 2,
        quantified_peptide_count: 1,
        topn_intensity: topn,
        ibaq_intensity: None,
        total_intensity: Intensity::Missing,
        theoretical_peptides: None,
        topn: 3,
    }
}

#[test]
fn test_write_psms_and_metadata() -> Result<(), WriterError> {
    let dir = tempdir()?;
    let path = dir.path().join("out.psm.parquet");
    let metadata = footer_metadata(RecordKind::Psm, Some(std::path::Path::new("in.mzTab")));

    let stats = write(psms(), &path, &[], PsmShape, &WriterConfig::default(), &metadata)?;
    assert_eq!(stats.rows_written, 3);
    assert_eq!(stats.files, vec![path.clone()]);

    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?;
    let kv: HashMap<String, Option<String>> = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .map(|kv| kv.iter().map(|e| (e.key.clone(), e.value.clone())).collect())
        .unwrap_or_default();
    assert_eq!(kv[metadata_keys::RECORD_KIND].as_deref(), Some("psm"));
    assert_eq!(kv[metadata_keys::SOURCE_FILE].as_deref(), Some("in.mzTab"));
    assert_eq!(
        kv[metadata_keys::FORMAT_VERSION].as_deref(),
        Some(OUTPUT_FORMAT_VERSION)
    );

    let batches = read_output(&path)?;
    let batch = &batches[0];
    assert_eq!(batch.num_rows(), 3);

    let groups = batch
        .column_by_name(schema::columns::PROTEIN_GROUP)
        .unwrap()
        .as_string::<i32>();
    assert_eq!(groups.value(0), "P1;P2");

    let peptidoforms = batch
        .column_by_name(schema::columns::PEPTIDOFORM)
        .unwrap()
        .as_string::<i32>();
    assert_eq!(peptidoforms.value(0), "PEP[UNIMOD:35]TIDEK");

    let accessions = batch
        .column_by_name(schema::columns::ACCESSIONS)
        .unwrap()
        .as_list::<i32>();
    let first = accessions.value(0);
    let first = first.as_string::<i32>();
    // Source order is kept in the list; the group key is sorted
    assert_eq!((first.value(0), first.value(1)), ("P2", "P1"));

    let modifications = batch
        .column_by_name(schema::columns::MODIFICATIONS)
        .unwrap()
        .as_list::<i32>();
    assert_eq!(modifications.value_length(0), 1);
    assert_eq!(modifications.value_length(1), 0);
    Ok(())
}

#[test]
fn test_feature_sample_columns() -> Result<(), WriterError> {
    let label_free = Arc::new(SampleDescriptor {
        run: "A".to_string(),
        data_file: "A.raw".to_string(),
        channels: vec![sample("S_A", None)],
    });
    let plex = Arc::new(SampleDescriptor {
        run: "plex".to_string(),
        data_file: "plex.raw".to_string(),
        channels: vec![sample("S1", Some("TMT126")), sample("S2", Some("TMT127"))],
    });

    let a = record("PEPTIDEK", &["P1"], "A", 1);
    let b = record("ELVISK", &["P1"], "plex", 2);
    let records = vec![
        UnifiedFeatureRecord {
            quant: vec![quant_entry(0, &a, None, Intensity::Value(10.0))],
            identification: a,
            sample: SampleMatch::Resolved(label_free),
        },
        UnifiedFeatureRecord {
            quant: vec![
                quant_entry(1, &b, Some("TMT126"), Intensity::Value(1.0)),
                quant_entry(2, &b, Some("TMT127"), Intensity::Missing),
            ],
            identification: b.clone(),
            sample: SampleMatch::Resolved(plex),
        },
        UnifiedFeatureRecord {
            quant: Vec::new(),
            identification: b,
            sample: SampleMatch::Unmatched,
        },
    ];

    let batch = FeatureShape.to_batch(&records)?;
    assert_eq!(batch.num_rows(), 3);

    let samples = batch
        .column_by_name(schema::columns::SAMPLE_ACCESSION)
        .unwrap()
        .as_string::<i32>();
    assert_eq!(samples.value(0), "S_A");
    // Multiplexed and unmatched runs have no single sample
    assert!(samples.is_null(1));
    assert!(samples.is_null(2));

    let intensity = batch
        .column_by_name(schema::columns::INTENSITY)
        .unwrap()
        .as_primitive::<Float64Type>();
    assert_eq!(intensity.value(0), 10.0);
    assert_eq!(intensity.value(1), 1.0);
    // No quant entry: null, not zero
    assert!(intensity.is_null(2));

    let quantified = batch
        .column_by_name(schema::columns::QUANTIFIED)
        .unwrap()
        .as_boolean();
    assert!(quantified.value(0));
    assert!(!quantified.value(2));

    let per_sample = batch
        .column_by_name(schema::columns::INTENSITIES)
        .unwrap()
        .as_list::<i32>();
    assert_eq!(per_sample.value_length(1), 2);
    let cells = per_sample.value(1);
    let cells = cells.as_struct();
    let cell_samples = cells.column(0).as_string::<i32>();
    assert_eq!((cell_samples.value(0), cell_samples.value(1)), ("S1", "S2"));
    let cell_values = cells.column(2).as_primitive::<Float64Type>();
    assert!(cell_values.is_null(1));
    Ok(())
}

#[test]
fn test_protein_group_nulls() -> Result<(), WriterError> {
    let rows = vec![
        aggregate_row("S1", Some(Intensity::Value(5.0))),
        aggregate_row("S2", Some(Intensity::Missing)),
    ];
    let batch = ProteinGroupShape.to_batch(&rows)?;

    let topn = batch
        .column_by_name(schema::columns::TOPN_INTENSITY)
        .unwrap()
        .as_primitive::<Float64Type>();
    assert_eq!(topn.value(0), 5.0);
    assert!(topn.is_null(1));

    let ibaq = batch
        .column_by_name(schema::columns::IBAQ_INTENSITY)
        .unwrap();
    assert_eq!(ibaq.null_count(), 2);

    let counts = batch
        .column_by_name(schema::columns::PEPTIDE_COUNT)
        .unwrap()
        .as_primitive::<Int32Type>();
    assert_eq!(counts.value(0), 2);
    Ok(())
}

#[test]
fn test_partitioned_write() -> Result<(), WriterError> {
    let dir = tempdir()?;
    let destination = dir.path().join("out.psm");
    let fields = vec![schema::columns::RUN.to_string()];

    let stats = write(
        psms(),
        &destination,
        &fields,
        PsmShape,
        &WriterConfig::default(),
        &HashMap::new(),
    )?;
    assert_eq!(stats.rows_written, 3);
    assert_eq!(stats.files.len(), 2);
    assert!(destination.join("run=A").join(PARTITION_FILE).is_file());
    assert!(destination.join("run=B").join(PARTITION_FILE).is_file());
    assert!(stats.files.iter().all(|f| f.starts_with(&destination)));

    assert_eq!(output_files(&destination)?.len(), 2);
    assert_eq!(row_count(&read_output(&destination)?), 3);

    // Only the final directory remains next to it
    let entries: Vec<_> = std::fs::read_dir(dir.path())?.collect::<Result<_, _>>()?;
    assert_eq!(entries.len(), 1);
    Ok(())
}

#[test]
fn test_null_partition_value() -> Result<(), WriterError> {
    let dir = tempdir()?;
    let destination = dir.path().join("out.pg");
    let mut rows = vec![aggregate_row("S1", None)];
    rows[0].condition = None;
    rows.push(aggregate_row("S2", None));

    write(
        rows,
        &destination,
        &[schema::columns::CONDITION.to_string()],
        ProteinGroupShape,
        &WriterConfig::default(),
        &HashMap::new(),
    )?;
    assert!(destination
        .join(format!("condition={}", NULL_PARTITION))
        .is_dir());
    assert!(destination.join("condition=ctrl").is_dir());
    Ok(())
}

#[test]
fn test_unknown_partition_field() {
    let dir = tempdir().unwrap();
    let result = write(
        psms(),
        &dir.path().join("out"),
        &["sample_accession".to_string()],
        PsmShape,
        &WriterConfig::default(),
        &HashMap::new(),
    );
    assert!(matches!(
        result,
        Err(WriterError::UnknownPartitionField { kind: "psm", .. })
    ));
}

#[test]
fn test_abandoned_write_leaves_nothing() -> Result<(), WriterError> {
    let dir = tempdir()?;
    let path = dir.path().join("out.parquet");
    {
        let mut writer =
            RecordWriter::create(&path, PsmShape, &WriterConfig::default(), &HashMap::new())?;
        writer.write_all(psms())?;
        writer.flush()?;
    }
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);

    {
        let mut writer = PartitionedWriter::create(
            dir.path().join("parts"),
            PsmShape,
            vec![schema::columns::RUN.to_string()],
            &WriterConfig::default(),
            &HashMap::new(),
        )?;
        writer.write_all(psms())?;
        assert_eq!(writer.partition_count(), 2);
    }
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[test]
fn test_existing_destination_is_refused() -> Result<(), WriterError> {
    let dir = tempdir()?;
    let path = dir.path().join("out.parquet");
    std::fs::write(&path, b"keep me")?;
    let result = RecordWriter::create(&path, PsmShape, &WriterConfig::default(), &HashMap::new());
    assert!(matches!(result, Err(WriterError::AlreadyExists(_))));
    assert_eq!(std::fs::read(&path)?, b"keep me");
    Ok(())
}

#[test]
fn test_flush_and_row_groups() -> Result<(), WriterError> {
    let dir = tempdir()?;
    let path = dir.path().join("out.parquet");
    let config = WriterConfig {
        row_group_size: 2,
        flush_rows: 2,
        ..WriterConfig::default()
    };
    let records: Vec<_> = (0..5).map(|i| record("PEPTIDEK", &["P1"], "A", i)).collect();

    let stats = write(records, &path, &[], PsmShape, &config, &HashMap::new())?;
    assert_eq!(stats.rows_written, 5);
    assert_eq!(stats.row_groups_written, 3);
    assert!(stats.file_size_bytes > 0);
    Ok(())
}

#[test]
fn test_partition_segment() {
    assert_eq!(partition_segment("run", Some("A_01")), "run=A_01");
    assert_eq!(partition_segment("run", Some("a/b c")), "run=a%2Fb%20c");
    assert_eq!(partition_segment("run", Some("..")), "run=%2E%2E");
    assert_eq!(partition_segment("run", Some("")), format!("run={}", EMPTY_PARTITION));
    assert_eq!(partition_segment("run", None), format!("run={}", NULL_PARTITION));
    assert_eq!(partition_segment("run", Some("__null__")), "run=%5F_null__");
    assert_eq!(partition_segment("run", Some("__empty__")), "run=%5F_empty__");
    assert_eq!(partition_segment("run", Some("__nullx")), "run=__nullx");
}

#[test]
fn test_sentinel_spelled_values_stay_disjoint() -> Result<(), WriterError> {
    let dir = tempdir()?;
    let destination = dir.path().join("out.pg");
    let conditions = [None, Some("__null__"), Some(""), Some("__empty__")];
    let rows: Vec<_> = conditions
        .iter()
        .enumerate()
        .map(|(i, condition)| {
            let mut row = aggregate_row(&format!("S{}", i), None);
            row.condition = condition.map(str::to_string);
            row
        })
        .collect();

    let stats = write(
        rows,
        &destination,
        &[schema::columns::CONDITION.to_string()],
        ProteinGroupShape,
        &WriterConfig::default(),
        &HashMap::new(),
    )?;
    assert_eq!(stats.files.len(), 4);
    for condition in conditions {
        let partition = destination.join(partition_segment("condition", condition));
        assert_eq!(row_count(&read_output(&partition)?), 1);
    }
    Ok(())
}

#[test]
fn test_open_partition_files_are_capped() -> Result<(), WriterError> {
    let dir = tempdir()?;
    let destination = dir.path().join("out.psm");
    let config = WriterConfig {
        max_open_partitions: 2,
        ..WriterConfig::default()
    };
    let runs = ["A", "B", "C", "D", "E"];
    let mut writer = PartitionedWriter::create(
        &destination,
        PsmShape,
        vec![schema::columns::RUN.to_string()],
        &config,
        &HashMap::new(),
    )?;
    for i in 0..20 {
        writer.write(record("PEPTIDEK", &["P1"], runs[i % runs.len()], i as u32))?;
        assert!(writer.open_files() <= 2);
    }
    assert_eq!(writer.partition_count(), runs.len());
    let stats = writer.finish()?;
    assert_eq!(stats.rows_written, 20);

    // Round-robin over five partitions reopens each one every pass
    assert_eq!(stats.files.len(), 20);
    assert!(destination.join("run=A").join(partition_file(3)).is_file());
    for run in runs {
        let batches = read_output(&destination.join(format!("run={}", run)))?;
        assert_eq!(row_count(&batches), 4);
        for batch in &batches {
            let column = batch
                .column_by_name(schema::columns::RUN)
                .unwrap()
                .as_string::<i32>();
            assert!(column.iter().all(|value| value == Some(run)));
        }
    }
    Ok(())
}

#[test]
fn test_output_namer() {
    let namer = OutputNamer::with_token("PXD000001", "abc");
    assert_eq!(namer.file_name(RecordKind::Psm), "PXD000001-abc.psm.parquet");
    assert_eq!(namer.file_name(RecordKind::ProteinGroup), "PXD000001-abc.pg.parquet");
    assert_eq!(namer.dir_name(RecordKind::Feature), "PXD000001-abc.feature");

    let random = OutputNamer::new("x");
    assert_eq!(random.token().len(), 32);
    assert_ne!(random.token(), OutputNamer::new("x").token());
}

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use arrow::array::{Array, AsArray};
use arrow::datatypes::Float64Type;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::tempdir;

use super::*;
use crate::aggregate::AggregationConfig;
use crate::fixtures::*;
use crate::index::IndexError;
use crate::loaders::QuantMap;
use crate::mztab::MzTabError;
use crate::transform::{ConfidencePolicy, TransformError};
use crate::writer::{read_output, schema::columns, OutputNamer, RecordKind};

const QUANT: &str = "\
ProteinName,PeptideSequence,PrecursorCharge,Intensity,Reference
P1,PEPTIDEK,2,100,A.mzML
P1,PEPTIDEK,2,50,B.mzML
";

fn mztab() -> String {
    mztab_text(
        &["A", "B"],
        &[
            ("PEPTIDEK", "1", "P1", 2, 1, 1, 0.001),
            ("PEPTIDEK", "2", "P1", 2, 2, 2, 0.001),
            ("ELVISK", "3", "P2", 2, 1, 3, 0.001),
        ],
    )
}

fn converter(config: ConversionConfig) -> Converter {
    Converter::new(config).with_namer(OutputNamer::with_token("test", "t0"))
}

fn topn_only() -> ConversionConfig {
    ConversionConfig {
        aggregation: AggregationConfig {
            topn: 1,
            topn_enabled: true,
            ibaq_enabled: false,
        },
        ..ConversionConfig::default()
    }
}

fn strings(batch: &RecordBatch, column: &str) -> Vec<String> {
    let array = batch.column_by_name(column).unwrap().as_string::<i32>();
    (0..array.len()).map(|i| array.value(i).to_string()).collect()
}

#[test]
fn test_protein_groups_topn_per_run() {
    let dir = tempdir().unwrap();
    let index = build_index(&dir.path().join("index"), &mztab());
    let quant = QuantMap::from_reader(Cursor::new(QUANT)).unwrap();
    let samples = label_free_samples(&["A", "B"]);

    let out = dir.path().join("out");
    let stats = converter(topn_only())
        .convert_protein_groups(&index, &quant, &samples, None, &out)
        .unwrap();
    assert_eq!(stats.kind, RecordKind::ProteinGroup);
    assert_eq!(stats.protein_groups, Some(3));
    assert_eq!(stats.output, out.join("test-t0.pg.parquet"));

    let batches = read_output(&stats.output).unwrap();
    let batch = &batches[0];
    assert_eq!(strings(batch, columns::PROTEIN_GROUP), vec!["P1", "P1", "P2"]);
    assert_eq!(strings(batch, columns::SAMPLE_ACCESSION), vec!["S_A", "S_B", "S_A"]);

    let topn = batch
        .column_by_name(columns::TOPN_INTENSITY)
        .unwrap()
        .as_primitive::<Float64Type>();
    assert_eq!(topn.value(0), 100.0);
    assert_eq!(topn.value(1), 50.0);
    // P2 was identified but never quantified
    assert!(topn.is_null(2));
}

#[test]
fn test_psm_output_applies_threshold() {
    let dir = tempdir().unwrap();
    let text = mztab_text(
        &["A"],
        &[
            ("PEPTIDEK", "1", "P1", 2, 1, 1, 0.001),
            ("ELVISK", "2", "P1", 2, 1, 2, 0.02),
            ("LIVESK", "3", "P1", 2, 1, 3, 0.5),
        ],
    );
    let index = build_index(&dir.path().join("index"), &text);

    let stats = converter(ConversionConfig::default())
        .convert_psms(&index, dir.path())
        .unwrap();
    assert_eq!(stats.transform.records_in, 3);
    assert_eq!(stats.transform.records_filtered, 2);
    assert_eq!(stats.writer.rows_written, 1);

    let batches = read_output(&stats.output).unwrap();
    assert_eq!(strings(&batches[0], columns::SEQUENCE), vec!["PEPTIDEK"]);

    let file = std::fs::File::open(&stats.output).unwrap();
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
    let confidence = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kv| kv.iter().find(|e| e.key == "qpx:confidence"))
        .and_then(|e| e.value.clone());
    assert_eq!(confidence, Some(ConversionConfig::default().policy().describe()));
}

#[test]
fn test_features_keep_unquantified_records() {
    let dir = tempdir().unwrap();
    let index = build_index(&dir.path().join("index"), &mztab());
    let quant = QuantMap::from_reader(Cursor::new(QUANT)).unwrap();
    let samples = label_free_samples(&["A", "B"]);

    let stats = converter(ConversionConfig::default())
        .convert_features(&index, &quant, Some(&samples), dir.path())
        .unwrap();
    assert_eq!(stats.writer.rows_written, 3);
    assert_eq!(stats.transform.records_without_quant, 1);

    let batches = read_output(&stats.output).unwrap();
    let intensity = batches[0]
        .column_by_name(columns::INTENSITY)
        .unwrap()
        .as_primitive::<Float64Type>();
    assert_eq!(intensity.value(0), 100.0);
    assert_eq!(intensity.value(1), 50.0);
    assert!(intensity.is_null(2));
}

#[test]
fn test_unresolved_run_fails_in_transform_stage() {
    let dir = tempdir().unwrap();
    let text = mztab_text(&["R9"], &[("PEPTIDEK", "1", "P1", 2, 1, 1, 0.001)]);
    let index = build_index(&dir.path().join("index"), &text);
    let samples = label_free_samples(&["A"]);

    let out = dir.path().join("out");
    let err = converter(ConversionConfig::default())
        .convert_features(&index, &QuantMap::empty(), Some(&samples), &out)
        .unwrap_err();
    assert_eq!(err.stage(), "transform");
    assert!(err.to_string().starts_with("[transform]"));
    assert!(err.to_string().contains("R9"));
    match err {
        ConversionError::Transform(TransformError::UnresolvedSample(e)) => assert_eq!(e.run, "R9"),
        other => panic!("unexpected error: {other}"),
    }
    // Nothing was left behind
    assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
}

#[test]
fn test_prepare_index_build_and_reuse() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("input.mzTab");
    std::fs::write(&source, mztab()).unwrap();
    let index_dir = dir.path().join("index");
    let converter = converter(ConversionConfig::default());

    let built = converter
        .prepare_index(Some(&source), &index_dir, IndexMode::Build { overwrite: false })
        .unwrap();
    assert_eq!(built.psm_count(), 3);
    drop(built);

    let err = converter
        .prepare_index(Some(&source), &index_dir, IndexMode::Build { overwrite: false })
        .unwrap_err();
    assert_eq!(err.stage(), "index");
    assert!(matches!(err, ConversionError::Index(IndexError::AlreadyExists(_))));

    let reused = converter
        .prepare_index(None, &index_dir, IndexMode::Reuse)
        .unwrap();
    assert_eq!(reused.psm_count(), 3);
    assert_eq!(
        reused.manifest().source_file.as_deref(),
        Some(source.display().to_string().as_str())
    );

    let err = converter
        .prepare_index(None, &index_dir, IndexMode::Build { overwrite: true })
        .unwrap_err();
    assert_eq!(err.stage(), "config");
}

#[test]
fn test_parse_errors_report_read_stage() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("bad.mzTab");
    let mut text = mztab();
    text.push_str("PSM\tPEPTIDEK\t4\tP1\tnull\tnot-a-charge\tms_run[1]:scan=4\t0.001\n");
    std::fs::write(&source, text).unwrap();

    let err = converter(ConversionConfig::default())
        .prepare_index(Some(&source), &dir.path().join("index"), IndexMode::Build { overwrite: false })
        .unwrap_err();
    assert_eq!(err.stage(), "read");
    assert!(err.is_recoverable());
    assert!(matches!(err, ConversionError::Read(MzTabError::Parse { .. })));

    let skip = ConversionConfig {
        parse_policy: crate::mztab::ParsePolicy::Skip,
        ..ConversionConfig::default()
    };
    let index = converter(skip)
        .prepare_index(Some(&source), &dir.path().join("index2"), IndexMode::Build { overwrite: false })
        .unwrap();
    assert_eq!(index.psm_count(), 3);
    assert_eq!(index.manifest().skipped_lines, 1);
}

#[test]
fn test_partitioned_features() {
    let dir = tempdir().unwrap();
    let index = build_index(&dir.path().join("index"), &mztab());
    let samples = label_free_samples(&["A", "B"]);
    let config = ConversionConfig {
        partition_fields: vec![columns::SAMPLE_ACCESSION.to_string()],
        ..ConversionConfig::default()
    };

    let stats = converter(config)
        .convert_features(&index, &QuantMap::empty(), Some(&samples), dir.path())
        .unwrap();
    assert_eq!(stats.output, dir.path().join("test-t0.feature"));
    assert_eq!(stats.writer.files.len(), 2);
    assert!(stats.output.join("sample_accession=S_A").is_dir());

    let total: usize = read_output(&stats.output)
        .unwrap()
        .iter()
        .map(|b| b.num_rows())
        .sum();
    assert_eq!(total, 3);
}

#[test]
fn test_unknown_partition_field_is_write_error() {
    let dir = tempdir().unwrap();
    let index = build_index(&dir.path().join("index"), &mztab());
    let config = ConversionConfig {
        partition_fields: vec!["nonsense".to_string()],
        ..ConversionConfig::default()
    };
    let err = converter(config).convert_psms(&index, dir.path()).unwrap_err();
    assert_eq!(err.stage(), "write");
}

#[test]
fn test_ibaq_without_counter_fails() {
    let dir = tempdir().unwrap();
    let index = build_index(&dir.path().join("index"), &mztab());
    let samples = label_free_samples(&["A", "B"]);
    let err = converter(ConversionConfig::default())
        .convert_protein_groups(&index, &QuantMap::empty(), &samples, None, dir.path())
        .unwrap_err();
    assert_eq!(err.stage(), "aggregate");
}

#[test]
fn test_cancellation_between_batches() {
    let dir = tempdir().unwrap();
    let index = build_index(&dir.path().join("index"), &mztab());
    let flag = Arc::new(AtomicBool::new(true));
    let out = dir.path().join("out");

    let err = converter(ConversionConfig::default())
        .with_cancel_flag(flag)
        .convert_psms(&index, &out)
        .unwrap_err();
    assert!(matches!(err, ConversionError::Cancelled { .. }));
    assert!(!Path::new(&out).join("test-t0.psm.parquet").exists());
}

#[test]
fn test_confidence_thresholds() {
    let base = record("PEPTIDEK", &["P1"], "A", 1);
    let mut decoy = base.clone();
    decoy.is_decoy = true;

    let policy = ConversionConfig::default().policy();
    assert!(policy.accepts(&base));
    assert!(!policy.accepts(&decoy));

    let keep = ConversionConfig {
        include_decoys: true,
        confidence: ConfidenceThreshold::None,
        ..ConversionConfig::default()
    };
    assert!(keep.policy().accepts(&decoy));

    let mut weak = base.clone();
    weak.posterior_error_probability = Some(0.2);
    assert!(!ConfidenceThreshold::Pep(0.05).to_policy().accepts(&weak));
    assert!(ConfidenceThreshold::QValue(0.01).to_policy().accepts(&base));
}

#[test]
fn test_config_from_toml() {
    let config: ConversionConfig = toml::from_str(
        r#"
        batch_size = 500
        partition_fields = ["run"]
        quant_mode = "labeled"
        confidence = { pep = 0.05 }

        [aggregation]
        topn = 5
        ibaq_enabled = false
        "#,
    )
    .unwrap();
    assert_eq!(config.batch_size, 500);
    assert_eq!(config.partition_fields, vec!["run"]);
    assert_eq!(config.confidence, ConfidenceThreshold::Pep(0.05));
    assert_eq!(config.aggregation.topn, 5);
    assert!(config.aggregation.topn_enabled);
    assert_eq!(config.output_prefix, "qpx");
}

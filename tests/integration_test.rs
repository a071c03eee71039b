//! Integration tests for qpx
//!
//! These tests run the full pipeline from mzTab, MSstats and SDRF files on
//! disk to the Parquet outputs.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use arrow::array::{Array, AsArray};
use arrow::datatypes::Float64Type;
use arrow::record_batch::RecordBatch;
use flate2::write::GzEncoder;
use flate2::Compression;
use parquet::file::reader::{FileReader, SerializedFileReader};
use tempfile::tempdir;

use qpx::aggregate::TheoreticalPeptideCounter;
use qpx::convert::{ConversionConfig, ConversionError, Converter, IndexMode};
use qpx::index::IndexError;
use qpx::writer::schema::columns;
use qpx::writer::{metadata_keys, read_output, OutputNamer, OUTPUT_FORMAT_VERSION};

const MZTAB: &str = "\
MTD\tmzTab-version\t1.0.0
MTD\tmzTab-mode\tSummary
MTD\tms_run[1]-location\tfile:///data/A.mzML
MTD\tms_run[2]-location\tfile:///data/B.mzML
PRH\taccession\tdescription
PRT\tP1\tProtein one
PRT\tP2\tProtein two
PSH\tsequence\tPSM_ID\taccession\tmodifications\tretention_time\tcharge\texp_mass_to_charge\tcalc_mass_to_charge\tspectra_ref\tsearch_engine_score[1]\topt_global_q-value\topt_global_Posterior_Error_Probability_score\topt_global_cv_MS:1002217_decoy_peptide
PSM\tPEPTIDEK\t1\tP1\tnull\t120.5\t2\t465.24\t465.23\tms_run[1]:scan=10\t55.1\t0.001\t0.0001\t0
PSM\tPEPTIDEK\t2\tP1\tnull\t121.0\t2\t465.24\t465.23\tms_run[2]:scan=11\t50.3\t0.002\t0.0002\t0
PSM\tPEPTMIDEK\t3\tP1\t5-UNIMOD:35\t300.2\t3\t338.16\t338.16\tms_run[1]:scan=20\t40.0\t0.004\t0.001\t0
PSM\tELVISLIVESK\t4\tP2\tnull\t410.7\t2\t615.37\t615.37\tms_run[1]:scan=30\t35.2\t0.005\t0.002\t0
PSM\tSHAREDK\t5\tP1\tnull\t95.3\t2\t396.70\t396.70\tms_run[2]:scan=40\t30.0\t0.003\t0.002\t0
PSM\tSHAREDK\t5\tP2\tnull\t95.3\t2\t396.70\t396.70\tms_run[2]:scan=40\t30.0\t0.003\t0.002\t0
PSM\tDECOYK\t6\tDECOY_P3\tnull\t50.0\t2\t300.10\t300.10\tms_run[1]:scan=50\t45.0\t0.001\t0.001\t1
PSM\tWEAKK\t7\tP2\tnull\t70.0\t2\t310.10\t310.10\tms_run[2]:scan=60\t5.0\t0.5\t0.9\t0
";

const QUANT: &str = "\
ProteinName,PeptideSequence,PrecursorCharge,Intensity,Reference,Condition,BioReplicate
P1,PEPTIDEK,2,1000,A.mzML,normal,1
P1,PEPTIDEK,2,500,B.mzML,tumor,2
P1,PEPTM(Oxidation)IDEK,3,3000,A.mzML,normal,1
P2,ELVISLIVESK,2,800,A.mzML,normal,1
";

const SDRF: &str = "\
source name\tcharacteristics[biological replicate]\tcomment[technical replicate]\tcomment[data file]\tcomment[label]\tfactor value[disease]
S_A\t1\t1\tA.raw\tlabel free sample\tnormal
S_B\t2\t1\tB.raw\tlabel free sample\ttumor
";

const FASTA: &str = "\
>sp|P1|PROT1_HUMAN Protein one
MAAAAAAAKGGGGGGGGR
LLLLLLLK
>sp|P2|PROT2_HUMAN Protein two
MKWVTFISLLLLFSSAYSR
";

struct Inputs {
    mztab: std::path::PathBuf,
    quant: std::path::PathBuf,
    sdrf: std::path::PathBuf,
    fasta: std::path::PathBuf,
}

fn write_inputs(dir: &Path) -> Inputs {
    let mztab = dir.join("PXD000001.mzTab.gz");
    let mut encoder = GzEncoder::new(File::create(&mztab).unwrap(), Compression::default());
    encoder.write_all(MZTAB.as_bytes()).unwrap();
    encoder.finish().unwrap();

    let quant = dir.join("msstats_in.csv");
    fs::write(&quant, QUANT).unwrap();
    let sdrf = dir.join("PXD000001.sdrf.tsv");
    fs::write(&sdrf, SDRF).unwrap();
    let fasta = dir.join("proteins.fasta");
    fs::write(&fasta, FASTA).unwrap();

    Inputs {
        mztab,
        quant,
        sdrf,
        fasta,
    }
}

fn converter() -> Converter {
    Converter::new(ConversionConfig::default()).with_namer(OutputNamer::with_token("qpx", "run1"))
}

fn strings(batch: &RecordBatch, column: &str) -> Vec<Option<String>> {
    let array = batch.column_by_name(column).unwrap().as_string::<i32>();
    (0..array.len())
        .map(|i| (!array.is_null(i)).then(|| array.value(i).to_string()))
        .collect()
}

fn floats(batch: &RecordBatch, column: &str) -> Vec<Option<f64>> {
    let array = batch
        .column_by_name(column)
        .unwrap()
        .as_primitive::<Float64Type>();
    (0..array.len())
        .map(|i| (!array.is_null(i)).then(|| array.value(i)))
        .collect()
}

fn footer(path: &Path) -> HashMap<String, String> {
    let reader = SerializedFileReader::new(File::open(path).unwrap()).unwrap();
    reader
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .unwrap()
        .iter()
        .map(|kv| (kv.key.clone(), kv.value.clone().unwrap_or_default()))
        .collect()
}

fn single_batch(path: &Path) -> RecordBatch {
    let batches = read_output(path).unwrap();
    assert_eq!(batches.len(), 1);
    batches.into_iter().next().unwrap()
}

/// One index build serves all three outputs
#[test]
fn test_full_pipeline() {
    let dir = tempdir().unwrap();
    let inputs = write_inputs(dir.path());
    let index_dir = dir.path().join("index");
    let out = dir.path().join("out");
    let converter = converter();

    let index = converter
        .prepare_index(
            Some(&inputs.mztab),
            &index_dir,
            IndexMode::Build { overwrite: false },
        )
        .unwrap();
    // SHAREDK's two protein rows collapse into one record
    assert_eq!(index.psm_count(), 7);
    assert_eq!(index.manifest().ms_runs.len(), 2);

    // PSM output
    let psms = converter.convert_psms(&index, &out).unwrap();
    assert_eq!(psms.output, out.join("qpx-run1.psm.parquet"));
    assert_eq!(psms.transform.records_in, 7);
    assert_eq!(psms.writer.rows_written, 5);
    let batch = single_batch(&psms.output);
    assert_eq!(
        strings(&batch, columns::SEQUENCE),
        ["PEPTIDEK", "PEPTIDEK", "PEPTMIDEK", "ELVISLIVESK", "SHAREDK"]
            .map(|s| Some(s.to_string()))
    );
    assert_eq!(
        strings(&batch, columns::PEPTIDOFORM)[2].as_deref(),
        Some("PEPTM[UNIMOD:35]IDEK")
    );
    assert_eq!(
        strings(&batch, columns::PROTEIN_GROUP)[4].as_deref(),
        Some("P1;P2")
    );
    assert_eq!(
        strings(&batch, columns::RUN),
        ["A", "B", "A", "A", "B"].map(|s| Some(s.to_string()))
    );

    let meta = footer(&psms.output);
    assert_eq!(meta[metadata_keys::FORMAT_VERSION], OUTPUT_FORMAT_VERSION);
    assert_eq!(meta[metadata_keys::RECORD_KIND], "psm");
    assert!(meta[metadata_keys::SOURCE_FILE].ends_with("PXD000001.mzTab.gz"));
    assert!(meta.contains_key(metadata_keys::CREATED));

    // Feature output
    let quant = converter.load_quant(&inputs.quant).unwrap();
    let samples = converter.load_samples(&inputs.sdrf).unwrap();
    let features = converter
        .convert_features(&index, &quant, Some(&samples), &out)
        .unwrap();
    assert_eq!(features.writer.rows_written, 5);
    assert_eq!(features.transform.records_without_quant, 1);
    let batch = single_batch(&features.output);
    assert_eq!(
        floats(&batch, columns::INTENSITY),
        vec![Some(1000.0), Some(500.0), Some(3000.0), Some(800.0), None]
    );
    assert_eq!(
        strings(&batch, columns::SAMPLE_ACCESSION),
        ["S_A", "S_B", "S_A", "S_A", "S_B"].map(|s| Some(s.to_string()))
    );
    assert_eq!(
        strings(&batch, columns::CONDITION)[1].as_deref(),
        Some("tumor")
    );

    // Protein group output
    let counter = converter.load_fasta(&inputs.fasta).unwrap();
    let count = |accession| counter.theoretical_peptide_count(accession).map(|n| n.get());
    assert_eq!(count("P1"), Some(3));
    assert_eq!(count("P2"), Some(1));
    let groups = converter
        .convert_protein_groups(
            &index,
            &quant,
            &samples,
            Some(&counter as &dyn TheoreticalPeptideCounter),
            &out,
        )
        .unwrap();
    assert_eq!(groups.protein_groups, Some(4));
    let batch = single_batch(&groups.output);
    assert_eq!(
        strings(&batch, columns::PROTEIN_GROUP),
        ["P1", "P1", "P2", "P1;P2"].map(|s| Some(s.to_string()))
    );
    assert_eq!(
        strings(&batch, columns::SAMPLE_ACCESSION),
        ["S_A", "S_B", "S_A", "S_B"].map(|s| Some(s.to_string()))
    );
    assert_eq!(
        floats(&batch, columns::TOPN_INTENSITY),
        vec![Some(2000.0), Some(500.0), Some(800.0), None]
    );
    let ibaq = floats(&batch, columns::IBAQ_INTENSITY);
    assert!((ibaq[0].unwrap() - 4000.0 / 3.0).abs() < 1e-9);
    assert!((ibaq[1].unwrap() - 500.0 / 3.0).abs() < 1e-9);
    assert_eq!(ibaq[2], Some(800.0));
    assert_eq!(ibaq[3], None);
    assert_eq!(
        strings(&batch, columns::DESCRIPTION)[0].as_deref(),
        Some("Protein one")
    );

    let meta = footer(&groups.output);
    assert_eq!(meta[metadata_keys::RECORD_KIND], "protein_group");
    assert_eq!(meta["qpx:topn"], "3");
    assert_eq!(meta["qpx:ibaq_enabled"], "true");

    // Every output shares the uniqueness token
    let mut names: Vec<String> = fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "qpx-run1.feature.parquet",
            "qpx-run1.pg.parquet",
            "qpx-run1.psm.parquet"
        ]
    );
}

/// A reused index yields byte-for-byte the same records as a fresh build
#[test]
fn test_reused_index_matches_fresh_build() {
    let dir = tempdir().unwrap();
    let inputs = write_inputs(dir.path());
    let index_dir = dir.path().join("index");

    let fresh = converter()
        .prepare_index(
            Some(&inputs.mztab),
            &index_dir,
            IndexMode::Build { overwrite: false },
        )
        .unwrap();
    let first = converter()
        .convert_psms(&fresh, &dir.path().join("first"))
        .unwrap();
    drop(fresh);

    let reused = converter()
        .prepare_index(None, &index_dir, IndexMode::Reuse)
        .unwrap();
    let second = converter()
        .convert_psms(&reused, &dir.path().join("second"))
        .unwrap();

    assert_eq!(
        read_output(&first.output).unwrap(),
        read_output(&second.output).unwrap()
    );
}

#[test]
fn test_rebuild_needs_overwrite() {
    let dir = tempdir().unwrap();
    let inputs = write_inputs(dir.path());
    let index_dir = dir.path().join("index");
    let build = |overwrite| {
        converter().prepare_index(Some(&inputs.mztab), &index_dir, IndexMode::Build { overwrite })
    };

    build(false).unwrap();
    match build(false) {
        Err(ConversionError::Index(IndexError::AlreadyExists(path))) => assert_eq!(path, index_dir),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("second build succeeded"),
    }
    assert_eq!(build(true).unwrap().psm_count(), 7);
}

#[test]
fn test_reuse_of_missing_index_fails() {
    let dir = tempdir().unwrap();
    let err = converter()
        .prepare_index(None, &dir.path().join("nothing"), IndexMode::Reuse)
        .unwrap_err();
    assert_eq!(err.stage(), "index");
    assert!(matches!(err, ConversionError::Index(IndexError::NotFound(_))));
}

/// Partitioned protein groups by condition, read back through the hive layout
#[test]
fn test_partitioned_protein_groups() {
    let dir = tempdir().unwrap();
    let inputs = write_inputs(dir.path());
    let mut config = ConversionConfig::default();
    config.partition_fields = vec![columns::CONDITION.to_string()];
    config.aggregation.ibaq_enabled = false;
    let converter = Converter::new(config).with_namer(OutputNamer::with_token("qpx", "part"));

    let index = converter
        .prepare_index(
            Some(&inputs.mztab),
            &dir.path().join("index"),
            IndexMode::Build { overwrite: false },
        )
        .unwrap();
    let quant = converter.load_quant(&inputs.quant).unwrap();
    let samples = converter.load_samples(&inputs.sdrf).unwrap();
    let stats = converter
        .convert_protein_groups(&index, &quant, &samples, None, &dir.path().join("out"))
        .unwrap();

    assert_eq!(stats.output, dir.path().join("out").join("qpx-part.pg"));
    for condition in ["normal", "tumor"] {
        let partition = stats.output.join(format!("condition={}", condition));
        let batch = single_batch(&partition);
        assert!(strings(&batch, columns::CONDITION)
            .iter()
            .all(|c| c.as_deref() == Some(condition)));
    }
    assert_eq!(stats.writer.rows_written, 4);
}

#[test]
fn test_missing_quant_column_reports_load_stage() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    fs::write(&path, "ProteinName,PeptideSequence,Intensity\nP1,PEPTIDEK,10\n").unwrap();
    let err = converter().load_quant(&path).unwrap_err();
    assert_eq!(err.stage(), "load-quant");
    assert!(err.to_string().starts_with("[load-quant]"));
}

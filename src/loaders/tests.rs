use std::io::Cursor;

use super::*;

const MSSTATS_CSV: &str = "\
ProteinName,PeptideSequence,PrecursorCharge,FragmentIon,ProductCharge,IsotopeLabelType,Condition,BioReplicate,Run,Intensity,Reference
P2;P1,.(Acetyl)PEPM(Oxidation)TIDEK.,2,NA,0,L,control,1,1,1000.5,RunA.mzML
P1,ELVISK,3,NA,0,L,treated,2,2,NA,RunB.mzML
P1,ELVISK,3,NA,0,L,treated,2,2,-5,RunB.mzML
P1,ELVISK,3,NA,0,L,treated,2,2,250,RunB.mzML
";

const SDRF: &str = "\
Source name\tcharacteristics[organism]\tcharacteristics[biological replicate]\tcomment[data file]\tcomment[label]\tcomment[technical replicate]\tcomment[fraction identifier]\tfactor value[treatment]\tfactor value[time]
S1\thuman\t1\tRunA.raw\tlabel free sample\t1\t1\tcontrol\t0h
S2\thuman\t2\tRunB.raw\tlabel free sample\t1\t1\ttreated\t24h
";

const SDRF_TMT: &str = "\
source name\tcomment[data file]\tcomment[label]\tfactor value[disease]
S1\tplex1.raw\tTMT126\tnormal
S2\tplex1.raw\tTMT127N\tcancer
";

#[test]
fn test_quant_map_csv() {
    let map = QuantMap::from_reader(Cursor::new(MSSTATS_CSV)).unwrap();
    assert_eq!(map.len(), 4);
    assert_eq!(map.key_count(), 2);

    let key = QuantKey {
        protein: "P1;P2".to_string(),
        peptide: "PEPMTIDEK".to_string(),
        charge: 2,
        run: "RunA".to_string(),
    };
    let entries = map.get(&key);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].intensity, Intensity::Value(1000.5));
    assert_eq!(entries[0].modified_peptide, ".(Acetyl)PEPM(Oxidation)TIDEK.");
    assert_eq!(entries[0].condition.as_deref(), Some("control"));
    assert_eq!(entries[0].channel.as_deref(), Some("L"));

    let elvis = map.get(&QuantKey {
        protein: "P1".to_string(),
        peptide: "ELVISK".to_string(),
        charge: 3,
        run: "RunB".to_string(),
    });
    let intensities: Vec<Intensity> = elvis.iter().map(|e| e.intensity).collect();
    assert_eq!(
        intensities,
        vec![Intensity::Missing, Intensity::Missing, Intensity::Value(250.0)]
    );
    // File order is kept and ids are unique
    assert!(elvis.windows(2).all(|w| w[0].entry_id < w[1].entry_id));
}

#[test]
fn test_quant_map_tsv_with_run_column() {
    let tsv = "ProteinName\tPeptideSequence\tPrecursorCharge\tRun\tIntensity\n\
               P1\tPEPTIDE\t2\tR1\t10\n";
    let map = QuantMap::from_reader(Cursor::new(tsv)).unwrap();
    let key = QuantKey {
        protein: "P1".to_string(),
        peptide: "PEPTIDE".to_string(),
        charge: 2,
        run: "R1".to_string(),
    };
    assert_eq!(map.get(&key).len(), 1);
}

#[test]
fn test_quant_map_errors() {
    let missing = "ProteinName,PeptideSequence,Intensity,Run\nP1,PEPTIDE,1,R1\n";
    match QuantMap::from_reader(Cursor::new(missing)) {
        Err(LoaderError::MissingColumn(column)) => assert_eq!(column, "precursorcharge"),
        other => panic!("unexpected result: {other:?}"),
    }

    let bad_charge = "ProteinName,PeptideSequence,PrecursorCharge,Intensity,Run\nP1,PEPTIDE,x,1,R1\n";
    match QuantMap::from_reader(Cursor::new(bad_charge)) {
        Err(LoaderError::InvalidRow { line, .. }) => assert_eq!(line, 2),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_strip_peptide() {
    assert_eq!(strip_peptide(".(Acetyl)PEPM(Oxidation)TIDEK."), "PEPMTIDEK");
    assert_eq!(strip_peptide("_PEPM[+15.99]TIDEK_"), "PEPMTIDEK");
    assert_eq!(strip_peptide("PEPC(UniMod:4(x))K"), "PEPCK");
}

#[test]
fn test_intensity_states() {
    assert_eq!(Intensity::from_option(Some(0.0)), Intensity::Value(0.0));
    assert_eq!(Intensity::from_option(Some(-1.0)), Intensity::Missing);
    assert_eq!(Intensity::from_option(Some(f64::NAN)), Intensity::Missing);
    assert_eq!(Intensity::from_option(None), Intensity::Missing);
    assert_eq!(Intensity::Value(3.0).value(), Some(3.0));
    assert!(Intensity::Missing.is_missing());
}

#[test]
fn test_sample_map_label_free() {
    let map = SampleMap::from_reader(Cursor::new(SDRF)).unwrap();
    assert_eq!(map.runs(), vec!["RunA", "RunB"]);

    let run_a = map.resolve("RunA").unwrap();
    assert!(!run_a.is_multiplexed());
    let sample = run_a.sample_for_channel(Some("anything")).unwrap();
    assert_eq!(sample.sample_accession, "S1");
    assert_eq!(sample.condition.as_deref(), Some("control|0h"));
    assert_eq!(sample.biological_replicate.as_deref(), Some("1"));
    assert_eq!(sample.fraction.as_deref(), Some("1"));
}

#[test]
fn test_sample_map_channels() {
    let map = SampleMap::from_reader(Cursor::new(SDRF_TMT)).unwrap();
    let plex = map.resolve("plex1").unwrap();
    assert!(plex.is_multiplexed());
    assert!(plex.single_sample().is_none());
    assert_eq!(
        plex.sample_for_channel(Some("tmt127n")).map(|s| s.sample_accession.as_str()),
        Some("S2")
    );
    assert!(plex.sample_for_channel(None).is_none());
    assert!(plex.sample_for_channel(Some("TMT128")).is_none());
}

#[test]
fn test_unresolved_run() {
    let map = SampleMap::from_reader(Cursor::new(SDRF)).unwrap();
    let err = map.resolve("R9").unwrap_err();
    assert_eq!(err.run, "R9");
    assert!(err.to_string().contains("\"R9\""));
}

#[test]
fn test_sample_map_duplicate_and_missing_columns() {
    let duplicate = format!("{}S3\tplex1.raw\tTMT126\tnormal\n", SDRF_TMT);
    assert!(matches!(
        SampleMap::from_reader(Cursor::new(duplicate)),
        Err(LoaderError::DuplicateSample { .. })
    ));

    let no_file = "source name\tcomment[label]\nS1\tTMT126\n";
    match SampleMap::from_reader(Cursor::new(no_file)) {
        Err(LoaderError::MissingColumn(column)) => assert_eq!(column, "comment[data file]"),
        other => panic!("unexpected result: {other:?}"),
    }
}

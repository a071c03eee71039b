use tempfile::tempdir;

use super::*;
use crate::fixtures::*;
use crate::loaders::{Intensity, QuantMap, SampleDescriptor, SampleMap};

fn collect(iter: JoinTransform<'_>) -> Vec<UnifiedFeatureRecord> {
    iter.flat_map(|batch| batch.unwrap()).collect()
}

#[test]
fn test_q_value_threshold() {
    let dir = tempdir().unwrap();
    let text = mztab_text(
        &["A"],
        &[
            ("PEPTIDEK", "1", "P1", 2, 1, 1, 0.001),
            ("ELVISK", "2", "P1", 2, 1, 2, 0.02),
            ("SAMPLER", "3", "P1", 2, 1, 3, 0.5),
        ],
    );
    let index = build_index(dir.path(), &text);
    let quant = QuantMap::empty();
    let policy = QValueCutoff::new(0.01);

    let mut iter = transform(&index, &quant, None, 100, &policy).unwrap();
    let records: Vec<_> = iter.by_ref().flat_map(|b| b.unwrap()).collect();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].identification.sequence, "PEPTIDEK");
    assert_eq!(iter.stats().records_in, 3);
    assert_eq!(iter.stats().records_filtered, 2);
    assert_eq!(iter.stats().records_out, 1);
}

#[test]
fn test_missing_quant_is_kept_as_missing() {
    let dir = tempdir().unwrap();
    let text = mztab_text(
        &["A", "B"],
        &[
            ("PEPTIDEK", "1", "P1", 2, 1, 1, 0.001),
            ("PEPTIDEK", "2", "P1", 2, 2, 1, 0.001),
        ],
    );
    let index = build_index(dir.path(), &text);

    let mut quant = QuantMap::empty();
    let first = record("PEPTIDEK", &["P1"], "A", 1);
    quant.insert(quant_entry(0, &first, None, Intensity::Value(100.0)));

    let samples = label_free_samples(&["A", "B"]);
    let records = collect(transform(&index, &quant, Some(&samples), 10, &AcceptAll).unwrap());

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].intensity(), Intensity::Value(100.0));
    assert!(!records[1].has_quant());
    assert_eq!(records[1].intensity(), Intensity::Missing);
    assert_eq!(
        records[1].single_sample().map(|s| s.sample_accession.as_str()),
        Some("S_B")
    );
}

#[test]
fn test_unresolved_run_is_fatal() {
    let dir = tempdir().unwrap();
    let text = mztab_text(
        &["A", "R9"],
        &[
            ("PEPTIDEK", "1", "P1", 2, 1, 1, 0.001),
            ("ELVISK", "2", "P1", 2, 2, 1, 0.001),
        ],
    );
    let index = build_index(dir.path(), &text);
    let quant = QuantMap::empty();
    let samples = label_free_samples(&["A"]);

    let mut iter = transform(&index, &quant, Some(&samples), 10, &AcceptAll).unwrap();
    let err = iter.next().unwrap().unwrap_err();
    match &err {
        TransformError::UnresolvedSample(e) => assert_eq!(e.run, "R9"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("R9"));
    assert!(iter.next().is_none());
}

#[test]
fn test_order_and_batching() {
    let dir = tempdir().unwrap();
    let rows: Vec<(String, String)> = (0..7)
        .map(|i| (format!("PEPTIDE{}K", "A".repeat(i)), i.to_string()))
        .collect();
    let psm_rows: Vec<_> = rows
        .iter()
        .enumerate()
        .map(|(i, (seq, id))| (seq.as_str(), id.as_str(), "P1", 2, 1, i as u32, 0.001))
        .collect();
    let index = build_index(dir.path(), &mztab_text(&["A"], &psm_rows));
    let quant = QuantMap::empty();

    let batches: Vec<Vec<UnifiedFeatureRecord>> = transform(&index, &quant, None, 3, &AcceptAll)
        .unwrap()
        .map(|b| b.unwrap())
        .collect();
    assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 1]);

    let ids: Vec<String> = batches
        .into_iter()
        .flatten()
        .map(|r| r.identification.psm_id)
        .collect();
    assert_eq!(ids, (0..7).map(|i| i.to_string()).collect::<Vec<_>>());
}

#[test]
fn test_unknown_channel_in_multiplexed_run() {
    let dir = tempdir().unwrap();
    let text = mztab_text(&["plex"], &[("PEPTIDEK", "1", "P1", 2, 1, 1, 0.001)]);
    let index = build_index(dir.path(), &text);

    let id = record("PEPTIDEK", &["P1"], "plex", 1);
    let mut quant = QuantMap::empty();
    quant.insert(quant_entry(0, &id, Some("TMT126"), Intensity::Value(1.0)));
    quant.insert(quant_entry(1, &id, Some("TMT131"), Intensity::Value(2.0)));

    let samples = SampleMap::from_descriptors([SampleDescriptor {
        run: "plex".to_string(),
        data_file: "plex.raw".to_string(),
        channels: vec![sample("S1", Some("TMT126")), sample("S2", Some("TMT127"))],
    }]);

    let err = transform(&index, &quant, Some(&samples), 10, &AcceptAll)
        .unwrap()
        .next()
        .unwrap()
        .unwrap_err();
    match err {
        TransformError::UnresolvedSample(e) => assert_eq!(e.channel.as_deref(), Some("TMT131")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_policies() {
    let mut r = record("PEPTIDEK", &["P1"], "A", 1);

    r.q_value = Some(0.01);
    assert!(QValueCutoff::new(0.01).accepts(&r));
    r.q_value = None;
    assert!(!QValueCutoff::new(0.01).accepts(&r));
    assert!(QValueCutoff {
        max_q_value: 0.01,
        keep_missing: true
    }
    .accepts(&r));

    r.posterior_error_probability = Some(0.2);
    assert!(!PepCutoff::new(0.05).accepts(&r));
    assert!(PepCutoff::new(0.2).accepts(&r));

    r.search_engine_score = Some(40.0);
    let higher = ScoreCutoff {
        threshold: 30.0,
        direction: ScoreDirection::HigherIsBetter,
        keep_missing: false,
    };
    let lower = ScoreCutoff {
        direction: ScoreDirection::LowerIsBetter,
        ..higher
    };
    assert!(higher.accepts(&r));
    assert!(!lower.accepts(&r));
    assert!(higher.describe().contains(">= 30"));

    assert!(AcceptAll.accepts(&r));
}

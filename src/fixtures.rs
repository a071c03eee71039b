//! Shared builders for unit tests

use std::io::Cursor;
use std::path::Path;

use crate::index::{BuildOptions, Index, IndexConfig};
use crate::loaders::{Intensity, QuantEntry, Sample, SampleDescriptor, SampleMap};
use crate::mztab::{IdentificationRecord, MzTabStreamer, SpectrumRef};

/// PSM row for [`mztab_text`]: (sequence, psm id, accessions, charge, run index, scan, q-value)
pub(crate) type PsmRow<'a> = (&'a str, &'a str, &'a str, i32, u32, u32, f64);

/// mzTab text declaring `runs` as `ms_run[1..]` and the given PSM rows
pub(crate) fn mztab_text(runs: &[&str], rows: &[PsmRow<'_>]) -> String {
    let mut text = String::new();
    for (i, run) in runs.iter().enumerate() {
        text.push_str(&format!("MTD\tms_run[{}]-location\tfile:///data/{}.mzML\n", i + 1, run));
    }
    text.push_str("PRH\taccession\tdescription\n");
    text.push_str("PRT\tP1\tProtein one\n");
    text.push_str(
        "PSH\tsequence\tPSM_ID\taccession\tmodifications\tcharge\tspectra_ref\topt_global_q-value\n",
    );
    for (sequence, psm_id, accession, charge, run, scan, q) in rows {
        text.push_str(&format!(
            "PSM\t{}\t{}\t{}\tnull\t{}\tms_run[{}]:scan={}\t{}\n",
            sequence, psm_id, accession, charge, run, scan, q
        ));
    }
    text
}

/// Build an index from mzTab text
pub(crate) fn build_index(dir: &Path, text: &str) -> Index {
    let mut streamer = MzTabStreamer::new(Cursor::new(text.as_bytes().to_vec()));
    Index::build(&mut streamer, dir, &BuildOptions::default(), IndexConfig::default())
        .expect("index build")
}

/// Minimal identification record
pub(crate) fn record(sequence: &str, accessions: &[&str], run: &str, scan: u32) -> IdentificationRecord {
    IdentificationRecord {
        psm_id: format!("{}-{}", run, scan),
        spectrum_ref: SpectrumRef::new(run, format!("scan={}", scan)),
        sequence: sequence.to_string(),
        modifications: Vec::new(),
        charge: 2,
        retention_time: Some(scan as f64),
        calc_mass_to_charge: None,
        exp_mass_to_charge: None,
        protein_accessions: accessions.iter().map(|a| a.to_string()).collect(),
        search_engine_score: None,
        q_value: Some(0.001),
        posterior_error_probability: None,
        is_decoy: false,
    }
}

/// Quant entry matching [`record`]'s key
pub(crate) fn quant_entry(
    entry_id: u64,
    record: &IdentificationRecord,
    channel: Option<&str>,
    intensity: Intensity,
) -> QuantEntry {
    QuantEntry {
        entry_id,
        protein: record.protein_group(),
        peptide: record.sequence.clone(),
        modified_peptide: record.sequence.clone(),
        charge: record.charge,
        run: record.run().to_string(),
        channel: channel.map(str::to_string),
        condition: None,
        biological_replicate: None,
        intensity,
    }
}

/// Sample with the given accession and label
pub(crate) fn sample(accession: &str, label: Option<&str>) -> Sample {
    Sample {
        sample_accession: accession.to_string(),
        label: label.map(str::to_string),
        condition: Some(format!("{}-condition", accession)),
        biological_replicate: Some("1".to_string()),
        technical_replicate: Some("1".to_string()),
        fraction: None,
    }
}

/// One single-sample descriptor per run; sample accession = `S_<run>`
pub(crate) fn label_free_samples(runs: &[&str]) -> SampleMap {
    SampleMap::from_descriptors(runs.iter().map(|run| SampleDescriptor {
        run: run.to_string(),
        data_file: format!("{}.raw", run),
        channels: vec![sample(&format!("S_{}", run), Some("label free sample"))],
    }))
}

use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use qpx::aggregate::TheoreticalPeptideCounter;
use qpx::convert::{ConversionConfig, ConversionStats, Converter, IndexMode};
use qpx::index::Index;

use super::InputArgs;

/// Open or build the index named by `input`.
///
/// Without an index directory the store lives in a temporary directory that
/// is removed once the returned guard drops.
fn open_index(converter: &Converter, input: &InputArgs) -> Result<(Index, Option<TempDir>)> {
    match (&input.mztab, &input.index) {
        (Some(mztab), Some(dir)) => {
            if !mztab.exists() {
                anyhow::bail!("Input file does not exist: {}", mztab.display());
            }
            let mode = IndexMode::Build {
                overwrite: input.overwrite,
            };
            let index = converter
                .prepare_index(Some(mztab), dir, mode)
                .context("Indexing failed")?;
            Ok((index, None))
        }
        (Some(mztab), None) => {
            if !mztab.exists() {
                anyhow::bail!("Input file does not exist: {}", mztab.display());
            }
            let scratch = tempfile::Builder::new()
                .prefix("qpx-index-")
                .tempdir()
                .context("Failed to create a temporary index directory")?;
            let index = converter
                .prepare_index(
                    Some(mztab),
                    scratch.path(),
                    IndexMode::Build { overwrite: false },
                )
                .context("Indexing failed")?;
            Ok((index, Some(scratch)))
        }
        (None, Some(dir)) => {
            let index = converter
                .prepare_index(None, dir, IndexMode::Reuse)
                .context("Opening the index failed")?;
            Ok((index, None))
        }
        (None, None) => anyhow::bail!("either --mztab or --index is required"),
    }
}

fn report(stats: &ConversionStats) {
    info!("Conversion complete in {:.2?}", stats.elapsed);
    info!(
        "  Records: {} in, {} filtered, {} written",
        stats.transform.records_in, stats.transform.records_filtered, stats.writer.rows_written
    );
    if let Some(groups) = stats.protein_groups {
        info!("  Protein group/sample rows: {}", groups);
    }
    info!(
        "  Output size: {} bytes ({:.2} MB)",
        stats.writer.file_size_bytes,
        stats.writer.file_size_bytes as f64 / 1024.0 / 1024.0
    );
    println!("{}", stats.output.display());
}

fn create_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))
}

/// Write the PSM table
pub fn psm(input: InputArgs, output_dir: PathBuf, config: ConversionConfig) -> Result<()> {
    create_output_dir(&output_dir)?;
    let converter = Converter::new(config);
    let (index, _scratch) = open_index(&converter, &input)?;

    let stats = converter
        .convert_psms(&index, &output_dir)
        .context("PSM conversion failed")?;
    report(&stats);
    Ok(())
}

/// Write the feature table
pub fn feature(
    input: InputArgs,
    quant: PathBuf,
    sdrf: Option<PathBuf>,
    output_dir: PathBuf,
    config: ConversionConfig,
) -> Result<()> {
    create_output_dir(&output_dir)?;
    let converter = Converter::new(config);
    let quant = converter.load_quant(&quant)?;
    let samples = sdrf.map(|path| converter.load_samples(&path)).transpose()?;
    let (index, _scratch) = open_index(&converter, &input)?;

    let stats = converter
        .convert_features(&index, &quant, samples.as_ref(), &output_dir)
        .context("Feature conversion failed")?;
    report(&stats);
    Ok(())
}

/// Write the protein group table
pub fn protein_groups(
    input: InputArgs,
    quant: PathBuf,
    sdrf: PathBuf,
    fasta: Option<PathBuf>,
    output_dir: PathBuf,
    config: ConversionConfig,
) -> Result<()> {
    if config.aggregation.ibaq_enabled && fasta.is_none() {
        anyhow::bail!("iBAQ needs --fasta (or pass --no-ibaq)");
    }
    create_output_dir(&output_dir)?;
    let converter = Converter::new(config);
    let quant = converter.load_quant(&quant)?;
    let samples = converter.load_samples(&sdrf)?;
    let counter = match &fasta {
        Some(path) if converter.config().aggregation.ibaq_enabled => {
            Some(converter.load_fasta(path).context("Reading the FASTA failed")?)
        }
        _ => None,
    };
    let (index, _scratch) = open_index(&converter, &input)?;

    let stats = converter
        .convert_protein_groups(
            &index,
            &quant,
            &samples,
            counter.as_ref().map(|c| c as &dyn TheoreticalPeptideCounter),
            &output_dir,
        )
        .context("Protein group conversion failed")?;
    report(&stats);
    Ok(())
}

use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use qpx::convert::{ConversionConfig, Converter, IndexMode};

/// Build a persistent index from an mzTab file
pub fn run(
    input: PathBuf,
    index: Option<PathBuf>,
    overwrite: bool,
    config: ConversionConfig,
) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }
    let index_dir = index.unwrap_or_else(|| PathBuf::from(format!("{}.qpx-index", input.display())));

    info!("qpx index");
    info!("=========");
    info!("Input: {}", input.display());
    info!("Index: {}", index_dir.display());

    let converter = Converter::new(config);
    let index = converter
        .prepare_index(Some(&input), &index_dir, IndexMode::Build { overwrite })
        .context("Indexing failed")?;

    let manifest = index.manifest();
    println!(
        "Indexed {} PSMs, {} proteins, {} peptides from {} run(s) into {}",
        manifest.psm_count,
        manifest.protein_count,
        manifest.peptide_count,
        manifest.ms_runs.len(),
        index.path().display()
    );
    if manifest.skipped_lines > 0 {
        println!("Skipped {} malformed line(s)", manifest.skipped_lines);
    }
    Ok(())
}

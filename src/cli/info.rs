use anyhow::{Context, Result};
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::fs::File;
use std::path::{Path, PathBuf};

use qpx::index::{IndexManifest, MANIFEST_FILE};
use qpx::writer::output_files;

/// Display information about a QPX output file, partition directory or index
pub fn run(path: PathBuf) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Path does not exist: {}", path.display());
    }
    if path.is_dir() && path.join(MANIFEST_FILE).is_file() {
        return index_info(&path);
    }
    if path.is_dir() {
        return partition_info(&path);
    }
    file_info(&path)
}

fn index_info(path: &Path) -> Result<()> {
    let manifest = IndexManifest::read(path).context("Failed to read index manifest")?;

    println!("QPX Index Information");
    println!("=====================");
    println!("Index: {}", path.display());
    println!(
        "Engine: {} (format {})",
        manifest.engine, manifest.format_version
    );
    println!("Created: {}", manifest.created.to_rfc3339());
    if let Some(source) = &manifest.source_file {
        println!("Source: {}", source);
    }
    println!();

    println!("Contents:");
    println!("  PSMs: {}", manifest.psm_count);
    println!("  Proteins: {}", manifest.protein_count);
    println!("  Peptides: {}", manifest.peptide_count);
    println!("  Skipped lines: {}", manifest.skipped_lines);
    println!();

    if !manifest.ms_runs.is_empty() {
        println!("MS runs:");
        for (n, run) in &manifest.ms_runs {
            println!("  ms_run[{}]: {}", n, run);
        }
    }
    if let Err(e) = manifest.check_compatible() {
        println!();
        println!("Warning: {}", e);
    }
    Ok(())
}

fn partition_info(path: &Path) -> Result<()> {
    let files = output_files(path).context("Failed to list partition files")?;
    if files.is_empty() {
        anyhow::bail!("No Parquet files under {}", path.display());
    }

    println!("QPX Partitioned Output");
    println!("======================");
    println!("Directory: {}", path.display());
    println!();

    let mut total_rows = 0i64;
    for file in &files {
        let reader = open(file)?;
        let rows = reader.metadata().file_metadata().num_rows();
        total_rows += rows;
        let relative = file.strip_prefix(path).unwrap_or(file);
        println!("  {} ({} rows)", relative.display(), rows);
    }
    println!();
    println!("Partitions: {}", files.len());
    println!("Total rows: {}", total_rows);
    println!();

    file_info(&files[0])
}

fn open(file: &Path) -> Result<SerializedFileReader<File>> {
    let handle = File::open(file)
        .with_context(|| format!("Failed to open file: {}", file.display()))?;
    SerializedFileReader::new(handle).context("Failed to read Parquet file")
}

fn file_info(file: &Path) -> Result<()> {
    let reader = open(file)?;
    let metadata = reader.metadata();
    let file_metadata = metadata.file_metadata();

    println!("QPX File Information");
    println!("====================");
    println!("File: {}", file.display());
    println!();

    println!("File Statistics:");
    println!("  Row groups: {}", metadata.num_row_groups());
    println!("  Total rows: {}", file_metadata.num_rows());
    println!(
        "  Schema columns: {}",
        file_metadata.schema_descr().num_columns()
    );
    println!();

    if let Some(kv_metadata) = file_metadata.key_value_metadata() {
        println!("Metadata Keys:");
        for kv in kv_metadata.iter().filter(|kv| kv.key.starts_with("qpx:")) {
            let value = kv.value.as_deref().unwrap_or("<null>");
            println!("  {}: {}", kv.key, value);
        }
        println!();
    }

    println!("Schema:");
    for i in 0..file_metadata.schema_descr().num_columns() {
        let col = file_metadata.schema_descr().column(i);
        println!("  {:3}. {} ({})", i + 1, col.path(), col.physical_type());
    }

    Ok(())
}

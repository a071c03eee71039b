//! Single-pass index construction

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, ErrorKind};
use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use log::{debug, info, warn};
use parquet::arrow::ArrowWriter;
use tempfile::NamedTempFile;

use crate::mztab::{
    IdentificationRecord, MzTabLine, MzTabStreamer, ParsePolicy, PeptideRow, ProteinRow,
};
use crate::writer::WriterConfig;

use super::manifest::{IndexManifest, MANIFEST_FILE};
use super::schema::{self, PEPTIDE_TABLE, PROTEIN_TABLE, PSM_FLOAT_COLUMNS, PSM_TABLE};
use super::{IndexConfig, IndexError};

/// Lock file present while a build is in progress
pub const LOCK_FILE: &str = ".lock";

/// Options controlling a build
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Remove an existing non-empty store instead of failing
    pub overwrite: bool,
    /// What to do with malformed source rows
    pub parse_policy: ParsePolicy,
    /// Source file name recorded in the manifest
    pub source_file: Option<PathBuf>,
}

/// Removes the lock file when the build ends, successful or not
struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn acquire(dir: &Path) -> Result<Self, IndexError> {
        let path = dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(IndexError::Locked(path)),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Whether a directory entry is something a build leaves in a store
fn is_store_entry(entry: &fs::DirEntry) -> Result<bool, IndexError> {
    if !entry.file_type()?.is_file() {
        return Ok(false);
    }
    let name = entry.file_name();
    let name = name.to_string_lossy();
    Ok(matches!(
        name.as_ref(),
        MANIFEST_FILE | PSM_TABLE | PROTEIN_TABLE | PEPTIDE_TABLE
    ) || name.starts_with(".tmp"))
}

/// Prepare the store directory: create it, or clear it when overwriting.
///
/// Overwriting only removes the files of an index; a directory holding
/// anything else is refused.
pub(super) fn prepare_store(dir: &Path, overwrite: bool) -> Result<(), IndexError> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(IndexError::AlreadyExists(dir.to_path_buf()));
        }
        let lock = dir.join(LOCK_FILE);
        if lock.exists() {
            return Err(IndexError::Locked(lock));
        }
        let entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
        if !entries.is_empty() {
            if !overwrite {
                return Err(IndexError::AlreadyExists(dir.to_path_buf()));
            }
            for entry in &entries {
                if !is_store_entry(entry)? {
                    return Err(IndexError::NotAnIndex {
                        path: dir.to_path_buf(),
                        entry: entry.path(),
                    });
                }
            }
            info!("Overwriting existing index at {}", dir.display());
            for entry in entries {
                fs::remove_file(entry.path())?;
            }
        }
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// A table written to a temp file in the store, persisted on finish
struct TableWriter {
    writer: ArrowWriter<NamedTempFile>,
    destination: PathBuf,
    rows: u64,
}

impl TableWriter {
    fn new(
        dir: &Path,
        name: &str,
        schema: SchemaRef,
        config: &WriterConfig,
        float_columns: &[&str],
    ) -> Result<Self, IndexError> {
        let tmp = NamedTempFile::new_in(dir)?;
        let props = config.to_writer_properties(&HashMap::new(), float_columns);
        let writer = ArrowWriter::try_new(tmp, schema, Some(props))?;
        Ok(Self {
            writer,
            destination: dir.join(name),
            rows: 0,
        })
    }

    fn write(&mut self, batch: RecordBatch) -> Result<(), IndexError> {
        self.rows += batch.num_rows() as u64;
        self.writer.write(&batch)?;
        Ok(())
    }

    fn finish(self) -> Result<u64, IndexError> {
        let tmp = self.writer.into_inner()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.destination)
            .map_err(|e| IndexError::IoError(e.error))?;
        Ok(self.rows)
    }
}

/// Consumes a streamer once and writes the index tables
pub(super) struct IndexBuilder {
    psms: TableWriter,
    proteins: TableWriter,
    peptides: TableWriter,
    psm_buffer: Vec<IdentificationRecord>,
    protein_buffer: Vec<ProteinRow>,
    peptide_buffer: Vec<PeptideRow>,
    pending: Option<IdentificationRecord>,
    flush_threshold: usize,
    policy: ParsePolicy,
    skipped: u64,
}

impl IndexBuilder {
    pub(super) fn new(
        dir: &Path,
        config: &IndexConfig,
        policy: ParsePolicy,
    ) -> Result<Self, IndexError> {
        let writer_config = WriterConfig {
            row_group_size: config.row_group_size,
            ..WriterConfig::fast_write()
        };
        Ok(Self {
            psms: TableWriter::new(
                dir,
                PSM_TABLE,
                schema::psm_schema(),
                &writer_config,
                PSM_FLOAT_COLUMNS,
            )?,
            proteins: TableWriter::new(dir, PROTEIN_TABLE, schema::protein_schema(), &writer_config, &[])?,
            peptides: TableWriter::new(dir, PEPTIDE_TABLE, schema::peptide_schema(), &writer_config, &[])?,
            psm_buffer: Vec::new(),
            protein_buffer: Vec::new(),
            peptide_buffer: Vec::new(),
            pending: None,
            flush_threshold: config.flush_threshold(),
            policy,
            skipped: 0,
        })
    }

    /// Stream every line into the tables and return the completed manifest
    pub(super) fn run<R: BufRead>(
        mut self,
        streamer: &mut MzTabStreamer<R>,
    ) -> Result<IndexManifest, IndexError> {
        let mut manifest = IndexManifest::new();

        for line in streamer.by_ref() {
            match line {
                Ok(MzTabLine::Metadata { .. }) => {}
                Ok(MzTabLine::Psm(record)) => self.push_psm(record)?,
                Ok(MzTabLine::Protein(row)) => {
                    self.protein_buffer.push(row);
                    if self.protein_buffer.len() >= self.flush_threshold {
                        self.flush_proteins()?;
                    }
                }
                Ok(MzTabLine::Peptide(row)) => {
                    self.peptide_buffer.push(row);
                    if self.peptide_buffer.len() >= self.flush_threshold {
                        self.flush_peptides()?;
                    }
                }
                Err(e) if e.is_recoverable() && self.policy == ParsePolicy::Skip => {
                    warn!("Skipping malformed row: {}", e);
                    self.skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(record) = self.pending.take() {
            self.psm_buffer.push(record);
        }
        self.flush_psms()?;
        self.flush_proteins()?;
        self.flush_peptides()?;

        manifest.psm_count = self.psms.finish()?;
        manifest.protein_count = self.proteins.finish()?;
        manifest.peptide_count = self.peptides.finish()?;
        manifest.skipped_lines = self.skipped;
        manifest.ms_runs = streamer.ms_runs().clone();
        manifest.metadata = streamer.metadata().clone();
        Ok(manifest)
    }

    /// Buffer a PSM, merging it into the previous one when it is the same
    /// match mapped to another protein
    fn push_psm(&mut self, record: IdentificationRecord) -> Result<(), IndexError> {
        let same_match = matches!(
            &self.pending,
            Some(pending) if pending.psm_id == record.psm_id
                && pending.spectrum_ref == record.spectrum_ref
                && pending.sequence == record.sequence
        );

        if same_match {
            if let Some(pending) = self.pending.as_mut() {
                for accession in record.protein_accessions {
                    if !pending.protein_accessions.contains(&accession) {
                        pending.protein_accessions.push(accession);
                    }
                }
            }
        } else if let Some(previous) = self.pending.replace(record) {
            self.psm_buffer.push(previous);
            if self.psm_buffer.len() >= self.flush_threshold {
                self.flush_psms()?;
            }
        }
        Ok(())
    }

    fn flush_psms(&mut self) -> Result<(), IndexError> {
        if self.psm_buffer.is_empty() {
            return Ok(());
        }
        debug!("Flushing {} PSMs to index", self.psm_buffer.len());
        let batch = schema::psms_to_batch(&self.psm_buffer)?;
        self.psm_buffer.clear();
        self.psms.write(batch)
    }

    fn flush_proteins(&mut self) -> Result<(), IndexError> {
        if self.protein_buffer.is_empty() {
            return Ok(());
        }
        let batch = schema::proteins_to_batch(&self.protein_buffer)?;
        self.protein_buffer.clear();
        self.proteins.write(batch)
    }

    fn flush_peptides(&mut self) -> Result<(), IndexError> {
        if self.peptide_buffer.is_empty() {
            return Ok(());
        }
        let batch = schema::peptides_to_batch(&self.peptide_buffer)?;
        self.peptide_buffer.clear();
        self.peptides.write(batch)
    }
}

/// Build a store at `dir` from `streamer`, holding the lock for the duration
pub(super) fn build_store<R: BufRead>(
    streamer: &mut MzTabStreamer<R>,
    dir: &Path,
    options: &BuildOptions,
    config: &IndexConfig,
) -> Result<IndexManifest, IndexError> {
    prepare_store(dir, options.overwrite)?;
    let _lock = LockGuard::acquire(dir)?;

    info!("Building index at {}", dir.display());
    let builder = IndexBuilder::new(dir, config, options.parse_policy)?;
    let mut manifest = builder.run(streamer)?;

    if let Some(source) = &options.source_file {
        manifest.source_file = Some(source.display().to_string());
        manifest.source_size_bytes = fs::metadata(source).ok().map(|m| m.len());
    }

    // Manifest last: its presence marks the store complete
    manifest.write(dir)?;
    info!(
        "Indexed {} PSMs, {} proteins, {} peptides ({} malformed lines skipped)",
        manifest.psm_count, manifest.protein_count, manifest.peptide_count, manifest.skipped_lines
    );
    Ok(manifest)
}

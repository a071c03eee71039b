//! # Index Module
//!
//! Durable, queryable store of everything read from one mzTab file.
//!
//! An index is a directory bundle:
//!
//! ```text
//! <store>/
//! ├── psms.parquet       identification records, insertion order
//! ├── proteins.parquet   protein section rows
//! ├── peptides.parquet   peptide section rows
//! └── index.json         manifest (engine, format version, counts, ms_runs)
//! ```
//!
//! [`Index::build`] parses the source once; [`Index::open`] re-attaches to a
//! finished store without re-parsing, so PSM, feature and protein-group
//! outputs can all be produced from a single build. Whether to build or reuse
//! is always the caller's explicit decision.
//!
//! Full scans stream fixed-size batches, so memory stays bounded no matter
//! how many rows the store holds. Lookups filter row groups in parallel on a
//! thread pool sized by [`IndexConfig::threads`].

mod builder;
mod config;
mod error;
mod lookup;
mod manifest;
mod scan;
pub mod schema;


use std::collections::HashMap;
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::mztab::{IdentificationRecord, MzTabStreamer, PeptideRow, ProteinRow, SpectrumRef};

pub use builder::{BuildOptions, LOCK_FILE};
pub use config::IndexConfig;
pub use error::IndexError;
pub use manifest::{IndexManifest, INDEX_ENGINE, INDEX_FORMAT_VERSION, MANIFEST_FILE};
pub use scan::TableScan;

use lookup::{filter_psms, Match};
use schema::{columns, PEPTIDE_TABLE, PROTEIN_TABLE, PSM_TABLE};

/// Handle to a built index store
pub struct Index {
    path: PathBuf,
    manifest: IndexManifest,
    config: IndexConfig,
    pool: Arc<ThreadPool>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("path", &self.path)
            .field("manifest", &self.manifest)
            .field("config", &self.config)
            .finish()
    }
}

impl Index {
    /// Consume `streamer` once and persist it as a new store at `path`.
    ///
    /// Fails with [`IndexError::AlreadyExists`] if `path` is a non-empty
    /// directory and `options.overwrite` is not set, with
    /// [`IndexError::NotAnIndex`] if overwriting would remove files that are
    /// not part of an index, and with [`IndexError::Locked`] while the
    /// store's lock file exists.
    pub fn build<R: BufRead>(
        streamer: &mut MzTabStreamer<R>,
        path: impl AsRef<Path>,
        options: &BuildOptions,
        config: IndexConfig,
    ) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let manifest = builder::build_store(streamer, path, options, &config)?;
        Self::attach(path, manifest, config)
    }

    /// Open an mzTab file (optionally gzip-compressed) and build a store from it
    pub fn build_from_file(
        source: impl AsRef<Path>,
        path: impl AsRef<Path>,
        options: &BuildOptions,
        config: IndexConfig,
    ) -> Result<Self, IndexError> {
        let source = source.as_ref();
        let mut streamer = MzTabStreamer::open(source)?;
        let options = BuildOptions {
            source_file: options
                .source_file
                .clone()
                .or_else(|| Some(source.to_path_buf())),
            ..options.clone()
        };
        Self::build(&mut streamer, path, &options, config)
    }

    /// Attach to a previously built store without re-parsing.
    ///
    /// The manifest is validated first: a missing store, an interrupted build
    /// or a store from another engine version is rejected.
    pub fn open(path: impl AsRef<Path>, config: IndexConfig) -> Result<Self, IndexError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(IndexError::NotFound(path.to_path_buf()));
        }
        let manifest = IndexManifest::read(path)?;
        manifest.check_compatible()?;
        for table in [PSM_TABLE, PROTEIN_TABLE, PEPTIDE_TABLE] {
            if !path.join(table).is_file() {
                return Err(IndexError::Incomplete(path.to_path_buf()));
            }
        }
        info!(
            "Opened index at {} ({} PSMs, built {})",
            path.display(),
            manifest.psm_count,
            manifest.created
        );
        Self::attach(path, manifest, config)
    }

    fn attach(path: &Path, manifest: IndexManifest, config: IndexConfig) -> Result<Self, IndexError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("qpx-index-{}", i))
            .build()?;
        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            config,
            pool: Arc::new(pool),
        })
    }

    /// Delete the store from disk
    pub fn destroy(self) -> Result<(), IndexError> {
        info!("Removing index at {}", self.path.display());
        fs::remove_dir_all(&self.path)?;
        Ok(())
    }

    /// Store location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store manifest
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Resource configuration
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Number of identification records in the store
    pub fn psm_count(&self) -> u64 {
        self.manifest.psm_count
    }

    /// Full scan of identification records in insertion order
    pub fn scan(&self) -> Result<TableScan<IdentificationRecord>, IndexError> {
        self.scan_with_batch_size(self.config.scan_batch_size)
    }

    /// Full scan with an explicit batch size
    pub fn scan_with_batch_size(
        &self,
        batch_size: usize,
    ) -> Result<TableScan<IdentificationRecord>, IndexError> {
        TableScan::open(&self.path.join(PSM_TABLE), batch_size, schema::batch_to_psms)
    }

    /// Scan of the protein section
    pub fn proteins(&self) -> Result<TableScan<ProteinRow>, IndexError> {
        TableScan::open(
            &self.path.join(PROTEIN_TABLE),
            self.config.scan_batch_size,
            schema::batch_to_proteins,
        )
    }

    /// Scan of the peptide section
    pub fn peptides(&self) -> Result<TableScan<PeptideRow>, IndexError> {
        TableScan::open(
            &self.path.join(PEPTIDE_TABLE),
            self.config.scan_batch_size,
            schema::batch_to_peptides,
        )
    }

    /// Protein descriptions by accession
    pub fn protein_descriptions(&self) -> Result<HashMap<String, String>, IndexError> {
        let mut descriptions = HashMap::new();
        for batch in self.proteins()? {
            for row in batch? {
                if let Some(description) = row.description {
                    descriptions.insert(row.accession, description);
                }
            }
        }
        Ok(descriptions)
    }

    /// Point lookup by spectrum reference
    pub fn psm_by_spectrum_ref(
        &self,
        spectrum_ref: &SpectrumRef,
    ) -> Result<Vec<IdentificationRecord>, IndexError> {
        self.filter(columns::SPECTRUM_KEY, Match::Exact(spectrum_ref.key()))
    }

    /// All identification records mapped to a protein accession
    pub fn psms_by_protein(&self, accession: &str) -> Result<Vec<IdentificationRecord>, IndexError> {
        self.filter(columns::ACCESSIONS, Match::Member(accession.to_string()))
    }

    /// All identification records for a bare peptide sequence
    pub fn psms_by_sequence(&self, sequence: &str) -> Result<Vec<IdentificationRecord>, IndexError> {
        self.filter(columns::SEQUENCE, Match::Exact(sequence.to_ascii_uppercase()))
    }

    fn filter(&self, column: &str, matcher: Match) -> Result<Vec<IdentificationRecord>, IndexError> {
        filter_psms(
            &self.path.join(PSM_TABLE),
            column,
            matcher,
            self.config.scan_batch_size,
            &self.pool,
        )
    }
}

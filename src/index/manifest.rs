use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::IndexError;

/// Engine name recorded in every manifest
pub const INDEX_ENGINE: &str = "qpx-index";

/// On-disk layout version. Bump when the table schemas change.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Manifest file name inside the store directory
pub const MANIFEST_FILE: &str = "index.json";

/// Self-describing header of an index store.
///
/// Written last during a build, so its presence marks the store as complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Engine that wrote the store
    pub engine: String,
    /// Layout version
    pub format_version: u32,
    /// Build completion time
    pub created: DateTime<Utc>,
    /// Source file the store was built from
    pub source_file: Option<String>,
    /// Size of the source file in bytes, when known
    pub source_size_bytes: Option<u64>,
    /// Identification records stored (after multi-protein collapse)
    pub psm_count: u64,
    /// Protein section rows stored
    pub protein_count: u64,
    /// Peptide section rows stored
    pub peptide_count: u64,
    /// Malformed lines skipped under the skip policy
    pub skipped_lines: u64,
    /// Declared runs by `ms_run` index
    pub ms_runs: BTreeMap<u32, String>,
    /// Source metadata section
    pub metadata: BTreeMap<String, String>,
}

impl IndexManifest {
    pub(crate) fn new() -> Self {
        Self {
            engine: INDEX_ENGINE.to_string(),
            format_version: INDEX_FORMAT_VERSION,
            created: Utc::now(),
            source_file: None,
            source_size_bytes: None,
            psm_count: 0,
            protein_count: 0,
            peptide_count: 0,
            skipped_lines: 0,
            ms_runs: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Reject manifests from another engine or layout version
    pub fn check_compatible(&self) -> Result<(), IndexError> {
        if self.engine != INDEX_ENGINE || self.format_version != INDEX_FORMAT_VERSION {
            return Err(IndexError::Incompatible {
                found: format!("{} v{}", self.engine, self.format_version),
                expected: format!("{} v{}", INDEX_ENGINE, INDEX_FORMAT_VERSION),
            });
        }
        Ok(())
    }

    /// Read the manifest from a store directory
    pub fn read(dir: &Path) -> Result<Self, IndexError> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(IndexError::Incomplete(dir.to_path_buf()));
        }
        let reader = BufReader::new(File::open(&path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Atomically write the manifest into a store directory
    pub(crate) fn write(&self, dir: &Path) -> Result<(), IndexError> {
        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(MANIFEST_FILE))
            .map_err(|e| IndexError::IoError(e.error))?;
        Ok(())
    }
}

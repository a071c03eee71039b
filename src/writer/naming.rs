//! Output file naming and footer metadata

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use super::RecordKind;

/// Version of the output layout written to file metadata
pub const OUTPUT_FORMAT_VERSION: &str = "1.0";

/// Footer metadata keys
pub mod metadata_keys {
    /// Output layout version
    pub const FORMAT_VERSION: &str = "qpx:format_version";
    /// `psm`, `feature` or `protein_group`
    pub const RECORD_KIND: &str = "qpx:record_kind";
    /// Identification file the output was converted from
    pub const SOURCE_FILE: &str = "qpx:source_file";
    /// RFC 3339 creation time
    pub const CREATED: &str = "qpx:created";
}

/// Names output files `{prefix}-{token}.{kind}.parquet`.
///
/// The token is fixed per namer, so every output of one conversion shares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNamer {
    prefix: String,
    token: String,
}

impl OutputNamer {
    /// Namer with a fresh random token
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_token(prefix, Uuid::new_v4().simple().to_string())
    }

    /// Namer with a caller-chosen token
    pub fn with_token(prefix: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            token: token.into(),
        }
    }

    /// Output prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Uniqueness token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// File name of an unpartitioned output
    pub fn file_name(&self, kind: RecordKind) -> String {
        format!("{}-{}.{}.parquet", self.prefix, self.token, kind.extension())
    }

    /// Directory name of a partitioned output
    pub fn dir_name(&self, kind: RecordKind) -> String {
        format!("{}-{}.{}", self.prefix, self.token, kind.extension())
    }

    /// Destination below `dir`: a file, or a directory when partitioned
    pub fn destination(&self, dir: &Path, kind: RecordKind, partitioned: bool) -> PathBuf {
        if partitioned {
            dir.join(self.dir_name(kind))
        } else {
            dir.join(self.file_name(kind))
        }
    }
}

/// Footer key/values common to every output file
pub fn footer_metadata(kind: RecordKind, source_file: Option<&Path>) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert(
        metadata_keys::FORMAT_VERSION.to_string(),
        OUTPUT_FORMAT_VERSION.to_string(),
    );
    metadata.insert(metadata_keys::RECORD_KIND.to_string(), kind.as_str().to_string());
    metadata.insert(metadata_keys::CREATED.to_string(), Utc::now().to_rfc3339());
    if let Some(source) = source_file {
        metadata.insert(
            metadata_keys::SOURCE_FILE.to_string(),
            source.display().to_string(),
        );
    }
    metadata
}

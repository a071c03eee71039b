use std::fmt;
use std::path::PathBuf;

/// Statistics from a completed write operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Number of records written
    pub rows_written: u64,
    /// Number of Parquet row groups written, over all files
    pub row_groups_written: usize,
    /// Total size of the written files in bytes
    pub file_size_bytes: u64,
    /// Every file written; sorted by path for partitioned output
    pub files: Vec<PathBuf>,
}

impl WriterStats {
    /// Fold another file's statistics into these
    pub(crate) fn merge(&mut self, other: WriterStats) {
        self.rows_written += other.rows_written;
        self.row_groups_written += other.row_groups_written;
        self.file_size_bytes += other.file_size_bytes;
        self.files.extend(other.files);
    }
}

impl fmt::Display for WriterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Wrote {} rows to {} file(s) in {} row groups ({} bytes)",
            self.rows_written,
            self.files.len(),
            self.row_groups_written,
            self.file_size_bytes
        )
    }
}

use serde::{Deserialize, Serialize};

/// Resource limits for building and querying an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Worker threads for lookups (0 = one per core)
    pub threads: usize,

    /// Approximate memory ceiling for buffered rows while building
    pub memory_limit_bytes: usize,

    /// Rows per batch returned by full scans
    pub scan_batch_size: usize,

    /// Rows per Parquet row group. Lookups parallelize across row groups.
    pub row_group_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            memory_limit_bytes: 256 * 1024 * 1024,
            scan_batch_size: 8_192,
            row_group_size: 65_536,
        }
    }
}

impl IndexConfig {
    /// Small memory footprint, single lookup thread
    pub fn low_memory() -> Self {
        Self {
            threads: 1,
            memory_limit_bytes: 32 * 1024 * 1024,
            scan_batch_size: 1_024,
            row_group_size: 16_384,
        }
    }

    /// Rows buffered before a row group is flushed while building.
    ///
    /// Assumes roughly 512 bytes per buffered PSM.
    pub fn flush_threshold(&self) -> usize {
        let row_group = self.row_group_size.max(1);
        (self.memory_limit_bytes / 512).clamp(1_024.min(row_group), row_group)
    }
}

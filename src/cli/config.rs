//! TOML configuration file support for power users.
//!
//! Instead of passing many CLI flags, users can specify settings in a config file:
//!
//! ```toml
//! # qpx.toml
//! [conversion]
//! batch_size = 20000
//! partition_by = ["run"]
//! q_value = 0.01
//! compression_level = 9
//!
//! [index]
//! threads = 4
//! memory_limit_mb = 512
//!
//! [aggregation]
//! topn = 3
//! ibaq = false
//! ```
//!
//! Every key is optional; unset keys keep the profile's value, and command
//! line flags override the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use qpx::aggregate::QuantMode;
use qpx::convert::{ConfidenceThreshold, ConversionConfig};
use qpx::mztab::ParsePolicy;
use qpx::writer::CompressionType;

/// Root configuration structure for qpx.toml files.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Conversion settings.
    #[serde(default)]
    pub conversion: ConversionSection,

    /// Index resource limits.
    #[serde(default)]
    pub index: IndexSection,

    /// Protein-level aggregation.
    #[serde(default)]
    pub aggregation: AggregationSection,
}

/// `[conversion]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionSection {
    /// Records per transform batch.
    pub batch_size: Option<usize>,

    /// Output fields to partition by.
    pub partition_by: Option<Vec<String>>,

    /// Output file name prefix.
    pub prefix: Option<String>,

    /// Maximum q-value kept.
    pub q_value: Option<f64>,

    /// Maximum posterior error probability kept (replaces the q-value filter).
    pub pep: Option<f64>,

    /// Keep decoy matches.
    pub include_decoys: Option<bool>,

    /// Skip malformed mzTab rows instead of aborting.
    pub skip_malformed: Option<bool>,

    /// `label-free` or `labeled`.
    pub quant_mode: Option<QuantMode>,

    /// ZSTD compression level (1-22).
    pub compression_level: Option<i32>,

    /// Rows per Parquet row group.
    pub row_group_size: Option<usize>,
}

/// `[index]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexSection {
    /// Lookup threads (0 = one per core).
    pub threads: Option<usize>,

    /// Build memory ceiling in MiB.
    pub memory_limit_mb: Option<usize>,

    /// Rows per scan batch.
    pub scan_batch_size: Option<usize>,
}

/// `[aggregation]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregationSection {
    /// Peptides averaged for TopN.
    pub topn: Option<usize>,

    /// Compute TopN.
    pub topn_enabled: Option<bool>,

    /// Compute iBAQ.
    pub ibaq: Option<bool>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Overlay the file's settings on `config`
    pub fn apply(&self, config: &mut ConversionConfig) {
        let c = &self.conversion;
        if let Some(mode) = c.quant_mode {
            // Mode first: it resets the aggregation defaults the table may override
            config.quant_mode = mode;
            config.aggregation = qpx::aggregate::AggregationConfig::for_mode(mode);
        }
        if let Some(batch_size) = c.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(fields) = &c.partition_by {
            config.partition_fields = fields.clone();
        }
        if let Some(prefix) = &c.prefix {
            config.output_prefix = prefix.clone();
        }
        if let Some(q) = c.q_value {
            config.confidence = ConfidenceThreshold::QValue(q);
        }
        if let Some(pep) = c.pep {
            config.confidence = ConfidenceThreshold::Pep(pep);
        }
        if let Some(include) = c.include_decoys {
            config.include_decoys = include;
        }
        if let Some(skip) = c.skip_malformed {
            config.parse_policy = if skip {
                ParsePolicy::Skip
            } else {
                ParsePolicy::Abort
            };
        }
        if let Some(level) = c.compression_level {
            config.writer.compression = CompressionType::Zstd(level);
        }
        if let Some(rows) = c.row_group_size {
            config.writer.row_group_size = rows;
        }

        let i = &self.index;
        if let Some(threads) = i.threads {
            config.index.threads = threads;
        }
        if let Some(mb) = i.memory_limit_mb {
            config.index.memory_limit_bytes = mb * 1024 * 1024;
        }
        if let Some(rows) = i.scan_batch_size {
            config.index.scan_batch_size = rows;
        }

        let a = &self.aggregation;
        if let Some(topn) = a.topn {
            config.aggregation.topn = topn;
        }
        if let Some(enabled) = a.topn_enabled {
            config.aggregation.topn_enabled = enabled;
        }
        if let Some(enabled) = a.ibaq {
            config.aggregation.ibaq_enabled = enabled;
        }
    }
}

//! # qpx - mzTab to QPX Conversion Engine
//!
//! `qpx` turns the text outputs of a proteomics search and quantification
//! pipeline into columnar, self-describing Parquet tables (QPX):
//!
//! - **PSM table**: one row per peptide-spectrum match that passes the
//!   confidence filter.
//! - **Feature table**: PSMs joined with MSstats-style intensities and the
//!   SDRF sample annotation.
//! - **Protein group table**: per (protein group, sample) TopN and iBAQ
//!   intensities.
//!
//! ## Key Features
//!
//! - **Bounded memory**: the mzTab file is streamed once into an on-disk
//!   [`index`], and every later stage scans it in fixed-size batches.
//!
//! - **Reusable index**: an index built once serves every output kind, and is
//!   validated against the engine version when reopened.
//!
//! - **Atomic outputs**: files are written to hidden temporaries and renamed
//!   into place, so a failed conversion never leaves a partial table.
//!
//! - **Hive-style partitioning**: outputs may be split by run, charge, sample
//!   or any other partition field into `field=value` directories.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use qpx::convert::{ConversionConfig, Converter, IndexMode};
//!
//! let converter = Converter::new(ConversionConfig::default());
//! let index = converter.prepare_index(
//!     Some(Path::new("PXD000001.mzTab")),
//!     Path::new("PXD000001.index"),
//!     IndexMode::Build { overwrite: false },
//! )?;
//! let stats = converter.convert_psms(&index, Path::new("out"))?;
//! println!("Wrote {} PSMs to {}", stats.writer.rows_written, stats.output.display());
//! # Ok::<(), qpx::convert::ConversionError>(())
//! ```
//!
//! ## Reading QPX Files
//!
//! Outputs are plain Parquet and can be read with any Parquet-compatible tool:
//!
//! ```sql
//! -- DuckDB, over a partitioned feature output
//! SELECT sample_accession, count(*)
//! FROM read_parquet('out/qpx-*.feature/**/*.parquet', hive_partitioning = true)
//! GROUP BY sample_accession;
//! ```
//!
//! ## Architecture
//!
//! - [`mztab`]: streaming mzTab reader with typed records
//! - [`index`]: persistent, queryable store built from one mzTab pass
//! - [`loaders`]: quantification table and SDRF sample sheet loaders
//! - [`transform`]: join of identifications, intensities and samples
//! - [`aggregate`]: TopN and iBAQ protein-group intensities
//! - [`writer`]: output schemas and atomic, optionally partitioned Parquet writing
//! - [`convert`]: pipeline orchestration with stage-tagged errors
//!
//! ### File Footer Metadata
//!
//! Every output file carries:
//!
//! - `qpx:format_version`: output layout version
//! - `qpx:record_kind`: `psm`, `feature` or `protein_group`
//! - `qpx:source_file`: the mzTab file the index was built from
//! - `qpx:created`: creation time (RFC 3339)
//! - `qpx:confidence`: the confidence filter applied

// Documentation lints - enforce complete documentation for publication
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![allow(clippy::too_many_arguments)]

pub mod aggregate;
pub mod convert;
pub mod index;
pub mod loaders;
pub mod mztab;
pub mod transform;
pub mod writer;

#[cfg(test)]
mod fixtures;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::aggregate::{
        AggregationConfig, FastaDigestCounter, ProteinGroupAggregate, QuantMode,
        TheoreticalPeptideCounter,
    };
    pub use crate::convert::{
        ConfidenceThreshold, ConversionConfig, ConversionError, ConversionStats, Converter,
        IndexMode,
    };
    pub use crate::index::{Index, IndexConfig, IndexError};
    pub use crate::loaders::{Intensity, QuantMap, SampleMap};
    pub use crate::mztab::{IdentificationRecord, MzTabStreamer, ParsePolicy};
    pub use crate::transform::{ConfidencePolicy, UnifiedFeatureRecord};
    pub use crate::writer::{CompressionType, OutputNamer, RecordKind, WriterConfig, WriterStats};
}

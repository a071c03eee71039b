//! # Conversion Pipeline
//!
//! Orchestrates one mzTab input into QPX outputs:
//!
//! ```text
//! mzTab ──► Index (persisted) ──► JoinTransform ◄── QuantMap, SampleMap
//!                                      │
//!                     ┌────────────────┼──────────────────┐
//!                     ▼                ▼                  ▼
//!                 PSM output     feature output     Aggregator ──► protein group output
//! ```
//!
//! The index is built once and may be reopened for every output kind.
//! Batches flow strictly in order; a failure in any stage aborts the
//! conversion with a [`ConversionError`] naming the stage, and leaves no
//! partially written output.
//!
//! ```rust,no_run
//! use std::path::Path;
//! use qpx::convert::{ConversionConfig, Converter, IndexMode};
//!
//! let converter = Converter::new(ConversionConfig::default());
//! let index = converter.prepare_index(
//!     Some(Path::new("PXD000001.mzTab.gz")),
//!     Path::new("PXD000001.index"),
//!     IndexMode::Build { overwrite: false },
//! )?;
//! let quant = converter.load_quant(Path::new("msstats_in.csv"))?;
//! let samples = converter.load_samples(Path::new("PXD000001.sdrf.tsv"))?;
//! converter.convert_features(&index, &quant, Some(&samples), Path::new("out"))?;
//! # Ok::<(), qpx::convert::ConversionError>(())
//! ```

mod config;
mod converter;
mod error;

#[cfg(test)]
mod tests;

pub use config::{ConfidenceThreshold, ConversionConfig};
pub use converter::{ConversionStats, Converter, IndexMode};
pub use error::ConversionError;

//! # Aggregation Engine
//!
//! Groups unified records by (protein group, sample) and computes
//! protein-level intensities:
//!
//! - **TopN**: mean of the N most intense peptides (ties by ascending sequence)
//! - **iBAQ**: summed intensity over the theoretical peptide count of the
//!   lead accession
//! - **total**: sum of all measured peptide intensities
//!
//! A peptide's intensity is the sum of its distinct quant entries. Missing
//! stays missing at every level: an all-missing group yields a missing TopN,
//! never zero, and a pair with no peptides yields no row at all.

mod config;
mod digest;
mod engine;
mod error;


pub use config::{AggregationConfig, QuantMode};
pub use digest::{DigestParameters, FastaDigestCounter, Protease, TheoreticalPeptideCounter};
pub use engine::{aggregate, topn_intensity, total_intensity, Aggregator, ProteinGroupAggregate};
pub use error::AggregateError;

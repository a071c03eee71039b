//! # Auxiliary Loaders
//!
//! Join-side inputs of the conversion:
//!
//! - [`QuantMap`]: MSstats-style quantification table keyed by
//!   (protein group, peptide, charge, run)
//! - [`SampleMap`]: SDRF sample sheet keyed by run identifier
//!
//! Both are loaded fully into memory; they are small compared to the
//! identification data.

mod error;
pub mod quant;
pub mod sdrf;

#[cfg(test)]
mod tests;

pub use error::{LoaderError, UnresolvedSampleError};
pub use quant::{strip_peptide, Intensity, QuantEntry, QuantKey, QuantMap};
pub use sdrf::{Sample, SampleDescriptor, SampleMap};

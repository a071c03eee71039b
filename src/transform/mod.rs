//! # Join-Transform Engine
//!
//! Streams the index in fixed-size batches and joins each identification
//! record with its quantification entries and sample descriptor.
//!
//! - records failing the [`ConfidencePolicy`] are dropped and counted
//! - records without quantification are kept with a missing intensity
//! - a run absent from the sample sheet aborts the pass
//!
//! Output order is index insertion order; one record per identification,
//! never merged.

mod engine;
mod error;
mod policy;
mod record;

#[cfg(test)]
mod tests;

pub use engine::{transform, JoinTransform, TransformStats};
pub use error::TransformError;
pub use policy::{AcceptAll, ConfidencePolicy, PepCutoff, QValueCutoff, ScoreCutoff, ScoreDirection};
pub use record::{SampleMatch, UnifiedFeatureRecord};

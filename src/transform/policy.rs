//! Confidence filtering strategies
//!
//! Search pipelines report confidence differently: a q-value where lower is
//! better, a posterior error probability, or a raw engine score whose sense
//! depends on the engine. The policy is chosen by the caller and handed to
//! [`transform`](super::transform); the engine itself never branches on the
//! source format.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mztab::IdentificationRecord;

/// Decides whether an identification record is confident enough to keep
pub trait ConfidencePolicy: Send + Sync {
    /// `true` keeps the record
    fn accepts(&self, record: &IdentificationRecord) -> bool;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Keep records with `q_value <= max_q_value` (inclusive)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QValueCutoff {
    /// Maximum accepted q-value
    pub max_q_value: f64,
    /// Keep records that carry no q-value
    pub keep_missing: bool,
}

impl QValueCutoff {
    /// Cutoff that drops records without a q-value
    pub fn new(max_q_value: f64) -> Self {
        Self {
            max_q_value,
            keep_missing: false,
        }
    }
}

impl ConfidencePolicy for QValueCutoff {
    fn accepts(&self, record: &IdentificationRecord) -> bool {
        match record.q_value {
            Some(q) => q <= self.max_q_value,
            None => self.keep_missing,
        }
    }

    fn describe(&self) -> String {
        format!("q-value <= {}", self.max_q_value)
    }
}

/// Keep records with `posterior_error_probability <= max_pep` (inclusive)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PepCutoff {
    /// Maximum accepted PEP
    pub max_pep: f64,
    /// Keep records that carry no PEP
    pub keep_missing: bool,
}

impl PepCutoff {
    /// Cutoff that drops records without a PEP
    pub fn new(max_pep: f64) -> Self {
        Self {
            max_pep,
            keep_missing: false,
        }
    }
}

impl ConfidencePolicy for PepCutoff {
    fn accepts(&self, record: &IdentificationRecord) -> bool {
        match record.posterior_error_probability {
            Some(pep) => pep <= self.max_pep,
            None => self.keep_missing,
        }
    }

    fn describe(&self) -> String {
        format!("PEP <= {}", self.max_pep)
    }
}

/// Sense of a search engine score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoreDirection {
    /// E-values, expectation scores
    LowerIsBetter,
    /// Hyperscores, probabilities of correctness
    HigherIsBetter,
}

impl fmt::Display for ScoreDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreDirection::LowerIsBetter => write!(f, "<="),
            ScoreDirection::HigherIsBetter => write!(f, ">="),
        }
    }
}

/// Threshold on `search_engine_score[1]`, inclusive in the given direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreCutoff {
    /// Threshold value
    pub threshold: f64,
    /// Which side of the threshold is kept
    pub direction: ScoreDirection,
    /// Keep records that carry no score
    pub keep_missing: bool,
}

impl ConfidencePolicy for ScoreCutoff {
    fn accepts(&self, record: &IdentificationRecord) -> bool {
        match (record.search_engine_score, self.direction) {
            (Some(s), ScoreDirection::LowerIsBetter) => s <= self.threshold,
            (Some(s), ScoreDirection::HigherIsBetter) => s >= self.threshold,
            (None, _) => self.keep_missing,
        }
    }

    fn describe(&self) -> String {
        format!("search engine score {} {}", self.direction, self.threshold)
    }
}

/// Keep everything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptAll;

impl ConfidencePolicy for AcceptAll {
    fn accepts(&self, _record: &IdentificationRecord) -> bool {
        true
    }

    fn describe(&self) -> String {
        "no confidence filter".to_string()
    }
}

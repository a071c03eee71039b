use std::fmt;

/// Errors that can occur while loading the quantification table or sample sheet
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// I/O error reading the file
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// CSV/TSV parsing error
    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    /// Required column absent from the header
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Row with an unparseable value
    #[error("Invalid row at line {line}: {reason}")]
    InvalidRow {
        /// 1-based line number (header is line 1)
        line: u64,
        /// What was wrong with the row
        reason: String,
    },

    /// Two sample sheet rows describe the same run and label
    #[error("Duplicate sample for run '{run}' and label '{label}'")]
    DuplicateSample {
        /// Run identifier
        run: String,
        /// Channel label
        label: String,
    },
}

/// A run (and optionally channel) that is absent from the sample sheet.
///
/// Always fatal: it means the identification data and the experimental
/// design describe different experiments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct UnresolvedSampleError {
    /// Run identifier that could not be resolved
    pub run: String,
    /// Channel label, for labeled runs
    pub channel: Option<String>,
}

impl fmt::Display for UnresolvedSampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.channel {
            Some(channel) => write!(
                f,
                "run \"{}\" channel \"{}\" is not described in the sample sheet",
                self.run, channel
            ),
            None => write!(f, "run \"{}\" is not described in the sample sheet", self.run),
        }
    }
}

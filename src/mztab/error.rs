/// Errors that can occur while reading an mzTab file
#[derive(Debug, thiserror::Error)]
pub enum MzTabError {
    /// I/O error while reading the source
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed row. Carries the 1-based line number and the raw line.
    #[error("parse error at line {line}: {reason} (line: {content:?})")]
    Parse {
        /// 1-based line number in the (decompressed) source
        line: u64,
        /// Raw line content, truncated to a readable length
        content: String,
        /// What was wrong with the row
        reason: String,
    },

    /// A section row appeared before its header row
    #[error("line {line}: {section} row before its header")]
    MissingHeader {
        /// 1-based line number
        line: u64,
        /// Section prefix, e.g. `PSM`
        section: &'static str,
    },
}

impl MzTabError {
    /// Whether this error is a row-level problem that a skip policy may recover from
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MzTabError::Parse { .. })
    }

    /// Line number of the offending row, if known
    pub fn line(&self) -> Option<u64> {
        match self {
            MzTabError::Parse { line, .. } | MzTabError::MissingHeader { line, .. } => Some(*line),
            MzTabError::IoError(_) => None,
        }
    }

    pub(crate) fn parse(line: u64, content: &str, reason: impl Into<String>) -> Self {
        const MAX_CONTENT: usize = 200;
        let content = if content.len() > MAX_CONTENT {
            let mut end = MAX_CONTENT;
            while !content.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &content[..end])
        } else {
            content.to_string()
        };
        MzTabError::Parse {
            line,
            content,
            reason: reason.into(),
        }
    }
}

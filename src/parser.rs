//! Pure parsers for the console's text responses
//!
//! The console has no framing and no versioning, so every parser here is
//! tolerant: malformed lines are skipped and reported as [`ParseIssue`]s
//! rather than failing the whole response. The one strict check is the
//! `pwr` header, which gates the session's single re-read.

mod clock;
mod info;
mod power;
mod stat;

pub use clock::{format_set_time_command, parse_bms_datetime, parse_time};
pub use info::parse_info;
pub use power::{POWER_HEADER, has_power_header, parse_power};
pub use stat::parse_stat;

/// A line that looked like data but could not be converted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    /// 1-based line number within the response
    pub line_no: usize,
    /// The offending line, trimmed
    pub line: String,
    pub reason: String,
}

impl std::fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {} ({})", self.line_no, self.reason, self.line)
    }
}

impl ParseIssue {
    /// View this issue as the crate's row-level error kind
    pub fn to_error(&self) -> crate::error::PylonError {
        crate::error::PylonError::parse(self.to_string())
    }
}

/// Parsed value together with the rows that had to be skipped
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome<T> {
    pub value: T,
    pub issues: Vec<ParseIssue>,
}

impl<T> ParseOutcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            issues: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub(crate) fn push_issue(&mut self, line_no: usize, line: &str, reason: impl Into<String>) {
        self.issues.push(ParseIssue {
            line_no,
            line: line.trim().to_string(),
            reason: reason.into(),
        });
    }
}

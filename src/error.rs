use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognised timestamp: {0:?}")]
pub struct TimestampError(pub String);

/// A reason the whole batch was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("PII columns detected: {}", .0.join(", "))]
    PrivacyColumns(Vec<String>),

    #[error("Failed to parse {count} timestamps (rows {})", join_rows(.rows, .count))]
    UnparseableTimestamps { count: usize, rows: Vec<usize> },
}

fn join_rows(rows: &[usize], count: &usize) -> String {
    let mut joined = rows
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if *count > rows.len() {
        joined.push_str(", ...");
    }
    joined
}

/// Every problem found in a rejected batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Upload problems caught before the batch reaches validation.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Unsupported file type: {0} (save spreadsheets as CSV first)")]
    UnsupportedFileType(String),

    #[error("File too large ({size} bytes, limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("Malformed CSV: {0}")]
    Malformed(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

use chrono::{NaiveDate, NaiveDateTime};
use std::path::PathBuf;
use thiserror::Error;

/// Failures a single processing unit can raise.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("samples out of order at index {index}: {current} follows {previous}")]
    OutOfOrder {
        index: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("no {kind} data for {date}")]
    MissingInput { kind: &'static str, date: NaiveDate },

    #[error("malformed {}:{line}: {reason}", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TelemetryError {
    pub fn malformed<P: Into<PathBuf>>(path: P, line: usize, reason: impl Into<String>) -> Self {
        TelemetryError::Malformed {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}

//! Error types for slow query log analysis

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading logs or writing a report.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("could not open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line_number}: malformed {field} value '{value}' in metadata line")]
    MalformedMetadata {
        line_number: usize,
        field: &'static str,
        value: String,
    },

    #[error("failed to write report: {0}")]
    Output(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;

//! Domain errors for KAT parsing, masking, and file generation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while validating options or transforming a KAT file.
#[derive(Debug, Error)]
pub enum KatError {
    /// An input path does not resolve to a file.
    #[error("input file {path:?} does not exist")]
    MissingInputFile { path: PathBuf },

    /// A record payload is not valid for the configured word width.
    #[error("malformed record at line {line}{}: {reason}", vector_suffix(.vector))]
    MalformedRecord {
        line: usize,
        vector: Option<u32>,
        reason: String,
    },

    /// Width or share count outside the supported set.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl KatError {
    pub fn malformed(line: usize, vector: Option<u32>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            vector,
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn vector_suffix(vector: &Option<u32>) -> String {
    match vector {
        Some(id) => format!(" (vector {id})"),
        None => String::new(),
    }
}

// error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the ancestry pipeline.
///
/// Only input problems and unrecoverable numerical failures end up here. Samples that
/// match no population and reference codes missing from the taxonomy are ordinary
/// outcomes (`OTHER`), never errors.
#[derive(Error, Debug)]
pub enum AncestryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read delimited table: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error in {path} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Column '{column}' not found in header of {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Linear algebra failure for population '{group}': {message}")]
    Linalg { group: String, message: String },

    #[error("Failed to render plot {path}: {message}")]
    Plot { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, AncestryError>;

impl AncestryError {
    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn missing_column(path: impl Into<PathBuf>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            path: path.into(),
            column: column.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn linalg(group: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Linalg {
            group: group.into(),
            message: message.into(),
        }
    }
}

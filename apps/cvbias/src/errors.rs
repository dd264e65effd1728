use std::path::PathBuf;

use thiserror::Error;

/// Application-level error type.
/// Failures scoped to one CV never surface here; they become verdicts.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing input for {run}: {path}")]
    MissingInput { run: String, path: PathBuf },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        AppError::Json {
            path: path.into(),
            source,
        }
    }

    /// Errors that should skip the unit being processed rather than stop the command.
    pub fn is_skippable(&self) -> bool {
        matches!(self, AppError::MissingInput { .. } | AppError::Json { .. })
    }
}

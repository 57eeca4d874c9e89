use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that abort a single dependency analysis run
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The project manifest is missing or not valid JSON
    #[error("Cannot read manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    /// IO error while reading the source tree
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking scan worker died
    #[error("Analysis worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Invalid project path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

use crate::{MutationMode, Phase};
use depmonkey_analyzer::AnalysisError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Dependency analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    /// A state-machine edge that the controller never takes on its own
    #[error("Illegal controller transition {from:?} -> {to:?}")]
    IllegalTransition { from: Phase, to: Phase },

    #[error("Watcher error: {0}")]
    Watcher(String),
}

/// Failure of the external package-manager command
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("Refusing to {} an empty package set", mode.verb())]
    EmptySet { mode: MutationMode },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

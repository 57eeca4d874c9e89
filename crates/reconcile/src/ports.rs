use crate::{Decision, MutationError, MutationMode, Prompt};
use async_trait::async_trait;
use depmonkey_analyzer::{AnalysisResult, ProjectAnalyzer};
use std::collections::BTreeSet;
use std::path::Path;

/// Produces the used/missing/extra sets for a project directory.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, dir: &Path) -> depmonkey_analyzer::Result<AnalysisResult>;
}

#[async_trait]
impl Analyzer for ProjectAnalyzer {
    async fn analyze(&self, dir: &Path) -> depmonkey_analyzer::Result<AnalysisResult> {
        ProjectAnalyzer::analyze(self, dir).await
    }
}

/// One blocking question to the user. Always resolves to a decision.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn choose(&self, prompt: &Prompt) -> Decision;
}

/// Adds or removes packages from the manifest.
#[async_trait]
pub trait Mutator: Send + Sync {
    async fn apply(
        &self,
        mode: MutationMode,
        names: &BTreeSet<String>,
    ) -> Result<(), MutationError>;
}

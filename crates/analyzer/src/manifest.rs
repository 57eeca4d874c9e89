use crate::{AnalysisError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const MANIFEST_FILE_NAME: &str = "package.json";

/// Declared dependency groups of a `package.json`.
///
/// Version ranges are kept as raw JSON values; only the names matter here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, serde_json::Value>,
}

impl Manifest {
    /// Read `<dir>/package.json`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE_NAME);
        let bytes = std::fs::read(&path).map_err(|err| AnalysisError::Manifest {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        Self::parse(&bytes).map_err(|reason| AnalysisError::Manifest { path, reason })
    }

    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, String> {
        serde_json::from_slice(bytes).map_err(|err| err.to_string())
    }

    /// Names that ship with the package at runtime.
    pub fn runtime_names(&self) -> BTreeSet<&str> {
        self.dependencies
            .keys()
            .chain(self.peer_dependencies.keys())
            .chain(self.optional_dependencies.keys())
            .map(String::as_str)
            .collect()
    }

    /// Every declared name, development tooling included.
    pub fn declared_names(&self) -> BTreeSet<&str> {
        let mut names = self.runtime_names();
        names.extend(self.dev_dependencies.keys().map(String::as_str));
        names
    }
}

//! # depmonkey analyzer
//!
//! Finds the difference between what a Node.js project declares in
//! `package.json` and what its sources actually import.
//!
//! ## Pipeline
//!
//! ```text
//! Directory
//!     │
//!     ├──> Manifest (package.json)
//!     │      └─> Declared names
//!     │
//!     ├──> File Scanner (.gitignore aware)
//!     │      └─> Source files
//!     │
//!     └──> Import extraction
//!            └─> Used names ──> missing / extra
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use depmonkey_analyzer::{AnalyzerOptions, ProjectAnalyzer};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let analyzer = ProjectAnalyzer::new(AnalyzerOptions::default());
//!     let result = analyzer.analyze(Path::new(".")).await?;
//!
//!     println!("missing: {:?}, extra: {:?}", result.missing, result.extra);
//!     Ok(())
//! }
//! ```

mod error;
mod imports;
mod manifest;
mod scanner;

pub use error::{AnalysisError, Result};
pub use imports::{imported_packages, is_builtin, module_specifiers, package_name};
pub use manifest::{Manifest, MANIFEST_FILE_NAME};
pub use scanner::{
    has_source_extension, is_ignored_scope, FileScanner, DEFAULT_SOURCE_EXTENSIONS,
    IGNORED_SCOPES, ROOT_OUTPUT_SCOPES,
};

use std::collections::BTreeSet;
use std::path::Path;

/// Outcome of one analyzer run. Produced fresh every time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    pub used: BTreeSet<String>,
    pub missing: BTreeSet<String>,
    pub extra: BTreeSet<String>,
}

impl AnalysisResult {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Report unused `devDependencies` as extra too.
    pub check_dev: bool,
    /// Names never reported as missing or extra.
    pub ignore: BTreeSet<String>,
    /// Source file extensions to scan, without the leading dot.
    pub extensions: Vec<String>,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            check_dev: false,
            ignore: BTreeSet::new(),
            extensions: DEFAULT_SOURCE_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Declared names that no source file imports.
pub fn extra_of(
    manifest: &Manifest,
    used: &BTreeSet<String>,
    options: &AnalyzerOptions,
) -> BTreeSet<String> {
    let declared = if options.check_dev {
        manifest.declared_names()
    } else {
        manifest.runtime_names()
    };
    declared
        .into_iter()
        .filter(|name| !used.contains(*name) && !options.ignore.contains(*name))
        .map(ToString::to_string)
        .collect()
}

/// Imported names that the manifest does not declare in any group.
pub fn missing_of(
    manifest: &Manifest,
    used: &BTreeSet<String>,
    options: &AnalyzerOptions,
) -> BTreeSet<String> {
    let declared = manifest.declared_names();
    used.iter()
        .filter(|name| !declared.contains(name.as_str()) && !options.ignore.contains(*name))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ProjectAnalyzer {
    options: AnalyzerOptions,
}

impl ProjectAnalyzer {
    #[must_use]
    pub const fn new(options: AnalyzerOptions) -> Self {
        Self { options }
    }

    /// Run the scan on a blocking worker so callers can await it.
    pub async fn analyze(&self, dir: &Path) -> Result<AnalysisResult> {
        let dir = dir.to_path_buf();
        let options = self.options.clone();
        tokio::task::spawn_blocking(move || analyze_blocking(&dir, &options)).await?
    }
}

/// Synchronous analysis of the project rooted at `dir`.
pub fn analyze_blocking(dir: &Path, options: &AnalyzerOptions) -> Result<AnalysisResult> {
    if !dir.is_dir() {
        return Err(AnalysisError::InvalidPath(dir.display().to_string()));
    }

    let manifest = Manifest::load(dir)?;
    let used = used_packages(dir, options)?;
    let missing = missing_of(&manifest, &used, options);
    let extra = extra_of(&manifest, &used, options);

    log::debug!(
        "analyzed {}: {} used, {} missing, {} extra",
        dir.display(),
        used.len(),
        missing.len(),
        extra.len()
    );

    Ok(AnalysisResult {
        used,
        missing,
        extra,
    })
}

fn used_packages(dir: &Path, options: &AnalyzerOptions) -> Result<BTreeSet<String>> {
    let mut used = BTreeSet::new();
    for path in FileScanner::new(dir, &options.extensions).scan() {
        let bytes = std::fs::read(&path)?;
        let source = String::from_utf8_lossy(&bytes);
        used.extend(imported_packages(&source));
    }
    Ok(used)
}

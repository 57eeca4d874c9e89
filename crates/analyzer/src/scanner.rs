use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Scanner for finding JavaScript/TypeScript sources in a project
pub struct FileScanner {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>, extensions: &[String]) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extensions: extensions.iter().map(|ext| ext.to_lowercase()).collect(),
        }
    }

    /// Scan directory for source files (.gitignore aware)
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let root = self.root.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false);
        builder.filter_entry(move |entry| !is_ignored_scope(entry.path(), &root));

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }

                    let path = entry.path();
                    if !has_source_extension(path, &self.extensions) {
                        continue;
                    }

                    files.push(path.to_path_buf());
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        files.sort();
        log::debug!("Found {} source files", files.len());
        files
    }
}

pub fn has_source_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// True for dependency and VCS directories at any depth, and for build
/// output directly under `root`.
pub fn is_ignored_scope(path: &Path, root: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    relative
        .components()
        .enumerate()
        .any(|(depth, component)| {
            let std::path::Component::Normal(name) = component else {
                return false;
            };
            let lowered = name.to_string_lossy().to_lowercase();
            IGNORED_SCOPES.contains(&lowered.as_str())
                || (depth == 0 && ROOT_OUTPUT_SCOPES.contains(&lowered.as_str()))
        })
}

/// Skipped wherever they appear.
pub const IGNORED_SCOPES: &[&str] = &[
    // VCS / tooling
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    ".husky",
    ".yarn",
    ".npm",
    ".pnpm-store",
    // installed packages and caches
    ".cache",
    "node_modules",
    "bower_components",
    "jspm_packages",
    ".next",
    ".turbo",
    ".parcel-cache",
    ".output",
    ".nuxt",
    ".vite",
    ".vercel",
    ".svelte-kit",
    ".nyc_output",
];

/// Build output, skipped only at the project root. `src/build/` is source.
pub const ROOT_OUTPUT_SCOPES: &[&str] = &[
    "build",
    "dist",
    "coverage",
    "storybook-static",
    "tmp",
    "vendor",
];

pub const DEFAULT_SOURCE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx", "ts", "tsx"];

use anyhow::{anyhow, Context, Result};
use depmonkey_analyzer::{AnalyzerOptions, DEFAULT_SOURCE_EXTENSIONS};
use depmonkey_reconcile::{PackageManager, WatchConfig};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "depmonkey.toml";
pub const PACKAGE_MANAGER_ENV: &str = "DEPMONKEY_PACKAGE_MANAGER";
pub const DEBOUNCE_ENV: &str = "DEPMONKEY_DEBOUNCE_MS";

const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_MAX_BATCH_WAIT_MS: u64 = 2_000;

/// Contents of `depmonkey.toml`; every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub package_manager: Option<String>,
    pub manager_bin: Option<PathBuf>,
    pub debounce_ms: Option<u64>,
    pub max_batch_wait_ms: Option<u64>,
    #[serde(default)]
    pub ignore: Vec<String>,
    pub check_dev: Option<bool>,
    pub extensions: Option<Vec<String>>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| anyhow!("invalid {CONFIG_FILE_NAME}: {err}"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// An explicit path must exist; the default `<root>/depmonkey.toml` is optional.
    pub fn discover(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default_path = root.join(CONFIG_FILE_NAME);
        if default_path.is_file() {
            log::debug!("using config {}", default_path.display());
            return Self::load(&default_path);
        }
        Ok(Self::default())
    }
}

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub package_manager: Option<String>,
    pub manager_bin: Option<PathBuf>,
    pub debounce_ms: Option<u64>,
    pub ignore: Vec<String>,
    pub check_dev: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub package_manager: PackageManager,
    pub manager_bin: Option<PathBuf>,
    pub debounce: Duration,
    pub max_batch_wait: Duration,
    pub ignore: BTreeSet<String>,
    pub check_dev: bool,
    pub extensions: Vec<String>,
}

impl Settings {
    /// Flags win over the environment, which wins over the file.
    pub fn resolve(
        flags: &Overrides,
        env: impl Fn(&str) -> Option<String>,
        file: FileConfig,
    ) -> Result<Self> {
        let package_manager = match flags
            .package_manager
            .clone()
            .or_else(|| env(PACKAGE_MANAGER_ENV))
            .or(file.package_manager)
        {
            Some(raw) => raw.parse::<PackageManager>().map_err(|err| anyhow!(err))?,
            None => PackageManager::default(),
        };

        let env_debounce = env(DEBOUNCE_ENV)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("{DEBOUNCE_ENV} must be milliseconds, got '{raw}'"))
            })
            .transpose()?;
        let debounce_ms = flags
            .debounce_ms
            .or(env_debounce)
            .or(file.debounce_ms)
            .unwrap_or(DEFAULT_DEBOUNCE_MS);
        let max_batch_wait_ms = file
            .max_batch_wait_ms
            .unwrap_or(DEFAULT_MAX_BATCH_WAIT_MS)
            .max(debounce_ms);

        let ignore = file
            .ignore
            .into_iter()
            .chain(flags.ignore.iter().cloned())
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        let extensions = match file.extensions {
            Some(list) => normalize_extensions(list)?,
            None => DEFAULT_SOURCE_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
        };

        Ok(Self {
            package_manager,
            manager_bin: flags.manager_bin.clone().or(file.manager_bin),
            debounce: Duration::from_millis(debounce_ms),
            max_batch_wait: Duration::from_millis(max_batch_wait_ms),
            ignore,
            check_dev: flags.check_dev || file.check_dev.unwrap_or(false),
            extensions,
        })
    }

    #[must_use]
    pub fn analyzer_options(&self) -> AnalyzerOptions {
        AnalyzerOptions {
            check_dev: self.check_dev,
            // the reconciler owns the ignore list so it can grow at runtime
            ignore: BTreeSet::new(),
            extensions: self.extensions.clone(),
        }
    }

    #[must_use]
    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            debounce: self.debounce,
            max_batch_wait: self.max_batch_wait,
            extensions: self.extensions.clone(),
            ..WatchConfig::default()
        }
    }
}

fn normalize_extensions(list: Vec<String>) -> Result<Vec<String>> {
    let mut out: Vec<String> = list
        .into_iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    out.sort();
    out.dedup();
    if out.is_empty() {
        anyhow::bail!("extensions must name at least one file extension");
    }
    Ok(out)
}

use crate::{MutationError, MutationMode, Mutator};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageManager {
    #[default]
    Npm,
    Yarn,
    Pnpm,
}

impl PackageManager {
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
        }
    }

    /// Arguments (without the program) that add or remove `names` and persist the manifest.
    #[must_use]
    pub fn args(self, mode: MutationMode, names: &BTreeSet<String>) -> Vec<String> {
        let head: &[&str] = match (self, mode) {
            (Self::Npm, MutationMode::Install) => &["install", "--save", "--loglevel", "silent"],
            (Self::Npm, MutationMode::Uninstall) => {
                &["uninstall", "--save", "--loglevel", "silent"]
            }
            (Self::Yarn | Self::Pnpm, MutationMode::Install) => &["add", "--silent"],
            (Self::Yarn | Self::Pnpm, MutationMode::Uninstall) => &["remove", "--silent"],
        };
        head.iter()
            .map(ToString::to_string)
            .chain(names.iter().cloned())
            .collect()
    }
}

impl FromStr for PackageManager {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "npm" => Ok(Self::Npm),
            "yarn" => Ok(Self::Yarn),
            "pnpm" => Ok(Self::Pnpm),
            other => Err(format!(
                "unknown package manager '{other}' (expected npm, yarn or pnpm)"
            )),
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Runs the package manager as a child process in the project directory.
#[derive(Debug, Clone)]
pub struct CommandMutator {
    manager: PackageManager,
    program: PathBuf,
    cwd: PathBuf,
}

impl CommandMutator {
    pub fn new(manager: PackageManager, cwd: impl AsRef<Path>) -> Self {
        Self {
            manager,
            program: PathBuf::from(manager.program()),
            cwd: cwd.as_ref().to_path_buf(),
        }
    }

    /// Use a specific executable instead of looking the manager up on `PATH`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    #[must_use]
    pub const fn manager(&self) -> PackageManager {
        self.manager
    }
}

#[async_trait]
impl Mutator for CommandMutator {
    async fn apply(
        &self,
        mode: MutationMode,
        names: &BTreeSet<String>,
    ) -> Result<(), MutationError> {
        if names.is_empty() {
            return Err(MutationError::EmptySet { mode });
        }

        let program = self.program.display().to_string();
        let args = self.manager.args(mode, names);
        log::debug!("running {program} {} in {}", args.join(" "), self.cwd.display());

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .current_dir(&self.cwd)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|source| MutationError::Spawn {
                program: program.clone(),
                source,
            })?;

        check_output(&program, &output)
    }
}

/// Any non-zero exit or anything on stderr counts as failure; warnings included.
pub fn check_output(program: &str, output: &Output) -> Result<(), MutationError> {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if output.status.success() && stderr.is_empty() {
        return Ok(());
    }
    Err(MutationError::Failed {
        program: program.to_string(),
        status: output.status.to_string(),
        stderr,
    })
}

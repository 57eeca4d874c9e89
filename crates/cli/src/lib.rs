use anyhow::{Context, Result};
use clap::Parser;
use depmonkey_analyzer::ProjectAnalyzer;
use depmonkey_reconcile::{CommandMutator, IgnoreFilter, Reconciler, SourceWatcher};
use std::env;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};

mod config;
mod prompt;
mod render;

pub use config::{FileConfig, Overrides, Settings, CONFIG_FILE_NAME};
pub use prompt::DialoguerPrompter;
pub use render::RenderFlush;

#[derive(Parser, Debug)]
#[command(name = "depmonkey")]
#[command(
    about = "Watches a Node.js project and offers to fix package.json when imports and dependencies drift apart",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Project directory containing package.json
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Package manager used to add and remove dependencies (npm|yarn|pnpm)
    #[arg(long)]
    package_manager: Option<String>,

    /// Run this executable instead of the package manager found on PATH
    #[arg(long, value_name = "PATH")]
    manager_bin: Option<PathBuf>,

    /// Quiet period after the last file change before re-checking
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Never ask about this package (repeatable)
    #[arg(long = "ignore", value_name = "NAME")]
    ignore: Vec<String>,

    /// Also report unused devDependencies
    #[arg(long)]
    check_dev: bool,

    /// Check once and exit instead of watching
    #[arg(long)]
    once: bool,

    /// Config file (default: <DIR>/depmonkey.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            package_manager: self.package_manager.clone(),
            manager_bin: self.manager_bin.clone(),
            debounce_ms: self.debounce_ms,
            ignore: self.ignore.clone(),
            check_dev: self.check_dev,
        }
    }
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let root = cli
        .dir
        .canonicalize()
        .with_context(|| format!("Project directory {} not found", cli.dir.display()))?;
    let file = FileConfig::discover(&root, cli.config.as_deref())?;
    let settings = Settings::resolve(&cli.overrides(), |key| env::var(key).ok(), file)?;
    log::debug!("settings: {settings:?}");

    if cli.once {
        run_once(&root, &settings).await
    } else {
        run_watch(&root, &settings).await
    }
}

fn mutator(root: &Path, settings: &Settings) -> CommandMutator {
    let mutator = CommandMutator::new(settings.package_manager, root);
    let mutator = match &settings.manager_bin {
        Some(program) => mutator.with_program(program),
        None => mutator,
    };
    log::debug!("packages are changed with {}", mutator.manager());
    mutator
}

fn ignore_filter(settings: &Settings) -> IgnoreFilter {
    let filter = IgnoreFilter::with_names(settings.ignore.iter().cloned());
    if !filter.is_empty() {
        log::info!("never asking about {} package(s)", filter.len());
    }
    filter
}

async fn run_once(root: &Path, settings: &Settings) -> Result<()> {
    // nothing feeds this channel; the cycle never sees a change
    let (_changes_tx, changes) = mpsc::channel(1);
    let (flush, flushes) = render::flush_channel();
    let mut reconciler = Reconciler::new(
        root,
        ProjectAnalyzer::new(settings.analyzer_options()),
        DialoguerPrompter::new().with_flush(flush),
        mutator(root, settings),
        ignore_filter(settings),
        changes,
    );
    let renderer = render::spawn(reconciler.subscribe_updates(), flushes);

    let result = reconciler.run_cycle().await;
    drop(reconciler);
    if let Err(err) = renderer.await {
        log::debug!("renderer stopped: {err}");
    }

    let report = result.context("Dependency check failed")?;
    log::debug!(
        "cycle finished: {} queued, {} refreshes, {} outcomes",
        report.queued,
        report.refreshes,
        report.outcomes.len()
    );
    Ok(())
}

async fn run_watch(root: &Path, settings: &Settings) -> Result<()> {
    let (watcher, changes) = SourceWatcher::start(root, &settings.watch_config())
        .with_context(|| format!("Failed to watch {}", root.display()))?;
    log::info!(
        "watching {} directories under {}",
        watcher.watch_count(),
        root.display()
    );

    let (flush, flushes) = render::flush_channel();
    let reconciler = Reconciler::new(
        root,
        ProjectAnalyzer::new(settings.analyzer_options()),
        DialoguerPrompter::new().with_flush(flush),
        mutator(root, settings),
        ignore_filter(settings),
        changes,
    );
    let renderer = render::spawn(reconciler.subscribe_updates(), flushes);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let result = reconciler
        .watch(settings.debounce, settings.max_batch_wait, shutdown_rx)
        .await;
    drop(watcher);
    if let Err(err) = renderer.await {
        log::debug!("renderer stopped: {err}");
    }

    result.context("Dependency check failed")
}

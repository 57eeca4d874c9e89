use crate::{ReconcileError, Result};
use depmonkey_analyzer::{
    has_source_extension, is_ignored_scope, DEFAULT_SOURCE_EXTENSIONS, MANIFEST_FILE_NAME,
};
use ignore::WalkBuilder;
use log::{debug, warn};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time;

/// A batch of relevant paths reported by one filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceChange {
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub debounce: Duration,
    pub max_batch_wait: Duration,
    pub notify_poll_interval: Duration,
    pub extensions: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            max_batch_wait: Duration::from_secs(2),
            notify_poll_interval: Duration::from_secs(2),
            extensions: DEFAULT_SOURCE_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

type SharedWatcher = Arc<Mutex<Option<RecommendedWatcher>>>;
type WatchState = Arc<Mutex<HashSet<PathBuf>>>;

/// Keeps the OS watcher alive; dropping it closes the change channel.
pub struct SourceWatcher {
    watcher: SharedWatcher,
    watch_state: WatchState,
}

impl SourceWatcher {
    /// Must be called from inside a tokio runtime.
    pub fn start(
        root: &Path,
        config: &WatchConfig,
    ) -> Result<(Self, mpsc::Receiver<SourceChange>)> {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (change_tx, change_rx) = mpsc::channel(256);

        let (watcher, watch_state) =
            create_fs_watcher(root, event_tx, config.notify_poll_interval)?;
        let watcher = Arc::new(Mutex::new(Some(watcher)));

        spawn_forward_loop(
            root.to_path_buf(),
            config.extensions.clone(),
            event_rx,
            change_tx,
            watcher.clone(),
            watch_state.clone(),
        );

        Ok((
            Self {
                watcher,
                watch_state,
            },
            change_rx,
        ))
    }

    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watch_state.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

impl Drop for SourceWatcher {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.watcher.lock() {
            guard.take();
        }
    }
}

fn create_fs_watcher(
    root: &Path,
    sender: mpsc::Sender<notify::Result<Event>>,
    poll_interval: Duration,
) -> Result<(RecommendedWatcher, WatchState)> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = sender.blocking_send(res);
        },
        NotifyConfig::default().with_poll_interval(poll_interval),
    )
    .map_err(|e| ReconcileError::Watcher(format!("watcher init failed: {e}")))?;
    let watch_state = Arc::new(Mutex::new(HashSet::new()));
    {
        let mut guard = watch_state
            .lock()
            .map_err(|_| ReconcileError::Watcher("watch state lock poisoned".to_string()))?;
        for dir in build_watch_list(root, root) {
            if let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
                warn!("failed to watch {}: {err}", dir.display());
                continue;
            }
            guard.insert(dir);
        }
        if guard.is_empty() {
            return Err(ReconcileError::Watcher(format!(
                "could not watch {}",
                root.display()
            )));
        }
        debug!("watching {} directories under {}", guard.len(), root.display());
    }
    Ok((watcher, watch_state))
}

fn build_watch_list(root: &Path, start: &Path) -> Vec<PathBuf> {
    let mut builder = WalkBuilder::new(start);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .require_git(false);
    let root_owned = root.to_path_buf();
    builder.filter_entry(move |entry| is_watchable_dir(&root_owned, entry.path()));

    let mut out = Vec::new();
    for entry in builder.build() {
        let Ok(entry) = entry else {
            continue;
        };
        if entry.file_type().is_some_and(|ft| ft.is_dir()) {
            out.push(entry.path().to_path_buf());
        }
    }
    out
}

fn maybe_add_watches(root: &Path, evt: &Event, watcher: &SharedWatcher, watch_state: &WatchState) {
    if !matches!(evt.kind, EventKind::Create(_)) {
        return;
    }
    for path in &evt.paths {
        if path.is_dir() && is_watchable_dir(root, path) {
            add_watch_tree(root, path, watcher, watch_state);
        }
    }
}

fn add_watch_tree(root: &Path, start: &Path, watcher: &SharedWatcher, watch_state: &WatchState) {
    let to_add = build_watch_list(root, start);
    if to_add.is_empty() {
        return;
    }

    let mut new_dirs: Vec<PathBuf> = Vec::new();
    {
        let Ok(mut guard) = watch_state.lock() else {
            warn!("watch state lock poisoned");
            return;
        };
        for dir in to_add {
            if guard.insert(dir.clone()) {
                new_dirs.push(dir);
            }
        }
    }

    if new_dirs.is_empty() {
        return;
    }

    let Ok(mut watcher_guard) = watcher.lock() else {
        warn!("watcher lock poisoned");
        return;
    };
    let Some(watcher) = watcher_guard.as_mut() else {
        return;
    };
    for dir in new_dirs {
        if let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            warn!("failed to watch {}: {err}", dir.display());
            if let Ok(mut guard) = watch_state.lock() {
                guard.remove(&dir);
            }
        }
    }
}

fn is_watchable_dir(root: &Path, path: &Path) -> bool {
    if path == root {
        return true;
    }
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    if is_ignored_scope(path, root) {
        return false;
    }
    !relative.components().any(|component| {
        matches!(component, std::path::Component::Normal(name) if name.to_string_lossy().starts_with('.'))
    })
}

fn spawn_forward_loop(
    root: PathBuf,
    extensions: Vec<String>,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
    change_tx: mpsc::Sender<SourceChange>,
    watcher: SharedWatcher,
    watch_state: WatchState,
) {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let Some(change) = handle_event(&root, &extensions, event, &watcher, &watch_state)
            else {
                continue;
            };
            if change_tx.send(change).await.is_err() {
                debug!("change receiver dropped; stopping watcher loop");
                break;
            }
        }
    });
}

fn handle_event(
    root: &Path,
    extensions: &[String],
    event: notify::Result<Event>,
    watcher: &SharedWatcher,
    watch_state: &WatchState,
) -> Option<SourceChange> {
    match event {
        Ok(evt) => {
            // our own analyzer reads every source file; reads must not trigger a cycle
            if matches!(evt.kind, EventKind::Access(_)) {
                return None;
            }
            maybe_add_watches(root, &evt, watcher, watch_state);
            let paths: Vec<PathBuf> = evt
                .paths
                .into_iter()
                .filter(|path| is_relevant_path(root, path, extensions))
                .collect();
            (!paths.is_empty()).then_some(SourceChange { paths })
        }
        Err(err) => {
            warn!("Watcher error: {err}");
            None
        }
    }
}

/// Source files with a watched extension, plus the root manifest.
pub fn is_relevant_path(root: &Path, path: &Path, extensions: &[String]) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    if is_ignored_scope(path, root) {
        return false;
    }
    let hidden = relative.components().any(|component| {
        matches!(component, std::path::Component::Normal(name) if name.to_string_lossy().starts_with('.'))
    });
    if hidden {
        return false;
    }
    if relative == Path::new(MANIFEST_FILE_NAME) {
        return true;
    }
    has_source_extension(path, extensions)
}

/// Coalesces bursts of change events into one analysis run.
///
/// A run is due `debounce` after the latest event, but no later than
/// `max_batch` after the first event of the burst.
#[derive(Debug)]
pub struct DebounceState {
    debounce: Duration,
    max_batch: Duration,
    pending: usize,
    last_event: Option<Instant>,
    first_event: Option<Instant>,
}

impl DebounceState {
    #[must_use]
    pub const fn new(debounce: Duration, max_batch: Duration) -> Self {
        Self {
            debounce,
            max_batch,
            pending: 0,
            last_event: None,
            first_event: None,
        }
    }

    pub fn record_event(&mut self, count: usize) {
        let now = Instant::now();
        self.pending = self.pending.saturating_add(count.max(1));
        self.last_event = Some(now);
        self.first_event.get_or_insert(now);
    }

    #[must_use]
    pub const fn pending(&self) -> usize {
        self.pending
    }

    #[must_use]
    pub const fn should_run(&self) -> bool {
        self.pending > 0
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<time::Instant> {
        if !self.should_run() {
            return None;
        }

        let mut deadline = self.last_event.map(|last| last + self.debounce);
        if let Some(first) = self.first_event {
            let forced = first + self.max_batch;
            deadline = Some(match deadline {
                Some(current) if forced < current => forced,
                Some(current) => current,
                None => forced,
            });
        }

        deadline.map(time::Instant::from_std)
    }

    pub fn reset(&mut self) {
        self.pending = 0;
        self.last_event = None;
        self.first_event = None;
    }
}

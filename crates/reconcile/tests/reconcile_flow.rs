use async_trait::async_trait;
use depmonkey_analyzer::{AnalysisError, AnalysisResult};
use depmonkey_reconcile::{
    ActionOutcome, Analyzer, Category, Decision, IgnoreFilter, MutationError, MutationMode,
    Mutator, Phase, Prompt, Prompter, ReconcileError, ReconcileUpdate, Reconciler, Resolution,
    SourceChange,
};
use pretty_assertions::assert_eq;
use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(ToString::to_string).collect()
}

/// In-memory project: a manifest and the set of packages the sources use.
#[derive(Clone, Default)]
struct Project {
    declared: Arc<Mutex<BTreeSet<String>>>,
    used: Arc<Mutex<BTreeSet<String>>>,
    broken: Arc<Mutex<bool>>,
    analyses: Arc<AtomicUsize>,
}

impl Project {
    fn new(declared: &[&str], used: &[&str]) -> Self {
        let project = Self::default();
        *project.declared.lock().unwrap() = names(declared);
        *project.used.lock().unwrap() = names(used);
        project
    }

    fn declare(&self, name: &str) {
        self.declared.lock().unwrap().insert(name.to_string());
    }

    fn use_package(&self, name: &str) {
        self.used.lock().unwrap().insert(name.to_string());
    }

    fn declared(&self) -> BTreeSet<String> {
        self.declared.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyzer for Project {
    async fn analyze(&self, _dir: &Path) -> depmonkey_analyzer::Result<AnalysisResult> {
        self.analyses.fetch_add(1, Ordering::SeqCst);
        if *self.broken.lock().unwrap() {
            return Err(AnalysisError::Manifest {
                path: PathBuf::from("package.json"),
                reason: "unexpected end of JSON input".to_string(),
            });
        }
        let declared = self.declared.lock().unwrap().clone();
        let used = self.used.lock().unwrap().clone();
        Ok(AnalysisResult {
            missing: used.difference(&declared).cloned().collect(),
            extra: declared.difference(&used).cloned().collect(),
            used,
        })
    }
}

type PromptHook = Box<dyn Fn(usize, &Prompt) + Send + Sync>;

/// Answers prompts from a script (falling back to `default`) and records them.
struct ScriptedPrompter {
    answers: Mutex<VecDeque<Decision>>,
    default: Decision,
    seen: Arc<Mutex<Vec<(Category, BTreeSet<String>)>>>,
    hook: Option<PromptHook>,
}

impl ScriptedPrompter {
    fn always(decision: Decision) -> Self {
        Self::script(&[], decision)
    }

    fn script(answers: &[Decision], default: Decision) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            default,
            seen: Arc::default(),
            hook: None,
        }
    }

    fn with_hook(mut self, hook: impl Fn(usize, &Prompt) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn choose(&self, prompt: &Prompt) -> Decision {
        let index = {
            let mut seen = self.seen.lock().unwrap();
            seen.push((prompt.category, prompt.names.iter().cloned().collect()));
            seen.len()
        };
        if let Some(hook) = &self.hook {
            hook(index, prompt);
        }
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default)
    }
}

/// Applies mutations to the in-memory manifest, optionally failing.
struct FakePackageManager {
    project: Option<Project>,
    fail: bool,
    calls: Arc<Mutex<Vec<(MutationMode, BTreeSet<String>)>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakePackageManager {
    fn for_project(project: &Project) -> Self {
        Self {
            project: Some(project.clone()),
            ..Self::detached()
        }
    }

    fn detached() -> Self {
        Self {
            project: None,
            fail: false,
            calls: Arc::default(),
            in_flight: Arc::default(),
            max_in_flight: Arc::default(),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::detached()
        }
    }
}

#[async_trait]
impl Mutator for FakePackageManager {
    async fn apply(&self, mode: MutationMode, names: &BTreeSet<String>) -> Result<(), MutationError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.calls.lock().unwrap().push((mode, names.clone()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(MutationError::Failed {
                program: "npm".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "npm ERR! 404 Not Found".to_string(),
            });
        }
        if let Some(project) = &self.project {
            let mut declared = project.declared.lock().unwrap();
            for name in names {
                match mode {
                    MutationMode::Install => declared.insert(name.clone()),
                    MutationMode::Uninstall => declared.remove(name),
                };
            }
        }
        Ok(())
    }
}

fn change() -> SourceChange {
    SourceChange {
        paths: vec![PathBuf::from("/project/index.js")],
    }
}

fn drain_updates(rx: &mut broadcast::Receiver<ReconcileUpdate>) -> Vec<ReconcileUpdate> {
    let mut out = Vec::new();
    while let Ok(update) = rx.try_recv() {
        out.push(update);
    }
    out
}

#[tokio::test]
async fn clean_project_queues_nothing_and_reports_idle() {
    let project = Project::new(&["lodash"], &["lodash"]);
    let prompter = ScriptedPrompter::always(Decision::Apply);
    let seen = prompter.seen.clone();
    let (_tx, rx) = mpsc::channel(8);
    let mut reconciler = Reconciler::new(
        "/project",
        project.clone(),
        prompter,
        FakePackageManager::detached(),
        IgnoreFilter::new(),
        rx,
    );
    let mut updates = reconciler.subscribe_updates();

    let report = reconciler.run_cycle().await.unwrap();

    assert!(report.is_idle());
    assert_eq!(drain_updates(&mut updates), vec![ReconcileUpdate::Idle]);
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(reconciler.phase(), Phase::Idle);
}

#[tokio::test]
async fn installs_missing_dependency_end_to_end() {
    let project = Project::new(&["lodash"], &["lodash", "chalk"]);
    let mutator = FakePackageManager::for_project(&project);
    let calls = mutator.calls.clone();
    let prompter = ScriptedPrompter::always(Decision::Apply);
    let seen = prompter.seen.clone();
    let (_tx, rx) = mpsc::channel(8);
    let mut reconciler = Reconciler::new(
        "/project",
        project.clone(),
        prompter,
        mutator,
        IgnoreFilter::new(),
        rx,
    );
    let mut updates = reconciler.subscribe_updates();

    let report = reconciler.run_cycle().await.unwrap();

    assert_eq!(report.queued, 1);
    assert_eq!(
        report.outcomes,
        vec![ActionOutcome::Resolved {
            category: Category::Missing,
            resolution: Resolution::Applied(names(&["chalk"])),
        }]
    );
    assert_eq!(seen.lock().unwrap().as_slice(), &[(Category::Missing, names(&["chalk"]))]);
    assert_eq!(
        calls.lock().unwrap().as_slice(),
        &[(MutationMode::Install, names(&["chalk"]))]
    );
    assert!(reconciler.state().pending(Category::Missing).is_empty());
    assert_eq!(project.declared(), names(&["chalk", "lodash"]));
    assert_eq!(
        drain_updates(&mut updates),
        vec![
            ReconcileUpdate::Attention {
                category: Category::Missing
            },
            ReconcileUpdate::Applying {
                category: Category::Missing,
                names: names(&["chalk"]),
            },
            ReconcileUpdate::Applied {
                category: Category::Missing,
                names: names(&["chalk"]),
            },
        ]
    );

    let second = reconciler.run_cycle().await.unwrap();
    assert!(second.is_idle());
}

#[tokio::test]
async fn missing_is_resolved_before_extra() {
    let project = Project::new(&["left-pad"], &["chalk"]);
    let prompter = ScriptedPrompter::always(Decision::DeferOnce);
    let seen = prompter.seen.clone();
    let (_tx, rx) = mpsc::channel(8);
    let mut reconciler = Reconciler::new(
        "/project",
        project,
        prompter,
        FakePackageManager::detached(),
        IgnoreFilter::new(),
        rx,
    );

    reconciler.run_cycle().await.unwrap();

    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[
            (Category::Missing, names(&["chalk"])),
            (Category::Extra, names(&["left-pad"])),
        ]
    );
}

#[tokio::test]
async fn change_during_prompt_is_coalesced_into_queued_action() {
    let project = Project::new(&["lodash", "left-pad"], &["lodash", "chalk"]);
    let (tx, rx) = mpsc::channel(8);
    let hook_project = project.clone();
    // while the user looks at the first prompt, another unused dependency appears
    let prompter = ScriptedPrompter::always(Decision::Apply).with_hook(move |index, _| {
        if index == 1 {
            hook_project.declare("rimraf");
            tx.try_send(change()).unwrap();
            tx.try_send(change()).unwrap();
        }
    });
    let seen = prompter.seen.clone();
    let mut reconciler = Reconciler::new(
        "/project",
        project.clone(),
        prompter,
        FakePackageManager::for_project(&project),
        IgnoreFilter::new(),
        rx,
    );

    let report = reconciler.run_cycle().await.unwrap();

    assert_eq!(report.refreshes, 1);
    assert_eq!(report.queued, 2);
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[
            (Category::Missing, names(&["chalk"])),
            (Category::Extra, names(&["left-pad", "rimraf"])),
        ]
    );
    assert_eq!(project.declared(), names(&["chalk", "lodash"]));
    assert_eq!(project.analyses.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ignored_package_is_never_asked_about_again() {
    let project = Project::new(&[], &["x"]);
    let prompter = ScriptedPrompter::script(&[Decision::IgnorePermanently], Decision::DeferOnce);
    let seen = prompter.seen.clone();
    let (_tx, rx) = mpsc::channel(8);
    let mut reconciler = Reconciler::new(
        "/project",
        project.clone(),
        prompter,
        FakePackageManager::detached(),
        IgnoreFilter::new(),
        rx,
    );

    reconciler.run_cycle().await.unwrap();
    assert!(reconciler.state().ignored().contains("x"));

    let second = reconciler.run_cycle().await.unwrap();
    assert!(second.is_idle());

    project.use_package("y");
    reconciler.run_cycle().await.unwrap();

    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[
            (Category::Missing, names(&["x"])),
            (Category::Missing, names(&["y"])),
        ]
    );
}

#[tokio::test]
async fn seeded_ignore_list_suppresses_from_the_start() {
    let project = Project::new(&["husky"], &[]);
    let (_tx, rx) = mpsc::channel(8);
    let mut reconciler = Reconciler::new(
        "/project",
        project,
        ScriptedPrompter::always(Decision::Apply),
        FakePackageManager::detached(),
        IgnoreFilter::with_names(["husky"]),
        rx,
    );

    assert!(reconciler.run_cycle().await.unwrap().is_idle());
}

#[tokio::test]
async fn failed_install_keeps_pending_and_continues_draining() {
    let project = Project::new(&["left-pad"], &["a", "b"]);
    let prompter = ScriptedPrompter::always(Decision::Apply);
    let seen = prompter.seen.clone();
    let (_tx, rx) = mpsc::channel(8);
    let mut reconciler = Reconciler::new(
        "/project",
        project,
        prompter,
        FakePackageManager::failing(),
        IgnoreFilter::new(),
        rx,
    );
    let mut updates = reconciler.subscribe_updates();

    let report = reconciler.run_cycle().await.unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert!(matches!(
        &report.outcomes[0],
        ActionOutcome::Failed { category: Category::Missing, names: failed, .. } if failed == &names(&["a", "b"])
    ));
    assert_eq!(
        reconciler.state().pending(Category::Missing),
        &names(&["a", "b"])
    );
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert!(drain_updates(&mut updates).iter().any(|update| matches!(
        update,
        ReconcileUpdate::MutationFailed { error, .. } if error.contains("404")
    )));
}

#[tokio::test]
async fn deferred_names_resurface_only_while_still_reported() {
    let project = Project::new(&[], &["a", "b"]);
    let prompter = ScriptedPrompter::always(Decision::DeferOnce);
    let seen = prompter.seen.clone();
    let (_tx, rx) = mpsc::channel(8);
    let mut reconciler = Reconciler::new(
        "/project",
        project.clone(),
        prompter,
        FakePackageManager::detached(),
        IgnoreFilter::new(),
        rx,
    );

    reconciler.run_cycle().await.unwrap();
    assert_eq!(
        reconciler.state().pending(Category::Missing),
        &names(&["a", "b"])
    );

    project.declare("a");
    reconciler.run_cycle().await.unwrap();

    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[
            (Category::Missing, names(&["a", "b"])),
            (Category::Missing, names(&["b"])),
        ]
    );
}

#[tokio::test]
async fn mutations_never_overlap_under_a_stream_of_changes() {
    let project = Project::new(&[], &["a"]);
    let (tx, rx) = mpsc::channel(64);
    // keep the package missing and fire a burst of changes during the first five prompts
    let prompter = ScriptedPrompter::always(Decision::Apply).with_hook(move |index, _| {
        if index <= 5 {
            for _ in 0..3 {
                let _ = tx.try_send(change());
            }
        }
    });
    let mutator = FakePackageManager::detached();
    let calls = mutator.calls.clone();
    let max_in_flight = mutator.max_in_flight.clone();
    let mut reconciler = Reconciler::new(
        "/project",
        project,
        prompter,
        mutator,
        IgnoreFilter::new(),
        rx,
    );

    let report = reconciler.run_cycle().await.unwrap();

    assert_eq!(report.refreshes, 5);
    assert_eq!(calls.lock().unwrap().len(), 6);
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn analysis_failure_aborts_cycle_and_leaves_queue_untouched() {
    let project = Project::new(&[], &["chalk"]);
    *project.broken.lock().unwrap() = true;
    let (_tx, rx) = mpsc::channel(8);
    let mut reconciler = Reconciler::new(
        "/project",
        project.clone(),
        ScriptedPrompter::always(Decision::DeferOnce),
        FakePackageManager::detached(),
        IgnoreFilter::new(),
        rx,
    );
    let mut updates = reconciler.subscribe_updates();

    let err = reconciler.run_cycle().await.unwrap_err();

    assert!(matches!(err, ReconcileError::Analysis(_)), "{err}");
    assert_eq!(reconciler.phase(), Phase::Idle);
    assert_eq!(reconciler.queued(), 0);
    assert!(matches!(
        drain_updates(&mut updates).as_slice(),
        [ReconcileUpdate::AnalysisFailed { .. }]
    ));

    *project.broken.lock().unwrap() = false;
    let report = reconciler.run_cycle().await.unwrap();
    assert_eq!(report.outcomes.len(), 1);
}

#[tokio::test]
async fn watch_loop_reruns_after_debounced_change_and_stops_on_shutdown() {
    let project = Project::new(&["lodash"], &["lodash"]);
    let (tx, rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = Reconciler::new(
        "/project",
        project.clone(),
        ScriptedPrompter::always(Decision::Apply),
        FakePackageManager::for_project(&project),
        IgnoreFilter::new(),
        rx,
    );
    let mut updates = reconciler.subscribe_updates();

    let driver = async {
        assert_eq!(updates.recv().await.unwrap(), ReconcileUpdate::Idle);

        project.use_package("chalk");
        tx.send(change()).await.unwrap();
        tx.send(change()).await.unwrap();

        loop {
            if let ReconcileUpdate::Applied { names: applied, .. } = updates.recv().await.unwrap() {
                assert_eq!(applied, names(&["chalk"]));
                break;
            }
        }
        shutdown_tx.send(true).unwrap();
    };

    let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(
            reconciler.watch(Duration::from_millis(20), Duration::from_millis(200), shutdown_rx),
            driver
        )
    })
    .await
    .expect("watch loop finished in time");

    result.unwrap();
    assert_eq!(project.declared(), names(&["chalk", "lodash"]));
    assert_eq!(project.analyses.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn watch_returns_startup_analysis_error() {
    let project = Project::new(&[], &[]);
    *project.broken.lock().unwrap() = true;
    let (_tx, rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = Reconciler::new(
        "/project",
        project,
        ScriptedPrompter::always(Decision::Apply),
        FakePackageManager::detached(),
        IgnoreFilter::new(),
        rx,
    );

    let err = reconciler
        .watch(Duration::from_millis(10), Duration::from_millis(50), shutdown_rx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("package.json"), "{err}");
}

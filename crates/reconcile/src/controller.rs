use crate::resolver::{self, join_names, Resolution};
use crate::watcher::{DebounceState, SourceChange};
use crate::{
    ActionQueue, Analyzer, Category, ControllerState, IgnoreFilter, Mutator, Phase, Prompter,
    ReconcileError, Result,
};
use depmonkey_analyzer::AnalysisResult;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time;

/// User-facing progress, published on a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileUpdate {
    /// A full cycle finished with nothing to ask about.
    Idle,
    /// An action is about to be resolved.
    Attention { category: Category },
    /// The package manager is about to run.
    Applying {
        category: Category,
        names: BTreeSet<String>,
    },
    Applied {
        category: Category,
        names: BTreeSet<String>,
    },
    Deferred {
        category: Category,
        names: BTreeSet<String>,
    },
    Ignored {
        category: Category,
        names: BTreeSet<String>,
    },
    Skipped { category: Category },
    MutationFailed {
        category: Category,
        names: BTreeSet<String>,
        error: String,
    },
    AnalysisFailed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Resolved {
        category: Category,
        resolution: Resolution,
    },
    Failed {
        category: Category,
        names: BTreeSet<String>,
        error: String,
    },
}

/// Summary of one Analyzing -> Queuing -> Draining pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// New queue entries (coalesced pushes are not counted).
    pub queued: usize,
    /// Re-analyses triggered by changes that arrived mid-drain.
    pub refreshes: usize,
    pub outcomes: Vec<ActionOutcome>,
}

impl CycleReport {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.outcomes.is_empty()
    }
}

/// Drives analysis, queuing and interactive resolution for one project.
pub struct Reconciler<A, P, M> {
    root: PathBuf,
    analyzer: A,
    prompter: P,
    mutator: M,
    state: ControllerState,
    queue: ActionQueue,
    changes: mpsc::Receiver<SourceChange>,
    update_tx: broadcast::Sender<ReconcileUpdate>,
}

impl<A, P, M> Reconciler<A, P, M>
where
    A: Analyzer,
    P: Prompter,
    M: Mutator,
{
    pub fn new(
        root: impl Into<PathBuf>,
        analyzer: A,
        prompter: P,
        mutator: M,
        ignored: IgnoreFilter,
        changes: mpsc::Receiver<SourceChange>,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(64);
        Self {
            root: root.into(),
            analyzer,
            prompter,
            mutator,
            state: ControllerState::new(ignored),
            queue: ActionQueue::new(),
            changes,
            update_tx,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.state.phase()
    }

    #[must_use]
    pub const fn state(&self) -> &ControllerState {
        &self.state
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn subscribe_updates(&self) -> broadcast::Receiver<ReconcileUpdate> {
        self.update_tx.subscribe()
    }

    /// Run one full cycle. Only legal while `Idle`.
    ///
    /// An analysis failure leaves the queue untouched, returns the controller
    /// to `Idle` and is returned to the caller.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.transition(Phase::Analyzing)?;
        // whatever changed so far is covered by the analysis below
        self.absorb_changes();
        info!("checking dependencies in {}", self.root.display());

        let result = match self.analyzer.analyze(&self.root).await {
            Ok(result) => result,
            Err(err) => {
                error!("dependency check failed: {err}");
                self.publish(ReconcileUpdate::AnalysisFailed {
                    error: err.to_string(),
                });
                self.transition(Phase::Idle)?;
                return Err(err.into());
            }
        };

        self.transition(Phase::Queuing)?;
        let queued = self.enqueue_analysis(&result);
        self.transition(Phase::Draining)?;
        let mut report = match self.drain().await {
            Ok(report) => report,
            Err(err) => {
                warn!("cycle aborted while {:?}: {err}", self.state.phase);
                self.state.phase = Phase::Idle;
                return Err(err);
            }
        };
        report.queued = report.queued.saturating_add(queued);
        self.transition(Phase::Idle)?;

        if report.is_idle() {
            info!("dependencies match the manifest");
            self.publish(ReconcileUpdate::Idle);
        }
        Ok(report)
    }

    /// Run the startup cycle, then re-run on debounced changes until the
    /// change feed closes or `shutdown` flips to `true`.
    ///
    /// Only a startup analysis failure is returned; later ones are logged.
    pub async fn watch(
        mut self,
        debounce: Duration,
        max_batch_wait: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        self.run_cycle().await?;

        let mut state = DebounceState::new(debounce, max_batch_wait);
        loop {
            let next_deadline = state.next_deadline();

            tokio::select! {
                change = self.changes.recv() => {
                    let Some(change) = change else {
                        info!("change feed closed; stopping");
                        break;
                    };
                    debug!("change detected: {:?}", change.paths);
                    state.record_event(change.paths.len());
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        info!("shutdown requested");
                        break;
                    }
                }
                () = async {
                    if let Some(deadline) = next_deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if next_deadline.is_some() => {
                    debug!("running cycle for {} pending change(s)", state.pending());
                    state.reset();
                    if let Err(err) = self.run_cycle().await {
                        warn!("cycle aborted: {err}");
                    }
                }
            }
        }
        Ok(())
    }

    fn transition(&mut self, to: Phase) -> Result<()> {
        let from = self.state.phase;
        if !from.can_transition_to(to) {
            return Err(ReconcileError::IllegalTransition { from, to });
        }
        debug!("controller {from:?} -> {to:?}");
        self.state.phase = to;
        Ok(())
    }

    /// Queuing step: push every non-empty category, missing first.
    fn enqueue_analysis(&mut self, result: &AnalysisResult) -> usize {
        if result.is_clean() {
            return 0;
        }
        let mut queued = 0usize;
        for (category, names) in [
            (Category::Missing, &result.missing),
            (Category::Extra, &result.extra),
        ] {
            let names = self.state.ignored().filter(names);
            if names.is_empty() {
                continue;
            }
            if self.push(category, names) {
                queued = queued.saturating_add(1);
            }
        }
        queued
    }

    /// Returns `true` if a new entry was queued, `false` if coalesced into
    /// the entry already waiting for this category.
    fn push(&mut self, category: Category, names: BTreeSet<String>) -> bool {
        if self.queue.contains(category) {
            debug!("coalescing {} {category} name(s)", names.len());
            self.state.pending_mut(category).extend(names);
            return false;
        }
        *self.state.pending_mut(category) = names;
        self.queue.enqueue(category)
    }

    async fn drain(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        if !self.queue.begin_drain() {
            debug!("drain already running; ignoring nested request");
            return Ok(report);
        }

        let drained = self.drain_entries(&mut report).await;
        self.queue.end_drain();
        drained.map(|()| report)
    }

    async fn drain_entries(&mut self, report: &mut CycleReport) -> Result<()> {
        while let Some(category) = self.queue.pop() {
            self.publish(ReconcileUpdate::Attention { category });
            let outcome = self.execute(category).await;
            report.outcomes.push(outcome);

            if self.absorb_changes() {
                report.refreshes = report.refreshes.saturating_add(1);
                let queued = self.refresh().await?;
                report.queued = report.queued.saturating_add(queued);
            }
        }
        Ok(())
    }

    async fn execute(&mut self, category: Category) -> ActionOutcome {
        let update_tx = self.update_tx.clone();
        let notifying = NotifyingMutator {
            inner: &self.mutator,
            category,
            update_tx: &update_tx,
        };
        match resolver::resolve(category, &mut self.state, &self.prompter, &notifying).await {
            Ok(resolution) => {
                let update = match &resolution {
                    Resolution::Applied(names) => {
                        info!("{category} dependencies resolved: {}", join_names(names));
                        ReconcileUpdate::Applied {
                            category,
                            names: names.clone(),
                        }
                    }
                    Resolution::Deferred(names) => ReconcileUpdate::Deferred {
                        category,
                        names: names.clone(),
                    },
                    Resolution::Ignored(names) => {
                        info!("ignoring {}", join_names(names));
                        ReconcileUpdate::Ignored {
                            category,
                            names: names.clone(),
                        }
                    }
                    Resolution::Skipped => ReconcileUpdate::Skipped { category },
                };
                self.publish(update);
                ActionOutcome::Resolved {
                    category,
                    resolution,
                }
            }
            Err(err) => {
                error!("failed to {} packages: {err}", category.mutation_mode().verb());
                let names = self.state.pending(category).clone();
                self.publish(ReconcileUpdate::MutationFailed {
                    category,
                    names: names.clone(),
                    error: err.to_string(),
                });
                ActionOutcome::Failed {
                    category,
                    names,
                    error: err.to_string(),
                }
            }
        }
    }

    /// Draining -> Analyzing -> Queuing -> Draining. A failed analysis keeps
    /// the existing queue and goes straight back to draining.
    async fn refresh(&mut self) -> Result<usize> {
        self.transition(Phase::Analyzing)?;
        debug!("changes arrived while draining; re-checking");
        match self.analyzer.analyze(&self.root).await {
            Ok(result) => {
                self.transition(Phase::Queuing)?;
                let queued = self.enqueue_analysis(&result);
                self.transition(Phase::Draining)?;
                Ok(queued)
            }
            Err(err) => {
                error!("dependency re-check failed: {err}");
                self.publish(ReconcileUpdate::AnalysisFailed {
                    error: err.to_string(),
                });
                self.transition(Phase::Draining)?;
                Ok(0)
            }
        }
    }

    /// Drop all buffered change notifications; report whether there were any.
    fn absorb_changes(&mut self) -> bool {
        let mut seen = false;
        while let Ok(change) = self.changes.try_recv() {
            debug!("change recorded while busy: {:?}", change.paths);
            seen = true;
        }
        seen
    }

    fn publish(&self, update: ReconcileUpdate) {
        // no subscribers is fine
        let _ = self.update_tx.send(update);
    }
}

/// Wraps the real mutator so the UI hears about a mutation before it starts.
struct NotifyingMutator<'a, M> {
    inner: &'a M,
    category: Category,
    update_tx: &'a broadcast::Sender<ReconcileUpdate>,
}

#[async_trait::async_trait]
impl<'a, M: Mutator> Mutator for NotifyingMutator<'a, M> {
    async fn apply(
        &self,
        mode: crate::MutationMode,
        names: &BTreeSet<String>,
    ) -> std::result::Result<(), crate::MutationError> {
        let _ = self.update_tx.send(ReconcileUpdate::Applying {
            category: self.category,
            names: names.clone(),
        });
        self.inner.apply(mode, names).await
    }
}

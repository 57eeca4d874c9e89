//! # depmonkey reconcile
//!
//! The watch-triggered loop that turns dependency analysis into questions
//! for the user and package-manager runs.
//!
//! ## Flow
//!
//! ```text
//! SourceWatcher (notify)
//!     │  SourceChange
//!     ▼
//! Reconciler ──> Analyzer ──> IgnoreFilter ──> ActionQueue (≤1 entry per category)
//!     │                                              │
//!     │                                              ▼ drain, one at a time
//!     │                                        resolver ──> Prompter
//!     │                                              │
//!     └──────────── ReconcileUpdate ◄────────── Mutator (npm/yarn/pnpm)
//! ```
//!
//! Everything runs on one task. The only suspension points are the analyzer,
//! the prompt and the package manager; change notifications that arrive
//! meanwhile are buffered and folded into a single re-analysis.

mod controller;
mod error;
mod executor;
mod ports;
mod queue;
mod resolver;
mod state;
mod watcher;

pub use controller::{ActionOutcome, CycleReport, ReconcileUpdate, Reconciler};
pub use error::{MutationError, ReconcileError, Result};
pub use executor::{check_output, CommandMutator, PackageManager};
pub use ports::{Analyzer, Mutator, Prompter};
pub use queue::ActionQueue;
pub use resolver::{resolve, Choice, Prompt, Resolution, CHOICES};
pub use state::{Category, ControllerState, Decision, IgnoreFilter, MutationMode, Phase};
pub use watcher::{is_relevant_path, DebounceState, SourceChange, SourceWatcher, WatchConfig};

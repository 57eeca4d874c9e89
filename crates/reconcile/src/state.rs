use std::collections::BTreeSet;
use std::fmt;

/// Kind of manifest/source mismatch. Each kind owns at most one queued action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Missing,
    Extra,
}

impl Category {
    #[must_use]
    pub const fn mutation_mode(self) -> MutationMode {
        match self {
            Self::Missing => MutationMode::Install,
            Self::Extra => MutationMode::Uninstall,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Extra => "extra",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationMode {
    Install,
    Uninstall,
}

impl MutationMode {
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
        }
    }
}

/// What the user picked for one prompt. Consumed immediately, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Apply,
    DeferOnce,
    IgnorePermanently,
}

/// Controller phases. Legal edges are listed in [`Phase::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Analyzing,
    Queuing,
    Draining,
}

impl Phase {
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::Analyzing)
                | (Self::Analyzing, Self::Queuing)
                // analysis failed: back to wherever the cycle came from
                | (Self::Analyzing, Self::Idle)
                | (Self::Analyzing, Self::Draining)
                | (Self::Queuing, Self::Draining)
                // refresh between two drained actions
                | (Self::Draining, Self::Analyzing)
                | (Self::Draining, Self::Idle)
        )
    }
}

/// Names the user asked to suppress. Grows for the life of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreFilter {
    ignored: BTreeSet<String>,
}

impl IgnoreFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut filter = Self::new();
        filter.add_ignored(names);
        filter
    }

    /// `names - ignored`
    #[must_use]
    pub fn filter(&self, names: &BTreeSet<String>) -> BTreeSet<String> {
        names.difference(&self.ignored).cloned().collect()
    }

    pub fn add_ignored<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored.extend(names.into_iter().map(Into::into));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.ignored.contains(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ignored.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ignored.is_empty()
    }
}

/// Everything the controller and resolver mutate between suspension points.
///
/// Built once at startup and owned by the controller; there is no global copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerState {
    pub(crate) phase: Phase,
    pending_missing: BTreeSet<String>,
    pending_extra: BTreeSet<String>,
    pub(crate) ignored: IgnoreFilter,
}

impl ControllerState {
    #[must_use]
    pub fn new(ignored: IgnoreFilter) -> Self {
        Self {
            ignored,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn pending(&self, category: Category) -> &BTreeSet<String> {
        match category {
            Category::Missing => &self.pending_missing,
            Category::Extra => &self.pending_extra,
        }
    }

    pub(crate) fn pending_mut(&mut self, category: Category) -> &mut BTreeSet<String> {
        match category {
            Category::Missing => &mut self.pending_missing,
            Category::Extra => &mut self.pending_extra,
        }
    }

    #[must_use]
    pub const fn ignored(&self) -> &IgnoreFilter {
        &self.ignored
    }
}

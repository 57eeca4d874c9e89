use crate::Category;
use std::collections::VecDeque;

/// FIFO of deferred "resolve this category" actions.
///
/// An entry is just the category; the names it acts on live in the
/// controller's pending sets until the entry is executed. A category is
/// present at most once.
#[derive(Debug, Default)]
pub struct ActionQueue {
    entries: VecDeque<Category>,
    draining: bool,
}

impl ActionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, category: Category) -> bool {
        self.entries.contains(&category)
    }

    /// Returns `false` when the category was already queued.
    pub fn enqueue(&mut self, category: Category) -> bool {
        if self.contains(category) {
            return false;
        }
        self.entries.push_back(category);
        true
    }

    pub fn pop(&mut self) -> Option<Category> {
        self.entries.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `false` if a drain is already running.
    pub fn begin_drain(&mut self) -> bool {
        if self.draining {
            return false;
        }
        self.draining = true;
        true
    }

    pub fn end_drain(&mut self) {
        self.draining = false;
    }
}

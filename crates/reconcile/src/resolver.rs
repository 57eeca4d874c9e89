use crate::{Category, ControllerState, Decision, MutationError, Mutator, Prompter};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub key: char,
    pub label: &'static str,
    pub decision: Decision,
}

pub const CHOICES: [Choice; 3] = [
    Choice {
        key: 'y',
        label: "yes please",
        decision: Decision::Apply,
    },
    Choice {
        key: 'l',
        label: "not this time, ask me again later",
        decision: Decision::DeferOnce,
    },
    Choice {
        key: 'n',
        label: "no, stop asking",
        decision: Decision::IgnorePermanently,
    },
];

/// Message plus choice set handed to the [`Prompter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub category: Category,
    pub headline: &'static str,
    pub names: Vec<String>,
    pub question: &'static str,
    pub choices: Vec<Choice>,
}

impl Prompt {
    #[must_use]
    pub fn for_category(category: Category, names: &BTreeSet<String>) -> Self {
        let (headline, question) = match category {
            Category::Missing => (
                "i found some deps missing from your package.json:",
                "want me to add them 4 u?",
            ),
            Category::Extra => (
                "i found some deps in your package.json that aren't used anywhere:",
                "want me to remove them from your package.json?",
            ),
        };
        Self {
            category,
            headline,
            names: names.iter().cloned().collect(),
            question,
            choices: CHOICES.to_vec(),
        }
    }

    /// Headline followed by one `- name` line per package.
    #[must_use]
    pub fn body(&self) -> String {
        let mut out = String::from(self.headline);
        for name in &self.names {
            out.push_str("\n- ");
            out.push_str(name);
        }
        out
    }

    #[must_use]
    pub fn choice_for_key(&self, key: char) -> Option<&Choice> {
        self.choices
            .iter()
            .find(|choice| choice.key.eq_ignore_ascii_case(&key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Applied(BTreeSet<String>),
    Deferred(BTreeSet<String>),
    Ignored(BTreeSet<String>),
    /// Everything pending had been ignored in the meantime; no prompt shown.
    Skipped,
}

/// Resolve one drained action for `category`.
///
/// On a failed mutation the pending set is left untouched so a later cycle
/// can offer it again.
pub async fn resolve<P, M>(
    category: Category,
    state: &mut ControllerState,
    prompter: &P,
    mutator: &M,
) -> Result<Resolution, MutationError>
where
    P: Prompter + ?Sized,
    M: Mutator + ?Sized,
{
    let names = state.ignored().filter(state.pending(category));
    if names.is_empty() {
        state.pending_mut(category).clear();
        return Ok(Resolution::Skipped);
    }

    let prompt = Prompt::for_category(category, &names);
    match prompter.choose(&prompt).await {
        Decision::Apply => {
            log::info!(
                "{}ing {} package(s): {}",
                category.mutation_mode().verb(),
                names.len(),
                join_names(&names)
            );
            mutator.apply(category.mutation_mode(), &names).await?;
            state.pending_mut(category).clear();
            Ok(Resolution::Applied(names))
        }
        Decision::DeferOnce => Ok(Resolution::Deferred(names)),
        Decision::IgnorePermanently => {
            state.ignored.add_ignored(names.iter().cloned());
            state.pending_mut(category).clear();
            Ok(Resolution::Ignored(names))
        }
    }
}

pub(crate) fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}

use crate::render::RenderFlush;
use async_trait::async_trait;
use console::{style, Term};
use depmonkey_reconcile::{Decision, Prompt, Prompter};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;

pub const MONKEY: &str = "🐒 ";

/// Asks on the terminal with an arrow-key menu.
///
/// Without a terminal (CI, pipes) every question is answered with
/// [`Decision::DeferOnce`] so nothing is changed behind the user's back.
#[derive(Debug, Clone)]
pub struct DialoguerPrompter {
    interactive: bool,
    flush: Option<RenderFlush>,
}

impl DialoguerPrompter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            interactive: Term::stderr().is_term() && Term::stdout().is_term(),
            flush: None,
        }
    }

    #[must_use]
    pub const fn non_interactive() -> Self {
        Self {
            interactive: false,
            flush: None,
        }
    }

    /// Print each question only after earlier progress lines are out.
    #[must_use]
    pub fn with_flush(mut self, flush: RenderFlush) -> Self {
        self.flush = Some(flush);
        self
    }
}

impl Default for DialoguerPrompter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prompter for DialoguerPrompter {
    async fn choose(&self, prompt: &Prompt) -> Decision {
        if let Some(flush) = &self.flush {
            flush.wait().await;
        }
        print_body(prompt);
        if !self.interactive {
            log::warn!("no terminal attached; will ask about {} again later", prompt.category);
            return Decision::DeferOnce;
        }

        let prompt = prompt.clone();
        match tokio::task::spawn_blocking(move || select(&prompt)).await {
            Ok(Ok(Some(decision))) => decision,
            Ok(Ok(None)) => Decision::DeferOnce,
            Ok(Err(err)) => {
                log::warn!("prompt failed: {err}");
                Decision::DeferOnce
            }
            Err(err) => {
                log::warn!("prompt task failed: {err}");
                Decision::DeferOnce
            }
        }
    }
}

fn print_body(prompt: &Prompt) {
    let mut lines = prompt.body().lines().map(str::to_string).collect::<Vec<_>>();
    if let Some(first) = lines.first_mut() {
        *first = format!("{MONKEY} {}", style(first.as_str()).bold());
    }
    let term = Term::stdout();
    for line in lines {
        if term.write_line(&line).is_err() {
            break;
        }
    }
}

fn select(prompt: &Prompt) -> dialoguer::Result<Option<Decision>> {
    let items: Vec<String> = prompt
        .choices
        .iter()
        .map(|choice| format!("({}) {}", choice.key, choice.label))
        .collect();
    let picked = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt.question)
        .items(&items)
        .default(0)
        .interact_on_opt(&Term::stderr())?;
    Ok(picked.and_then(|index| prompt.choices.get(index).map(|choice| choice.decision)))
}

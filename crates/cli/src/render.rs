use crate::prompt::MONKEY;
use console::{style, Term};
use depmonkey_reconcile::ReconcileUpdate;
use std::collections::BTreeSet;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Chatty,
    Success,
    Failure,
}

/// Lets the prompter wait until every update published so far is on screen.
#[derive(Debug, Clone)]
pub struct RenderFlush {
    tx: mpsc::Sender<oneshot::Sender<()>>,
}

impl RenderFlush {
    /// Returns immediately once the renderer is gone.
    pub async fn wait(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(ack_tx).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

pub type FlushRequests = mpsc::Receiver<oneshot::Sender<()>>;

pub fn flush_channel() -> (RenderFlush, FlushRequests) {
    let (tx, rx) = mpsc::channel(4);
    (RenderFlush { tx }, rx)
}

/// Print updates to stdout until the reconciler goes away.
pub fn spawn(
    updates: broadcast::Receiver<ReconcileUpdate>,
    flushes: FlushRequests,
) -> JoinHandle<()> {
    let term = Term::stdout();
    spawn_with(updates, flushes, move |line| term.write_line(line).is_ok())
}

/// `write` returns `false` when output is gone for good.
fn spawn_with<W>(
    mut updates: broadcast::Receiver<ReconcileUpdate>,
    mut flushes: FlushRequests,
    mut write: W,
) -> JoinHandle<()>
where
    W: FnMut(&str) -> bool + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(update) => {
                        if !render(&update, &mut write) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::debug!("renderer skipped {skipped} update(s)");
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(ack) = flushes.recv() => {
                    // everything published before the request is already buffered
                    let open = loop {
                        match updates.try_recv() {
                            Ok(update) => {
                                if !render(&update, &mut write) {
                                    break false;
                                }
                            }
                            Err(TryRecvError::Lagged(_)) => {}
                            Err(TryRecvError::Empty) => break true,
                            Err(TryRecvError::Closed) => break false,
                        }
                    };
                    let _ = ack.send(());
                    if !open {
                        break;
                    }
                }
            }
        }
    })
}

fn render(update: &ReconcileUpdate, write: &mut impl FnMut(&str) -> bool) -> bool {
    let Some((tone, text)) = message(update) else {
        log::debug!("{update:?}");
        return true;
    };
    let line = match tone {
        Tone::Chatty => format!("{MONKEY} {text}"),
        Tone::Success => style(text).green().to_string(),
        Tone::Failure => style(text).red().to_string(),
    };
    write(&line)
}

fn message(update: &ReconcileUpdate) -> Option<(Tone, String)> {
    let text = match update {
        ReconcileUpdate::Idle => (Tone::Chatty, "hey buddy... ready when you are".to_string()),
        ReconcileUpdate::Applying { category, .. } => (
            Tone::Chatty,
            format!("{}ing...", category.mutation_mode().verb()),
        ),
        ReconcileUpdate::Applied { .. } => (Tone::Success, "ok".to_string()),
        ReconcileUpdate::Deferred { .. } => {
            (Tone::Success, "ok, i'll ask again later".to_string())
        }
        ReconcileUpdate::Ignored { names, .. } => (
            Tone::Success,
            format!("ok, i won't bring up {} again", list(names)),
        ),
        ReconcileUpdate::MutationFailed {
            category, error, ..
        } => (
            Tone::Failure,
            format!(
                "Failed {}ing deps...\n{error}",
                category.mutation_mode().verb()
            ),
        ),
        ReconcileUpdate::AnalysisFailed { error } => {
            (Tone::Failure, format!("couldn't check your deps: {error}"))
        }
        ReconcileUpdate::Attention { .. } | ReconcileUpdate::Skipped { .. } => return None,
    };
    Some(text)
}

fn list(names: &BTreeSet<String>) -> String {
    names.iter().cloned().collect::<Vec<_>>().join(", ")
}

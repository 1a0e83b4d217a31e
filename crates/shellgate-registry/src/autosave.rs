use std::sync::Arc;
use std::time::Duration;

use shellgate_types::Debouncer;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{SessionStore, Tab};

pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_millis(500);

/// Running autosave task
#[derive(Debug)]
pub struct Autosave {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Autosave {
    /// Stop saving. A save waiting out its quiet period is dropped.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Persist every snapshot published on `changes`, once it has been quiet for
/// `delay`. An empty set deletes the stored copy instead.
pub fn spawn_autosave(
    store: Arc<dyn SessionStore>,
    user: String,
    mut changes: watch::Receiver<Vec<Tab>>,
    delay: Duration,
) -> Autosave {
    let cancel = CancellationToken::new();
    let stopped = cancel.clone();

    let task = tokio::spawn(async move {
        let mut pending = Debouncer::new(delay);
        loop {
            tokio::select! {
                _ = stopped.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        // Registry dropped
                        break;
                    }
                    let snapshot = changes.borrow_and_update().clone();
                    pending.schedule(snapshot);
                }
                snapshot = pending.fired() => persist(store.as_ref(), &user, &snapshot).await,
            }
        }
        debug!(%user, "autosave stopped");
    });

    Autosave { cancel, task }
}

/// Save or delete; failures are logged and tolerated
pub(crate) async fn persist(store: &dyn SessionStore, user: &str, tabs: &[Tab]) {
    let result = if tabs.is_empty() {
        store.delete(user).await
    } else {
        store.save(user, tabs).await
    };
    match result {
        Ok(()) => debug!(%user, tabs = tabs.len(), "session saved"),
        Err(e) => warn!(%user, error = %e, "failed to save session"),
    }
}

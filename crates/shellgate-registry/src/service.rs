use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::autosave::{persist, spawn_autosave, Autosave, DEFAULT_AUTOSAVE_DELAY};
use crate::{SessionRegistry, SessionStore};

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Key the tab set is stored under
    pub user: String,
    pub host_manager_title: String,
    pub autosave_delay: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            user: "local".to_string(),
            host_manager_title: "Host Manager".to_string(),
            autosave_delay: DEFAULT_AUTOSAVE_DELAY,
        }
    }
}

/// The registry wired to its store: restored once at start, autosaved after
pub struct TabService {
    registry: Arc<Mutex<SessionRegistry>>,
    store: Arc<dyn SessionStore>,
    user: String,
    autosave: Autosave,
}

impl TabService {
    pub async fn start(config: RegistryConfig, store: Arc<dyn SessionStore>) -> Self {
        let mut registry = SessionRegistry::new(config.host_manager_title);
        restore_once(&mut registry, store.as_ref(), &config.user).await;

        // Subscribing after the restore keeps the restored set itself from being saved back
        let autosave = spawn_autosave(
            store.clone(),
            config.user.clone(),
            registry.subscribe(),
            config.autosave_delay,
        );

        Self {
            registry: Arc::new(Mutex::new(registry)),
            store,
            user: config.user,
            autosave,
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, SessionRegistry> {
        self.registry.lock().await
    }

    pub fn registry(&self) -> Arc<Mutex<SessionRegistry>> {
        self.registry.clone()
    }

    /// Fire-and-forget save of the current set. Nothing waits for it and it
    /// may not finish if the process exits first.
    ///
    /// An empty set deletes the stored copy, so tabs closed since the last
    /// autosave do not come back on the next start.
    pub fn save_before_exit(&self) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let store = self.store.clone();
        let user = self.user.clone();
        tokio::spawn(async move {
            let snapshot = registry.lock().await.snapshot();
            persist(store.as_ref(), &user, &snapshot).await;
        })
    }

    /// Stop autosaving
    pub async fn shutdown(self) {
        self.autosave.stop().await;
    }
}

/// Load the stored set, apply it, and delete the stored copy
async fn restore_once(registry: &mut SessionRegistry, store: &dyn SessionStore, user: &str) {
    let stored = match store.get(user).await {
        Ok(Some(stored)) => stored,
        Ok(None) => return,
        Err(e) => {
            warn!(%user, error = %e, "failed to restore session");
            return;
        }
    };

    if registry.restore(stored) == 0 {
        return;
    }
    info!(%user, tabs = registry.tabs().len() - 1, "session restored");
    if let Err(e) = store.delete(user).await {
        warn!(%user, error = %e, "failed to clear restored session");
    }
}

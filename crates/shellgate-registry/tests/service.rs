use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use shellgate_registry::{
    MemorySessionStore, NewTab, RegistryConfig, RegistryError, SessionStore, Tab, TabService,
    TabType, HOST_MANAGER_TAB_ID,
};
use tokio::time::sleep;

/// Memory store that counts writes and can be told to fail
#[derive(Default)]
struct RecordingStore {
    inner: MemorySessionStore,
    saves: AtomicUsize,
    deletes: AtomicUsize,
    broken: bool,
}

impl RecordingStore {
    fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for RecordingStore {
    async fn get(&self, user: &str) -> Result<Option<Vec<Tab>>, RegistryError> {
        if self.broken {
            return Err(RegistryError::Status(503));
        }
        self.inner.get(user).await
    }

    async fn save(&self, user: &str, tabs: &[Tab]) -> Result<(), RegistryError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(RegistryError::Status(503));
        }
        self.inner.save(user, tabs).await
    }

    async fn delete(&self, user: &str) -> Result<(), RegistryError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(user).await
    }
}

fn config() -> RegistryConfig {
    RegistryConfig {
        user: "alice".into(),
        ..RegistryConfig::default()
    }
}

fn stored_tabs() -> Vec<Tab> {
    serde_json::from_value(serde_json::json!([
        {"id": 1, "type": "ssh_manager", "title": "Host Manager"},
        {"id": 5, "type": "local_terminal", "title": "Terminal"},
        {"id": 9, "type": "file_manager", "title": "File Manager"}
    ]))
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn restore_is_consumed_once() {
    let store = Arc::new(RecordingStore::default());
    store.inner.save("alice", &stored_tabs()).await.unwrap();

    let service = TabService::start(config(), store.clone()).await;
    {
        let registry = service.lock().await;
        let ids: Vec<u64> = registry.tabs().iter().map(|tab| tab.id).collect();
        assert_eq!(ids, vec![HOST_MANAGER_TAB_ID, 5, 9]);
        assert_eq!(registry.current_tab(), 5);
    }
    assert!(store.get("alice").await.unwrap().is_none());

    // Restoring alone is not a change worth saving
    sleep(Duration::from_secs(2)).await;
    assert_eq!(store.saves(), 0);
    service.shutdown().await;

    let again = TabService::start(config(), store.clone()).await;
    assert_eq!(again.lock().await.tabs().len(), 1);
    again.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn burst_of_changes_is_saved_once() {
    let store = Arc::new(RecordingStore::default());
    let service = TabService::start(config(), store.clone()).await;

    for _ in 0..3 {
        service.lock().await.add_tab(NewTab::new(TabType::LocalTerminal));
        sleep(Duration::from_millis(100)).await;
    }
    // 400ms since the last change
    sleep(Duration::from_millis(300)).await;
    assert_eq!(store.saves(), 0);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(store.saves(), 1);
    let saved = store.get("alice").await.unwrap().unwrap();
    let titles: Vec<_> = saved.iter().map(|tab| tab.title.clone()).collect();
    assert_eq!(titles, vec!["Terminal", "Terminal (2)", "Terminal (3)"]);
    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn emptied_set_deletes_stored_copy() {
    let store = Arc::new(RecordingStore::default());
    let service = TabService::start(config(), store.clone()).await;

    let id = service.lock().await.add_tab(NewTab::new(TabType::Settings).title("Settings"));
    sleep(Duration::from_millis(600)).await;
    assert!(store.get("alice").await.unwrap().is_some());

    assert!(service.lock().await.remove_tab(id));
    sleep(Duration::from_millis(600)).await;
    assert_eq!(store.deletes(), 1);
    assert!(store.get("alice").await.unwrap().is_none());
    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rename_is_picked_up_by_autosave() {
    let store = Arc::new(RecordingStore::default());
    let service = TabService::start(config(), store.clone()).await;

    let id = service.lock().await.add_tab(NewTab::new(TabType::Terminal));
    service.lock().await.rename_tab(id, "db shell").unwrap();
    sleep(Duration::from_millis(600)).await;

    let saved = store.get("alice").await.unwrap().unwrap();
    assert_eq!(saved[0].title, "db shell");
    assert_eq!(store.saves(), 1);
    service.shutdown().await;
}

#[tokio::test]
async fn save_before_exit_stores_current_set() {
    let store = Arc::new(RecordingStore::default());
    let service = TabService::start(config(), store.clone()).await;
    service.lock().await.add_tab(NewTab::new(TabType::LocalTerminal));

    service.save_before_exit().await.unwrap();
    assert_eq!(store.get("alice").await.unwrap().unwrap().len(), 1);
    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn closing_last_tab_then_exiting_clears_stored_copy() {
    let store = Arc::new(RecordingStore::default());
    let service = TabService::start(config(), store.clone()).await;

    let id = service.lock().await.add_tab(NewTab::new(TabType::LocalTerminal));
    sleep(Duration::from_millis(600)).await;
    assert_eq!(store.saves(), 1);

    // Exit before the autosave for the removal gets a chance to run
    assert!(service.lock().await.remove_tab(id));
    service.save_before_exit().await.unwrap();
    service.shutdown().await;
    assert!(store.get("alice").await.unwrap().is_none());

    let next = TabService::start(config(), store.clone()).await;
    let types: Vec<TabType> = next.lock().await.tabs().iter().map(|tab| tab.tab_type).collect();
    assert_eq!(types, vec![TabType::SshManager]);
    next.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn store_failures_are_tolerated() {
    let store = Arc::new(RecordingStore {
        broken: true,
        ..RecordingStore::default()
    });
    let service = TabService::start(config(), store.clone()).await;
    assert_eq!(service.lock().await.tabs().len(), 1);

    service.lock().await.add_tab(NewTab::new(TabType::Terminal));
    sleep(Duration::from_millis(600)).await;
    assert_eq!(store.saves(), 1);
    assert_eq!(service.lock().await.tabs().len(), 2);
    service.shutdown().await;
}

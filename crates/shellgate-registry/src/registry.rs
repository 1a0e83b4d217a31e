use std::collections::HashSet;
use std::sync::Arc;

use shellgate_types::TransportControl;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{HostConfig, NewTab, RegistryError, Tab, TabType};

/// The host-manager tab always carries this id
pub const HOST_MANAGER_TAB_ID: u64 = 1;

pub const MAX_SPLIT_SCREEN_TABS: usize = 3;

/// In-memory tab set. Every public mutation is one atomic transition and
/// publishes the persistable snapshot to subscribers.
#[derive(Debug)]
pub struct SessionRegistry {
    tabs: Vec<Tab>,
    current: u64,
    split_screen: Vec<u64>,
    next_id: u64,
    host_manager_title: String,
    snapshots: watch::Sender<Vec<Tab>>,
}

impl SessionRegistry {
    pub fn new(host_manager_title: impl Into<String>) -> Self {
        let host_manager_title = host_manager_title.into();
        let (snapshots, _) = watch::channel(Vec::new());
        Self {
            tabs: vec![host_manager_tab(&host_manager_title)],
            current: HOST_MANAGER_TAB_ID,
            split_screen: Vec::new(),
            next_id: HOST_MANAGER_TAB_ID + 1,
            host_manager_title,
            snapshots,
        }
    }

    /// Open a tab and make it the active one
    pub fn add_tab(&mut self, new_tab: NewTab) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let title = if new_tab.tab_type.needs_unique_title() {
            self.unique_title(new_tab.tab_type, new_tab.title.as_deref())
        } else {
            new_tab.title.unwrap_or_default()
        };
        debug!(tab_id = id, tab_type = %new_tab.tab_type, %title, "adding tab");

        self.tabs
            .push(Tab::new(id, new_tab.tab_type, title, new_tab.host_config));
        self.current = id;
        self.split_screen.retain(|&member| member != id);
        self.publish();
        id
    }

    /// Close a tab, disconnecting its transport first.
    ///
    /// Returns false when nothing was removed: unknown id, or the host manager
    /// as the only tab left.
    pub fn remove_tab(&mut self, id: u64) -> bool {
        let index = match self.tabs.iter().position(|tab| tab.id == id) {
            Some(index) => index,
            None => return false,
        };
        if self.tabs[index].tab_type == TabType::SshManager && self.tabs.len() == 1 {
            return false;
        }

        if let Some(transport) = self.tabs[index].transport() {
            debug!(tab_id = id, "disconnecting transport of closing tab");
            transport.disconnect();
        }
        self.tabs.remove(index);
        self.split_screen.retain(|&member| member != id);

        if self.tabs.is_empty() {
            self.tabs.push(host_manager_tab(&self.host_manager_title));
        }
        if self.current == id {
            self.current = self.tabs[0].id;
        }
        self.publish();
        true
    }

    /// Toggle split-view membership. Returns whether the tab is a member afterwards.
    pub fn set_split_screen_tab(&mut self, id: u64) -> bool {
        if let Some(position) = self.split_screen.iter().position(|&member| member == id) {
            self.split_screen.remove(position);
            return false;
        }
        if self.get_tab(id).is_none() || self.split_screen.len() >= MAX_SPLIT_SCREEN_TABS {
            return false;
        }
        self.split_screen.push(id);
        true
    }

    pub fn set_current_tab(&mut self, id: u64) -> Result<(), RegistryError> {
        if self.get_tab(id).is_none() {
            return Err(RegistryError::NotFound(id));
        }
        self.current = id;
        Ok(())
    }

    pub fn current_tab(&self) -> u64 {
        self.current
    }

    pub fn split_screen_tabs(&self) -> &[u64] {
        &self.split_screen
    }

    pub fn get_tab(&self, id: u64) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id == id)
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    /// In-memory only; the next autosave picks it up
    pub fn rename_tab(&mut self, id: u64, title: impl Into<String>) -> Result<(), RegistryError> {
        let tab = self.tab_mut(id)?;
        tab.title = title.into();
        self.publish();
        Ok(())
    }

    /// Apply new host settings to every tab connected to `host_id`.
    /// Returns how many tabs changed.
    pub fn update_host_config(&mut self, host_id: i64, config: HostConfig) -> usize {
        let title = config.display_title();
        let mut updated = 0;
        for tab in &mut self.tabs {
            if tab.host_config.as_ref().map(|host| host.id) == Some(host_id) {
                tab.host_config = Some(config.clone());
                tab.title = title.clone();
                updated += 1;
            }
        }
        if updated > 0 {
            self.publish();
        }
        updated
    }

    /// Remember the live transport behind a terminal tab without owning it
    pub fn attach_transport(
        &mut self,
        id: u64,
        transport: &Arc<dyn TransportControl>,
    ) -> Result<(), RegistryError> {
        let tab = self.tab_mut(id)?;
        if !tab.tab_type.has_transport() {
            return Err(RegistryError::NoTransportSlot {
                id,
                tab_type: tab.tab_type,
            });
        }
        tab.transport = Some(Arc::downgrade(transport));
        Ok(())
    }

    /// Tabs worth persisting: everything but the host manager
    pub fn snapshot(&self) -> Vec<Tab> {
        self.tabs
            .iter()
            .filter(|tab| tab.tab_type != TabType::SshManager)
            .cloned()
            .collect()
    }

    /// Receives a fresh snapshot after every mutation
    pub fn subscribe(&self) -> watch::Receiver<Vec<Tab>> {
        self.snapshots.subscribe()
    }

    /// Replace every tab but the host manager with a stored set.
    /// Returns how many tabs were restored.
    pub fn restore(&mut self, stored: Vec<Tab>) -> usize {
        let mut seen = HashSet::from([HOST_MANAGER_TAB_ID]);
        let mut restored = Vec::new();
        for mut tab in stored {
            if tab.tab_type == TabType::SshManager {
                continue;
            }
            if !seen.insert(tab.id) {
                warn!(tab_id = tab.id, "skipping stored tab with duplicate id");
                continue;
            }
            tab.transport = None;
            restored.push(tab);
        }
        if restored.is_empty() {
            return 0;
        }

        let max_id = restored.iter().map(|tab| tab.id).max().unwrap_or(HOST_MANAGER_TAB_ID);
        self.next_id = self.next_id.max(max_id + 1);
        self.current = restored[0].id;

        // Transports of replaced tabs must not outlive their records
        for tab in &self.tabs {
            if let Some(transport) = tab.transport() {
                transport.disconnect();
            }
        }

        let count = restored.len();
        self.tabs = std::iter::once(host_manager_tab(&self.host_manager_title))
            .chain(restored)
            .collect();
        self.split_screen.clear();
        info!(count, next_id = self.next_id, "restored tabs");
        self.publish();
        count
    }

    fn tab_mut(&mut self, id: u64) -> Result<&mut Tab, RegistryError> {
        self.tabs
            .iter_mut()
            .find(|tab| tab.id == id)
            .ok_or(RegistryError::NotFound(id))
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    /// Desired (or default) title, made distinct among tabs of the same type
    fn unique_title(&self, tab_type: TabType, desired: Option<&str>) -> String {
        let base = desired
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| tab_type.default_title());
        let root = match split_counter(base) {
            Some((root, _)) => root,
            None => base,
        };

        let mut root_used = false;
        let mut used = HashSet::new();
        for tab in self.tabs.iter().filter(|tab| tab.tab_type == tab_type) {
            if tab.title == root {
                root_used = true;
            } else if let Some((tab_root, n)) = split_counter(&tab.title) {
                if tab_root == root {
                    used.insert(n);
                }
            }
        }

        if !root_used {
            return root.to_string();
        }
        let n = (2..).find(|n| !used.contains(n)).unwrap_or(2);
        format!("{} ({})", root, n)
    }
}

fn host_manager_tab(title: &str) -> Tab {
    Tab::new(HOST_MANAGER_TAB_ID, TabType::SshManager, title.to_string(), None)
}

/// `"Name (3)"` -> `("Name", 3)`
fn split_counter(title: &str) -> Option<(&str, u64)> {
    let inner = title.strip_suffix(')')?;
    let open = inner.rfind(" (")?;
    let digits = &inner[open + 2..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((&inner[..open], digits.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> SessionRegistry {
        SessionRegistry::new("Host Manager")
    }

    fn titles(registry: &SessionRegistry) -> Vec<&str> {
        registry.tabs().iter().map(|tab| tab.title.as_str()).collect()
    }

    #[derive(Default)]
    struct CountingTransport {
        disconnects: AtomicUsize,
    }

    impl TransportControl for CountingTransport {
        fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn starts_with_host_manager() {
        let registry = registry();
        assert_eq!(registry.tabs().len(), 1);
        assert_eq!(registry.current_tab(), HOST_MANAGER_TAB_ID);
        assert_eq!(registry.tabs()[0].tab_type, TabType::SshManager);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn terminal_titles_take_lowest_free_suffix() {
        let mut registry = registry();
        registry.add_tab(NewTab::new(TabType::Terminal));
        let second = registry.add_tab(NewTab::new(TabType::Terminal));
        registry.add_tab(NewTab::new(TabType::Terminal));
        assert_eq!(
            titles(&registry),
            vec!["Host Manager", "Terminal", "Terminal (2)", "Terminal (3)"]
        );

        registry.remove_tab(second);
        let id = registry.add_tab(NewTab::new(TabType::Terminal));
        assert_eq!(registry.get_tab(id).unwrap().title, "Terminal (2)");
    }

    #[test]
    fn desired_title_is_reduced_to_its_root() {
        let mut registry = registry();
        let first = registry.add_tab(NewTab::new(TabType::Terminal).title("web (4)"));
        let second = registry.add_tab(NewTab::new(TabType::Terminal).title("web"));
        assert_eq!(registry.get_tab(first).unwrap().title, "web");
        assert_eq!(registry.get_tab(second).unwrap().title, "web (2)");
    }

    #[test]
    fn uniqueness_is_per_type() {
        let mut registry = registry();
        let remote = registry.add_tab(NewTab::new(TabType::Terminal));
        let local = registry.add_tab(NewTab::new(TabType::LocalTerminal));
        let files = registry.add_tab(NewTab::new(TabType::FileManager));
        let stats = registry.add_tab(NewTab::new(TabType::Server));
        assert_eq!(registry.get_tab(remote).unwrap().title, "Terminal");
        assert_eq!(registry.get_tab(local).unwrap().title, "Terminal");
        assert_eq!(registry.get_tab(files).unwrap().title, "File Manager");
        assert_eq!(registry.get_tab(stats).unwrap().title, "Server Stats");
    }

    #[test]
    fn other_types_keep_title_as_given() {
        let mut registry = registry();
        let a = registry.add_tab(NewTab::new(TabType::Settings).title("Settings"));
        let b = registry.add_tab(NewTab::new(TabType::Settings).title("Settings"));
        let c = registry.add_tab(NewTab::new(TabType::Home));
        assert_eq!(registry.get_tab(a).unwrap().title, "Settings");
        assert_eq!(registry.get_tab(b).unwrap().title, "Settings");
        assert_eq!(registry.get_tab(c).unwrap().title, "");
    }

    #[test]
    fn counter_suffix_parsing() {
        assert_eq!(split_counter("Terminal (12)"), Some(("Terminal", 12)));
        assert_eq!(split_counter("a (b) (2)"), Some(("a (b)", 2)));
        assert_eq!(split_counter("Terminal (x)"), None);
        assert_eq!(split_counter("Terminal (+2)"), None);
        assert_eq!(split_counter("Terminal ()"), None);
        assert_eq!(split_counter("Terminal"), None);
    }

    #[test]
    fn sole_host_manager_cannot_be_removed() {
        let mut registry = registry();
        assert!(!registry.remove_tab(HOST_MANAGER_TAB_ID));
        assert_eq!(registry.tabs().len(), 1);
        assert!(!registry.remove_tab(99));
    }

    #[test]
    fn removing_last_tab_recreates_host_manager() {
        let mut registry = registry();
        let terminal = registry.add_tab(NewTab::new(TabType::Terminal));
        assert!(registry.remove_tab(HOST_MANAGER_TAB_ID));
        assert!(registry.remove_tab(terminal));

        assert_eq!(registry.tabs().len(), 1);
        assert_eq!(registry.tabs()[0].id, HOST_MANAGER_TAB_ID);
        assert_eq!(registry.current_tab(), HOST_MANAGER_TAB_ID);
    }

    #[test]
    fn removing_active_tab_activates_first_remaining() {
        let mut registry = registry();
        let a = registry.add_tab(NewTab::new(TabType::Terminal));
        let b = registry.add_tab(NewTab::new(TabType::Terminal));
        assert_eq!(registry.current_tab(), b);

        registry.remove_tab(b);
        assert_eq!(registry.current_tab(), HOST_MANAGER_TAB_ID);

        registry.set_current_tab(a).unwrap();
        let c = registry.add_tab(NewTab::new(TabType::Home));
        registry.set_current_tab(a).unwrap();
        registry.remove_tab(c);
        assert_eq!(registry.current_tab(), a);
        assert!(registry.set_current_tab(c).is_err());
    }

    #[test]
    fn remove_disconnects_attached_transport_first() {
        let mut registry = registry();
        let id = registry.add_tab(NewTab::new(TabType::LocalTerminal));
        let transport = Arc::new(CountingTransport::default());
        let control: Arc<dyn TransportControl> = transport.clone();
        registry.attach_transport(id, &control).unwrap();
        assert!(registry.get_tab(id).unwrap().transport().is_some());

        assert!(registry.remove_tab(id));
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transport_slot_is_weak_and_typed() {
        let mut registry = registry();
        let terminal = registry.add_tab(NewTab::new(TabType::Terminal));
        let settings = registry.add_tab(NewTab::new(TabType::Settings));

        let control: Arc<dyn TransportControl> = Arc::new(CountingTransport::default());
        assert!(matches!(
            registry.attach_transport(settings, &control),
            Err(RegistryError::NoTransportSlot { .. })
        ));
        registry.attach_transport(terminal, &control).unwrap();

        drop(control);
        assert!(registry.get_tab(terminal).unwrap().transport().is_none());
        // Dead transport: removal still works
        assert!(registry.remove_tab(terminal));
    }

    #[test]
    fn split_screen_toggles_and_caps_at_three() {
        let mut registry = registry();
        let ids: Vec<u64> = (0..4)
            .map(|_| registry.add_tab(NewTab::new(TabType::Terminal)))
            .collect();

        for &id in &ids[..3] {
            assert!(registry.set_split_screen_tab(id));
        }
        assert!(!registry.set_split_screen_tab(ids[3]));
        assert_eq!(registry.split_screen_tabs(), &ids[..3]);

        assert!(!registry.set_split_screen_tab(ids[1]));
        assert!(registry.set_split_screen_tab(ids[3]));
        assert_eq!(registry.split_screen_tabs(), &[ids[0], ids[2], ids[3]]);

        registry.remove_tab(ids[0]);
        assert_eq!(registry.split_screen_tabs(), &[ids[2], ids[3]]);
    }

    #[test]
    fn host_config_update_retitles_matching_tabs() {
        let mut registry = registry();
        let host: HostConfig = serde_json::from_value(serde_json::json!({
            "id": 5, "username": "root", "ip": "10.0.0.1", "port": 22
        }))
        .unwrap();
        let a = registry.add_tab(NewTab::new(TabType::Terminal).host(host.clone()));
        let b = registry.add_tab(NewTab::new(TabType::FileManager).host(host.clone()));
        let other = registry.add_tab(NewTab::new(TabType::Terminal));

        let updated = HostConfig {
            port: 2200,
            ..host.clone()
        };
        assert_eq!(registry.update_host_config(5, updated.clone()), 2);
        assert_eq!(registry.get_tab(a).unwrap().title, "root@10.0.0.1:2200");
        assert_eq!(registry.get_tab(b).unwrap().host_config, Some(updated));
        assert_eq!(registry.get_tab(other).unwrap().title, "Terminal (2)");

        let unrelated = HostConfig { id: 99, ..host };
        assert_eq!(registry.update_host_config(99, unrelated), 0);
    }

    #[test]
    fn restore_replaces_set_and_advances_ids() {
        let mut registry = registry();
        registry.add_tab(NewTab::new(TabType::Home));

        let mut stored = vec![
            Tab::new(HOST_MANAGER_TAB_ID, TabType::SshManager, "old".into(), None),
            Tab::new(12, TabType::Terminal, "Terminal".into(), None),
            Tab::new(40, TabType::FileManager, "File Manager".into(), None),
        ];
        stored.push(Tab::new(12, TabType::Terminal, "dup".into(), None));

        assert_eq!(registry.restore(stored), 2);
        assert_eq!(titles(&registry), vec!["Host Manager", "Terminal", "File Manager"]);
        assert_eq!(registry.current_tab(), 12);
        assert_eq!(registry.add_tab(NewTab::new(TabType::Home)), 41);
    }

    #[test]
    fn restore_of_nothing_changes_nothing() {
        let mut registry = registry();
        let home = registry.add_tab(NewTab::new(TabType::Home));
        assert_eq!(registry.restore(Vec::new()), 0);
        assert_eq!(
            registry.restore(vec![Tab::new(1, TabType::SshManager, "x".into(), None)]),
            0
        );
        assert_eq!(registry.current_tab(), home);
        assert_eq!(registry.tabs().len(), 2);
    }

    #[test]
    fn mutations_publish_snapshots() {
        let mut registry = registry();
        let mut snapshots = registry.subscribe();
        assert!(!snapshots.has_changed().unwrap());

        let id = registry.add_tab(NewTab::new(TabType::LocalTerminal));
        assert!(snapshots.has_changed().unwrap());
        assert_eq!(snapshots.borrow_and_update().len(), 1);

        registry.rename_tab(id, "build box").unwrap();
        assert_eq!(snapshots.borrow_and_update()[0].title, "build box");
        assert!(registry.rename_tab(77, "x").is_err());
    }
}

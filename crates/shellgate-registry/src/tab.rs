use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shellgate_types::TransportControl;

/// Kind of logical session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabType {
    Terminal,
    LocalTerminal,
    FileManager,
    Server,
    Admin,
    UserProfile,
    Settings,
    Home,
    SshManager,
    RemoteEditor,
}

impl TabType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TabType::Terminal => "terminal",
            TabType::LocalTerminal => "local_terminal",
            TabType::FileManager => "file_manager",
            TabType::Server => "server",
            TabType::Admin => "admin",
            TabType::UserProfile => "user_profile",
            TabType::Settings => "settings",
            TabType::Home => "home",
            TabType::SshManager => "ssh_manager",
            TabType::RemoteEditor => "remote_editor",
        }
    }

    /// Sessions that drive an interactive transport
    pub fn has_transport(&self) -> bool {
        matches!(self, TabType::Terminal | TabType::LocalTerminal)
    }

    /// Types whose siblings get `" (N)"` suffixes to stay distinguishable
    pub fn needs_unique_title(&self) -> bool {
        matches!(
            self,
            TabType::Terminal
                | TabType::LocalTerminal
                | TabType::Server
                | TabType::FileManager
                | TabType::RemoteEditor
        )
    }

    pub fn default_title(&self) -> &'static str {
        match self {
            TabType::Server => "Server Stats",
            TabType::FileManager => "File Manager",
            TabType::RemoteEditor => "File",
            _ => "Terminal",
        }
    }
}

impl std::fmt::Display for TabType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings of a remote host. Owned elsewhere; fields this crate
/// does not know about are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub port: u16,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HostConfig {
    /// `name` when set, otherwise `username@ip:port`
    pub fn display_title(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{}@{}:{}", self.username, self.ip, self.port),
        }
    }
}

/// A logical session as tracked by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: u64,
    #[serde(rename = "type")]
    pub tab_type: TabType,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_config: Option<HostConfig>,
    /// Fields written by other clients of the session store
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Back-reference to the live transport; never owned, never persisted
    #[serde(skip)]
    pub(crate) transport: Option<Weak<dyn TransportControl>>,
}

impl Tab {
    pub(crate) fn new(id: u64, tab_type: TabType, title: String, host_config: Option<HostConfig>) -> Self {
        Self {
            id,
            tab_type,
            title,
            host_config,
            extra: Map::new(),
            transport: None,
        }
    }

    /// The attached transport, if it is still alive
    pub fn transport(&self) -> Option<Arc<dyn TransportControl>> {
        self.transport.as_ref().and_then(Weak::upgrade)
    }
}

/// Request for a new tab
#[derive(Debug, Clone)]
pub struct NewTab {
    pub tab_type: TabType,
    pub title: Option<String>,
    pub host_config: Option<HostConfig>,
}

impl NewTab {
    pub fn new(tab_type: TabType) -> Self {
        Self {
            tab_type,
            title: None,
            host_config: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn host(mut self, host_config: HostConfig) -> Self {
        self.host_config = Some(host_config);
        self
    }
}

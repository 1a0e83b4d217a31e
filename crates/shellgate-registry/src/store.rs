//! Session stores: where the tab set lives between runs

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{RegistryError, Tab};

/// Persisted tab set, keyed by the authenticated user
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `None` when nothing is stored
    async fn get(&self, user: &str) -> Result<Option<Vec<Tab>>, RegistryError>;

    async fn save(&self, user: &str, tabs: &[Tab]) -> Result<(), RegistryError>;

    async fn delete(&self, user: &str) -> Result<(), RegistryError>;
}

/// Wire and on-disk document: `{"sessionData": [...]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    pub session_data: Vec<Tab>,
}

/// Keeps sessions in process memory
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Vec<Tab>>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, user: &str) -> Result<Option<Vec<Tab>>, RegistryError> {
        Ok(self.sessions.read().await.get(user).cloned())
    }

    async fn save(&self, user: &str, tabs: &[Tab]) -> Result<(), RegistryError> {
        self.sessions
            .write()
            .await
            .insert(user.to_string(), tabs.to_vec());
        Ok(())
    }

    async fn delete(&self, user: &str) -> Result<(), RegistryError> {
        self.sessions.write().await.remove(user);
        Ok(())
    }
}

/// One JSON document per user in a directory
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Create the store, making the directory if needed. `~` is expanded.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, RegistryError> {
        let dir = expand_tilde(dir.as_ref());
        std::fs::create_dir_all(&dir).map_err(|source| RegistryError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, user: &str) -> PathBuf {
        let name: String = user
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let name = if name.is_empty() || name.starts_with('.') {
            format!("user{}", name)
        } else {
            name
        };
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, user: &str) -> Result<Option<Vec<Tab>>, RegistryError> {
        let path = self.session_path(user);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(RegistryError::Io { path, source }),
        };
        let document: SessionDocument = serde_json::from_str(&json)?;
        Ok(Some(document.session_data))
    }

    async fn save(&self, user: &str, tabs: &[Tab]) -> Result<(), RegistryError> {
        let path = self.session_path(user);
        let json = serde_json::to_string_pretty(&SessionDocument {
            session_data: tabs.to_vec(),
        })?;

        // Write then rename so a crash never leaves half a document behind
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, json)
            .await
            .map_err(|source| RegistryError::Io {
                path: staging.clone(),
                source,
            })?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|source| RegistryError::Io { path, source })
    }

    async fn delete(&self, user: &str) -> Result<(), RegistryError> {
        let path = self.session_path(user);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RegistryError::Io { path, source }),
        }
    }
}

/// Talks to the session REST endpoint (`GET/POST/DELETE {base}/session`).
///
/// The server derives the user from the bearer token, so the `user`
/// argument only shows up in logs.
#[derive(Debug, Clone)]
pub struct HttpSessionStore {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpSessionStore {
    pub fn new(base_url: &str, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/session", base_url.trim_end_matches('/')),
            token: token.into(),
        }
    }
}

#[async_trait]
impl SessionStore for HttpSessionStore {
    async fn get(&self, user: &str) -> Result<Option<Vec<Tab>>, RegistryError> {
        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(&self.token)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let document: SessionDocument = response.json().await?;
                tracing::debug!(user, tabs = document.session_data.len(), "fetched stored session");
                Ok(Some(document.session_data))
            }
            status => Err(RegistryError::Status(status.as_u16())),
        }
    }

    async fn save(&self, user: &str, tabs: &[Tab]) -> Result<(), RegistryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&SessionDocument {
                session_data: tabs.to_vec(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RegistryError::Status(response.status().as_u16()));
        }
        tracing::debug!(user, tabs = tabs.len(), "stored session");
        Ok(())
    }

    async fn delete(&self, user: &str) -> Result<(), RegistryError> {
        let response = self
            .client
            .delete(&self.endpoint)
            .bearer_auth(&self.token)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => {
                tracing::debug!(user, "deleted stored session");
                Ok(())
            }
            status => Err(RegistryError::Status(status.as_u16())),
        }
    }
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Where the client gets its bearer token from
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Polled until it yields a token; the client stays idle until then
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn token(&self) -> Option<String>;
}

/// A token fixed at construction. An empty token counts as none.
#[derive(Debug, Clone)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()).filter(|token| !token.is_empty()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

#[async_trait]
impl CredentialSource for StaticCredential {
    async fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// A token that appears, changes or goes away at runtime (login, logout)
#[derive(Debug, Clone, Default)]
pub struct SharedCredential {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedCredential {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, token: impl Into<String>) {
        *self.inner.write().await = Some(token.into());
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[async_trait]
impl CredentialSource for SharedCredential {
    async fn token(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .clone()
            .filter(|token| !token.is_empty())
    }
}

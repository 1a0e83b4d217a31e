use std::net::SocketAddr;
use std::sync::Arc;

use shellgate_terminal::{NativePtySpawner, PtySpawner};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::{AllowAll, StaticToken, TokenVerifier};
use crate::connection::{ConnectionInfo, ConnectionTable};
use crate::routes::{self, AppState};
use crate::{GatewayConfig, GatewayError};

/// A running gateway.
///
/// Shutting down stops accepting new connections. Connections already open
/// keep their process until their own socket closes.
pub struct Gateway {
    local_addr: SocketAddr,
    connections: ConnectionTable,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), GatewayError>>,
}

impl Gateway {
    /// Bind with the native PTY backend and the configured token, if any
    pub async fn bind(config: GatewayConfig) -> Result<Self, GatewayError> {
        let spawner = Arc::new(NativePtySpawner::new(config.shell.clone()));
        let verifier: Arc<dyn TokenVerifier> = match &config.auth_token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => {
                warn!("no auth token configured, every local connection will be accepted");
                Arc::new(AllowAll)
            }
        };
        Self::bind_with(config, spawner, verifier).await
    }

    pub async fn bind_with(
        config: GatewayConfig,
        spawner: Arc<dyn PtySpawner>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let connections = ConnectionTable::default();
        let backend = spawner.name().to_string();
        let app = routes::create_router(AppState {
            config: Arc::new(config),
            spawner,
            verifier,
            connections: connections.clone(),
        });

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await?;
            Ok(())
        });

        info!(%local_addr, %backend, "terminal gateway listening");
        Ok(Self {
            local_addr,
            connections,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        self.connections.list().await
    }

    pub async fn active_connections(&self) -> usize {
        self.connections.len().await
    }

    /// Stop accepting and wait for the listener to wind down
    pub async fn shutdown(self) -> Result<(), GatewayError> {
        self.shutdown.cancel();
        self.task.await??;
        info!(addr = %self.local_addr, "terminal gateway stopped");
        Ok(())
    }
}

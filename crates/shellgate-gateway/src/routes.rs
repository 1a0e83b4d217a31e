use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use shellgate_terminal::PtySpawner;
use shellgate_types::GATEWAY_WS_PATH;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{bearer_token, TokenVerifier};
use crate::connection::{self, ConnectionTable};
use crate::GatewayConfig;

/// Application state shared across routes
#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<GatewayConfig>,
    pub spawner: Arc<dyn PtySpawner>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub connections: ConnectionTable,
}

#[derive(Debug, Deserialize)]
struct ConnectQuery {
    token: Option<String>,
}

/// Create router with all routes
pub(crate) fn create_router(state: AppState) -> Router {
    Router::new()
        // The same endpoint is reachable directly and behind the web proxy path
        .route("/", get(websocket_handler))
        .route(GATEWAY_WS_PATH, get(websocket_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - authenticate, then upgrade to a terminal connection
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
) -> Response {
    let token = query.token.or_else(|| bearer_token(&headers));
    if !state.verifier.verify(token.as_deref()) {
        warn!(token_present = token.is_some(), "rejected unauthenticated terminal connection");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    ws.on_upgrade(move |socket| connection::handle_socket(socket, state))
}

/// GET /health - liveness and connection count
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "backend": state.spawner.name(),
        "connections": state.connections.len().await,
    }))
}

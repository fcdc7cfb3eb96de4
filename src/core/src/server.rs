use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::chat::CompletionBackend;
use crate::config::ServerConfig;
use crate::connection::{run_connection, ConnectionParams};
use crate::huddle_config::HuddleConfig;
use crate::session::{SessionHub, SessionSettings};

const MAX_SESSION_ID_LEN: usize = 128;

/// Shared state accessible by handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub config: ServerConfig,
    pub hub: SessionHub,
}

/// Build the axum router for the WS server.
///
/// The router exposes `/ws` (WebSocket upgrade, `?session=<id>`) and
/// `/health`.
pub fn build_router(
    config: ServerConfig,
    huddle_config: HuddleConfig,
    backend: Arc<dyn CompletionBackend>,
) -> Router {
    let settings = SessionSettings {
        default_model: huddle_config.chat.default_model,
        welcome_message: huddle_config.chat.welcome_message,
        retention: config.session_retention,
    };
    tracing::info!(
        model = %settings.default_model,
        retention_secs = settings.retention.as_secs(),
        "session hub ready"
    );
    let state = AppState {
        config,
        hub: SessionHub::new(backend, settings),
    };

    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load `~/.huddle/config.toml`, falling back to defaults on any error.
pub fn load_huddle_config() -> HuddleConfig {
    match HuddleConfig::load() {
        Ok(config) => config,
        Err(err) => {
            let path = HuddleConfig::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "~/.huddle/config.toml".to_string());
            tracing::warn!(%path, error = %err, "failed to load huddle config; using defaults");
            HuddleConfig::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
    sessions: usize,
    timestamp: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.hub.settings().default_model.clone(),
        sessions: state.hub.len(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    session: Option<String>,
}

/// Session id from the query, or a fresh one when missing or unusable.
fn resolve_session_id(requested: Option<String>) -> String {
    requested
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s.len() <= MAX_SESSION_ID_LEN)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let session_id = resolve_session_id(query.session);
    tracing::debug!(session = %session_id, "ws upgrade requested");

    let params = ConnectionParams {
        session_id,
        hub: state.hub.clone(),
        heartbeat_interval: state.config.heartbeat_interval,
        idle_timeout: state.config.idle_timeout,
        outbound_buffer: state.config.outbound_buffer,
    };

    ws.on_upgrade(move |socket| run_connection(socket, params))
        .into_response()
}

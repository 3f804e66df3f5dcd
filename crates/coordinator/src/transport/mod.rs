// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/WebSocket surface: the browser-facing signaling route, the debug
//! schema dump, and a liveness probe (spec §6 / SPEC_FULL §4.I).

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use crate::media::MediaRpcClient;
use crate::registry::Registry;
use crate::session::{SessionDeps, SessionLimits};

/// Shared application state handed to every route.
pub struct AppState {
    pub registry: Arc<Registry>,
    pub media: Arc<MediaRpcClient>,
    pub limits: SessionLimits,
}

/// Build the router: the configured WebSocket mount point, `{ws_path}/_schema`,
/// and `/healthz`.
pub fn build_router(ws_path: &str, state: Arc<AppState>) -> Router {
    let schema_path = format!("{}/_schema", ws_path.trim_end_matches('/'));
    Router::new()
        .route(ws_path, get(ws_upgrade))
        .route(&schema_path, get(schema))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let deps = Arc::new(SessionDeps {
        registry: Arc::clone(&state.registry),
        media: Arc::clone(&state.media),
        limits: state.limits,
    });
    ws.max_message_size(state.limits.max_frame_bytes)
        .on_upgrade(|socket| crate::session::ws::serve(socket, deps))
}

async fn schema(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.schema().await)
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.media.is_connected() {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "status": "media server unreachable" })))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

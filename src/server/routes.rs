//! HTTP routes for a daybook node.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check (no role check)
//! - `GET /api/sync`: Pull the node's sanitized snapshot (server role only)
//! - `POST /api/sync`: Push a snapshot to merge into the node (server role only)
//! - `GET /api/sync/status`: Orchestrator status

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::service::{ServerError, SyncService};
use crate::models::Snapshot;
use crate::sync::{SyncOrchestrator, SyncStatus, SYNC_PATH};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SyncService>,
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Request body limit for pushes, from `server.max_body_bytes`
    pub max_body_bytes: usize,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct PushResponse {
    status: &'static str,
}

async fn pull(State(state): State<AppState>) -> Result<Json<Snapshot>, ServerError> {
    state.service.pull().await.map(Json)
}

async fn push(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PushResponse>, ServerError> {
    state.service.push(&body).await?;
    Ok(Json(PushResponse { status: "ok" }))
}

async fn status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.orchestrator.status().await)
}

/// Builds the node's router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route(SYNC_PATH, get(pull).post(push))
        .route(&format!("{}/status", SYNC_PATH), get(status))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

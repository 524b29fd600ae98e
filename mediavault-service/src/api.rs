//! HTTP API for the MediaVault scanning service.
//!
//! This module provides the REST API endpoints for:
//! - Health and metrics monitoring
//! - Library listing and scan requests
//! - Scan status, progress and cancellation
//! - WebSocket connections

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{delete, get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::service::{Actor, ActorRole, ScanningService};
use crate::websocket::{WebSocketManager, handle_ws_connection};

pub mod libraries;
pub mod scans;
use libraries::{list_libraries_handler, start_scan_handler};
use scans::{
    cancel_scan_handler, cancel_user_scans_handler, get_scan_handler, get_scan_progress_handler,
    list_scans_handler,
};

/// Application state
pub struct AppState {
    pub service: Arc<ScanningService>,
    pub start_time: Instant,
    pub ws_manager: Arc<WebSocketManager>,
    pub metrics: PrometheusHandle,
}

/// Caller identity taken from the query string.
/// Authentication happens upstream; handlers only check ownership.
#[derive(Debug, Deserialize)]
pub struct ActorParams {
    pub user_id: Uuid,
    #[serde(default)]
    pub role: ActorRole,
}

impl ActorParams {
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.role)
    }
}

/// Build the API router
pub fn router(
    service: Arc<ScanningService>,
    ws_manager: Arc<WebSocketManager>,
    metrics: PrometheusHandle,
) -> Router {
    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        ws_manager,
        metrics,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Library endpoints
        .route("/libraries", get(list_libraries_handler))
        .route("/libraries/{id}/scans", post(start_scan_handler))
        // Scan endpoints
        .route("/scans", get(list_scans_handler))
        .route("/scans/{id}", get(get_scan_handler))
        .route("/scans/{id}", delete(cancel_scan_handler))
        .route("/scans/{id}/progress", get(get_scan_progress_handler))
        .route("/users/{user_id}/scans/cancel", post(cancel_user_scans_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(ws_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let queue = state.service.queue();
    let status = if queue.is_closed() {
        "shutting_down"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        queue_depth: queue.len(),
        active_scans: state.service.lifecycle().progress().active_count(),
        websocket_connections: state.ws_manager.connection_count(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    queue_depth: usize,
    active_scans: usize,
    websocket_connections: usize,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

// === WebSocket ===

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| {
        handle_ws_connection(socket, state.ws_manager.clone(), state.service.clone())
    })
}

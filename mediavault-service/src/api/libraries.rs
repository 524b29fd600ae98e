//! Library API endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::scan::{Library, LibraryScan};
use crate::service::{Actor, ActorRole};

use super::AppState;

/// Query parameters for starting a scan
#[derive(Debug, Deserialize)]
pub struct StartScanParams {
    pub user_id: Uuid,
    #[serde(default)]
    pub role: ActorRole,
    /// Allow scanners to fetch metadata from remote providers
    #[serde(default)]
    pub download_metadata: bool,
}

/// Response for a started scan
#[derive(Debug, Serialize)]
pub struct StartScanResponse {
    pub scan: LibraryScan,
    pub jobs_queued: usize,
}

/// List all configured libraries
pub async fn list_libraries_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Library>> {
    Json(state.service.list_libraries())
}

/// Request and start a scan of a library.
///
/// Returns once the scan's top-level jobs are queued. A client that
/// disconnects before then cancels the scan.
pub async fn start_scan_handler(
    State(state): State<Arc<AppState>>,
    Path(library_id): Path<Uuid>,
    Query(params): Query<StartScanParams>,
) -> Result<(StatusCode, Json<StartScanResponse>), ServiceError> {
    let actor = Actor::new(params.user_id, params.role);
    let scan = state.service.request_scan(library_id, &actor)?;

    // Dropped along with this future if the client goes away
    let request_token = CancellationToken::new();
    let _request_guard = request_token.clone().drop_guard();

    let jobs_queued = state
        .service
        .start_scan(scan.id, params.download_metadata, &request_token)
        .await?;
    let scan = state.service.get_scan(scan.id)?;

    Ok((StatusCode::ACCEPTED, Json(StartScanResponse { scan, jobs_queued })))
}

//! Scan API endpoints.
//!
//! Handlers for scan lookup, progress, and cancellation. Every handler checks
//! that the caller started the scan or is an administrator.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::scan::{LibraryScan, ScanProgressSnapshot};
use crate::service::Actor;

use super::{ActorParams, AppState};

/// Response for cancel operations
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub cancelled: usize,
}

/// Look up a scan the actor is allowed to manage
fn managed_scan(state: &AppState, scan_id: Uuid, actor: &Actor) -> ServiceResult<LibraryScan> {
    let scan = state.service.get_scan(scan_id)?;
    if !actor.can_manage(scan.user_id) {
        return Err(ServiceError::Forbidden);
    }
    Ok(scan)
}

/// List scans: all of them for administrators, otherwise the caller's own
pub async fn list_scans_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActorParams>,
) -> Json<Vec<LibraryScan>> {
    let actor = params.actor();
    let user_filter = (!actor.is_admin()).then_some(actor.user_id);
    Json(state.service.list_scans(user_filter))
}

pub async fn get_scan_handler(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<Uuid>,
    Query(params): Query<ActorParams>,
) -> Result<Json<LibraryScan>, ServiceError> {
    let scan = managed_scan(&state, scan_id, &params.actor())?;
    Ok(Json(scan))
}

/// Current progress of a running scan; 404 once the scan has ended
pub async fn get_scan_progress_handler(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<Uuid>,
    Query(params): Query<ActorParams>,
) -> Result<Json<ScanProgressSnapshot>, ServiceError> {
    let scan = managed_scan(&state, scan_id, &params.actor())?;
    let progress = state.service.get_scan_progress(&scan.identity())?;
    Ok(Json(progress))
}

/// Cancel a scan. Succeeds whether or not the scan was still running.
pub async fn cancel_scan_handler(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<Uuid>,
    Query(params): Query<ActorParams>,
) -> Result<Json<CancelResponse>, ServiceError> {
    let scan = managed_scan(&state, scan_id, &params.actor())?;
    state.service.cancel_scan(&scan)?;
    Ok(Json(CancelResponse {
        success: true,
        cancelled: 1,
    }))
}

/// Cancel every active scan of a user
pub async fn cancel_user_scans_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<ActorParams>,
) -> Result<Json<CancelResponse>, ServiceError> {
    if !params.actor().can_manage(user_id) {
        return Err(ServiceError::Forbidden);
    }
    let cancelled = state.service.cancel_user_scans(user_id);
    Ok(Json(CancelResponse {
        success: true,
        cancelled,
    }))
}

//! Admin-only maintenance handlers.

use crate::{
    auth::require_admin,
    error::HttpError,
    models::entity::{Entity, UpdateStatusRequest},
    sync::RestoreReport,
    AppError, AppState,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tradedir_core::entity_ops;

const OUTBOX_PEEK_LIMIT: usize = 20;

/// Change an entity's trading status.
///
/// # Errors
/// Returns 403 without the admin token, 404 for missing entities.
pub async fn set_entity_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Entity>, HttpError> {
    require_admin(&state, &headers)?;
    Ok(Json(entity_ops::set_entity_status(
        &state.db, &id, req.status,
    )?))
}

/// Rebuild the search index from the record store.
///
/// Runs on the blocking pool; requests keep being served meanwhile and
/// writes that race the rebuild are re-applied by their queued syncs.
///
/// # Errors
/// Returns 403 without the admin token, 500 when a collection cannot be scanned.
pub async fn restore_index(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RestoreReport>, HttpError> {
    require_admin(&state, &headers)?;
    let index_sync = state.index_sync.clone();
    let report = tokio::task::spawn_blocking(move || index_sync.restore_all())
        .await
        .map_err(|err| {
            tracing::error!("Restore task failed: {}", err);
            AppError::Internal
        })??;
    Ok(Json(report))
}

/// One queued outbox item.
#[derive(Debug, Serialize)]
pub struct OutboxItemView {
    pub seq: u64,
    pub kind: &'static str,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
}

/// Background sync health.
#[derive(Debug, Serialize)]
pub struct OutboxStatus {
    pub pending: u64,
    pub in_flight: usize,
    pub index_faulted: bool,
    /// Oldest queued items first.
    pub oldest: Vec<OutboxItemView>,
}

/// Report queued work and whether the index is faulted.
///
/// # Errors
/// Returns 403 without the admin token.
pub async fn outbox_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OutboxStatus>, HttpError> {
    require_admin(&state, &headers)?;
    let oldest = state
        .db
        .outbox
        .peek(OUTBOX_PEEK_LIMIT)?
        .into_iter()
        .map(|(seq, entry)| OutboxItemView {
            seq,
            kind: entry.item.kind(),
            attempts: entry.attempts,
            enqueued_at: entry.enqueued_at,
            not_before: entry.not_before,
        })
        .collect();
    Ok(Json(OutboxStatus {
        pending: state.db.outbox.pending_len()?,
        in_flight: state.db.outbox.in_flight_len(),
        index_faulted: state.index_sync.is_faulted(),
        oldest,
    }))
}

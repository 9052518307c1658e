//! Tag autocomplete handler.

use crate::{error::HttpError, index::TagIndexRecord, models::tag::TagSuggestQuery, AppState};
use axum::{
    extract::{Query, State},
    Json,
};
use tradedir_core::{DEFAULT_TAG_SUGGESTION_LIMIT, MAX_PAGE_SIZE};

/// Suggest catalog tags starting with `prefix`.
///
/// # Errors
/// Returns 500 when both the index and the record store are unreadable.
pub async fn suggest_tags(
    State(state): State<AppState>,
    Query(query): Query<TagSuggestQuery>,
) -> Result<Json<Vec<TagIndexRecord>>, HttpError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TAG_SUGGESTION_LIMIT)
        .clamp(1, MAX_PAGE_SIZE);
    Ok(Json(state.index_sync.suggest_tags(&query.prefix, limit)?))
}

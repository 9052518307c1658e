//! Category catalog HTTP handlers.
//!
//! Rename and delete return once the catalog row commits; the entity cascade
//! runs on the sync workers.

use crate::{auth::require_admin, error::HttpError, models::category::*, search::Page, AppState};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;
use tradedir_core::category_ops;

/// List categories, optionally filtered by name.
///
/// # Errors
/// Returns 400 for a zero page or page size.
pub async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<CategoryListQuery>,
) -> Result<Json<Page<Category>>, HttpError> {
    let page = category_ops::list_categories(&state.db, &query, state.config.page_size)?;
    Ok(Json(page))
}

/// Create a category.
///
/// # Errors
/// Returns 403 without the admin token, 409 for a duplicate name, 400 for a blank one.
pub async fn create_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<Json<Category>, HttpError> {
    require_admin(&state, &headers)?;
    Ok(Json(category_ops::create_category(&state.db, &req.name)?))
}

/// Rename a category and queue the rewrite of every entity that references it.
///
/// # Errors
/// Returns 403 without the admin token, 404 for unknown ids, 409 when the new
/// name is taken.
pub async fn rename_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RenameCategoryRequest>,
) -> Result<Json<Category>, HttpError> {
    require_admin(&state, &headers)?;
    Ok(Json(category_ops::rename_category(
        &state.db, &id, &req.name,
    )?))
}

/// Delete a category and queue the configured entity cascade.
///
/// # Errors
/// Returns 403 without the admin token, 404 for unknown ids.
pub async fn delete_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, HttpError> {
    require_admin(&state, &headers)?;
    let deleted = category_ops::delete_category(&state.db, &id)?;
    tracing::info!(category_id = %deleted.id, name = %deleted.name, "Category deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}

//! User account HTTP handlers.

use crate::{auth::require_caller, error::HttpError, models::user::*, AppState};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;
use tradedir_core::user_ops;

fn require_self(state: &AppState, headers: &HeaderMap, id: &str) -> Result<(), HttpError> {
    let user_id = require_caller(state, headers)?;
    if user_id != id {
        return Err(HttpError::forbidden("You can only manage your own account"));
    }
    Ok(())
}

/// Register a user.
///
/// # Errors
/// Returns 400 for invalid fields, 409 when the email is taken.
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<User>, HttpError> {
    Ok(Json(user_ops::create_user(&state.db, req)?))
}

/// Fetch the caller's own account.
///
/// # Errors
/// Returns 401/403 for other accounts.
pub async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<User>, HttpError> {
    require_self(&state, &headers, &id)?;
    Ok(Json(state.db.users.get_live(&id)?))
}

/// Update the caller's own account.
///
/// # Errors
/// Returns 401/403 for other accounts, 400 for invalid fields, 409 when a new
/// email is taken.
pub async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, HttpError> {
    require_self(&state, &headers, &id)?;
    Ok(Json(user_ops::update_user(&state.db, &id, req)?))
}

/// Soft-delete the caller's own account and the entities only it manages.
///
/// # Errors
/// Returns 401/403 for other accounts.
pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, HttpError> {
    require_self(&state, &headers, &id)?;
    let removed = user_ops::soft_delete_user(&state.db, &id)?;
    Ok(Json(serde_json::json!({
        "success": true,
        "deleted_entities": removed,
    })))
}

//! Entity HTTP handlers.

use super::split_csv;
use crate::{
    auth::{caller, require_admin, require_caller},
    error::HttpError,
    index::EntityIndexRecord,
    mail::render_contact,
    models::entity::*,
    search::{EntityQueryPlan, Page, SearchCriteria},
    AppError, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;
use tradedir_core::entity_ops;

/// Load a live entity and check that `user_id` owns it.
fn owned_entity(state: &AppState, id: &str, user_id: &str) -> Result<Entity, HttpError> {
    let entity = state.db.entities.get_live(id)?;
    if !entity.is_owned_by(user_id) {
        return Err(HttpError::forbidden("You do not manage this entity"));
    }
    Ok(entity)
}

/// Search the directory.
///
/// Anonymous callers only see Accepted entities; authenticated callers also
/// see Pending ones. `favorites_only` reads the favorites of
/// `querying_entity_id`, which the caller must manage.
///
/// # Returns
/// One page of matching index records.
///
/// # Errors
/// Returns 400 for invalid criteria, 401/403 for favorites of an entity the
/// caller cannot read.
pub async fn search_entities(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EntitySearchQuery>,
) -> Result<Json<Page<EntityIndexRecord>>, HttpError> {
    let caller = caller(&state, &headers)?;
    let statuses = if caller.is_some() {
        vec![TradingStatus::Accepted, TradingStatus::Pending]
    } else {
        vec![TradingStatus::Accepted]
    };

    let favorite_ids = if query.favorites_only {
        let Some(querying_id) = query.querying_entity_id.as_deref() else {
            return Err(AppError::BadRequest(
                "favorites_only requires querying_entity_id".to_string(),
            )
            .into());
        };
        let user_id = caller.as_deref().ok_or(HttpError::Unauthorized)?;
        owned_entity(&state, querying_id, user_id)?.favorite_entities
    } else {
        Vec::new()
    };

    let criteria = SearchCriteria {
        page: query.page.unwrap_or(1),
        page_size: query.page_size.unwrap_or(state.config.page_size),
        category: query.category,
        offers: split_csv(query.offers.as_deref()),
        wants: split_csv(query.wants.as_deref()),
        tagged_since: query.tagged_since,
        favorites_only: query.favorites_only,
        statuses,
        favorite_ids,
        name: query.name,
        city: query.city,
        country: query.country,
    };
    let plan = EntityQueryPlan::from_criteria(criteria)?;
    Ok(Json(state.index_sync.search_entities(&plan)?))
}

/// Fetch one entity document.
///
/// Accepted entities are public; others are visible to their managers and,
/// when Pending, to any authenticated caller.
///
/// # Errors
/// Returns 404 when the entity is missing, deleted, or hidden from the caller.
pub async fn get_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Entity>, HttpError> {
    let caller = caller(&state, &headers)?;
    let entity = state.db.entities.get_live(&id)?;
    let visible = match (entity.status, caller.as_deref()) {
        (TradingStatus::Accepted, _) => true,
        (TradingStatus::Pending, Some(_)) => true,
        (_, Some(user_id)) => entity.is_owned_by(user_id),
        (_, None) => false,
    };
    if !visible {
        return Err(AppError::NotFound.into());
    }
    Ok(Json(entity))
}

/// Create an entity managed by the caller. New entities start Pending.
///
/// # Errors
/// Returns 401 without a caller, 400 for invalid fields.
pub async fn create_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateEntityRequest>,
) -> Result<Json<Entity>, HttpError> {
    let user_id = require_caller(&state, &headers)?;
    let entity = entity_ops::create_entity(&state.db, &user_id, req)?;
    Ok(Json(entity))
}

/// Update an entity profile, including its offers, wants, and categories.
///
/// # Errors
/// Returns 401/403 unless the caller manages the entity, 404 when it is
/// missing, 400 for invalid fields.
pub async fn update_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateEntityRequest>,
) -> Result<Json<Entity>, HttpError> {
    let user_id = require_caller(&state, &headers)?;
    owned_entity(&state, &id, &user_id)?;
    let entity = entity_ops::update_entity_profile(&state.db, &id, req)?;
    Ok(Json(entity))
}

/// Soft-delete an entity. Allowed for its managers and for admins.
///
/// # Errors
/// Returns 401/403 when the caller may not delete it, 404 when it is missing.
pub async fn delete_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, HttpError> {
    if require_admin(&state, &headers).is_err() {
        let user_id = require_caller(&state, &headers)?;
        owned_entity(&state, &id, &user_id)?;
    }
    entity_ops::soft_delete_entity(&state.db, &id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Tags of an entity that other Accepted entities recently listed on the opposite side.
///
/// # Errors
/// Returns 401/403 unless the caller manages the entity, 404 when it is missing.
pub async fn matched_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<MatchedTagsQuery>,
) -> Result<Json<MatchedTags>, HttpError> {
    let user_id = require_caller(&state, &headers)?;
    owned_entity(&state, &id, &user_id)?;
    Ok(Json(entity_ops::matched_tags(&state.db, &id, query.since)?))
}

/// Add or remove a favorite on an entity the caller manages.
///
/// # Errors
/// Returns 401/403 unless the caller manages `entity_id`, 404 when either
/// entity is missing, 400 for self-favorites.
pub async fn set_favorite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FavoriteRequest>,
) -> Result<Json<Entity>, HttpError> {
    let user_id = require_caller(&state, &headers)?;
    owned_entity(&state, &req.entity_id, &user_id)?;
    let entity =
        entity_ops::set_favorite(&state.db, &req.entity_id, &req.favorite_id, req.favorite)?;
    Ok(Json(entity))
}

/// Email another entity on behalf of one the caller manages.
///
/// Delivery runs in the background; the response does not wait for it and
/// delivery failures are only logged.
///
/// # Errors
/// Returns 401/403 unless the caller manages the sender, 404 when either
/// entity is missing, 400 for an empty body or non-Accepted entities.
pub async fn contact_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ContactRequest>,
) -> Result<Json<Value>, HttpError> {
    let user_id = require_caller(&state, &headers)?;
    owned_entity(&state, &req.sender_entity_id, &user_id)?;
    let body = req.body.trim();
    if body.is_empty() {
        return Err(AppError::BadRequest("Message body must not be empty".to_string()).into());
    }
    let (sender, receiver) =
        entity_ops::contact_targets(&state.db, &req.sender_entity_id, &req.receiver_entity_id)?;

    let (subject, text, html) = render_contact(&sender.name, &sender.email, body);
    let mailer = state.mailer.clone();
    let receiver_email = receiver.email;
    tokio::task::spawn_blocking(move || {
        if let Err(err) = mailer.send(&receiver_email, &subject, &text, &html) {
            tracing::warn!(receiver = %receiver_email, error = %err, "Contact mail delivery failed");
        }
    });
    tracing::info!(sender = %sender.id, receiver = %receiver.id, "Contact message queued");
    Ok(Json(serde_json::json!({ "success": true })))
}

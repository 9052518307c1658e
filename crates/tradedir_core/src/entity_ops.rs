//! Entity mutations: profile edits, status changes, favorites, and lookups.
//!
//! Every mutation commits the entity write and its follow-up work items in
//! one transaction. Tags reach the catalog only through an Accepted entity.

use crate::{
    db::{Database, TransactionOps},
    diff::TagDifference,
    error::AppError,
    models::entity::{
        CreateEntityRequest, Entity, MatchedTags, TagField, TradingStatus, UpdateEntityRequest,
    },
    text::{normalize_optional_nonempty, validate_tag_list},
    work::WorkItem,
};
use chrono::{DateTime, Utc};

fn required_field(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn stamped(names: &[String], at: DateTime<Utc>) -> Vec<TagField> {
    names
        .iter()
        .map(|name| TagField {
            name: name.clone(),
            added_at: at,
        })
        .collect()
}

/// Create a Pending entity owned by `owner_id`.
///
/// Pending entities never feed the tag catalog, so only index syncs are queued.
///
/// # Errors
/// Returns [`AppError::BadRequest`] for invalid fields, [`AppError::NotFound`]
/// when the owner is missing, or storage errors.
pub fn create_entity(
    db: &Database,
    owner_id: &str,
    request: CreateEntityRequest,
) -> Result<Entity, AppError> {
    let name = required_field("name", &request.name)?;
    let email = required_field("email", &request.email)?;
    let offers = validate_tag_list("offers", request.offers.as_deref().unwrap_or_default())?;
    let wants = validate_tag_list("wants", request.wants.as_deref().unwrap_or_default())?;
    let categories = match request.categories {
        Some(ref raw) => db.categories.names()?.resolve_all(raw),
        None => Vec::new(),
    };

    let mut entity = Entity::new(name, email, owner_id);
    entity.description = normalize_optional_nonempty(request.description);
    entity.website = normalize_optional_nonempty(request.website);
    entity.location_city = normalize_optional_nonempty(request.location_city);
    entity.location_region = normalize_optional_nonempty(request.location_region);
    entity.location_country = normalize_optional_nonempty(request.location_country);
    entity.offers = stamped(&offers, entity.created_at);
    entity.wants = stamped(&wants, entity.created_at);
    entity.categories = categories;

    TransactionOps::create_entity_for_owner(db, &entity)?;
    tracing::info!(entity_id = %entity.id, owner_id, "Entity created");
    Ok(entity)
}

/// Apply a profile edit.
///
/// Offers and wants go through [`TagDifference`]: an absent or empty list
/// leaves that list unchanged. Categories are resolved against the catalog
/// inside the write transaction: names with a queued rename take the new name,
/// and names left behind by a category delete are dropped. When the entity is
/// Accepted, newly added tags are queued for the tag catalog.
///
/// # Returns
/// The stored entity.
///
/// # Errors
/// Returns [`AppError::NotFound`] for missing or deleted entities,
/// [`AppError::BadRequest`] for invalid fields, or storage errors.
pub fn update_entity_profile(
    db: &Database,
    id: &str,
    request: UpdateEntityRequest,
) -> Result<Entity, AppError> {
    let new_offers = validate_tag_list("offers", request.offers.as_deref().unwrap_or_default())?;
    let new_wants = validate_tag_list("wants", request.wants.as_deref().unwrap_or_default())?;
    let name = request
        .name
        .as_deref()
        .map(|value| required_field("name", value))
        .transpose()?;
    let email = request
        .email
        .as_deref()
        .map(|value| required_field("email", value))
        .transpose()?;

    let updated = db.entities.update_with_category_names(id, |entity, names| {
        if entity.is_deleted() {
            return Err(AppError::NotFound);
        }
        let now = Utc::now();
        let diff = TagDifference::compute(
            &entity.offer_names(),
            &new_offers,
            &entity.want_names(),
            &new_wants,
        );
        entity.offers = diff.apply_offers(&entity.offers, now);
        entity.wants = diff.apply_wants(&entity.wants, now);

        if let Some(name) = name {
            entity.name = name;
        }
        if let Some(email) = email {
            entity.email = email;
        }
        if request.description.is_some() {
            entity.description = normalize_optional_nonempty(request.description);
        }
        if request.website.is_some() {
            entity.website = normalize_optional_nonempty(request.website);
        }
        if request.location_city.is_some() {
            entity.location_city = normalize_optional_nonempty(request.location_city);
        }
        if request.location_region.is_some() {
            entity.location_region = normalize_optional_nonempty(request.location_region);
        }
        if request.location_country.is_some() {
            entity.location_country = normalize_optional_nonempty(request.location_country);
        }
        entity.categories = match request.categories {
            Some(ref raw) => names.resolve_all(raw),
            None => names.resolve_all(&entity.categories),
        };

        let mut items = vec![WorkItem::SyncEntity {
            id: entity.id.clone(),
        }];
        if entity.is_accepted() && diff.has_additions() {
            items.push(WorkItem::RecordTags {
                offers: diff.offers_added.clone(),
                wants: diff.wants_added.clone(),
            });
        }
        tracing::debug!(
            entity_id = %entity.id,
            offers_added = diff.offers_added.len(),
            offers_removed = diff.offers_removed.len(),
            wants_added = diff.wants_added.len(),
            wants_removed = diff.wants_removed.len(),
            "Entity profile updated"
        );
        Ok(items)
    })?;
    updated.ok_or(AppError::NotFound)
}

/// Change an entity's trading status.
///
/// A transition into Accepted queues every current offer and want for the
/// tag catalog.
///
/// # Errors
/// Returns [`AppError::NotFound`] for missing or deleted entities, or storage errors.
pub fn set_entity_status(
    db: &Database,
    id: &str,
    status: TradingStatus,
) -> Result<Entity, AppError> {
    let updated = db.entities.update_with(id, |entity| {
        if entity.is_deleted() {
            return Err(AppError::NotFound);
        }
        let previous = entity.status;
        entity.status = status;

        let mut items = vec![WorkItem::SyncEntity {
            id: entity.id.clone(),
        }];
        let offers = entity.offer_names();
        let wants = entity.want_names();
        if previous != TradingStatus::Accepted
            && status == TradingStatus::Accepted
            && (!offers.is_empty() || !wants.is_empty())
        {
            items.push(WorkItem::RecordTags { offers, wants });
        }
        tracing::info!(
            entity_id = %entity.id,
            from = previous.as_str(),
            to = status.as_str(),
            "Entity status changed"
        );
        Ok(items)
    })?;
    updated.ok_or(AppError::NotFound)
}

/// Add or remove `favorite_id` in an entity's favorites.
///
/// # Errors
/// Returns [`AppError::BadRequest`] when an entity favorites itself,
/// [`AppError::NotFound`] when either entity is missing, or storage errors.
pub fn set_favorite(
    db: &Database,
    entity_id: &str,
    favorite_id: &str,
    favorite: bool,
) -> Result<Entity, AppError> {
    if entity_id == favorite_id {
        return Err(AppError::BadRequest(
            "An entity cannot favorite itself".to_string(),
        ));
    }
    if favorite {
        db.entities.get_live(favorite_id)?;
    }
    let updated = db.entities.update_with(entity_id, |entity| {
        if entity.is_deleted() {
            return Err(AppError::NotFound);
        }
        let present = entity.favorite_entities.iter().any(|id| id == favorite_id);
        if favorite && !present {
            entity.favorite_entities.push(favorite_id.to_string());
        } else if !favorite {
            entity.favorite_entities.retain(|id| id != favorite_id);
        }
        Ok(Vec::new())
    })?;
    updated.ok_or(AppError::NotFound)
}

/// Soft-delete an entity and remove it from the index.
///
/// # Errors
/// Returns [`AppError::NotFound`] for missing or already deleted entities.
pub fn soft_delete_entity(db: &Database, id: &str) -> Result<Entity, AppError> {
    let updated = db.entities.update_with(id, |entity| {
        if entity.is_deleted() {
            return Err(AppError::NotFound);
        }
        entity.deleted_at = Some(Utc::now());
        Ok(vec![WorkItem::SyncEntity {
            id: entity.id.clone(),
        }])
    })?;
    let entity = updated.ok_or(AppError::NotFound)?;
    tracing::info!(entity_id = %entity.id, "Entity soft-deleted");
    Ok(entity)
}

/// Tags of `id` that Accepted entities listed on the opposite side at or after `since`.
///
/// # Errors
/// Returns [`AppError::NotFound`] for missing or deleted entities, or storage errors.
pub fn matched_tags(db: &Database, id: &str, since: DateTime<Utc>) -> Result<MatchedTags, AppError> {
    let entity = db.entities.get_live(id)?;
    let mut matched = MatchedTags {
        matched_offers: Vec::new(),
        matched_wants: Vec::new(),
    };
    for offer in &entity.offers {
        if let Some(tag) = db.tags.get(&offer.name)? {
            if tag.want_added_at.is_some_and(|at| at >= since) {
                matched.matched_offers.push(tag.name);
            }
        }
    }
    for want in &entity.wants {
        if let Some(tag) = db.tags.get(&want.name)? {
            if tag.offer_added_at.is_some_and(|at| at >= since) {
                matched.matched_wants.push(tag.name);
            }
        }
    }
    Ok(matched)
}

/// Resolve sender and receiver for a contact message.
///
/// # Returns
/// `(sender, receiver)`.
///
/// # Errors
/// Returns [`AppError::NotFound`] when either entity is missing, or
/// [`AppError::BadRequest`] when they are the same or not both Accepted.
pub fn contact_targets(
    db: &Database,
    sender_id: &str,
    receiver_id: &str,
) -> Result<(Entity, Entity), AppError> {
    if sender_id == receiver_id {
        return Err(AppError::BadRequest(
            "An entity cannot contact itself".to_string(),
        ));
    }
    let sender = db.entities.get_live(sender_id)?;
    let receiver = db.entities.get_live(receiver_id)?;
    if !sender.is_accepted() || !receiver.is_accepted() {
        return Err(AppError::BadRequest(
            "Both entities must be accepted to exchange messages".to_string(),
        ));
    }
    Ok((sender, receiver))
}

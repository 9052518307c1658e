//! Search index projections of canonical documents.
//!
//! Each projection is a pure function of its source document; entity
//! categories are additionally resolved against the category catalog.

use crate::{
    db::category::CategoryNames,
    models::{
        entity::{Entity, TagField, TradingStatus},
        tag::Tag,
        user::User,
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Indexed view of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIndexRecord {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl From<&User> for UserIndexRecord {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
        }
    }
}

/// Indexed view of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityIndexRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub offers: Vec<TagField>,
    pub wants: Vec<TagField>,
    pub location_city: Option<String>,
    pub location_country: Option<String>,
    pub status: TradingStatus,
    pub categories: Vec<String>,
}

impl EntityIndexRecord {
    /// Project `entity`, keeping only categories that resolve in `categories`.
    ///
    /// Documents may keep a deleted category name until their next edit; the
    /// index never carries it.
    pub fn project(entity: &Entity, categories: &CategoryNames) -> Self {
        Self {
            id: entity.id.clone(),
            name: entity.name.clone(),
            email: entity.email.clone(),
            offers: entity.offers.clone(),
            wants: entity.wants.clone(),
            location_city: entity.location_city.clone(),
            location_country: entity.location_country.clone(),
            status: entity.status,
            categories: categories.resolve_all(&entity.categories),
        }
    }
}

/// Indexed view of a tag catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagIndexRecord {
    pub tag_id: String,
    pub name: String,
    pub offer_added_at: Option<DateTime<Utc>>,
    pub want_added_at: Option<DateTime<Utc>>,
}

impl From<&Tag> for TagIndexRecord {
    fn from(tag: &Tag) -> Self {
        Self {
            tag_id: tag.id.clone(),
            name: tag.name.clone(),
            offer_added_at: tag.offer_added_at,
            want_added_at: tag.want_added_at,
        }
    }
}

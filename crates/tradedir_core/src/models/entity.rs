//! Trading entity models and request payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Review state of a trading entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingStatus {
    Pending,
    Accepted,
    Rejected,
}

impl TradingStatus {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for TradingStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown trading status '{}'", other)),
        }
    }
}

/// One offer or want on an entity, with the time it was added to that list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagField {
    pub name: String,
    pub added_at: DateTime<Utc>,
}

/// Canonical entity document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub email: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub location_city: Option<String>,
    pub location_region: Option<String>,
    pub location_country: Option<String>,
    pub status: TradingStatus,
    pub offers: Vec<TagField>,
    pub wants: Vec<TagField>,
    pub categories: Vec<String>,
    pub favorite_entities: Vec<String>,
    pub users: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// Create a pending entity owned by `owner_id` with no tags or categories.
    pub fn new(name: String, email: String, owner_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            description: None,
            website: None,
            location_city: None,
            location_region: None,
            location_country: None,
            status: TradingStatus::Pending,
            offers: Vec::new(),
            wants: Vec::new(),
            categories: Vec::new(),
            favorite_entities: Vec::new(),
            users: vec![owner_id.to_string()],
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_accepted(&self) -> bool {
        self.status == TradingStatus::Accepted
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.users.iter().any(|owner| owner == user_id)
    }

    pub fn offer_names(&self) -> Vec<String> {
        self.offers.iter().map(|tag| tag.name.clone()).collect()
    }

    pub fn want_names(&self) -> Vec<String> {
        self.wants.iter().map(|tag| tag.name.clone()).collect()
    }
}

/// Request payload for creating an entity.
#[derive(Debug, Deserialize, Clone)]
pub struct CreateEntityRequest {
    pub name: String,
    pub email: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub location_city: Option<String>,
    pub location_region: Option<String>,
    pub location_country: Option<String>,
    pub offers: Option<Vec<String>>,
    pub wants: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
}

/// Request payload for updating an entity profile.
///
/// An absent or empty `offers`/`wants` list leaves that list unchanged.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct UpdateEntityRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub location_city: Option<String>,
    pub location_region: Option<String>,
    pub location_country: Option<String>,
    pub offers: Option<Vec<String>>,
    pub wants: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
}

/// Request payload for an admin status change.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TradingStatus,
}

/// Request payload for adding or removing a favorite.
#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub entity_id: String,
    pub favorite_id: String,
    pub favorite: bool,
}

/// Request payload for emailing another entity.
#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub sender_entity_id: String,
    pub receiver_entity_id: String,
    pub body: String,
}

/// Query parameters for directory search.
///
/// Tag lists are comma-separated.
#[derive(Debug, Deserialize, Default)]
pub struct EntitySearchQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub category: Option<String>,
    pub offers: Option<String>,
    pub wants: Option<String>,
    pub tagged_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub favorites_only: bool,
    pub querying_entity_id: Option<String>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Query parameters for matched-tag lookups.
#[derive(Debug, Deserialize)]
pub struct MatchedTagsQuery {
    pub since: DateTime<Utc>,
}

/// Tags of one entity that other Accepted entities recently listed on the opposite side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchedTags {
    /// My offers that somebody recently wanted.
    pub matched_offers: Vec<String>,
    /// My wants that somebody recently offered.
    pub matched_wants: Vec<String>,
}

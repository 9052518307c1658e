//! Tag catalog models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of a trade a tag was listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSide {
    Offer,
    Want,
}

/// Catalog entry for a tag name seen on an Accepted entity.
///
/// Entries are only ever merged, never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub offer_added_at: Option<DateTime<Utc>>,
    pub want_added_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

fn latest(current: Option<DateTime<Utc>>, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(current.map_or(at, |existing| existing.max(at)))
}

impl Tag {
    /// Create a fresh catalog entry first seen at `at` on `side`.
    pub fn first_seen(name: String, side: TagSide, at: DateTime<Utc>) -> Self {
        let mut tag = Self {
            id: Uuid::new_v4().to_string(),
            name,
            created_at: at,
            offer_added_at: None,
            want_added_at: None,
            deleted_at: None,
        };
        tag.record(side, at);
        tag
    }

    /// Merge one more sighting into this entry.
    ///
    /// Keeps the earliest `created_at` and the latest per-side timestamp, so
    /// replaying sightings in any order converges on the same entry.
    pub fn record(&mut self, side: TagSide, at: DateTime<Utc>) {
        self.created_at = self.created_at.min(at);
        match side {
            TagSide::Offer => self.offer_added_at = latest(self.offer_added_at, at),
            TagSide::Want => self.want_added_at = latest(self.want_added_at, at),
        }
    }

    /// Latest time the tag was added on `side`, if ever.
    pub fn added_at(&self, side: TagSide) -> Option<DateTime<Utc>> {
        match side {
            TagSide::Offer => self.offer_added_at,
            TagSide::Want => self.want_added_at,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Query parameters for tag autocomplete.
#[derive(Debug, Deserialize)]
pub struct TagSuggestQuery {
    pub prefix: String,
    pub limit: Option<usize>,
}

//! Secondary search index: projections, the storage seam, and the redb backend.
//!
//! The index is a cache. Every record can be rebuilt from the record store.

/// Index record projections.
pub mod records;
/// redb-backed index implementation.
pub mod redb_index;

pub use records::{EntityIndexRecord, TagIndexRecord, UserIndexRecord};
pub use redb_index::RedbSearchIndex;

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index collection a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexNamespace {
    Users,
    Entities,
    Tags,
}

impl IndexNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Entities => "entities",
            Self::Tags => "tags",
        }
    }
}

impl fmt::Display for IndexNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage seam for the search index.
///
/// Implementations must be safe to call from several workers at once.
pub trait SearchIndex: Send + Sync {
    /// Insert or replace a user record keyed by `user_id`.
    fn upsert_user(&self, record: &UserIndexRecord) -> Result<(), AppError>;
    /// Insert or replace an entity record keyed by `id`.
    fn upsert_entity(&self, record: &EntityIndexRecord) -> Result<(), AppError>;
    /// Insert or replace a tag record keyed by `tag_id`.
    fn upsert_tag(&self, record: &TagIndexRecord) -> Result<(), AppError>;
    /// Remove a record; `Ok(false)` when it was not present.
    fn remove(&self, namespace: IndexNamespace, id: &str) -> Result<bool, AppError>;

    fn get_user(&self, id: &str) -> Result<Option<UserIndexRecord>, AppError>;
    fn get_entity(&self, id: &str) -> Result<Option<EntityIndexRecord>, AppError>;
    fn get_tag(&self, tag_id: &str) -> Result<Option<TagIndexRecord>, AppError>;

    /// Every record id in `namespace`.
    fn ids(&self, namespace: IndexNamespace) -> Result<Vec<String>, AppError>;
    /// Visit every entity record.
    fn scan_entities(
        &self,
        on_record: &mut dyn FnMut(EntityIndexRecord) -> Result<(), AppError>,
    ) -> Result<(), AppError>;
    /// Tag records whose name starts with `prefix`, ordered by name.
    fn tags_with_prefix(&self, prefix: &str, limit: usize)
        -> Result<Vec<TagIndexRecord>, AppError>;
}

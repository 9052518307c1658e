//! Tag catalog storage backed by redb.

use super::outbox::{append_in_txn, OutboxDb};
use crate::{
    db::tables::TAGS,
    error::AppError,
    models::tag::{Tag, TagSide},
    work::WorkItem,
};
use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use std::sync::Arc;

pub(crate) fn deserialize_tag(bytes: &[u8]) -> Result<Tag, AppError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Accessor for the tag catalog.
pub struct TagDb {
    db: Arc<redb::Database>,
    outbox: OutboxDb,
}

impl TagDb {
    /// Initialize the tag table if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error when redb transaction/table initialization fails.
    pub fn new(db: Arc<redb::Database>, outbox: OutboxDb) -> Result<Self, AppError> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(TAGS)?;
        write_txn.commit()?;
        Ok(Self { db, outbox })
    }

    /// Merge sightings of normalized tag names into the catalog.
    ///
    /// Each name is inserted on first sight and otherwise merged (earliest
    /// `created_at`, latest per-side timestamp). A `SyncTag` item is queued for
    /// every touched name in the same transaction.
    ///
    /// # Arguments
    /// - `offers`: Names newly offered by an Accepted entity.
    /// - `wants`: Names newly wanted by an Accepted entity.
    /// - `at`: Time the names were added.
    ///
    /// # Returns
    /// The catalog entries after merging, offers first.
    ///
    /// # Errors
    /// Returns an error when storage or serialization fails.
    pub fn record_sightings(
        &self,
        offers: &[String],
        wants: &[String],
        at: DateTime<Utc>,
    ) -> Result<Vec<Tag>, AppError> {
        if offers.is_empty() && wants.is_empty() {
            return Ok(Vec::new());
        }
        let sightings = offers
            .iter()
            .map(|name| (name, TagSide::Offer))
            .chain(wants.iter().map(|name| (name, TagSide::Want)));

        let write_txn = self.db.begin_write()?;
        let mut merged: Vec<Tag> = Vec::new();
        {
            let mut tags = write_txn.open_table(TAGS)?;
            for (name, side) in sightings {
                let existing = match tags.get(name.as_str())? {
                    Some(guard) => Some(deserialize_tag(guard.value())?),
                    None => None,
                };
                let tag = match existing {
                    Some(mut tag) => {
                        tag.record(side, at);
                        tag
                    }
                    None => Tag::first_seen(name.clone(), side, at),
                };
                let encoded = bincode::serialize(&tag)?;
                tags.insert(name.as_str(), encoded.as_slice())?;
                merged.retain(|seen| seen.name != tag.name);
                merged.push(tag);
            }
        }
        let items: Vec<WorkItem> = merged
            .iter()
            .map(|tag| WorkItem::SyncTag {
                name: tag.name.clone(),
            })
            .collect();
        append_in_txn(&write_txn, &items, Utc::now())?;
        write_txn.commit()?;
        self.outbox.notify();
        Ok(merged)
    }

    /// Fetch a catalog entry by normalized name.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn get(&self, name: &str) -> Result<Option<Tag>, AppError> {
        let read_txn = self.db.begin_read()?;
        let tags = read_txn.open_table(TAGS)?;
        match tags.get(name)? {
            Some(value) => Ok(Some(deserialize_tag(value.value())?)),
            None => Ok(None),
        }
    }

    /// Catalog entries whose name starts with `prefix`, in name order.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn with_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<Tag>, AppError> {
        let read_txn = self.db.begin_read()?;
        let tags = read_txn.open_table(TAGS)?;
        let mut found = Vec::new();
        for item in tags.range(prefix..)? {
            if found.len() >= limit {
                break;
            }
            let (key, value) = item?;
            if !key.value().starts_with(prefix) {
                break;
            }
            let tag = deserialize_tag(value.value())?;
            if !tag.is_deleted() {
                found.push(tag);
            }
        }
        Ok(found)
    }

    /// Visit every catalog entry in name order.
    ///
    /// # Errors
    /// Returns an error when storage access, deserialization, or the callback fails.
    pub fn scan<F>(&self, mut on_tag: F) -> Result<(), AppError>
    where
        F: FnMut(Tag) -> Result<(), AppError>,
    {
        let read_txn = self.db.begin_read()?;
        let tags = read_txn.open_table(TAGS)?;
        for item in tags.iter()? {
            let (_, value) = item?;
            on_tag(deserialize_tag(value.value())?)?;
        }
        Ok(())
    }
}

//! Record store to search index synchronization and full restore.
//!
//! The record store is the source of truth. Index writes happen after the
//! canonical write commits; an index that may have missed a write is marked
//! faulted so readers route through the record store until a clean restore.

use crate::{
    db::Database,
    error::AppError,
    index::{
        EntityIndexRecord, IndexNamespace, SearchIndex, TagIndexRecord, UserIndexRecord,
    },
    search::{self, EntityQueryPlan, IndexSource, Page, RecordStoreSource},
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Per-collection outcome of [`IndexSync::restore_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub collection: IndexNamespace,
    /// Live documents written to the index.
    pub indexed: usize,
    /// Index records removed because their document is gone or soft-deleted.
    pub pruned: usize,
    /// Documents whose index write failed.
    pub failed: usize,
    pub elapsed_ms: u128,
}

impl CollectionReport {
    fn new(collection: IndexNamespace) -> Self {
        Self {
            collection,
            indexed: 0,
            pruned: 0,
            failed: 0,
            elapsed_ms: 0,
        }
    }
}

/// Outcome of a full restore, one report per collection in restore order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub collections: Vec<CollectionReport>,
}

impl RestoreReport {
    pub fn total_failed(&self) -> usize {
        self.collections.iter().map(|report| report.failed).sum()
    }
}

/// What a single sync did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Upserted,
    Removed,
    Skipped,
}

/// Mirrors canonical documents into a [`SearchIndex`].
pub struct IndexSync {
    db: Arc<Database>,
    index: Arc<dyn SearchIndex>,
    faulted: AtomicBool,
}

impl IndexSync {
    pub fn new(db: Arc<Database>, index: Arc<dyn SearchIndex>) -> Self {
        Self {
            db,
            index,
            faulted: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> &dyn SearchIndex {
        self.index.as_ref()
    }

    /// Whether the index may be missing writes.
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    /// Route reads through the record store until the next clean restore.
    pub fn mark_faulted(&self) {
        if !self.faulted.swap(true, Ordering::AcqRel) {
            tracing::warn!("Search index marked faulted; reads fall back to the record store");
        }
    }

    fn finalize_index_write(
        &self,
        operation: &str,
        id: &str,
        result: Result<SyncAction, AppError>,
    ) -> Result<SyncAction, AppError> {
        if let Err(ref err) = result {
            tracing::warn!(
                operation,
                id,
                error = %err,
                "Canonical write committed but index update failed"
            );
        }
        result
    }

    /// Bring the index record for one entity in line with its document.
    ///
    /// Missing or soft-deleted documents are removed from the index. Category
    /// names no longer in the catalog are left out of the record.
    ///
    /// # Errors
    /// Returns an error when the record store read or the index write fails.
    pub fn sync_entity(&self, id: &str) -> Result<SyncAction, AppError> {
        let result = match self.db.entities.get_with_category_names(id)? {
            Some((entity, names)) if !entity.is_deleted() => self
                .index
                .upsert_entity(&EntityIndexRecord::project(&entity, &names))
                .map(|()| SyncAction::Upserted),
            _ => self
                .index
                .remove(IndexNamespace::Entities, id)
                .map(|_| SyncAction::Removed),
        };
        self.finalize_index_write("sync_entity", id, result)
    }

    /// Bring the index record for one user in line with its document.
    ///
    /// # Errors
    /// Returns an error when the record store read or the index write fails.
    pub fn sync_user(&self, id: &str) -> Result<SyncAction, AppError> {
        let result = match self.db.users.get(id)? {
            Some(user) if !user.is_deleted() => self
                .index
                .upsert_user(&UserIndexRecord::from(&user))
                .map(|()| SyncAction::Upserted),
            _ => self
                .index
                .remove(IndexNamespace::Users, id)
                .map(|_| SyncAction::Removed),
        };
        self.finalize_index_write("sync_user", id, result)
    }

    /// Bring the index record for one catalog tag in line with its document.
    ///
    /// Tags are keyed by name in the catalog and by id in the index; a name
    /// with no catalog entry is skipped.
    ///
    /// # Errors
    /// Returns an error when the record store read or the index write fails.
    pub fn sync_tag(&self, name: &str) -> Result<SyncAction, AppError> {
        let result = match self.db.tags.get(name)? {
            Some(tag) if !tag.is_deleted() => self
                .index
                .upsert_tag(&TagIndexRecord::from(&tag))
                .map(|()| SyncAction::Upserted),
            Some(tag) => self
                .index
                .remove(IndexNamespace::Tags, &tag.id)
                .map(|_| SyncAction::Removed),
            None => Ok(SyncAction::Skipped),
        };
        self.finalize_index_write("sync_tag", name, result)
    }

    fn record_outcome(
        report: &mut CollectionReport,
        result: Result<SyncAction, AppError>,
    ) {
        match result {
            Ok(SyncAction::Upserted) => report.indexed += 1,
            Ok(SyncAction::Removed) => report.pruned += 1,
            Ok(SyncAction::Skipped) => {}
            Err(_) => report.failed += 1,
        }
    }

    fn restore_users(&self) -> Result<CollectionReport, AppError> {
        let mut report = CollectionReport::new(IndexNamespace::Users);
        let mut live = Vec::new();
        self.db.users.scan(|user| {
            if !user.is_deleted() {
                live.push(user.id);
            }
            Ok(())
        })?;
        for id in &live {
            Self::record_outcome(&mut report, self.sync_user(id));
        }
        let live: HashSet<String> = live.into_iter().collect();
        for id in self.index.ids(IndexNamespace::Users)? {
            if !live.contains(&id) {
                Self::record_outcome(&mut report, self.sync_user(&id));
            }
        }
        Ok(report)
    }

    fn restore_entities(&self) -> Result<CollectionReport, AppError> {
        let mut report = CollectionReport::new(IndexNamespace::Entities);
        let mut live = Vec::new();
        self.db.entities.scan(|entity| {
            if !entity.is_deleted() {
                live.push(entity.id);
            }
            Ok(())
        })?;
        for id in &live {
            Self::record_outcome(&mut report, self.sync_entity(id));
        }
        let live: HashSet<String> = live.into_iter().collect();
        for id in self.index.ids(IndexNamespace::Entities)? {
            if !live.contains(&id) {
                Self::record_outcome(&mut report, self.sync_entity(&id));
            }
        }
        Ok(report)
    }

    fn restore_tags(&self) -> Result<CollectionReport, AppError> {
        let mut report = CollectionReport::new(IndexNamespace::Tags);
        let mut live_names = Vec::new();
        let mut live_ids = HashSet::new();
        self.db.tags.scan(|tag| {
            if !tag.is_deleted() {
                live_ids.insert(tag.id.clone());
                live_names.push(tag.name);
            }
            Ok(())
        })?;
        for name in &live_names {
            Self::record_outcome(&mut report, self.sync_tag(name));
        }
        for tag_id in self.index.ids(IndexNamespace::Tags)? {
            if live_ids.contains(&tag_id) {
                continue;
            }
            let result = self.prune_tag(&tag_id);
            Self::record_outcome(&mut report, result);
        }
        Ok(report)
    }

    fn prune_tag(&self, tag_id: &str) -> Result<SyncAction, AppError> {
        // A tag created after the scan is kept; anything else is removed.
        if let Some(record) = self.index.get_tag(tag_id)? {
            if let Some(tag) = self.db.tags.get(&record.name)? {
                if tag.id == tag_id && !tag.is_deleted() {
                    return Ok(SyncAction::Skipped);
                }
            }
        }
        let result = self
            .index
            .remove(IndexNamespace::Tags, tag_id)
            .map(|_| SyncAction::Removed);
        self.finalize_index_write("prune_tag", tag_id, result)
    }

    /// Rebuild the whole index from the record store.
    ///
    /// Collections are restored in order users, entities, tags. Within each,
    /// every live document is re-projected, then index records whose document
    /// is gone or soft-deleted are pruned. Per-document failures are counted
    /// and logged; they do not stop the restore. Safe to run repeatedly and
    /// alongside live writers, since each record is re-read at write time.
    ///
    /// A restore with no failures clears the faulted flag.
    ///
    /// # Returns
    /// Counts and timings per collection.
    ///
    /// # Errors
    /// Returns an error when a collection cannot be read.
    pub fn restore_all(&self) -> Result<RestoreReport, AppError> {
        let steps: [(IndexNamespace, fn(&Self) -> Result<CollectionReport, AppError>); 3] = [
            (IndexNamespace::Users, Self::restore_users),
            (IndexNamespace::Entities, Self::restore_entities),
            (IndexNamespace::Tags, Self::restore_tags),
        ];

        let mut collections = Vec::with_capacity(steps.len());
        for (namespace, step) in steps {
            let started = Instant::now();
            let mut report = step(self).map_err(|err| {
                tracing::error!(collection = %namespace, error = %err, "Restore aborted");
                err
            })?;
            report.elapsed_ms = started.elapsed().as_millis();
            tracing::info!(
                collection = %namespace,
                indexed = report.indexed,
                pruned = report.pruned,
                failed = report.failed,
                took_ms = report.elapsed_ms as u64,
                "Restored index collection"
            );
            collections.push(report);
        }

        let report = RestoreReport { collections };
        if report.total_failed() == 0 {
            if self.faulted.swap(false, Ordering::AcqRel) {
                tracing::info!("Search index restored cleanly; fault cleared");
            }
        } else {
            self.mark_faulted();
        }
        Ok(report)
    }

    /// Run an entity search against the index, or the record store while the
    /// index is faulted or unreadable.
    ///
    /// # Errors
    /// Returns an error when the record store fallback also fails.
    pub fn search_entities(
        &self,
        plan: &EntityQueryPlan,
    ) -> Result<Page<EntityIndexRecord>, AppError> {
        if !self.is_faulted() {
            match search::execute(plan, &IndexSource(self.index.as_ref())) {
                Ok(page) => return Ok(page),
                Err(err) => {
                    tracing::warn!(error = %err, "Index search failed; using record store");
                    self.mark_faulted();
                }
            }
        }
        search::execute(plan, &RecordStoreSource(self.db.as_ref()))
    }

    /// Tag names starting with `prefix`, for autocomplete.
    ///
    /// # Errors
    /// Returns an error when the record store fallback also fails.
    pub fn suggest_tags(&self, prefix: &str, limit: usize) -> Result<Vec<TagIndexRecord>, AppError> {
        let Some(prefix) = crate::text::normalize_tag_name(prefix) else {
            return Ok(Vec::new());
        };
        if !self.is_faulted() {
            match self.index.tags_with_prefix(&prefix, limit) {
                Ok(found) => return Ok(found),
                Err(err) => {
                    tracing::warn!(error = %err, "Index tag lookup failed; using record store");
                    self.mark_faulted();
                }
            }
        }
        Ok(self
            .db
            .tags
            .with_prefix(&prefix, limit)?
            .iter()
            .map(TagIndexRecord::from)
            .collect())
    }
}

#[cfg(test)]
mod tests;

//! Background work items and the dispatcher that executes them.
//!
//! Items are read from the durable outbox; execution is at-least-once, so
//! every handler must be safe to repeat.

use crate::{
    category_ops,
    config::CategoryDeletePolicy,
    db::{outbox::ClaimedItem, Database},
    error::AppError,
    sync::IndexSync,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const BASE_BACKOFF_MS: i64 = 200;
const MAX_BACKOFF_MS: i64 = 30_000;

/// Follow-up work queued by a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkItem {
    /// Re-project one entity into the search index.
    SyncEntity { id: String },
    /// Re-project one user into the search index.
    SyncUser { id: String },
    /// Re-project one tag catalog entry into the search index.
    SyncTag { name: String },
    /// Merge newly added names of an Accepted entity into the tag catalog.
    RecordTags {
        offers: Vec<String>,
        wants: Vec<String>,
    },
    /// Rewrite entities referencing category `from` to `to`.
    RenameCategory { from: String, to: String },
    /// Apply the delete policy to entities referencing category `name`.
    DeleteCategory { name: String },
}

impl WorkItem {
    /// Key shared by items that must not run concurrently.
    ///
    /// Category cascades share one key so renames and deletes apply in order.
    pub fn serial_key(&self) -> Option<String> {
        match self {
            Self::SyncEntity { id } => Some(format!("entity:{}", id)),
            Self::SyncUser { id } => Some(format!("user:{}", id)),
            Self::SyncTag { name } => Some(format!("tag:{}", name)),
            Self::RecordTags { .. } => None,
            Self::RenameCategory { .. } | Self::DeleteCategory { .. } => {
                Some("category-cascade".to_string())
            }
        }
    }

    /// Short name for logs and status output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SyncEntity { .. } => "sync_entity",
            Self::SyncUser { .. } => "sync_user",
            Self::SyncTag { .. } => "sync_tag",
            Self::RecordTags { .. } => "record_tags",
            Self::RenameCategory { .. } => "rename_category",
            Self::DeleteCategory { .. } => "delete_category",
        }
    }

    fn is_index_sync(&self) -> bool {
        matches!(
            self,
            Self::SyncEntity { .. } | Self::SyncUser { .. } | Self::SyncTag { .. }
        )
    }
}

/// Result of one [`Dispatcher::run_next`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing runnable right now.
    Idle,
    Completed,
    /// Failed transiently; re-queued with backoff.
    Retried,
    /// Failed for good; removed from the outbox.
    Dropped,
}

/// Executes outbox items against the record store and search index.
pub struct Dispatcher {
    db: Arc<Database>,
    index_sync: Arc<IndexSync>,
    delete_policy: CategoryDeletePolicy,
    max_attempts: u32,
}

fn backoff_for(attempts: u32) -> chrono::Duration {
    let factor = 1_i64 << attempts.min(16);
    chrono::Duration::milliseconds(BASE_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

impl Dispatcher {
    pub fn new(
        db: Arc<Database>,
        index_sync: Arc<IndexSync>,
        delete_policy: CategoryDeletePolicy,
        max_attempts: u32,
    ) -> Self {
        Self {
            db,
            index_sync,
            delete_policy,
            max_attempts: max_attempts.max(1),
        }
    }

    fn execute(&self, item: &WorkItem, claimed: &ClaimedItem) -> Result<(), AppError> {
        match item {
            WorkItem::SyncEntity { id } => self.index_sync.sync_entity(id).map(|_| ()),
            WorkItem::SyncUser { id } => self.index_sync.sync_user(id).map(|_| ()),
            WorkItem::SyncTag { name } => self.index_sync.sync_tag(name).map(|_| ()),
            WorkItem::RecordTags { offers, wants } => self
                .db
                .tags
                .record_sightings(offers, wants, claimed.entry.enqueued_at)
                .map(|_| ()),
            WorkItem::RenameCategory { from, to } => {
                category_ops::cascade_rename(&self.db, from, to).map(|_| ())
            }
            WorkItem::DeleteCategory { name } => {
                category_ops::cascade_delete(&self.db, name, self.delete_policy).map(|_| ())
            }
        }
    }

    /// Claim and execute the oldest runnable item.
    ///
    /// Failures never escape: transient ones are re-queued with exponential
    /// backoff until `max_attempts`, everything else is logged and dropped. A
    /// dropped index sync marks the index faulted.
    ///
    /// # Errors
    /// Returns an error only when the outbox itself cannot be read or updated.
    pub fn run_next(&self) -> Result<RunOutcome, AppError> {
        let Some(claimed) = self.db.outbox.claim()? else {
            return Ok(RunOutcome::Idle);
        };
        let item = &claimed.entry.item;

        let err = match self.execute(item, &claimed) {
            Ok(()) => {
                self.db.outbox.complete(&claimed)?;
                tracing::debug!(seq = claimed.seq, kind = item.kind(), "Work item completed");
                return Ok(RunOutcome::Completed);
            }
            Err(err) => err,
        };

        let attempts = claimed.entry.attempts.saturating_add(1);
        if err.is_transient() && attempts < self.max_attempts {
            let backoff = backoff_for(claimed.entry.attempts);
            self.db.outbox.retry_later(&claimed, backoff)?;
            tracing::warn!(
                seq = claimed.seq,
                kind = item.kind(),
                attempts,
                error = %err,
                "Work item failed; will retry"
            );
            return Ok(RunOutcome::Retried);
        }

        if err.is_transient() {
            tracing::error!(
                seq = claimed.seq,
                kind = item.kind(),
                item = ?item,
                attempts,
                error = %err,
                "Work item failed permanently; dropping"
            );
        } else {
            tracing::warn!(
                seq = claimed.seq,
                kind = item.kind(),
                item = ?item,
                error = %err,
                "Work item rejected; dropping"
            );
        }
        if item.is_index_sync() {
            self.index_sync.mark_faulted();
        }
        self.db.outbox.complete(&claimed)?;
        Ok(RunOutcome::Dropped)
    }

    /// Run items until nothing is runnable.
    ///
    /// Items backing off after a failure are left queued.
    ///
    /// # Returns
    /// Number of items taken off the queue or re-queued.
    ///
    /// # Errors
    /// Returns an error when the outbox cannot be read or updated.
    pub fn drain(&self) -> Result<usize, AppError> {
        let mut processed = 0;
        loop {
            match self.run_next()? {
                RunOutcome::Idle => return Ok(processed),
                _ => processed += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascades_share_one_serial_key() {
        let rename = WorkItem::RenameCategory {
            from: "a".to_string(),
            to: "b".to_string(),
        };
        let delete = WorkItem::DeleteCategory {
            name: "c".to_string(),
        };
        assert_eq!(rename.serial_key(), delete.serial_key());
        assert_eq!(
            WorkItem::RecordTags {
                offers: vec![],
                wants: vec![]
            }
            .serial_key(),
            None
        );
        assert_ne!(
            WorkItem::SyncEntity { id: "x".to_string() }.serial_key(),
            WorkItem::SyncUser { id: "x".to_string() }.serial_key()
        );
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_for(0), chrono::Duration::milliseconds(200));
        assert_eq!(backoff_for(1), chrono::Duration::milliseconds(400));
        assert_eq!(backoff_for(30), chrono::Duration::milliseconds(MAX_BACKOFF_MS));
    }
}

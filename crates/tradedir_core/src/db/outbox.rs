//! Durable outbox of background work items.
//!
//! Items are appended inside the same write transaction as the mutation that
//! caused them, so a committed mutation always has its follow-up work queued.
//! Rows are removed only when the dispatcher reports completion.

use crate::{db::tables::OUTBOX, error::AppError, work::WorkItem};
use chrono::{DateTime, Duration, Utc};
use redb::{ReadableDatabase, ReadableTable, ReadableTableMetadata};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Persisted outbox row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub item: WorkItem,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub not_before: Option<DateTime<Utc>>,
}

/// An outbox row leased to one dispatcher until completed or released.
#[derive(Debug, Clone)]
pub struct ClaimedItem {
    pub seq: u64,
    pub entry: OutboxEntry,
}

#[derive(Default)]
struct LeaseState {
    in_flight: HashSet<u64>,
    busy_keys: HashSet<String>,
}

impl LeaseState {
    fn release(&mut self, claimed: &ClaimedItem) {
        self.in_flight.remove(&claimed.seq);
        if let Some(key) = claimed.entry.item.serial_key() {
            self.busy_keys.remove(&key);
        }
    }
}

/// Callback invoked after new items are committed.
pub type OutboxWaker = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Shared {
    leases: Mutex<LeaseState>,
    waker: Mutex<Option<OutboxWaker>>,
}

/// Accessor for the outbox table plus in-process lease tracking.
#[derive(Clone)]
pub struct OutboxDb {
    db: Arc<redb::Database>,
    shared: Arc<Shared>,
}

/// Append `items` to the outbox inside an open write transaction.
///
/// The caller must not hold the outbox table open in the same transaction.
///
/// # Errors
/// Returns an error when encoding or table access fails.
pub(crate) fn append_in_txn(
    txn: &redb::WriteTransaction,
    items: &[WorkItem],
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if items.is_empty() {
        return Ok(());
    }
    let mut table = txn.open_table(OUTBOX)?;
    let mut next = match table.last()? {
        Some((key, _)) => key.value() + 1,
        None => 1,
    };
    for item in items {
        let entry = OutboxEntry {
            item: item.clone(),
            enqueued_at: now,
            attempts: 0,
            not_before: None,
        };
        let encoded = bincode::serialize(&entry)?;
        table.insert(next, encoded.as_slice())?;
        next += 1;
    }
    Ok(())
}

impl OutboxDb {
    /// Initialize the outbox table if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error when redb transaction/table initialization fails.
    pub fn new(db: Arc<redb::Database>) -> Result<Self, AppError> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(OUTBOX)?;
        write_txn.commit()?;
        Ok(Self {
            db,
            shared: Arc::new(Shared::default()),
        })
    }

    fn leases(&self) -> Result<MutexGuard<'_, LeaseState>, AppError> {
        self.shared
            .leases
            .lock()
            .map_err(|_| AppError::StorageMessage("Outbox lease lock poisoned".to_string()))
    }

    /// Register the callback run after outbox items are committed.
    pub fn set_waker(&self, waker: OutboxWaker) {
        match self.shared.waker.lock() {
            Ok(mut slot) => *slot = Some(waker),
            Err(_) => tracing::warn!("Outbox waker lock poisoned; workers fall back to polling"),
        }
    }

    /// Wake registered workers. Called after a commit that appended items.
    pub fn notify(&self) {
        let waker = match self.shared.waker.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        if let Some(waker) = waker {
            waker();
        }
    }

    /// Append items in a transaction of their own and wake workers.
    ///
    /// # Errors
    /// Returns an error when encoding or storage fails.
    pub fn enqueue(&self, items: &[WorkItem]) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        append_in_txn(&write_txn, items, Utc::now())?;
        write_txn.commit()?;
        self.notify();
        Ok(())
    }

    /// Lease the oldest runnable item.
    ///
    /// Items already leased, items whose serialization key is held by another
    /// lease, and items still backing off are skipped. A backing-off item also
    /// holds its serialization key, so later items sharing it wait behind it.
    ///
    /// # Returns
    /// `Ok(None)` when nothing is runnable right now.
    ///
    /// # Errors
    /// Returns an error when storage access or decoding fails.
    pub fn claim(&self) -> Result<Option<ClaimedItem>, AppError> {
        let now = Utc::now();
        let mut leases = self.leases()?;
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OUTBOX)?;
        let mut deferred_keys = HashSet::new();
        for row in table.iter()? {
            let (key, value) = row?;
            let seq = key.value();
            if leases.in_flight.contains(&seq) {
                continue;
            }
            let entry: OutboxEntry = bincode::deserialize(value.value())?;
            let serial_key = entry.item.serial_key();
            if entry.not_before.is_some_and(|at| at > now) {
                if let Some(key) = serial_key {
                    deferred_keys.insert(key);
                }
                continue;
            }
            if let Some(ref key) = serial_key {
                if leases.busy_keys.contains(key) || deferred_keys.contains(key) {
                    continue;
                }
            }
            leases.in_flight.insert(seq);
            if let Some(key) = serial_key {
                leases.busy_keys.insert(key);
            }
            return Ok(Some(ClaimedItem { seq, entry }));
        }
        Ok(None)
    }

    fn remove_row(&self, seq: u64) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(OUTBOX)?;
            table.remove(seq)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn write_row(&self, seq: u64, entry: &OutboxEntry) -> Result<(), AppError> {
        let encoded = bincode::serialize(entry)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(OUTBOX)?;
            table.insert(seq, encoded.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn release_lease(&self, claimed: &ClaimedItem) {
        match self.shared.leases.lock() {
            Ok(mut leases) => leases.release(claimed),
            Err(poisoned) => poisoned.into_inner().release(claimed),
        }
    }

    /// Remove a finished (or abandoned) item and release its lease.
    ///
    /// # Errors
    /// Returns an error when the delete fails; the lease is released anyway.
    pub fn complete(&self, claimed: &ClaimedItem) -> Result<(), AppError> {
        let result = self.remove_row(claimed.seq);
        self.release_lease(claimed);
        result
    }

    /// Record a failed attempt, delay the item by `backoff`, and release its lease.
    ///
    /// # Returns
    /// The attempt count after this failure.
    ///
    /// # Errors
    /// Returns an error when the update fails; the lease is released anyway.
    pub fn retry_later(&self, claimed: &ClaimedItem, backoff: Duration) -> Result<u32, AppError> {
        let mut entry = claimed.entry.clone();
        entry.attempts = entry.attempts.saturating_add(1);
        entry.not_before = Some(Utc::now() + backoff);
        let result = self.write_row(claimed.seq, &entry).map(|()| entry.attempts);
        self.release_lease(claimed);
        result
    }

    /// Number of items not yet completed, leased ones included.
    ///
    /// # Errors
    /// Returns an error when storage access fails.
    pub fn pending_len(&self) -> Result<u64, AppError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OUTBOX)?;
        Ok(table.len()?)
    }

    /// Number of items currently leased by dispatchers.
    pub fn in_flight_len(&self) -> usize {
        match self.shared.leases.lock() {
            Ok(leases) => leases.in_flight.len(),
            Err(poisoned) => poisoned.into_inner().in_flight.len(),
        }
    }

    /// Oldest pending rows, for status reporting.
    ///
    /// # Errors
    /// Returns an error when storage access or decoding fails.
    pub fn peek(&self, limit: usize) -> Result<Vec<(u64, OutboxEntry)>, AppError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OUTBOX)?;
        let mut rows = Vec::new();
        for row in table.iter()? {
            if rows.len() >= limit {
                break;
            }
            let (key, value) = row?;
            rows.push((key.value(), bincode::deserialize(value.value())?));
        }
        Ok(rows)
    }
}

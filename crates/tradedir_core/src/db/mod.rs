//! Database layer and transactional helpers for tradedir.

/// Category catalog storage.
pub mod category;
/// Entity document storage.
pub mod entity;
/// Durable work-item outbox.
pub mod outbox;
/// Table definitions.
pub mod tables;
/// Tag catalog storage.
pub mod tag;
/// Cross-table atomic operations.
pub mod transactions;
/// User document storage.
pub mod user;

pub use transactions::TransactionOps;

use crate::error::AppError;
use std::path::Path;
use std::sync::Arc;
use tables::REDB_FILE_NAME;

/// Database handle with per-collection accessors over one redb file.
pub struct Database {
    pub db: Arc<redb::Database>,
    pub entities: entity::EntityDb,
    pub users: user::UserDb,
    pub tags: tag::TagDb,
    pub categories: category::CategoryDb,
    pub outbox: outbox::OutboxDb,
}

#[cfg(test)]
mod tests;

fn open_redb(path: &str) -> Result<redb::Database, AppError> {
    let dir = Path::new(path);
    std::fs::create_dir_all(dir).map_err(|err| {
        AppError::StorageMessage(format!(
            "Failed to create database directory '{}': {}",
            path, err
        ))
    })?;
    let file = dir.join(REDB_FILE_NAME);
    match redb::Database::create(&file) {
        Ok(db) => Ok(db),
        Err(redb::DatabaseError::DatabaseAlreadyOpen) => Err(AppError::StorageMessage(format!(
            "Database '{}' is already open by another process",
            file.display()
        ))),
        Err(err) => Err(err.into()),
    }
}

impl Database {
    fn from_parts(db: Arc<redb::Database>, outbox: outbox::OutboxDb) -> Result<Self, AppError> {
        Ok(Self {
            entities: entity::EntityDb::new(db.clone(), outbox.clone())?,
            users: user::UserDb::new(db.clone(), outbox.clone())?,
            tags: tag::TagDb::new(db.clone(), outbox.clone())?,
            categories: category::CategoryDb::new(db.clone(), outbox.clone())?,
            outbox,
            db,
        })
    }

    /// Open the record store under `path` and initialize tables.
    ///
    /// `path` is a directory; the redb file inside it is created on first use.
    ///
    /// # Returns
    /// A fully initialized [`Database`].
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created, the file is held by
    /// another process, or table initialization fails.
    pub fn new(path: &str) -> Result<Self, AppError> {
        let db = Arc::new(open_redb(path)?);
        let outbox = outbox::OutboxDb::new(db.clone())?;
        Self::from_parts(db, outbox)
    }

    /// Clone this handle for another subsystem in the same process.
    ///
    /// The clone shares the redb instance and the outbox lease state, so
    /// workers holding different handles never claim the same item.
    ///
    /// # Errors
    /// Returns an error if table initialization fails.
    pub fn share(&self) -> Result<Self, AppError> {
        Self::from_parts(self.db.clone(), self.outbox.clone())
    }
}

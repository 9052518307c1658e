//! User document storage backed by redb.

use super::outbox::{append_in_txn, OutboxDb};
use crate::{
    db::tables::{USERS, USER_EMAILS},
    error::AppError,
    models::user::User,
    text::normalize_email,
    work::WorkItem,
};
use chrono::Utc;
use redb::{ReadableDatabase, ReadableTable};
use std::sync::Arc;

pub(crate) fn deserialize_user(bytes: &[u8]) -> Result<User, AppError> {
    Ok(bincode::deserialize(bytes)?)
}

fn ensure_email_free(
    emails: &redb::Table<&str, &str>,
    email_key: &str,
    owner_id: &str,
) -> Result<(), AppError> {
    if let Some(existing) = emails.get(email_key)? {
        if existing.value() != owner_id {
            return Err(AppError::Conflict(format!(
                "Email '{}' is already registered",
                email_key
            )));
        }
    }
    Ok(())
}

/// Accessor for user rows and the email uniqueness table.
pub struct UserDb {
    db: Arc<redb::Database>,
    outbox: OutboxDb,
}

impl UserDb {
    /// Initialize user tables if they do not exist yet.
    ///
    /// # Errors
    /// Returns an error when redb transaction/table initialization fails.
    pub fn new(db: Arc<redb::Database>, outbox: OutboxDb) -> Result<Self, AppError> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(USERS)?;
        write_txn.open_table(USER_EMAILS)?;
        write_txn.commit()?;
        Ok(Self { db, outbox })
    }

    /// Insert a new user and queue its index sync.
    ///
    /// # Errors
    /// Returns [`AppError::Conflict`] when the email is taken, or storage errors.
    pub fn create(&self, user: &User) -> Result<(), AppError> {
        let encoded = bincode::serialize(user)?;
        let email_key = normalize_email(&user.email);
        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            let mut emails = write_txn.open_table(USER_EMAILS)?;
            if users.get(user.id.as_str())?.is_some() {
                return Err(AppError::StorageMessage(format!(
                    "User id '{}' already exists",
                    user.id
                )));
            }
            ensure_email_free(&emails, &email_key, &user.id)?;
            users.insert(user.id.as_str(), encoded.as_slice())?;
            emails.insert(email_key.as_str(), user.id.as_str())?;
        }
        append_in_txn(
            &write_txn,
            &[WorkItem::SyncUser {
                id: user.id.clone(),
            }],
            Utc::now(),
        )?;
        write_txn.commit()?;
        self.outbox.notify();
        Ok(())
    }

    /// Fetch a user by id, soft-deleted ones included.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn get(&self, id: &str) -> Result<Option<User>, AppError> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        match users.get(id)? {
            Some(value) => Ok(Some(deserialize_user(value.value())?)),
            None => Ok(None),
        }
    }

    /// Fetch a user that is not soft-deleted.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] for missing or soft-deleted rows.
    pub fn get_live(&self, id: &str) -> Result<User, AppError> {
        match self.get(id)? {
            Some(user) if !user.is_deleted() => Ok(user),
            _ => Err(AppError::NotFound),
        }
    }

    /// Look up a user by email, case-insensitively.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn get_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let read_txn = self.db.begin_read()?;
        let emails = read_txn.open_table(USER_EMAILS)?;
        let users = read_txn.open_table(USERS)?;
        let Some(id_guard) = emails.get(normalize_email(email).as_str())? else {
            return Ok(None);
        };
        match users.get(id_guard.value())? {
            Some(value) => Ok(Some(deserialize_user(value.value())?)),
            None => Ok(None),
        }
    }

    /// Read-modify-write one user, keep the email index in step, and queue
    /// its index sync.
    ///
    /// # Returns
    /// `Ok(Some(user))` with the stored result, `Ok(None)` when the id is missing.
    ///
    /// # Errors
    /// Returns the error from `mutate`, [`AppError::Conflict`] when a changed
    /// email is taken, or storage/serialization errors.
    pub fn update_with<F>(&self, id: &str, mutate: F) -> Result<Option<User>, AppError>
    where
        F: FnOnce(&mut User) -> Result<(), AppError>,
    {
        let now = Utc::now();
        let write_txn = self.db.begin_write()?;
        let user = {
            let mut users = write_txn.open_table(USERS)?;
            let mut emails = write_txn.open_table(USER_EMAILS)?;
            let Some(old_guard) = users.get(id)? else {
                return Ok(None);
            };
            let mut user = deserialize_user(old_guard.value())?;
            drop(old_guard);

            let old_email_key = normalize_email(&user.email);
            mutate(&mut user)?;
            user.updated_at = now;

            let new_email_key = normalize_email(&user.email);
            if new_email_key != old_email_key {
                ensure_email_free(&emails, &new_email_key, id)?;
                emails.remove(old_email_key.as_str())?;
                emails.insert(new_email_key.as_str(), id)?;
            }

            let encoded = bincode::serialize(&user)?;
            users.insert(id, encoded.as_slice())?;
            user
        };
        append_in_txn(&write_txn, &[WorkItem::SyncUser { id: id.to_string() }], now)?;
        write_txn.commit()?;
        self.outbox.notify();
        Ok(Some(user))
    }

    /// Visit every stored user in key order.
    ///
    /// # Errors
    /// Returns an error when storage access, deserialization, or the callback fails.
    pub fn scan<F>(&self, mut on_user: F) -> Result<(), AppError>
    where
        F: FnMut(User) -> Result<(), AppError>,
    {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        for item in users.iter()? {
            let (_, value) = item?;
            on_user(deserialize_user(value.value())?)?;
        }
        Ok(())
    }
}

//! Atomic cross-table transaction helpers for entity ownership.

use super::entity::deserialize_entity;
use super::outbox::append_in_txn;
use super::tables::{ENTITIES, USERS};
use super::user::deserialize_user;
use super::Database;
use crate::error::AppError;
use crate::models::entity::Entity;
use crate::work::WorkItem;
use chrono::Utc;
use redb::ReadableTable;

/// Atomic operations that update entity and user rows together.
pub struct TransactionOps;

impl TransactionOps {
    /// Insert an entity and link it to its owning user in one transaction.
    ///
    /// Index syncs for both documents are queued in the same transaction.
    ///
    /// # Arguments
    /// - `db`: Open database handle.
    /// - `entity`: New entity; its first `users` element is the owner.
    ///
    /// # Returns
    /// `Ok(())` when the write commits.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] when the owner is missing or soft-deleted,
    /// [`AppError::BadRequest`] when no owner is set, or storage errors.
    pub fn create_entity_for_owner(db: &Database, entity: &Entity) -> Result<(), AppError> {
        let Some(owner_id) = entity.users.first().cloned() else {
            return Err(AppError::BadRequest(
                "Entity must have an owning user".to_string(),
            ));
        };
        let encoded_entity = bincode::serialize(entity)?;
        let now = Utc::now();

        let write_txn = db.db.begin_write()?;
        {
            let mut entities = write_txn.open_table(ENTITIES)?;
            let mut users = write_txn.open_table(USERS)?;

            let Some(owner_guard) = users.get(owner_id.as_str())? else {
                return Err(AppError::NotFound);
            };
            let mut owner = deserialize_user(owner_guard.value())?;
            drop(owner_guard);
            if owner.is_deleted() {
                return Err(AppError::NotFound);
            }
            if entities.get(entity.id.as_str())?.is_some() {
                return Err(AppError::StorageMessage(format!(
                    "Entity id '{}' already exists",
                    entity.id
                )));
            }

            owner.entities.push(entity.id.clone());
            owner.updated_at = now;
            let encoded_owner = bincode::serialize(&owner)?;
            entities.insert(entity.id.as_str(), encoded_entity.as_slice())?;
            users.insert(owner_id.as_str(), encoded_owner.as_slice())?;
        }
        append_in_txn(
            &write_txn,
            &[
                WorkItem::SyncEntity {
                    id: entity.id.clone(),
                },
                WorkItem::SyncUser { id: owner_id },
            ],
            now,
        )?;
        write_txn.commit()?;
        db.outbox.notify();
        Ok(())
    }

    /// Soft-delete a user and every entity it solely owns.
    ///
    /// Entities with other live owners are left untouched.
    ///
    /// # Returns
    /// Ids of entities soft-deleted along with the user.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] when the user is missing or already deleted,
    /// or storage errors.
    pub fn soft_delete_user_cascade(db: &Database, user_id: &str) -> Result<Vec<String>, AppError> {
        let now = Utc::now();
        let write_txn = db.db.begin_write()?;
        let removed_entities = {
            let mut entities = write_txn.open_table(ENTITIES)?;
            let mut users = write_txn.open_table(USERS)?;

            let Some(user_guard) = users.get(user_id)? else {
                return Err(AppError::NotFound);
            };
            let mut user = deserialize_user(user_guard.value())?;
            drop(user_guard);
            if user.is_deleted() {
                return Err(AppError::NotFound);
            }
            user.deleted_at = Some(now);
            user.updated_at = now;

            let mut removed = Vec::new();
            for entity_id in &user.entities {
                let Some(entity_guard) = entities.get(entity_id.as_str())? else {
                    continue;
                };
                let mut entity = deserialize_entity(entity_guard.value())?;
                drop(entity_guard);
                if entity.is_deleted() {
                    continue;
                }
                let mut co_owned = false;
                for other in entity.users.iter().filter(|owner| *owner != user_id) {
                    if let Some(other_guard) = users.get(other.as_str())? {
                        if !deserialize_user(other_guard.value())?.is_deleted() {
                            co_owned = true;
                            break;
                        }
                    }
                }
                if co_owned {
                    continue;
                }
                entity.deleted_at = Some(now);
                entity.updated_at = now;
                let encoded = bincode::serialize(&entity)?;
                entities.insert(entity_id.as_str(), encoded.as_slice())?;
                removed.push(entity_id.clone());
            }

            let encoded_user = bincode::serialize(&user)?;
            users.insert(user_id, encoded_user.as_slice())?;
            removed
        };

        let mut items = vec![WorkItem::SyncUser {
            id: user_id.to_string(),
        }];
        items.extend(
            removed_entities
                .iter()
                .map(|id| WorkItem::SyncEntity { id: id.clone() }),
        );
        append_in_txn(&write_txn, &items, now)?;
        write_txn.commit()?;
        db.outbox.notify();
        Ok(removed_entities)
    }
}

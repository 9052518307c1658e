//! Entity document storage backed by redb.

use super::category::CategoryNames;
use super::outbox::{append_in_txn, OutboxDb};
use crate::{
    db::tables::ENTITIES, error::AppError, models::entity::Entity, text::category_key,
    work::WorkItem,
};
use chrono::Utc;
use redb::{ReadableDatabase, ReadableTable};
use std::sync::Arc;

pub(crate) fn deserialize_entity(bytes: &[u8]) -> Result<Entity, AppError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Accessor for the entity table.
pub struct EntityDb {
    db: Arc<redb::Database>,
    outbox: OutboxDb,
}

impl EntityDb {
    /// Initialize the entity table if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error when redb transaction/table initialization fails.
    pub fn new(db: Arc<redb::Database>, outbox: OutboxDb) -> Result<Self, AppError> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(ENTITIES)?;
        write_txn.commit()?;
        Ok(Self { db, outbox })
    }

    /// Fetch an entity by id, soft-deleted ones included.
    ///
    /// # Returns
    /// `Ok(Some(entity))` when found, `Ok(None)` when missing.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn get(&self, id: &str) -> Result<Option<Entity>, AppError> {
        let read_txn = self.db.begin_read()?;
        let entities = read_txn.open_table(ENTITIES)?;
        match entities.get(id)? {
            Some(value) => Ok(Some(deserialize_entity(value.value())?)),
            None => Ok(None),
        }
    }

    /// Fetch an entity that is not soft-deleted.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] for missing or soft-deleted rows.
    pub fn get_live(&self, id: &str) -> Result<Entity, AppError> {
        match self.get(id)? {
            Some(entity) if !entity.is_deleted() => Ok(entity),
            _ => Err(AppError::NotFound),
        }
    }

    /// Fetch an entity together with the [`CategoryNames`] view from the same snapshot.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn get_with_category_names(
        &self,
        id: &str,
    ) -> Result<Option<(Entity, CategoryNames)>, AppError> {
        let read_txn = self.db.begin_read()?;
        let entities = read_txn.open_table(ENTITIES)?;
        let Some(value) = entities.get(id)? else {
            return Ok(None);
        };
        let entity = deserialize_entity(value.value())?;
        drop(value);
        drop(entities);
        let names = CategoryNames::read_from(&read_txn)?;
        Ok(Some((entity, names)))
    }

    fn rewrite<F>(&self, id: &str, mutate: F) -> Result<Option<Entity>, AppError>
    where
        F: FnOnce(&redb::WriteTransaction, &mut Entity) -> Result<Vec<WorkItem>, AppError>,
    {
        let now = Utc::now();
        let write_txn = self.db.begin_write()?;
        let (entity, items) = {
            let mut entities = write_txn.open_table(ENTITIES)?;
            let Some(old_guard) = entities.get(id)? else {
                return Ok(None);
            };
            let mut entity = deserialize_entity(old_guard.value())?;
            drop(old_guard);

            let items = mutate(&write_txn, &mut entity)?;
            entity.updated_at = now;
            let encoded = bincode::serialize(&entity)?;
            entities.insert(id, encoded.as_slice())?;
            (entity, items)
        };
        append_in_txn(&write_txn, &items, now)?;
        write_txn.commit()?;
        if !items.is_empty() {
            self.outbox.notify();
        }
        Ok(Some(entity))
    }

    /// Read-modify-write one entity and queue follow-up work atomically.
    ///
    /// `mutate` receives the stored document and returns the work items to
    /// append; returning an error aborts the transaction unchanged.
    /// `updated_at` is refreshed on success.
    ///
    /// # Returns
    /// `Ok(Some(entity))` with the stored result, `Ok(None)` when the id is missing.
    ///
    /// # Errors
    /// Returns the error from `mutate`, or storage/serialization errors.
    pub fn update_with<F>(&self, id: &str, mutate: F) -> Result<Option<Entity>, AppError>
    where
        F: FnOnce(&mut Entity) -> Result<Vec<WorkItem>, AppError>,
    {
        self.rewrite(id, |_, entity| mutate(entity))
    }

    /// Like [`EntityDb::update_with`], with the [`CategoryNames`] view read
    /// inside the same write transaction.
    ///
    /// # Errors
    /// Returns the error from `mutate`, or storage/serialization errors.
    pub fn update_with_category_names<F>(
        &self,
        id: &str,
        mutate: F,
    ) -> Result<Option<Entity>, AppError>
    where
        F: FnOnce(&mut Entity, &CategoryNames) -> Result<Vec<WorkItem>, AppError>,
    {
        self.rewrite(id, |txn, entity| {
            let names = CategoryNames::read_in(txn)?;
            mutate(entity, &names)
        })
    }

    /// Visit every stored entity in key order.
    ///
    /// # Errors
    /// Returns an error when storage access, deserialization, or the callback fails.
    pub fn scan<F>(&self, mut on_entity: F) -> Result<(), AppError>
    where
        F: FnMut(Entity) -> Result<(), AppError>,
    {
        let read_txn = self.db.begin_read()?;
        let entities = read_txn.open_table(ENTITIES)?;
        for item in entities.iter()? {
            let (_, value) = item?;
            on_entity(deserialize_entity(value.value())?)?;
        }
        Ok(())
    }

    /// Ids of every stored entity, soft-deleted ones included.
    ///
    /// # Errors
    /// Returns an error when storage access fails.
    pub fn ids(&self) -> Result<Vec<String>, AppError> {
        let read_txn = self.db.begin_read()?;
        let entities = read_txn.open_table(ENTITIES)?;
        let mut ids = Vec::new();
        for item in entities.iter()? {
            let (key, _) = item?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }

    /// Ids of entities whose categories include `name`, compared case-insensitively.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn ids_with_category(&self, name: &str) -> Result<Vec<String>, AppError> {
        let key = category_key(name);
        let mut ids = Vec::new();
        self.scan(|entity| {
            if entity
                .categories
                .iter()
                .any(|category| category_key(category) == key)
            {
                ids.push(entity.id);
            }
            Ok(())
        })?;
        Ok(ids)
    }
}

//! Search index stored in its own redb file.

use super::{EntityIndexRecord, IndexNamespace, SearchIndex, TagIndexRecord, UserIndexRecord};
use crate::error::AppError;
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;

/// File name for the search index within the configured index directory.
pub const INDEX_FILE_NAME: &str = "index.redb";

const IDX_USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("idx_users");
const IDX_ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("idx_entities");
const IDX_TAGS: TableDefinition<&str, &[u8]> = TableDefinition::new("idx_tags");
/// Tag name to tag id, for prefix lookups.
const IDX_TAG_NAMES: TableDefinition<&str, &str> = TableDefinition::new("idx_tag_names");

fn table_for(namespace: IndexNamespace) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match namespace {
        IndexNamespace::Users => IDX_USERS,
        IndexNamespace::Entities => IDX_ENTITIES,
        IndexNamespace::Tags => IDX_TAGS,
    }
}

/// redb-backed [`SearchIndex`].
pub struct RedbSearchIndex {
    db: Arc<redb::Database>,
}

impl RedbSearchIndex {
    /// Open (or create) the index under directory `path`.
    ///
    /// # Errors
    /// Returns an error when the directory or redb file cannot be opened.
    pub fn open(path: &str) -> Result<Self, AppError> {
        let dir = Path::new(path);
        std::fs::create_dir_all(dir).map_err(|err| {
            AppError::StorageMessage(format!(
                "Failed to create index directory '{}': {}",
                path, err
            ))
        })?;
        let db = redb::Database::create(dir.join(INDEX_FILE_NAME))?;
        let index = Self { db: Arc::new(db) };
        index.init_tables()?;
        Ok(index)
    }

    fn init_tables(&self) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        write_txn.open_table(IDX_USERS)?;
        write_txn.open_table(IDX_ENTITIES)?;
        write_txn.open_table(IDX_TAGS)?;
        write_txn.open_table(IDX_TAG_NAMES)?;
        write_txn.commit()?;
        Ok(())
    }

    fn put<T: Serialize>(
        &self,
        namespace: IndexNamespace,
        id: &str,
        record: &T,
    ) -> Result<(), AppError> {
        let encoded = bincode::serialize(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table_for(namespace))?;
            table.insert(id, encoded.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn fetch<T: DeserializeOwned>(
        &self,
        namespace: IndexNamespace,
        id: &str,
    ) -> Result<Option<T>, AppError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table_for(namespace))?;
        match table.get(id)? {
            Some(value) => Ok(Some(bincode::deserialize(value.value())?)),
            None => Ok(None),
        }
    }
}

impl SearchIndex for RedbSearchIndex {
    fn upsert_user(&self, record: &UserIndexRecord) -> Result<(), AppError> {
        self.put(IndexNamespace::Users, &record.user_id, record)
    }

    fn upsert_entity(&self, record: &EntityIndexRecord) -> Result<(), AppError> {
        self.put(IndexNamespace::Entities, &record.id, record)
    }

    fn upsert_tag(&self, record: &TagIndexRecord) -> Result<(), AppError> {
        let encoded = bincode::serialize(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut tags = write_txn.open_table(IDX_TAGS)?;
            let mut names = write_txn.open_table(IDX_TAG_NAMES)?;
            let previous_name = match tags.get(record.tag_id.as_str())? {
                Some(guard) => {
                    Some(bincode::deserialize::<TagIndexRecord>(guard.value())?.name)
                }
                None => None,
            };
            if let Some(previous_name) = previous_name {
                if previous_name != record.name {
                    names.remove(previous_name.as_str())?;
                }
            }
            tags.insert(record.tag_id.as_str(), encoded.as_slice())?;
            names.insert(record.name.as_str(), record.tag_id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove(&self, namespace: IndexNamespace, id: &str) -> Result<bool, AppError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(table_for(namespace))?;
            let removed_name = match table.remove(id)? {
                Some(guard) if namespace == IndexNamespace::Tags => Some(Some(
                    bincode::deserialize::<TagIndexRecord>(guard.value())?.name,
                )),
                Some(_) => Some(None),
                None => None,
            };
            if let Some(Some(name)) = removed_name.as_ref() {
                let mut names = write_txn.open_table(IDX_TAG_NAMES)?;
                let owned_by_id = match names.get(name.as_str())? {
                    Some(owner) => owner.value() == id,
                    None => false,
                };
                if owned_by_id {
                    names.remove(name.as_str())?;
                }
            }
            removed_name.is_some()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn get_user(&self, id: &str) -> Result<Option<UserIndexRecord>, AppError> {
        self.fetch(IndexNamespace::Users, id)
    }

    fn get_entity(&self, id: &str) -> Result<Option<EntityIndexRecord>, AppError> {
        self.fetch(IndexNamespace::Entities, id)
    }

    fn get_tag(&self, tag_id: &str) -> Result<Option<TagIndexRecord>, AppError> {
        self.fetch(IndexNamespace::Tags, tag_id)
    }

    fn ids(&self, namespace: IndexNamespace) -> Result<Vec<String>, AppError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table_for(namespace))?;
        let mut ids = Vec::new();
        for item in table.iter()? {
            let (key, _) = item?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }

    fn scan_entities(
        &self,
        on_record: &mut dyn FnMut(EntityIndexRecord) -> Result<(), AppError>,
    ) -> Result<(), AppError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(IDX_ENTITIES)?;
        for item in table.iter()? {
            let (_, value) = item?;
            on_record(bincode::deserialize(value.value())?)?;
        }
        Ok(())
    }

    fn tags_with_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<TagIndexRecord>, AppError> {
        let read_txn = self.db.begin_read()?;
        let names = read_txn.open_table(IDX_TAG_NAMES)?;
        let tags = read_txn.open_table(IDX_TAGS)?;
        let mut found = Vec::new();
        for item in names.range(prefix..)? {
            if found.len() >= limit {
                break;
            }
            let (name, tag_id) = item?;
            if !name.value().starts_with(prefix) {
                break;
            }
            if let Some(value) = tags.get(tag_id.value())? {
                found.push(bincode::deserialize(value.value())?);
            }
        }
        Ok(found)
    }
}

//! Category catalog storage backed by redb.

use super::outbox::{append_in_txn, OutboxDb, OutboxEntry};
use crate::{
    db::tables::{CATEGORIES, CATEGORY_NAMES, OUTBOX},
    error::AppError,
    models::category::Category,
    text::{category_display_name, category_key},
    work::WorkItem,
};
use chrono::Utc;
use redb::{ReadableDatabase, ReadableTable};
use std::collections::HashMap;
use std::sync::Arc;

fn deserialize_category(bytes: &[u8]) -> Result<Category, AppError> {
    Ok(bincode::deserialize(bytes)?)
}

fn load_category(
    categories: &redb::Table<&str, &[u8]>,
    id: &str,
) -> Result<Option<Category>, AppError> {
    let Some(guard) = categories.get(id)? else {
        return Ok(None);
    };
    Ok(Some(deserialize_category(guard.value())?))
}

/// Catalog view used to resolve category names carried by entities.
///
/// A catalog name resolves to its display form. A name that is the source of
/// a queued rename resolves through the rename, so documents still waiting on
/// their cascade carry the new name. Anything else is stale.
#[derive(Debug, Clone, Default)]
pub struct CategoryNames {
    display: HashMap<String, String>,
    renamed: HashMap<String, String>,
}

impl CategoryNames {
    fn load<N, C, O>(names: &N, categories: &C, outbox: &O) -> Result<Self, AppError>
    where
        N: ReadableTable<&'static str, &'static str>,
        C: ReadableTable<&'static str, &'static [u8]>,
        O: ReadableTable<u64, &'static [u8]>,
    {
        let mut display = HashMap::new();
        for item in names.iter()? {
            let (key, id) = item?;
            if let Some(value) = categories.get(id.value())? {
                display.insert(
                    key.value().to_string(),
                    deserialize_category(value.value())?.name,
                );
            }
        }
        let mut renamed = HashMap::new();
        for row in outbox.iter()? {
            let (_, value) = row?;
            let entry: OutboxEntry = bincode::deserialize(value.value())?;
            if let WorkItem::RenameCategory { from, to } = entry.item {
                renamed.insert(category_key(&from), to);
            }
        }
        Ok(Self { display, renamed })
    }

    /// Read the view inside an open write transaction.
    ///
    /// Tables are released before returning, so the caller may append to the
    /// outbox afterwards.
    pub(crate) fn read_in(txn: &redb::WriteTransaction) -> Result<Self, AppError> {
        let names = txn.open_table(CATEGORY_NAMES)?;
        let categories = txn.open_table(CATEGORIES)?;
        let outbox = txn.open_table(OUTBOX)?;
        Self::load(&names, &categories, &outbox)
    }

    pub(crate) fn read_from(txn: &redb::ReadTransaction) -> Result<Self, AppError> {
        let names = txn.open_table(CATEGORY_NAMES)?;
        let categories = txn.open_table(CATEGORIES)?;
        let outbox = txn.open_table(OUTBOX)?;
        Self::load(&names, &categories, &outbox)
    }

    /// Catalog display name for `name`, following queued renames.
    pub fn resolve(&self, name: &str) -> Option<String> {
        let mut key = category_key(name);
        for _ in 0..=self.renamed.len() {
            if let Some(display) = self.display.get(&key) {
                return Some(display.clone());
            }
            key = category_key(self.renamed.get(&key)?);
        }
        None
    }

    /// Resolve every name, dropping stale names and duplicates.
    pub fn resolve_all<S: AsRef<str>>(&self, raw: &[S]) -> Vec<String> {
        let mut resolved: Vec<String> = Vec::new();
        for name in raw {
            if let Some(display) = self.resolve(name.as_ref()) {
                if !resolved.contains(&display) {
                    resolved.push(display);
                }
            }
        }
        resolved
    }
}

/// Result of a rename request.
#[derive(Debug, Clone, PartialEq)]
pub enum RenameOutcome {
    /// The stored name changed; a cascade was queued.
    Renamed { category: Category, previous: String },
    /// The new name equals the stored one; nothing was written.
    Unchanged(Category),
}

/// Accessor for the category catalog.
pub struct CategoryDb {
    db: Arc<redb::Database>,
    outbox: OutboxDb,
}

impl CategoryDb {
    /// Initialize category tables if they do not exist yet.
    ///
    /// # Errors
    /// Returns an error when redb transaction/table initialization fails.
    pub fn new(db: Arc<redb::Database>, outbox: OutboxDb) -> Result<Self, AppError> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(CATEGORIES)?;
        write_txn.open_table(CATEGORY_NAMES)?;
        write_txn.commit()?;
        Ok(Self { db, outbox })
    }

    /// Insert a category unless its name is taken case-insensitively.
    ///
    /// The existence check and insert share one write transaction.
    ///
    /// # Errors
    /// Returns [`AppError::BadRequest`] for blank names, [`AppError::Conflict`]
    /// when the name exists, or storage errors.
    pub fn create(&self, name: &str) -> Result<Category, AppError> {
        let display = category_display_name(name)?;
        let key = category_key(&display);
        let category = Category::new(display);
        let encoded = bincode::serialize(&category)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut categories = write_txn.open_table(CATEGORIES)?;
            let mut names = write_txn.open_table(CATEGORY_NAMES)?;
            if names.get(key.as_str())?.is_some() {
                return Err(AppError::Conflict("Category already exists".to_string()));
            }
            categories.insert(category.id.as_str(), encoded.as_slice())?;
            names.insert(key.as_str(), category.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(category)
    }

    /// Fetch a category by id.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn get(&self, id: &str) -> Result<Option<Category>, AppError> {
        let read_txn = self.db.begin_read()?;
        let categories = read_txn.open_table(CATEGORIES)?;
        match categories.get(id)? {
            Some(value) => Ok(Some(deserialize_category(value.value())?)),
            None => Ok(None),
        }
    }

    /// Fetch a category by name, case-insensitively.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn get_by_name(&self, name: &str) -> Result<Option<Category>, AppError> {
        let read_txn = self.db.begin_read()?;
        let names = read_txn.open_table(CATEGORY_NAMES)?;
        let categories = read_txn.open_table(CATEGORIES)?;
        let Some(id_guard) = names.get(category_key(name).as_str())? else {
            return Ok(None);
        };
        match categories.get(id_guard.value())? {
            Some(value) => Ok(Some(deserialize_category(value.value())?)),
            None => Ok(None),
        }
    }

    /// Current [`CategoryNames`] view.
    ///
    /// # Errors
    /// Returns an error when storage access or decoding fails.
    pub fn names(&self) -> Result<CategoryNames, AppError> {
        let read_txn = self.db.begin_read()?;
        CategoryNames::read_from(&read_txn)
    }

    /// Rename a category and queue the entity cascade in the same transaction.
    ///
    /// A case-only change of the same category is allowed. Renaming to the
    /// current name writes nothing.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] for unknown ids, [`AppError::Conflict`]
    /// when another category owns the name, [`AppError::BadRequest`] for blank
    /// names, or storage errors.
    pub fn rename(&self, id: &str, new_name: &str) -> Result<RenameOutcome, AppError> {
        let display = category_display_name(new_name)?;
        let new_key = category_key(&display);
        let now = Utc::now();

        let write_txn = self.db.begin_write()?;
        let (category, previous) = {
            let mut categories = write_txn.open_table(CATEGORIES)?;
            let mut names = write_txn.open_table(CATEGORY_NAMES)?;
            let Some(mut category) = load_category(&categories, id)? else {
                return Err(AppError::NotFound);
            };
            if category.name == display {
                return Ok(RenameOutcome::Unchanged(category));
            }
            if let Some(owner) = names.get(new_key.as_str())? {
                if owner.value() != id {
                    return Err(AppError::Conflict(format!(
                        "Category '{}' already exists",
                        display
                    )));
                }
            }

            let previous = std::mem::replace(&mut category.name, display);
            category.updated_at = now;
            let old_key = category_key(&previous);
            if old_key != new_key {
                names.remove(old_key.as_str())?;
                names.insert(new_key.as_str(), id)?;
            }
            let encoded = bincode::serialize(&category)?;
            categories.insert(id, encoded.as_slice())?;
            (category, previous)
        };
        append_in_txn(
            &write_txn,
            &[WorkItem::RenameCategory {
                from: previous.clone(),
                to: category.name.clone(),
            }],
            now,
        )?;
        write_txn.commit()?;
        self.outbox.notify();
        tracing::info!(
            category_id = id,
            from = %previous,
            to = %category.name,
            "Category renamed; cascade queued"
        );
        Ok(RenameOutcome::Renamed { category, previous })
    }

    /// Hard-delete a category and queue the entity cascade in the same transaction.
    ///
    /// # Returns
    /// The deleted row.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] for unknown ids, or storage errors.
    pub fn delete(&self, id: &str) -> Result<Category, AppError> {
        let write_txn = self.db.begin_write()?;
        let category = {
            let mut categories = write_txn.open_table(CATEGORIES)?;
            let mut names = write_txn.open_table(CATEGORY_NAMES)?;
            let Some(category) = load_category(&categories, id)? else {
                return Err(AppError::NotFound);
            };
            categories.remove(id)?;
            names.remove(category_key(&category.name).as_str())?;
            category
        };
        append_in_txn(
            &write_txn,
            &[WorkItem::DeleteCategory {
                name: category.name.clone(),
            }],
            Utc::now(),
        )?;
        write_txn.commit()?;
        self.outbox.notify();
        tracing::info!(category_id = id, name = %category.name, "Category deleted; cascade queued");
        Ok(category)
    }

    /// All categories ordered case-insensitively by name.
    ///
    /// # Errors
    /// Returns an error when storage access or deserialization fails.
    pub fn list(&self) -> Result<Vec<Category>, AppError> {
        let read_txn = self.db.begin_read()?;
        let names = read_txn.open_table(CATEGORY_NAMES)?;
        let categories = read_txn.open_table(CATEGORIES)?;
        let mut found = Vec::new();
        for item in names.iter()? {
            let (_, id) = item?;
            if let Some(value) = categories.get(id.value())? {
                found.push(deserialize_category(value.value())?);
            }
        }
        Ok(found)
    }
}

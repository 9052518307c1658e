//! Category catalog operations and the entity cascades they trigger.

use crate::{
    config::CategoryDeletePolicy,
    db::{category::RenameOutcome, Database},
    error::AppError,
    models::category::{Category, CategoryListQuery},
    search::Page,
    text::category_key,
    work::WorkItem,
};
use serde::Serialize;

/// Counts from one cascade run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    /// Entities that referenced the category when the cascade started.
    pub matched: usize,
    /// Entities whose document was rewritten or re-synced.
    pub rewritten: usize,
    /// Entities skipped after an error.
    pub failed: usize,
}

/// Create a catalog category.
///
/// # Errors
/// Returns [`AppError::Conflict`] when the name exists case-insensitively,
/// [`AppError::BadRequest`] for blank names, or storage errors.
pub fn create_category(db: &Database, name: &str) -> Result<Category, AppError> {
    let category = db.categories.create(name)?;
    tracing::info!(category_id = %category.id, name = %category.name, "Category created");
    Ok(category)
}

/// Rename a category; the entity rewrite runs later on the dispatcher.
///
/// # Errors
/// Returns [`AppError::NotFound`], [`AppError::Conflict`],
/// [`AppError::BadRequest`], or storage errors.
pub fn rename_category(db: &Database, id: &str, new_name: &str) -> Result<Category, AppError> {
    match db.categories.rename(id, new_name)? {
        RenameOutcome::Renamed { category, .. } => Ok(category),
        RenameOutcome::Unchanged(category) => Ok(category),
    }
}

/// Delete a category; the entity cascade runs later on the dispatcher.
///
/// # Errors
/// Returns [`AppError::NotFound`] for unknown ids, or storage errors.
pub fn delete_category(db: &Database, id: &str) -> Result<Category, AppError> {
    db.categories.delete(id)
}

/// Page through categories, optionally filtered by a case-insensitive name substring.
///
/// # Errors
/// Returns [`AppError::BadRequest`] for a zero page or page size, or storage errors.
pub fn list_categories(
    db: &Database,
    query: &CategoryListQuery,
    default_page_size: usize,
) -> Result<Page<Category>, AppError> {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(default_page_size);
    if page == 0 || page_size == 0 {
        return Err(AppError::BadRequest(
            "page and page_size start at 1".to_string(),
        ));
    }
    let filter = query
        .name
        .as_deref()
        .map(category_key)
        .filter(|key| !key.is_empty());
    let matched: Vec<Category> = db
        .categories
        .list()?
        .into_iter()
        .filter(|category| {
            filter
                .as_deref()
                .map_or(true, |needle| category_key(&category.name).contains(needle))
        })
        .collect();
    Ok(Page::from_sorted(matched, page, page_size))
}

/// Rewrite every entity referencing category `from` to reference `to`.
///
/// Each entity is re-read inside its own write transaction, so concurrent
/// edits are merged rather than overwritten. Entities that no longer carry the
/// old name are left alone. Per-entity failures are logged and skipped.
///
/// # Returns
/// Cascade counts.
///
/// # Errors
/// Returns an error only when the candidate scan fails.
pub fn cascade_rename(db: &Database, from: &str, to: &str) -> Result<CascadeReport, AppError> {
    let from_key = category_key(from);
    let to_key = category_key(to);
    let ids = db.entities.ids_with_category(from)?;
    let mut report = CascadeReport {
        matched: ids.len(),
        ..CascadeReport::default()
    };

    for id in &ids {
        let result = db.entities.update_with(id, |entity| {
            if !entity
                .categories
                .iter()
                .any(|category| category_key(category) == from_key)
            {
                return Ok(Vec::new());
            }
            let mut renamed = Vec::with_capacity(entity.categories.len());
            let mut placed = false;
            for category in entity.categories.drain(..) {
                let key = category_key(&category);
                if key == from_key || key == to_key {
                    if !placed {
                        renamed.push(to.to_string());
                        placed = true;
                    }
                } else {
                    renamed.push(category);
                }
            }
            entity.categories = renamed;
            Ok(vec![WorkItem::SyncEntity { id: entity.id.clone() }])
        });
        match result {
            Ok(Some(_)) => report.rewritten += 1,
            Ok(None) => {}
            Err(err) => {
                report.failed += 1;
                tracing::error!(entity_id = %id, from, to, error = %err, "Category rename cascade failed for entity");
            }
        }
    }

    tracing::info!(
        from,
        to,
        matched = report.matched,
        rewritten = report.rewritten,
        failed = report.failed,
        "Category rename cascade finished"
    );
    Ok(report)
}

/// Apply a delete policy to every entity referencing category `name`.
///
/// With [`CategoryDeletePolicy::Keep`] documents keep the stale name and only
/// their index records are refreshed. With [`CategoryDeletePolicy::Detach`]
/// the name is stripped from each document.
///
/// # Errors
/// Returns an error only when the candidate scan or queueing fails.
pub fn cascade_delete(
    db: &Database,
    name: &str,
    policy: CategoryDeletePolicy,
) -> Result<CascadeReport, AppError> {
    let key = category_key(name);
    let ids = db.entities.ids_with_category(name)?;
    let mut report = CascadeReport {
        matched: ids.len(),
        ..CascadeReport::default()
    };

    match policy {
        CategoryDeletePolicy::Keep => {
            let items: Vec<WorkItem> = ids
                .iter()
                .map(|id| WorkItem::SyncEntity { id: id.clone() })
                .collect();
            db.outbox.enqueue(&items)?;
            report.rewritten = items.len();
        }
        CategoryDeletePolicy::Detach => {
            for id in &ids {
                let result = db.entities.update_with(id, |entity| {
                    let before = entity.categories.len();
                    entity
                        .categories
                        .retain(|category| category_key(category) != key);
                    if entity.categories.len() == before {
                        return Ok(Vec::new());
                    }
                    Ok(vec![WorkItem::SyncEntity { id: entity.id.clone() }])
                });
                match result {
                    Ok(Some(_)) => report.rewritten += 1,
                    Ok(None) => {}
                    Err(err) => {
                        report.failed += 1;
                        tracing::error!(entity_id = %id, category = name, error = %err, "Category delete cascade failed for entity");
                    }
                }
            }
        }
    }

    tracing::info!(
        category = name,
        policy = ?policy,
        matched = report.matched,
        rewritten = report.rewritten,
        failed = report.failed,
        "Category delete cascade finished"
    );
    Ok(report)
}

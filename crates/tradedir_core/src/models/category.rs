//! Category catalog models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog entry for a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    /// Display name; uniqueness is enforced case-insensitively.
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request payload for creating a category.
#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

/// Request payload for renaming a category.
#[derive(Debug, Deserialize)]
pub struct RenameCategoryRequest {
    pub name: String,
}

/// Query parameters for listing categories.
#[derive(Debug, Deserialize, Default)]
pub struct CategoryListQuery {
    pub name: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

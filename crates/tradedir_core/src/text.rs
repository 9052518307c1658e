//! Shared text normalization for tags, categories and profile fields.

use crate::constants::{MAX_CATEGORY_NAME_LEN, MAX_TAGS_PER_FIELD, MAX_TAG_NAME_LEN};
use crate::error::AppError;
use std::collections::HashSet;

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim an optional string and drop empty values.
///
/// # Returns
/// `None` when the input is missing or whitespace-only; otherwise the trimmed
/// string.
pub fn normalize_optional_nonempty(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Canonical form of a tag name: trimmed, inner whitespace collapsed, lowercased.
///
/// # Returns
/// `None` when nothing is left after trimming.
pub fn normalize_tag_name(raw: &str) -> Option<String> {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.to_lowercase())
    }
}

/// Normalize a submitted tag list, dropping blanks and later duplicates.
///
/// Order of first occurrence is preserved.
pub fn normalize_tag_list<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|value| normalize_tag_name(value.as_ref()))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Normalize and bound-check a submitted tag list.
///
/// # Errors
/// Returns [`AppError::BadRequest`] when the list or one of its names is too long.
pub fn validate_tag_list<S: AsRef<str>>(field: &str, raw: &[S]) -> Result<Vec<String>, AppError> {
    let tags = normalize_tag_list(raw);
    if tags.len() > MAX_TAGS_PER_FIELD {
        return Err(AppError::BadRequest(format!(
            "{} accepts at most {} tags",
            field, MAX_TAGS_PER_FIELD
        )));
    }
    if let Some(tag) = tags
        .iter()
        .find(|tag| tag.chars().count() > MAX_TAG_NAME_LEN)
    {
        return Err(AppError::BadRequest(format!(
            "Tag '{}' exceeds {} characters",
            tag, MAX_TAG_NAME_LEN
        )));
    }
    Ok(tags)
}

/// Display form of a category name (trimmed, inner whitespace collapsed, case kept).
///
/// # Errors
/// Returns [`AppError::BadRequest`] for blank or overlong names.
pub fn category_display_name(raw: &str) -> Result<String, AppError> {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() {
        return Err(AppError::BadRequest(
            "Category name must not be empty".to_string(),
        ));
    }
    if collapsed.chars().count() > MAX_CATEGORY_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "Category name exceeds {} characters",
            MAX_CATEGORY_NAME_LEN
        )));
    }
    Ok(collapsed)
}

/// Case-insensitive uniqueness key for a category name.
pub fn category_key(name: &str) -> String {
    collapse_whitespace(name).to_lowercase()
}

/// Canonical form of an email address used for uniqueness checks.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

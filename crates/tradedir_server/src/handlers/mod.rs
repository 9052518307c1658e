//! HTTP request handlers.

/// Admin-only maintenance endpoints.
pub mod admin;
/// Category catalog endpoints.
pub mod category;
/// Entity, favorite, contact, and search endpoints.
pub mod entity;
/// Tag autocomplete endpoint.
pub mod tag;
/// User account endpoints.
pub mod user;

/// Split a comma-separated query value into raw items.
pub(crate) fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

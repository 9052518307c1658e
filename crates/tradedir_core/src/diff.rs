//! Minimal tag changes between an entity's stored and submitted offers/wants.

use crate::models::entity::TagField;
use crate::text::normalize_tag_list;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Added and removed tag names per field.
///
/// Never persisted; recomputed for every profile edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDifference {
    pub offers_added: Vec<String>,
    pub offers_removed: Vec<String>,
    pub wants_added: Vec<String>,
    pub wants_removed: Vec<String>,
}

fn field_difference(old: &[String], new: &[String]) -> (Vec<String>, Vec<String>) {
    let old = normalize_tag_list(old);
    let new = normalize_tag_list(new);
    if new.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let old_set: HashSet<&str> = old.iter().map(String::as_str).collect();
    let new_set: HashSet<&str> = new.iter().map(String::as_str).collect();
    let added = new
        .iter()
        .filter(|name| !old_set.contains(name.as_str()))
        .cloned()
        .collect();
    let removed = old
        .iter()
        .filter(|name| !new_set.contains(name.as_str()))
        .cloned()
        .collect();
    (added, removed)
}

fn apply_field(
    current: &[TagField],
    added: &[String],
    removed: &[String],
    now: DateTime<Utc>,
) -> Vec<TagField> {
    let removed: HashSet<&str> = removed.iter().map(String::as_str).collect();
    let mut next: Vec<TagField> = current
        .iter()
        .filter(|field| !removed.contains(field.name.as_str()))
        .cloned()
        .collect();
    for name in added {
        if next.iter().all(|field| &field.name != name) {
            next.push(TagField {
                name: name.clone(),
                added_at: now,
            });
        }
    }
    next
}

impl TagDifference {
    /// Compute the difference between stored and submitted tag lists.
    ///
    /// Both inputs are normalized before comparison. An empty submitted list
    /// means "not submitted" and leaves that field unchanged; when both are
    /// empty the whole difference is empty.
    ///
    /// # Arguments
    /// - `old_offers`/`old_wants`: Currently stored names.
    /// - `new_offers`/`new_wants`: Submitted names.
    ///
    /// # Returns
    /// Duplicate-free added/removed lists in submission order.
    pub fn compute<S: AsRef<str>>(
        old_offers: &[String],
        new_offers: &[S],
        old_wants: &[String],
        new_wants: &[S],
    ) -> Self {
        let new_offers = normalize_tag_list(new_offers);
        let new_wants = normalize_tag_list(new_wants);
        if new_offers.is_empty() && new_wants.is_empty() {
            return Self::default();
        }
        let (offers_added, offers_removed) = field_difference(old_offers, &new_offers);
        let (wants_added, wants_removed) = field_difference(old_wants, &new_wants);
        Self {
            offers_added,
            offers_removed,
            wants_added,
            wants_removed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.offers_added.is_empty()
            && self.offers_removed.is_empty()
            && self.wants_added.is_empty()
            && self.wants_removed.is_empty()
    }

    pub fn has_additions(&self) -> bool {
        !self.offers_added.is_empty() || !self.wants_added.is_empty()
    }

    /// Rewrite an offers list: removed names dropped, retained names keep their
    /// `added_at`, added names appended at `now`.
    pub fn apply_offers(&self, current: &[TagField], now: DateTime<Utc>) -> Vec<TagField> {
        apply_field(current, &self.offers_added, &self.offers_removed, now)
    }

    /// Wants counterpart of [`TagDifference::apply_offers`].
    pub fn apply_wants(&self, current: &[TagField], now: DateTime<Utc>) -> Vec<TagField> {
        apply_field(current, &self.wants_added, &self.wants_removed, now)
    }
}

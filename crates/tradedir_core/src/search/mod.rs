//! Directory search: criteria validation, query planning, and execution.
//!
//! A plan runs unchanged against either the search index or the record store
//! through [`EntityRecordSource`].

use crate::{
    constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    db::Database,
    error::AppError,
    index::{EntityIndexRecord, SearchIndex},
    models::entity::{TagField, TradingStatus},
    text::{category_key, normalize_tag_list},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Caller-supplied search parameters.
#[derive(Debug, Clone)]
pub struct SearchCriteria {
    /// 1-based page number.
    pub page: usize,
    pub page_size: usize,
    pub category: Option<String>,
    pub offers: Vec<String>,
    pub wants: Vec<String>,
    pub tagged_since: Option<DateTime<Utc>>,
    pub favorites_only: bool,
    /// Statuses the caller may see.
    pub statuses: Vec<TradingStatus>,
    /// Favorites of the querying entity; only read when `favorites_only` is set.
    pub favorite_ids: Vec<String>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            category: None,
            offers: Vec::new(),
            wants: Vec::new(),
            tagged_since: None,
            favorites_only: false,
            statuses: vec![TradingStatus::Accepted],
            favorite_ids: Vec::new(),
            name: None,
            city: None,
            country: None,
        }
    }
}

fn lowercase_nonempty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_lowercase())
        .filter(|value| !value.is_empty())
}

/// Validated, normalized form of [`SearchCriteria`].
#[derive(Debug, Clone)]
pub struct EntityQueryPlan {
    pub page: usize,
    pub page_size: usize,
    category_key: Option<String>,
    offers: Vec<String>,
    wants: Vec<String>,
    tagged_since: Option<DateTime<Utc>>,
    favorites: Option<Vec<String>>,
    statuses: HashSet<TradingStatus>,
    name: Option<String>,
    city: Option<String>,
    country: Option<String>,
}

fn field_matches(filter: &[String], tags: &[TagField], since: Option<DateTime<Utc>>) -> bool {
    if filter.is_empty() {
        return true;
    }
    tags.iter().any(|tag| {
        filter.iter().any(|name| name == &tag.name)
            && since.map_or(true, |cutoff| tag.added_at >= cutoff)
    })
}

fn optional_matches(expected: Option<&str>, actual: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => actual.is_some_and(|actual| actual.trim().to_lowercase() == expected),
    }
}

impl EntityQueryPlan {
    /// Validate and normalize criteria.
    ///
    /// # Errors
    /// Returns [`AppError::BadRequest`] for a zero page, a page size outside
    /// `1..=MAX_PAGE_SIZE`, or an empty status set.
    pub fn from_criteria(criteria: SearchCriteria) -> Result<Self, AppError> {
        if criteria.page == 0 {
            return Err(AppError::BadRequest("page starts at 1".to_string()));
        }
        if criteria.page_size == 0 || criteria.page_size > MAX_PAGE_SIZE {
            return Err(AppError::BadRequest(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if criteria.statuses.is_empty() {
            return Err(AppError::BadRequest(
                "at least one trading status is required".to_string(),
            ));
        }

        let favorites = criteria.favorites_only.then(|| {
            let mut seen = HashSet::new();
            criteria
                .favorite_ids
                .into_iter()
                .filter(|id| seen.insert(id.clone()))
                .collect()
        });

        Ok(Self {
            page: criteria.page,
            page_size: criteria.page_size,
            category_key: criteria
                .category
                .map(|name| category_key(&name))
                .filter(|key| !key.is_empty()),
            offers: normalize_tag_list(&criteria.offers),
            wants: normalize_tag_list(&criteria.wants),
            tagged_since: criteria.tagged_since,
            favorites,
            statuses: criteria.statuses.into_iter().collect(),
            name: lowercase_nonempty(criteria.name),
            city: lowercase_nonempty(criteria.city),
            country: lowercase_nonempty(criteria.country),
        })
    }

    /// Favorite ids the plan is restricted to, when `favorites_only` was set.
    pub fn favorites(&self) -> Option<&[String]> {
        self.favorites.as_deref()
    }

    /// Whether one candidate satisfies every filter of the plan.
    pub fn matches(&self, record: &EntityIndexRecord) -> bool {
        if !self.statuses.contains(&record.status) {
            return false;
        }
        if let Some(ref favorites) = self.favorites {
            if !favorites.iter().any(|id| id == &record.id) {
                return false;
            }
        }
        if let Some(ref key) = self.category_key {
            if !record
                .categories
                .iter()
                .any(|category| &category_key(category) == key)
            {
                return false;
            }
        }
        if !field_matches(&self.offers, &record.offers, self.tagged_since)
            || !field_matches(&self.wants, &record.wants, self.tagged_since)
        {
            return false;
        }
        if let Some(cutoff) = self.tagged_since {
            if self.offers.is_empty() && self.wants.is_empty() {
                let recent = record
                    .offers
                    .iter()
                    .chain(record.wants.iter())
                    .any(|tag| tag.added_at >= cutoff);
                if !recent {
                    return false;
                }
            }
        }
        if let Some(ref name) = self.name {
            if !record.name.to_lowercase().contains(name.as_str()) {
                return false;
            }
        }
        optional_matches(self.city.as_deref(), record.location_city.as_deref())
            && optional_matches(self.country.as_deref(), record.location_country.as_deref())
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub number_of_results: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Cut page `page` (1-based) out of an already ordered result list.
    ///
    /// A page past the end is empty but keeps the totals.
    pub fn from_sorted(all: Vec<T>, page: usize, page_size: usize) -> Self {
        let number_of_results = all.len();
        let page_size = page_size.max(1);
        let total_pages = number_of_results.div_ceil(page_size);
        let offset = page.saturating_sub(1).saturating_mul(page_size);
        let items = all.into_iter().skip(offset).take(page_size).collect();
        Self {
            items,
            page,
            page_size,
            number_of_results,
            total_pages,
        }
    }
}

/// Where a plan reads entity candidates from.
pub trait EntityRecordSource {
    /// Visit every candidate record.
    fn for_each(
        &self,
        on_record: &mut dyn FnMut(EntityIndexRecord) -> Result<(), AppError>,
    ) -> Result<(), AppError>;

    /// Fetch one candidate by id.
    fn fetch(&self, id: &str) -> Result<Option<EntityIndexRecord>, AppError>;
}

/// Candidates served from the search index.
pub struct IndexSource<'a>(pub &'a dyn SearchIndex);

impl EntityRecordSource for IndexSource<'_> {
    fn for_each(
        &self,
        on_record: &mut dyn FnMut(EntityIndexRecord) -> Result<(), AppError>,
    ) -> Result<(), AppError> {
        self.0.scan_entities(on_record)
    }

    fn fetch(&self, id: &str) -> Result<Option<EntityIndexRecord>, AppError> {
        self.0.get_entity(id)
    }
}

/// Candidates projected straight from the record store; soft-deleted rows skipped.
pub struct RecordStoreSource<'a>(pub &'a Database);

impl EntityRecordSource for RecordStoreSource<'_> {
    fn for_each(
        &self,
        on_record: &mut dyn FnMut(EntityIndexRecord) -> Result<(), AppError>,
    ) -> Result<(), AppError> {
        let names = self.0.categories.names()?;
        self.0.entities.scan(|entity| {
            if entity.is_deleted() {
                return Ok(());
            }
            on_record(EntityIndexRecord::project(&entity, &names))
        })
    }

    fn fetch(&self, id: &str) -> Result<Option<EntityIndexRecord>, AppError> {
        Ok(self
            .0
            .entities
            .get_with_category_names(id)?
            .filter(|(entity, _)| !entity.is_deleted())
            .map(|(entity, names)| EntityIndexRecord::project(&entity, &names)))
    }
}

/// Run a plan against a source.
///
/// Results are ordered by case-insensitive name, then id.
///
/// # Errors
/// Returns an error when the source cannot be read.
pub fn execute(
    plan: &EntityQueryPlan,
    source: &dyn EntityRecordSource,
) -> Result<Page<EntityIndexRecord>, AppError> {
    let mut matched = Vec::new();
    match plan.favorites() {
        Some(favorites) => {
            for id in favorites {
                if let Some(record) = source.fetch(id)? {
                    if plan.matches(&record) {
                        matched.push(record);
                    }
                }
            }
        }
        None => source.for_each(&mut |record| {
            if plan.matches(&record) {
                matched.push(record);
            }
            Ok(())
        })?,
    }

    let mut keyed: Vec<(String, EntityIndexRecord)> = matched
        .into_iter()
        .map(|record| (record.name.to_lowercase(), record))
        .collect();
    keyed.sort_by(|(left_name, left), (right_name, right)| {
        left_name
            .cmp(right_name)
            .then_with(|| left.id.cmp(&right.id))
    });
    let ordered = keyed.into_iter().map(|(_, record)| record).collect();
    Ok(Page::from_sorted(ordered, plan.page, plan.page_size))
}

#[cfg(test)]
mod tests;

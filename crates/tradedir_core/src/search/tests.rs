//! Query planning and execution tests.

use super::*;
use chrono::Duration;

struct VecSource(Vec<EntityIndexRecord>);

impl EntityRecordSource for VecSource {
    fn for_each(
        &self,
        on_record: &mut dyn FnMut(EntityIndexRecord) -> Result<(), AppError>,
    ) -> Result<(), AppError> {
        for record in &self.0 {
            on_record(record.clone())?;
        }
        Ok(())
    }

    fn fetch(&self, id: &str) -> Result<Option<EntityIndexRecord>, AppError> {
        Ok(self.0.iter().find(|record| record.id == id).cloned())
    }
}

fn tags(names: &[&str], at: DateTime<Utc>) -> Vec<TagField> {
    names
        .iter()
        .map(|name| TagField {
            name: name.to_string(),
            added_at: at,
        })
        .collect()
}

fn record(id: &str, name: &str, status: TradingStatus) -> EntityIndexRecord {
    EntityIndexRecord {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{}@example.com", id),
        offers: Vec::new(),
        wants: Vec::new(),
        location_city: None,
        location_country: None,
        status,
        categories: Vec::new(),
    }
}

fn ids(page: &Page<EntityIndexRecord>) -> Vec<&str> {
    page.items.iter().map(|record| record.id.as_str()).collect()
}

fn run(source: &VecSource, criteria: SearchCriteria) -> Page<EntityIndexRecord> {
    let plan = EntityQueryPlan::from_criteria(criteria).expect("valid criteria");
    execute(&plan, source).expect("execute")
}

/// E1 Accepted offers apple/bread, E2 Pending offers bread.
fn two_bakeries() -> VecSource {
    let now = Utc::now();
    let mut e1 = record("e1", "Alpha Bakery", TradingStatus::Accepted);
    e1.offers = tags(&["apple", "bread"], now);
    let mut e2 = record("e2", "Beta Bakery", TradingStatus::Pending);
    e2.offers = tags(&["bread"], now);
    VecSource(vec![e2, e1])
}

#[test]
fn status_set_limits_results() {
    let source = two_bakeries();
    let accepted_only = run(
        &source,
        SearchCriteria {
            offers: vec!["bread".to_string()],
            ..SearchCriteria::default()
        },
    );
    assert_eq!(ids(&accepted_only), vec!["e1"]);

    let both = run(
        &source,
        SearchCriteria {
            offers: vec!["bread".to_string()],
            statuses: vec![TradingStatus::Accepted, TradingStatus::Pending],
            ..SearchCriteria::default()
        },
    );
    assert_eq!(ids(&both), vec!["e1", "e2"]);
    assert_eq!(both.number_of_results, 2);
    assert_eq!(both.total_pages, 1);
}

#[test]
fn page_size_one_splits_into_pages() {
    let source = two_bakeries();
    let criteria = |page| SearchCriteria {
        page,
        page_size: 1,
        offers: vec!["BREAD".to_string()],
        statuses: vec![TradingStatus::Accepted, TradingStatus::Pending],
        ..SearchCriteria::default()
    };
    let first = run(&source, criteria(1));
    let second = run(&source, criteria(2));
    let past_end = run(&source, criteria(3));

    assert_eq!(ids(&first), vec!["e1"]);
    assert_eq!(ids(&second), vec!["e2"]);
    assert!(past_end.items.is_empty());
    for page in [&first, &second, &past_end] {
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.number_of_results, 2);
    }
}

#[test]
fn pagination_math_handles_remainders_and_empty_results() {
    let page: Page<u32> = Page::from_sorted((0..7).collect(), 3, 3);
    assert_eq!(page.items, vec![6]);
    assert_eq!(page.total_pages, 3);

    let empty: Page<u32> = Page::from_sorted(Vec::new(), 1, 10);
    assert!(empty.items.is_empty());
    assert_eq!(empty.total_pages, 0);
    assert_eq!(empty.number_of_results, 0);
}

#[test]
fn offers_or_within_field_and_across_fields() {
    let now = Utc::now();
    let mut both = record("both", "Both", TradingStatus::Accepted);
    both.offers = tags(&["apple"], now);
    both.wants = tags(&["flour"], now);
    let mut offers_only = record("offers", "Offers", TradingStatus::Accepted);
    offers_only.offers = tags(&["pear"], now);
    let source = VecSource(vec![both, offers_only]);

    let any_offer = run(
        &source,
        SearchCriteria {
            offers: vec!["apple".to_string(), "pear".to_string()],
            ..SearchCriteria::default()
        },
    );
    assert_eq!(ids(&any_offer), vec!["both", "offers"]);

    let offer_and_want = run(
        &source,
        SearchCriteria {
            offers: vec!["apple".to_string(), "pear".to_string()],
            wants: vec!["flour".to_string()],
            ..SearchCriteria::default()
        },
    );
    assert_eq!(ids(&offer_and_want), vec!["both"]);
}

#[test]
fn tagged_since_applies_per_field_and_without_filters() {
    let now = Utc::now();
    let cutoff = now - Duration::days(1);
    let mut fresh = record("fresh", "Fresh", TradingStatus::Accepted);
    fresh.offers = tags(&["apple"], now);
    fresh.wants = tags(&["flour"], now - Duration::days(5));
    let mut stale = record("stale", "Stale", TradingStatus::Accepted);
    stale.offers = tags(&["apple"], now - Duration::days(3));
    let untagged = record("none", "None", TradingStatus::Accepted);
    let source = VecSource(vec![fresh, stale, untagged]);

    let recent_apple = run(
        &source,
        SearchCriteria {
            offers: vec!["apple".to_string()],
            tagged_since: Some(cutoff),
            ..SearchCriteria::default()
        },
    );
    assert_eq!(ids(&recent_apple), vec!["fresh"]);

    let recent_flour = run(
        &source,
        SearchCriteria {
            wants: vec!["flour".to_string()],
            tagged_since: Some(cutoff),
            ..SearchCriteria::default()
        },
    );
    assert!(recent_flour.items.is_empty());

    let anything_recent = run(
        &source,
        SearchCriteria {
            tagged_since: Some(cutoff),
            ..SearchCriteria::default()
        },
    );
    assert_eq!(ids(&anything_recent), vec!["fresh"]);
}

#[test]
fn favorites_only_restricts_and_empty_set_yields_empty_page() {
    let source = VecSource(vec![
        record("a", "A", TradingStatus::Accepted),
        record("b", "B", TradingStatus::Accepted),
        record("c", "C", TradingStatus::Pending),
    ]);

    let favorites = run(
        &source,
        SearchCriteria {
            favorites_only: true,
            favorite_ids: vec!["c".to_string(), "b".to_string(), "missing".to_string()],
            ..SearchCriteria::default()
        },
    );
    assert_eq!(ids(&favorites), vec!["b"]);

    let none = run(
        &source,
        SearchCriteria {
            favorites_only: true,
            ..SearchCriteria::default()
        },
    );
    assert!(none.items.is_empty());
    assert_eq!(none.total_pages, 0);

    let ignored = run(
        &source,
        SearchCriteria {
            favorite_ids: vec!["a".to_string()],
            ..SearchCriteria::default()
        },
    );
    assert_eq!(ids(&ignored), vec!["a", "b"]);
}

#[test]
fn category_and_location_filters_are_case_insensitive() {
    let mut garden = record("g", "Green Thumb", TradingStatus::Accepted);
    garden.categories = vec!["Home Garden".to_string()];
    garden.location_city = Some("Montréal".to_string());
    garden.location_country = Some("Canada".to_string());
    let mut tools = record("t", "Toolshed", TradingStatus::Accepted);
    tools.categories = vec!["Tools".to_string()];
    tools.location_country = Some("Canada".to_string());
    let source = VecSource(vec![garden, tools]);

    let by_category = run(
        &source,
        SearchCriteria {
            category: Some("  home   GARDEN".to_string()),
            ..SearchCriteria::default()
        },
    );
    assert_eq!(ids(&by_category), vec!["g"]);

    let by_place = run(
        &source,
        SearchCriteria {
            city: Some("montréal".to_string()),
            country: Some("CANADA".to_string()),
            ..SearchCriteria::default()
        },
    );
    assert_eq!(ids(&by_place), vec!["g"]);

    let by_name = run(
        &source,
        SearchCriteria {
            name: Some("SHED".to_string()),
            ..SearchCriteria::default()
        },
    );
    assert_eq!(ids(&by_name), vec!["t"]);
}

#[test]
fn results_order_by_name_then_id() {
    let source = VecSource(vec![
        record("2", "beta", TradingStatus::Accepted),
        record("3", "Alpha", TradingStatus::Accepted),
        record("1", "beta", TradingStatus::Accepted),
    ]);
    let page = run(&source, SearchCriteria::default());
    assert_eq!(ids(&page), vec!["3", "1", "2"]);
}

#[test]
fn invalid_criteria_are_rejected() {
    let cases = [
        SearchCriteria {
            page: 0,
            ..SearchCriteria::default()
        },
        SearchCriteria {
            page_size: 0,
            ..SearchCriteria::default()
        },
        SearchCriteria {
            page_size: MAX_PAGE_SIZE + 1,
            ..SearchCriteria::default()
        },
        SearchCriteria {
            statuses: Vec::new(),
            ..SearchCriteria::default()
        },
    ];
    for criteria in cases {
        let err = EntityQueryPlan::from_criteria(criteria).expect_err("invalid");
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}

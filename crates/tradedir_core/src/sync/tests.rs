//! Index synchronization and restore tests.

use super::*;
use crate::{
    config::CategoryDeletePolicy,
    entity_ops,
    models::entity::{CreateEntityRequest, Entity, TradingStatus},
    search::SearchCriteria,
    test_support::{create_user, Harness},
    work::{Dispatcher, RunOutcome},
};
use chrono::Utc;

fn accepted_entity(harness: &Harness, email: &str, offers: &[&str]) -> Entity {
    let owner = create_user(&harness.db, email);
    let entity = entity_ops::create_entity(
        &harness.db,
        &owner.id,
        CreateEntityRequest {
            name: format!("Shop {}", email),
            email: email.to_string(),
            description: None,
            website: None,
            location_city: None,
            location_region: None,
            location_country: None,
            offers: Some(offers.iter().map(|name| name.to_string()).collect()),
            wants: None,
            categories: None,
        },
    )
    .expect("create entity");
    entity_ops::set_entity_status(&harness.db, &entity.id, TradingStatus::Accepted)
        .expect("accept")
}

fn accepted_plan() -> EntityQueryPlan {
    EntityQueryPlan::from_criteria(SearchCriteria::default()).expect("plan")
}

fn index_ids(harness: &Harness, namespace: IndexNamespace) -> Vec<String> {
    let mut ids = harness.index.ids(namespace).expect("index ids");
    ids.sort();
    ids
}

/// Every index record, keyed by namespace and id.
fn index_contents(
    harness: &Harness,
) -> (
    Vec<UserIndexRecord>,
    Vec<EntityIndexRecord>,
    Vec<TagIndexRecord>,
) {
    let users = index_ids(harness, IndexNamespace::Users)
        .iter()
        .map(|id| harness.index.get_user(id).expect("read").expect("user"))
        .collect();
    let entities = index_ids(harness, IndexNamespace::Entities)
        .iter()
        .map(|id| harness.index.get_entity(id).expect("read").expect("entity"))
        .collect();
    let tags = index_ids(harness, IndexNamespace::Tags)
        .iter()
        .map(|id| harness.index.get_tag(id).expect("read").expect("tag"))
        .collect();
    (users, entities, tags)
}

#[test]
fn drained_outbox_mirrors_users_entities_and_tags() {
    let harness = Harness::new();
    let entity = accepted_entity(&harness, "a@example.com", &["apple", "bread"]);
    harness.drain();

    assert_eq!(harness.db.outbox.pending_len().expect("pending"), 0);
    let record = harness
        .index
        .get_entity(&entity.id)
        .expect("read")
        .expect("indexed");
    assert_eq!(record.status, TradingStatus::Accepted);
    assert_eq!(index_ids(&harness, IndexNamespace::Users).len(), 1);
    let tags: Vec<String> = harness
        .sync
        .suggest_tags("", 10)
        .expect("suggest")
        .into_iter()
        .map(|tag| tag.name)
        .collect();
    assert!(tags.is_empty(), "blank prefix suggests nothing");
    let tags: Vec<String> = harness
        .sync
        .suggest_tags("  A", 10)
        .expect("suggest")
        .into_iter()
        .map(|tag| tag.name)
        .collect();
    assert_eq!(tags, vec!["apple"]);
}

#[test]
fn restore_is_idempotent() {
    let harness = Harness::new();
    accepted_entity(&harness, "a@example.com", &["apple"]);
    accepted_entity(&harness, "b@example.com", &["bread"]);
    harness.drain();

    let first = harness.sync.restore_all().expect("first restore");
    let snapshot = index_contents(&harness);
    let second = harness.sync.restore_all().expect("second restore");

    let order: Vec<IndexNamespace> = first
        .collections
        .iter()
        .map(|report| report.collection)
        .collect();
    assert_eq!(
        order,
        vec![
            IndexNamespace::Users,
            IndexNamespace::Entities,
            IndexNamespace::Tags
        ]
    );
    for (a, b) in first.collections.iter().zip(second.collections.iter()) {
        assert_eq!(a.indexed, b.indexed);
        assert_eq!(b.pruned, 0);
        assert_eq!(b.failed, 0);
    }
    assert_eq!(first.collections[1].indexed, 2);
    assert_eq!(first.collections[2].indexed, 2);
    assert_eq!(snapshot.0.len(), 2);
    assert_eq!(snapshot.1.len(), 2);
    assert_eq!(snapshot.2.len(), 2);
    assert_eq!(snapshot, index_contents(&harness), "records are identical after a rerun");
}

#[test]
fn restore_prunes_soft_deleted_documents_and_rebuilds_missing_ones() {
    let harness = Harness::new();
    let keep = accepted_entity(&harness, "keep@example.com", &["apple"]);
    let gone = accepted_entity(&harness, "gone@example.com", &["bread"]);
    harness.drain();

    // Soft-delete without queueing a sync, and drop a live record from the index.
    harness
        .db
        .entities
        .update_with(&gone.id, |entity| {
            entity.deleted_at = Some(Utc::now());
            Ok(Vec::new())
        })
        .expect("soft delete");
    harness
        .index
        .remove(IndexNamespace::Entities, &keep.id)
        .expect("drop record");

    let report = harness.sync.restore_all().expect("restore");
    let entities = &report.collections[1];
    assert_eq!(entities.indexed, 1);
    assert_eq!(entities.pruned, 1);
    assert_eq!(index_ids(&harness, IndexNamespace::Entities), vec![keep.id]);
}

#[test]
fn dropped_sync_faults_the_index_until_a_clean_restore() {
    let harness = Harness::new();
    let dispatcher = Dispatcher::new(
        harness.db.clone(),
        harness.sync.clone(),
        CategoryDeletePolicy::Keep,
        1,
    );
    harness.index.set_fail_writes(true);
    let entity = accepted_entity(&harness, "a@example.com", &["apple"]);

    let mut dropped = 0;
    loop {
        match dispatcher.run_next().expect("run") {
            RunOutcome::Idle => break,
            RunOutcome::Dropped => dropped += 1,
            _ => {}
        }
    }
    assert!(dropped > 0);
    assert!(harness.sync.is_faulted());
    assert!(harness.index.get_entity(&entity.id).expect("read").is_none());

    let page = harness
        .sync
        .search_entities(&accepted_plan())
        .expect("fallback search");
    assert_eq!(page.items.len(), 1, "record store serves reads while faulted");

    let failed = harness.sync.restore_all().expect("restore with failures");
    assert!(failed.total_failed() > 0);
    assert!(harness.sync.is_faulted());

    harness.index.set_fail_writes(false);
    let clean = harness.sync.restore_all().expect("clean restore");
    assert_eq!(clean.total_failed(), 0);
    assert!(!harness.sync.is_faulted());
    let page = harness
        .sync
        .search_entities(&accepted_plan())
        .expect("index search");
    assert_eq!(page.items[0].id, entity.id);
}

#[test]
fn transient_index_failures_are_retried_not_dropped() {
    let harness = Harness::new();
    harness.index.set_fail_writes(true);
    accepted_entity(&harness, "a@example.com", &[]);

    let processed = harness.drain();
    assert!(processed > 0);
    assert!(!harness.sync.is_faulted());
    let rows = harness.db.outbox.peek(10).expect("peek");
    assert_eq!(rows.len(), 3, "entity, user, and status syncs stay queued");
    assert!(rows.iter().any(|(_, entry)| entry.attempts >= 1));
    assert!(
        rows.iter()
            .filter(|(_, entry)| entry.attempts == 0)
            .all(|(_, entry)| matches!(entry.item, crate::work::WorkItem::SyncEntity { .. })),
        "a repeated entity sync waits behind the backing-off one"
    );
}

#[test]
fn unreadable_index_falls_back_to_record_store() {
    let harness = Harness::new();
    accepted_entity(&harness, "a@example.com", &["apple"]);
    harness.drain();
    harness.index.set_fail_reads(true);

    let page = harness
        .sync
        .search_entities(&accepted_plan())
        .expect("fallback");
    assert_eq!(page.items.len(), 1);
    assert!(harness.sync.is_faulted());

    let tags = harness.sync.suggest_tags("app", 5).expect("fallback suggest");
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "apple");
}

#[test]
fn sync_of_missing_documents_removes_or_skips() {
    let harness = Harness::new();
    assert_eq!(
        harness.sync.sync_entity("missing").expect("sync"),
        SyncAction::Removed
    );
    assert_eq!(
        harness.sync.sync_tag("never-seen").expect("sync"),
        SyncAction::Skipped
    );
}

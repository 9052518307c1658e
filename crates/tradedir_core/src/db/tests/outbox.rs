//! Outbox leasing, retry, and completion tests.

use super::*;

fn sync_entity(id: &str) -> WorkItem {
    WorkItem::SyncEntity { id: id.to_string() }
}

#[test]
fn enqueue_claim_complete_removes_row() {
    let (db, _temp) = setup_temp_db();
    db.outbox.enqueue(&[sync_entity("a")]).expect("enqueue");
    assert_eq!(db.outbox.pending_len().expect("len"), 1);

    let claimed = db.outbox.claim().expect("claim").expect("runnable item");
    assert_eq!(claimed.entry.item, sync_entity("a"));
    assert_eq!(claimed.entry.attempts, 0);
    assert_eq!(db.outbox.in_flight_len(), 1);
    assert!(db.outbox.claim().expect("claim").is_none(), "leased item is skipped");

    db.outbox.complete(&claimed).expect("complete");
    assert_eq!(db.outbox.pending_len().expect("len"), 0);
    assert_eq!(db.outbox.in_flight_len(), 0);
}

#[test]
fn items_sharing_a_serial_key_are_never_leased_together() {
    let (db, _temp) = setup_temp_db();
    db.outbox
        .enqueue(&[sync_entity("same"), sync_entity("same"), sync_entity("other")])
        .expect("enqueue");

    let first = db.outbox.claim().expect("claim").expect("first");
    let second = db.outbox.claim().expect("claim").expect("second");
    assert_eq!(first.entry.item, sync_entity("same"));
    assert_eq!(second.entry.item, sync_entity("other"));
    assert!(db.outbox.claim().expect("claim").is_none());

    db.outbox.complete(&first).expect("complete first");
    let third = db.outbox.claim().expect("claim").expect("third");
    assert_eq!(third.entry.item, sync_entity("same"));
    assert!(third.seq > first.seq);
}

#[test]
fn retry_later_bumps_attempts_and_defers_the_item() {
    let (db, _temp) = setup_temp_db();
    db.outbox.enqueue(&[sync_entity("a")]).expect("enqueue");

    let claimed = db.outbox.claim().expect("claim").expect("item");
    let attempts = db
        .outbox
        .retry_later(&claimed, Duration::hours(1))
        .expect("retry");
    assert_eq!(attempts, 1);
    assert!(db.outbox.claim().expect("claim").is_none(), "item is backing off");
    assert_eq!(db.outbox.pending_len().expect("len"), 1);

    let rows = db.outbox.peek(10).expect("peek");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1.attempts, 1);
    assert!(rows[0].1.not_before.is_some());

    db.outbox
        .retry_later(&claimed, Duration::zero())
        .expect("retry now");
    let again = db.outbox.claim().expect("claim").expect("runnable again");
    assert_eq!(again.seq, claimed.seq);
}

#[test]
fn backing_off_item_holds_its_serial_key() {
    let (db, _temp) = setup_temp_db();
    let first_rename = WorkItem::RenameCategory {
        from: "A".to_string(),
        to: "B".to_string(),
    };
    let second_rename = WorkItem::RenameCategory {
        from: "B".to_string(),
        to: "C".to_string(),
    };
    db.outbox
        .enqueue(&[first_rename.clone(), second_rename, sync_entity("x")])
        .expect("enqueue");

    let claimed = db.outbox.claim().expect("claim").expect("first rename");
    assert_eq!(claimed.entry.item, first_rename);
    db.outbox
        .retry_later(&claimed, Duration::hours(1))
        .expect("retry");

    let next = db.outbox.claim().expect("claim").expect("unrelated item");
    assert_eq!(next.entry.item, sync_entity("x"));
    assert!(
        db.outbox.claim().expect("claim").is_none(),
        "second rename waits for the first"
    );
    db.outbox.complete(&next).expect("complete");

    db.outbox
        .retry_later(&claimed, Duration::zero())
        .expect("retry now");
    let again = db.outbox.claim().expect("claim").expect("first rename again");
    assert_eq!(again.entry.item, first_rename);
}

#[test]
fn shared_handles_share_leases_and_waker() {
    let (db, _temp) = setup_temp_db();
    let other = db.share().expect("share");
    let woken = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = woken.clone();
    db.outbox.set_waker(Arc::new(move || {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }));

    other.outbox.enqueue(&[sync_entity("a")]).expect("enqueue");
    assert_eq!(woken.load(std::sync::atomic::Ordering::SeqCst), 1);

    let claimed = db.outbox.claim().expect("claim").expect("item");
    assert!(other.outbox.claim().expect("claim").is_none());
    other.outbox.complete(&claimed).expect("complete");
    assert_eq!(db.outbox.in_flight_len(), 0);
}

#[test]
fn aborted_mutation_appends_nothing() {
    let (db, _temp) = setup_temp_db();
    let owner = create_user(&db, "owner@example.com");
    let entity = Entity::new("Mill".to_string(), "mill@example.com".to_string(), &owner.id);
    TransactionOps::create_entity_for_owner(&db, &entity).expect("create entity");
    clear_outbox(&db);

    let err = db
        .entities
        .update_with(&entity.id, |_| Err(AppError::BadRequest("nope".to_string())))
        .expect_err("mutation rejected");
    assert!(matches!(err, AppError::BadRequest(_)));
    assert!(pending_items(&db).is_empty());
}

//! User storage tests.

use super::*;

#[test]
fn email_uniqueness_is_case_insensitive() {
    let (db, _temp) = setup_temp_db();
    create_user(&db, "Alice@Example.com");

    let dup = User::new(
        "alice@example.COM".to_string(),
        "Other".to_string(),
        "Alice".to_string(),
    );
    let err = db.users.create(&dup).expect_err("duplicate email");
    assert!(matches!(err, AppError::Conflict(_)));
    assert!(db
        .users
        .get_by_email(" ALICE@example.com ")
        .expect("lookup")
        .is_some());
}

#[test]
fn email_change_moves_the_uniqueness_key() {
    let (db, _temp) = setup_temp_db();
    let alice = create_user(&db, "alice@example.com");
    let bob = create_user(&db, "bob@example.com");

    let err = db
        .users
        .update_with(&alice.id, |user| {
            user.email = "BOB@example.com".to_string();
            Ok(())
        })
        .expect_err("taken");
    assert!(matches!(err, AppError::Conflict(_)));

    db.users
        .update_with(&alice.id, |user| {
            user.email = "alice@new.example.com".to_string();
            Ok(())
        })
        .expect("update")
        .expect("row");
    assert!(db.users.get_by_email("alice@example.com").expect("old").is_none());
    assert_eq!(
        db.users
            .get_by_email("alice@new.example.com")
            .expect("new")
            .expect("row")
            .id,
        alice.id
    );
    assert_eq!(
        db.users.get_by_email("bob@example.com").expect("bob").expect("row").id,
        bob.id
    );
}

#[test]
fn create_and_update_queue_user_syncs() {
    let (db, _temp) = setup_temp_db();
    let alice = create_user(&db, "alice@example.com");
    db.users
        .update_with(&alice.id, |user| {
            user.first_name = "Alicia".to_string();
            Ok(())
        })
        .expect("update");
    let sync = WorkItem::SyncUser { id: alice.id };
    assert_eq!(pending_items(&db), vec![sync.clone(), sync]);
}

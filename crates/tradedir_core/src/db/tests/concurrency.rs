//! Concurrent writer tests.

use super::*;

#[test]
fn concurrent_category_creates_yield_one_winner() {
    let (db, _temp) = setup_temp_db();
    let workers = 4;
    let barrier = Arc::new(Barrier::new(workers));
    let mut handles = Vec::new();
    for i in 0..workers {
        let handle_db = db.share().expect("share");
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            let name = if i % 2 == 0 { "Garden" } else { "GARDEN" };
            handle_db.categories.create(name)
        }));
    }

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("join"))
        .collect();
    let winners = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .all(|err| matches!(err, AppError::Conflict(_))));
    assert_eq!(db.categories.list().expect("list").len(), 1);
}

#[test]
fn concurrent_tag_sightings_converge_on_one_entry() {
    let (db, _temp) = setup_temp_db();
    let base = Utc::now() - Duration::hours(1);
    let workers = 6;
    let barrier = Arc::new(Barrier::new(workers));
    let mut handles = Vec::new();
    for i in 0..workers {
        let handle_db = db.share().expect("share");
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            let at = base + Duration::minutes(i as i64);
            let names = vec!["cider".to_string()];
            if i % 2 == 0 {
                handle_db.tags.record_sightings(&names, &[], at)
            } else {
                handle_db.tags.record_sightings(&[], &names, at)
            }
        }));
    }
    for handle in handles {
        handle.join().expect("join").expect("record");
    }

    let tag = db.tags.get("cider").expect("get").expect("entry");
    assert_eq!(tag.created_at, base);
    assert_eq!(tag.offer_added_at, Some(base + Duration::minutes(4)));
    assert_eq!(tag.want_added_at, Some(base + Duration::minutes(5)));
}

#[test]
fn concurrent_entity_edits_are_merged_not_lost() {
    let (db, _temp) = setup_temp_db();
    let owner = create_user(&db, "owner@example.com");
    let entity = Entity::new("Shop".to_string(), "shop@example.com".to_string(), &owner.id);
    TransactionOps::create_entity_for_owner(&db, &entity).expect("create");

    let workers = 5;
    let barrier = Arc::new(Barrier::new(workers));
    let mut handles = Vec::new();
    for i in 0..workers {
        let handle_db = db.share().expect("share");
        let barrier = barrier.clone();
        let id = entity.id.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            handle_db
                .entities
                .update_with(&id, |entity| {
                    entity.favorite_entities.push(format!("fav-{}", i));
                    Ok(Vec::new())
                })
                .expect("update")
        }));
    }
    for handle in handles {
        handle.join().expect("join");
    }

    let stored = db.entities.get_live(&entity.id).expect("entity");
    assert_eq!(stored.favorite_entities.len(), workers);
}

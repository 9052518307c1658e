//! Database integration tests.

use super::*;
use crate::error::AppError;
use crate::models::{category::*, entity::*, tag::*, user::*};
use crate::test_support::{create_user, setup_temp_db};
use crate::work::WorkItem;
use chrono::{Duration, Utc};
use std::sync::{Arc, Barrier};
use std::thread;

fn pending_items(db: &Database) -> Vec<WorkItem> {
    db.outbox
        .peek(usize::MAX)
        .expect("peek outbox")
        .into_iter()
        .map(|(_, entry)| entry.item)
        .collect()
}

fn clear_outbox(db: &Database) {
    while let Some(claimed) = db.outbox.claim().expect("claim") {
        db.outbox.complete(&claimed).expect("complete");
    }
}

mod concurrency;
mod outbox;
mod users;

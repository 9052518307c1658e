//! Background tasks that drain the outbox.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tradedir_core::work::{Dispatcher, RunOutcome};

/// Handles for running sync workers.
pub struct SyncWorkers {
    handles: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

async fn idle(wake: &Notify, poll: Duration) {
    tokio::select! {
        _ = wake.notified() => {}
        _ = tokio::time::sleep(poll) => {}
    }
}

async fn run_worker(
    worker: usize,
    dispatcher: Arc<Dispatcher>,
    wake: Arc<Notify>,
    stop: Arc<AtomicBool>,
    poll: Duration,
) {
    tracing::debug!(worker, "Sync worker started");
    while !stop.load(Ordering::SeqCst) {
        let task_dispatcher = dispatcher.clone();
        match tokio::task::spawn_blocking(move || task_dispatcher.run_next()).await {
            Ok(Ok(RunOutcome::Idle)) => idle(&wake, poll).await,
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                tracing::error!(worker, error = %err, "Outbox unavailable; backing off");
                tokio::time::sleep(poll).await;
            }
            Err(err) => {
                tracing::error!(worker, error = %err, "Sync task aborted");
                tokio::time::sleep(poll).await;
            }
        }
    }
    tracing::debug!(worker, "Sync worker stopped");
}

/// Start `count` workers sharing one dispatcher.
///
/// Workers sleep until `wake` fires or `poll` elapses, so items that are
/// backing off still get picked up without a new commit.
pub fn spawn_sync_workers(
    dispatcher: Arc<Dispatcher>,
    wake: Arc<Notify>,
    count: usize,
    poll: Duration,
) -> SyncWorkers {
    let stop = Arc::new(AtomicBool::new(false));
    let handles = (0..count.max(1))
        .map(|worker| {
            tokio::spawn(run_worker(
                worker,
                dispatcher.clone(),
                wake.clone(),
                stop.clone(),
                poll,
            ))
        })
        .collect();
    SyncWorkers {
        handles,
        stop,
        wake,
    }
}

impl SyncWorkers {
    /// Stop all workers after their current item and wait for them.
    pub async fn shutdown(self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::warn!("Sync worker did not stop cleanly: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppState, Config, Database};
    use tempfile::TempDir;
    use tradedir_core::{models::user::CreateUserRequest, user_ops};

    #[tokio::test]
    async fn workers_drain_committed_work_and_stop() {
        let temp = TempDir::new().expect("temp dir");
        let config = Config::for_db_path(temp.path().join("data").to_str().expect("db path"));
        let db = Database::new(&config.db_path).expect("db");
        let state = AppState::new(config, db).expect("state");
        let workers = spawn_sync_workers(
            state.dispatcher.clone(),
            state.wake.clone(),
            2,
            Duration::from_millis(20),
        );

        let user = user_ops::create_user(
            &state.db,
            CreateUserRequest {
                email: "worker@example.com".to_string(),
                first_name: "Work".to_string(),
                last_name: "Er".to_string(),
                telephone: None,
            },
        )
        .expect("create user");

        let mut indexed = false;
        for _ in 0..100 {
            indexed = state.index_sync.index().get_user(&user.id).expect("read").is_some()
                && state.db.outbox.pending_len().expect("pending") == 0;
            if indexed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(indexed, "user reached the index and the outbox emptied");

        workers.shutdown().await;
    }
}

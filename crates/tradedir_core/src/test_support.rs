//! Shared test-only helpers for tradedir_core.

use crate::{
    config::CategoryDeletePolicy,
    db::Database,
    error::AppError,
    index::{
        EntityIndexRecord, IndexNamespace, RedbSearchIndex, SearchIndex, TagIndexRecord,
        UserIndexRecord,
    },
    models::user::User,
    sync::IndexSync,
    work::Dispatcher,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Creates an isolated temporary database and returns it with the temp dir.
///
/// Keep the [`TempDir`] alive for the full test to preserve the backing files.
///
/// # Panics
/// Panics if temp-dir creation, path conversion, or database initialization
/// fails in the test environment.
pub(crate) fn setup_temp_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("temp dir");
    let db_path = temp_dir.path().join("data");
    let db = Database::new(db_path.to_str().expect("db path")).expect("db");
    (db, temp_dir)
}

/// [`SearchIndex`] whose writes can be switched to fail on demand.
pub(crate) struct FlakyIndex {
    inner: RedbSearchIndex,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl FlakyIndex {
    pub(crate) fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::StorageMessage("injected index write failure".to_string()));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<(), AppError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::StorageMessage("injected index read failure".to_string()));
        }
        Ok(())
    }
}

impl SearchIndex for FlakyIndex {
    fn upsert_user(&self, record: &UserIndexRecord) -> Result<(), AppError> {
        self.check_write()?;
        self.inner.upsert_user(record)
    }

    fn upsert_entity(&self, record: &EntityIndexRecord) -> Result<(), AppError> {
        self.check_write()?;
        self.inner.upsert_entity(record)
    }

    fn upsert_tag(&self, record: &TagIndexRecord) -> Result<(), AppError> {
        self.check_write()?;
        self.inner.upsert_tag(record)
    }

    fn remove(&self, namespace: IndexNamespace, id: &str) -> Result<bool, AppError> {
        self.check_write()?;
        self.inner.remove(namespace, id)
    }

    fn get_user(&self, id: &str) -> Result<Option<UserIndexRecord>, AppError> {
        self.check_read()?;
        self.inner.get_user(id)
    }

    fn get_entity(&self, id: &str) -> Result<Option<EntityIndexRecord>, AppError> {
        self.check_read()?;
        self.inner.get_entity(id)
    }

    fn get_tag(&self, tag_id: &str) -> Result<Option<TagIndexRecord>, AppError> {
        self.check_read()?;
        self.inner.get_tag(tag_id)
    }

    fn ids(&self, namespace: IndexNamespace) -> Result<Vec<String>, AppError> {
        self.check_read()?;
        self.inner.ids(namespace)
    }

    fn scan_entities(
        &self,
        on_record: &mut dyn FnMut(EntityIndexRecord) -> Result<(), AppError>,
    ) -> Result<(), AppError> {
        self.check_read()?;
        self.inner.scan_entities(on_record)
    }

    fn tags_with_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<TagIndexRecord>, AppError> {
        self.check_read()?;
        self.inner.tags_with_prefix(prefix, limit)
    }
}

/// Database, index, synchronizer, and dispatcher wired together over temp storage.
pub(crate) struct Harness {
    pub db: Arc<Database>,
    pub index: Arc<FlakyIndex>,
    pub sync: Arc<IndexSync>,
    pub dispatcher: Dispatcher,
    _temp: TempDir,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_policy(CategoryDeletePolicy::Keep)
    }

    pub(crate) fn with_policy(policy: CategoryDeletePolicy) -> Self {
        let (db, temp) = setup_temp_db();
        let db = Arc::new(db);
        let index_dir = temp.path().join("index");
        let index = Arc::new(FlakyIndex {
            inner: RedbSearchIndex::open(index_dir.to_str().expect("index path"))
                .expect("index"),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        });
        let sync = Arc::new(IndexSync::new(db.clone(), index.clone()));
        let dispatcher = Dispatcher::new(db.clone(), sync.clone(), policy, 3);
        Self {
            db,
            index,
            sync,
            dispatcher,
            _temp: temp,
        }
    }

    /// Run queued work until nothing is runnable.
    pub(crate) fn drain(&self) -> usize {
        self.dispatcher.drain().expect("drain outbox")
    }
}

/// Insert a live user directly through the storage layer.
pub(crate) fn create_user(db: &Database, email: &str) -> User {
    let user = User::new(email.to_string(), "Test".to_string(), "User".to_string());
    db.users.create(&user).expect("create user");
    user
}

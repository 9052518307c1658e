//! Offline search index rebuild.
//!
//! Opens the record store directly, so the server must be stopped. Use
//! `POST /api/admin/restore` against a running server instead.

use std::sync::Arc;
use tradedir_server::{
    config::Config,
    db::Database,
    index::RedbSearchIndex,
    sync::{IndexSync, RestoreReport},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradedir_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if std::env::args().skip(1).any(|arg| arg == "--help") {
        println!("Usage: tradedir-restore\n");
        println!("Rebuilds the search index at INDEX_PATH from the record store at DB_PATH.");
        println!("Stop the server first; it holds the record store open.");
        return Ok(());
    }

    let config = Config::from_env();
    let db = Arc::new(Database::new(&config.db_path)?);
    let index = Arc::new(RedbSearchIndex::open(&config.index_path)?);
    let index_sync = IndexSync::new(db, index);

    let report = index_sync.restore_all()?;
    for line in summary_lines(&report) {
        println!("{}", line);
    }
    let failed = report.total_failed();
    if failed > 0 {
        tracing::warn!(failed, "Some documents failed to index; rerun the restore to retry them");
    }
    Ok(())
}

/// One line per collection, in restore order.
fn summary_lines(report: &RestoreReport) -> Vec<String> {
    report
        .collections
        .iter()
        .map(|collection| {
            format!(
                "{:<10} indexed={} pruned={} failed={} ({} ms)",
                collection.collection.as_str(),
                collection.indexed,
                collection.pruned,
                collection.failed,
                collection.elapsed_ms
            )
        })
        .collect()
}

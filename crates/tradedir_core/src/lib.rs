//! Core domain library for tradedir (config, storage, tag/category sync, search).

/// Category rename/delete cascades.
pub mod category_ops;
/// Configuration loading and defaults.
pub mod config;
/// Shared constants used across crates.
pub mod constants;
/// Database access layer and transactions.
pub mod db;
/// Tag difference computation for offer/want edits.
pub mod diff;
/// Process-global environment helpers for tests and tooling.
pub mod env;
/// Entity mutations that touch several tables at once.
pub mod entity_ops;
/// Application error types (storage/domain).
pub mod error;
/// Secondary search index storage and projections.
pub mod index;
/// Data models for API requests and persistence.
pub mod models;
/// Entity search criteria and query planning.
pub mod search;
/// Record store to search index synchronization.
pub mod sync;
/// Tag and category name normalization.
pub mod text;
/// User account mutations.
pub mod user_ops;
/// Outbox work items and the dispatcher that runs them.
pub mod work;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{CategoryDeletePolicy, Config};
pub use constants::*;
pub use db::Database;
pub use error::AppError;

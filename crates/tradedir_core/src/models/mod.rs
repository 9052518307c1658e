//! Data models for persistence and API payloads.

/// Category catalog models.
pub mod category;
/// Trading entity models.
pub mod entity;
/// Tag catalog models.
pub mod tag;
/// User account models.
pub mod user;

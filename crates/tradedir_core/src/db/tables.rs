//! redb table definitions shared by storage modules.

use redb::TableDefinition;

/// File name for the record store within the configured DB directory.
pub const REDB_FILE_NAME: &str = "data.redb";

/// Canonical entity rows (`Entity`, bincode-encoded).
pub const ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entities");
/// Canonical user rows (`User`, bincode-encoded).
pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
/// Normalized email to user id.
pub const USER_EMAILS: TableDefinition<&str, &str> = TableDefinition::new("user_emails");
/// Tag catalog keyed by normalized name (`Tag`, bincode-encoded).
pub const TAGS: TableDefinition<&str, &[u8]> = TableDefinition::new("tags");
/// Category catalog keyed by id (`Category`, bincode-encoded).
pub const CATEGORIES: TableDefinition<&str, &[u8]> = TableDefinition::new("categories");
/// Case-insensitive category key to category id.
pub const CATEGORY_NAMES: TableDefinition<&str, &str> = TableDefinition::new("category_names");
/// Pending work items by sequence number (`OutboxEntry`, bincode-encoded).
pub const OUTBOX: TableDefinition<u64, &[u8]> = TableDefinition::new("outbox");

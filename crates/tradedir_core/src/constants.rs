//! Shared constants used across tradedir crates.

/// Default API port for the directory server.
pub const DEFAULT_PORT: u16 = 38480;

/// Default maximum request body accepted by the API layer.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Default page size for entity and category searches.
pub const DEFAULT_PAGE_SIZE: usize = 20;
/// Upper bound for a single search page.
pub const MAX_PAGE_SIZE: usize = 100;

/// Default number of background sync workers.
pub const DEFAULT_SYNC_WORKERS: usize = 2;
/// Default attempts for a transiently failing outbox item.
pub const DEFAULT_SYNC_MAX_ATTEMPTS: u32 = 3;
/// Default idle poll interval for sync workers in milliseconds.
pub const DEFAULT_SYNC_POLL_MS: u64 = 500;

/// Default result cap for tag autocomplete.
pub const DEFAULT_TAG_SUGGESTION_LIMIT: usize = 10;

/// Maximum tags accepted per offers/wants list.
pub const MAX_TAGS_PER_FIELD: usize = 50;
/// Maximum length of a single normalized tag name.
pub const MAX_TAG_NAME_LEN: usize = 64;
/// Maximum length of a category display name.
pub const MAX_CATEGORY_NAME_LEN: usize = 80;

/// Default base URL for CLI/API clients.
pub const DEFAULT_CLI_SERVER_URL: &str = "http://localhost:38480";

/// Request header carrying the authenticated user id from the gateway.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Request header carrying the admin token.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

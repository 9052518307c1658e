//! Configuration loading from environment variables.

use crate::constants::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_PAGE_SIZE, DEFAULT_PORT, DEFAULT_SYNC_MAX_ATTEMPTS,
    DEFAULT_SYNC_POLL_MS, DEFAULT_SYNC_WORKERS, MAX_PAGE_SIZE,
};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// What happens to entity documents when a category they reference is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryDeletePolicy {
    /// Leave the stale name on entity documents; it is dropped on the next edit.
    #[default]
    Keep,
    /// Strip the deleted name from every referencing entity document.
    Detach,
}

impl FromStr for CategoryDeletePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "detach" => Ok(Self::Detach),
            other => Err(format!("unknown category delete policy '{}'", other)),
        }
    }
}

/// Runtime configuration for tradedir.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory holding the record store (`data.redb`).
    pub db_path: String,
    /// Directory holding the search index (`index.redb`).
    pub index_path: String,
    pub port: u16,
    pub page_size: usize,
    pub max_body_size: usize,
    pub sync_workers: usize,
    pub sync_max_attempts: u32,
    pub sync_poll_ms: u64,
    pub category_delete_policy: CategoryDeletePolicy,
    pub admin_token: Option<String>,
}

/// Expand tilde (~) in paths to the user's home directory
fn expand_tilde(path: String) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = resolve_home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path
}

fn resolve_home_dir() -> Option<PathBuf> {
    if let Ok(home) = env::var("HOME") {
        if !home.trim().is_empty() {
            return Some(PathBuf::from(home));
        }
    }

    // Windows
    if let Ok(profile) = env::var("USERPROFILE") {
        if !profile.trim().is_empty() {
            return Some(PathBuf::from(profile));
        }
    }

    std::env::current_dir().ok()
}

fn default_db_path() -> String {
    let home = resolve_home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".cache")
        .join("tradedir")
        .join("db")
        .to_string_lossy()
        .to_string()
}

fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|raw| raw.trim().parse().ok())
}

/// Parse a boolean-like environment flag value.
///
/// # Supported Values
/// - Truthy: `1`, `true`, `yes`, `on`
/// - Falsy: `0`, `false`, `no`, `off`, empty string
///
/// Matching is case-insensitive and ignores surrounding whitespace.
///
/// # Returns
/// `Some(bool)` when the value is recognized, otherwise `None`.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a boolean flag from the environment.
///
/// Missing or unrecognized values are treated as `false`.
///
/// # Arguments
/// - `name`: Environment variable name.
///
/// # Returns
/// `true` when the value is a recognized truthy value.
pub fn env_flag_enabled(name: &str) -> bool {
    env::var(name)
        .ok()
        .and_then(|value| parse_env_flag(&value))
        .unwrap_or(false)
}

impl Config {
    /// Build a configuration with defaults for everything except storage paths.
    ///
    /// The search index lives next to the record store.
    ///
    /// # Arguments
    /// - `db_path`: Record store directory.
    ///
    /// # Returns
    /// A [`Config`] with default tuning values.
    pub fn for_db_path(db_path: &str) -> Self {
        Self {
            db_path: db_path.to_string(),
            index_path: db_path.to_string(),
            port: DEFAULT_PORT,
            page_size: DEFAULT_PAGE_SIZE,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            sync_workers: DEFAULT_SYNC_WORKERS,
            sync_max_attempts: DEFAULT_SYNC_MAX_ATTEMPTS,
            sync_poll_ms: DEFAULT_SYNC_POLL_MS,
            category_delete_policy: CategoryDeletePolicy::Keep,
            admin_token: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Returns
    /// A populated [`Config`] with defaults applied when env vars are missing.
    pub fn from_env() -> Self {
        let db_path = env::var("DB_PATH")
            .map(expand_tilde)
            .unwrap_or_else(|_| default_db_path());
        let index_path = env::var("INDEX_PATH")
            .map(expand_tilde)
            .unwrap_or_else(|_| db_path.clone());

        let category_delete_policy = match env::var("CATEGORY_DELETE_POLICY") {
            Ok(raw) => raw.parse().unwrap_or_else(|err: String| {
                tracing::warn!("{}; falling back to 'keep'", err);
                CategoryDeletePolicy::Keep
            }),
            Err(_) => CategoryDeletePolicy::Keep,
        };

        let admin_token = env::var("ADMIN_TOKEN")
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        Self {
            db_path,
            index_path,
            port: env_parsed("PORT").unwrap_or(DEFAULT_PORT),
            page_size: env_parsed::<usize>("PAGE_SIZE")
                .filter(|size| (1..=MAX_PAGE_SIZE).contains(size))
                .unwrap_or(DEFAULT_PAGE_SIZE),
            max_body_size: env_parsed("MAX_BODY_SIZE").unwrap_or(DEFAULT_MAX_BODY_SIZE),
            sync_workers: env_parsed::<usize>("SYNC_WORKERS")
                .filter(|workers| *workers > 0)
                .unwrap_or(DEFAULT_SYNC_WORKERS),
            sync_max_attempts: env_parsed::<u32>("SYNC_MAX_ATTEMPTS")
                .filter(|attempts| *attempts > 0)
                .unwrap_or(DEFAULT_SYNC_MAX_ATTEMPTS),
            sync_poll_ms: env_parsed("SYNC_POLL_MS").unwrap_or(DEFAULT_SYNC_POLL_MS),
            category_delete_policy,
            admin_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_env_flag, CategoryDeletePolicy, Config};
    use crate::env::{env_lock, EnvGuard};

    #[test]
    fn parse_env_flag_accepts_truthy_values() {
        for value in ["1", "true", "TRUE", " yes ", "on"] {
            assert_eq!(parse_env_flag(value), Some(true), "value: {}", value);
        }
    }

    #[test]
    fn parse_env_flag_accepts_falsy_values() {
        for value in ["", "0", "false", "FALSE", " no ", "off"] {
            assert_eq!(parse_env_flag(value), Some(false), "value: {}", value);
        }
    }

    #[test]
    fn parse_env_flag_rejects_unknown_values() {
        assert_eq!(parse_env_flag("maybe"), None);
        assert_eq!(parse_env_flag("enabled"), None);
    }

    #[test]
    fn category_delete_policy_parses_known_values() {
        assert_eq!(
            "keep".parse::<CategoryDeletePolicy>(),
            Ok(CategoryDeletePolicy::Keep)
        );
        assert_eq!(
            " Detach ".parse::<CategoryDeletePolicy>(),
            Ok(CategoryDeletePolicy::Detach)
        );
        assert!("purge".parse::<CategoryDeletePolicy>().is_err());
    }

    #[test]
    fn from_env_applies_overrides_and_rejects_out_of_range_values() {
        let _lock = env_lock().lock().expect("env lock");
        let _db = EnvGuard::set("DB_PATH", "/tmp/tradedir-config-test");
        let _index = EnvGuard::remove("INDEX_PATH");
        let _page = EnvGuard::set("PAGE_SIZE", "0");
        let _workers = EnvGuard::set("SYNC_WORKERS", "4");
        let _policy = EnvGuard::set("CATEGORY_DELETE_POLICY", "detach");
        let _token = EnvGuard::set("ADMIN_TOKEN", "   ");

        let config = Config::from_env();
        assert_eq!(config.db_path, "/tmp/tradedir-config-test");
        assert_eq!(config.index_path, config.db_path);
        assert_eq!(config.page_size, crate::DEFAULT_PAGE_SIZE);
        assert_eq!(config.sync_workers, 4);
        assert_eq!(config.category_delete_policy, CategoryDeletePolicy::Detach);
        assert_eq!(config.admin_token, None);
    }
}

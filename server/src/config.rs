//! Runtime configuration, grounded in the teacher's `db::DbConfig`
//! pattern of env-var-with-default construction.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,

    /// Default `expires_at` horizon for new items.
    pub default_item_ttl_days: i64,
    /// Upper clamp on a caller-supplied TTL.
    pub max_item_ttl_days: i64,
    /// When reclamation considers a non-terminal claim stale.
    pub claim_staleness_hours: i64,
    /// Reclamation loop cadence.
    pub reclamation_interval: Duration,
    /// Position-assignment retries on index conflict.
    pub enqueue_retry_attempts: u32,
    /// Page size clamp for Search/FindNearby/ListByOwner.
    pub search_page_limit_max: i64,
    /// Archival age for terminal items (orthogonal to the claim queue).
    pub archive_age_days: i64,
}

fn env_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/giveaway".to_string()),
            max_connections: env_var("DB_MAX_CONNECTIONS", 10),
            min_connections: env_var("DB_MIN_CONNECTIONS", 2),
            acquire_timeout: Duration::from_secs(env_var("DB_ACQUIRE_TIMEOUT_SECS", 30)),
            idle_timeout: Duration::from_secs(env_var("DB_IDLE_TIMEOUT_SECS", 600)),

            default_item_ttl_days: env_var("DEFAULT_ITEM_TTL_DAYS", 14),
            max_item_ttl_days: env_var("MAX_ITEM_TTL_DAYS", 90),
            claim_staleness_hours: env_var("CLAIM_STALENESS_HOURS", 48),
            reclamation_interval: Duration::from_secs(
                env_var("RECLAMATION_INTERVAL_SECS", 24 * 3600),
            ),
            enqueue_retry_attempts: env_var("ENQUEUE_RETRY_ATTEMPTS", 3),
            search_page_limit_max: env_var("SEARCH_PAGE_LIMIT_MAX", 100),
            archive_age_days: env_var("ARCHIVE_AGE_DAYS", 90),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Clamp a caller-supplied TTL request to `(0, max_item_ttl_days]`,
    /// falling back to `default_item_ttl_days` when absent.
    pub fn resolve_ttl_days(&self, requested: Option<i64>) -> i64 {
        match requested {
            Some(days) if days > 0 => days.min(self.max_item_ttl_days),
            _ => self.default_item_ttl_days,
        }
    }
}

use std::env;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::types::PromotionFlags;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub ring_url: Option<String>,
    pub ring_project: String,
    pub ring_token: Option<String>,
    pub force_beta: bool,
    pub force_prod: bool,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub log_ttl_days: i64,
    pub db_acquire_timeout_secs: u64,
}

fn flag_enabled(value: Option<String>) -> bool {
    value.is_some_and(|v| v == "true")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn load() -> Self {
        Self {
            database_url: non_empty(env::var("MODULE_REGISTRY_DATABASE_URL").ok()),
            ring_url: non_empty(env::var("MODULE_REGISTRY_RING_URL").ok()),
            ring_project: env::var("MODULE_REGISTRY_RING_PROJECT")
                .unwrap_or_else(|_| "modules".into()),
            ring_token: non_empty(env::var("MODULE_REGISTRY_RING_TOKEN").ok()),
            force_beta: flag_enabled(env::var("FORCE_BETA").ok()),
            force_prod: flag_enabled(env::var("FORCE_PROD").ok()),
            max_attempts: env::var("MODULE_REGISTRY_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(8),
            retry_delay_ms: env::var("MODULE_REGISTRY_RETRY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            log_ttl_days: env::var("MODULE_REGISTRY_LOG_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(10),
            db_acquire_timeout_secs: env::var("MODULE_REGISTRY_DB_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(10),
        }
    }

    pub fn promotion_flags(&self) -> PromotionFlags {
        PromotionFlags {
            force_beta: self.force_beta,
            force_prod: self.force_prod,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.retry_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn log_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.log_ttl_days)
    }

    /// How long each record-store call waits for a database connection.
    pub fn db_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.db_acquire_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_requires_literal_true() {
        assert!(flag_enabled(Some("true".into())));
        assert!(!flag_enabled(Some("TRUE".into())));
        assert!(!flag_enabled(Some("1".into())));
        assert!(!flag_enabled(None));
    }

    #[test]
    fn blank_targets_are_unset() {
        assert_eq!(non_empty(Some("  ".into())), None);
        assert_eq!(non_empty(Some("postgres://x".into())).as_deref(), Some("postgres://x"));
    }

    #[test]
    fn default_log_ttl() {
        // Only reliable when MODULE_REGISTRY_LOG_TTL_DAYS is unset (typical in test/CI)
        let config = Config::load();
        if env::var("MODULE_REGISTRY_LOG_TTL_DAYS").is_err() {
            assert_eq!(config.log_ttl(), chrono::Duration::days(10));
        }
    }

    #[test]
    fn default_db_acquire_timeout() {
        let config = Config::load();
        if env::var("MODULE_REGISTRY_DB_TIMEOUT_SECS").is_err() {
            assert_eq!(config.db_acquire_timeout(), Duration::from_secs(10));
        }
    }

    #[test]
    fn default_ring_project() {
        let config = Config::load();
        if env::var("MODULE_REGISTRY_RING_PROJECT").is_err() {
            assert_eq!(config.ring_project, "modules");
        }
    }

    #[test]
    fn promotion_flags_mirror_config() {
        let mut config = Config::load();
        config.force_beta = true;
        config.force_prod = false;
        let flags = config.promotion_flags();
        assert!(flags.force_beta);
        assert!(!flags.force_prod);
    }

    #[test]
    fn retry_policy_uses_configured_cap() {
        let mut config = Config::load();
        config.max_attempts = 3;
        config.retry_delay_ms = 10;
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(10));
    }
}

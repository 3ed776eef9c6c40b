//! Configuration management for Castwork
//!
//! Every section is optional; a missing section takes the defaults below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Largest candidate batch one run may select
///
/// Candidate ids are bound one per `IN (...)` placeholder, and SQLite caps
/// the number of bound variables per statement.
pub const MAX_BATCH_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub publish: PublishConfig,
    pub analytics: AnalyticsConfig,
    pub lock: LockConfig,
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/castwork/castwork.db".to_string(),
        }
    }
}

/// What happens to a content item when every one of its targets failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllFailedPolicy {
    /// Item stays `failed` until someone re-submits it
    #[default]
    Terminal,
    /// Item returns to `scheduled` while its retry budget lasts
    Requeue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub batch_limit: usize,
    pub concurrency: usize,
    #[serde(with = "humantime_serde_str")]
    pub adapter_timeout: Duration,
    pub on_all_failed: AllFailedPolicy,
    pub retry: RetryConfig,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            batch_limit: 50,
            concurrency: 1,
            adapter_timeout: Duration::from_secs(30),
            on_all_failed: AllFailedPolicy::Terminal,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Dispatch attempts allowed per target; 0 disables retry
    pub max_attempts: u32,
    #[serde(with = "humantime_serde_str")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            delay: Duration::from_secs(15 * 60),
        }
    }
}

impl RetryConfig {
    pub fn enabled(&self) -> bool {
        self.max_attempts > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub lookback_days: u32,
    pub batch_limit: usize,
    #[serde(with = "humantime_serde_str")]
    pub freshness: Duration,
    pub concurrency: usize,
    #[serde(with = "humantime_serde_str")]
    pub adapter_timeout: Duration,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            batch_limit: 100,
            freshness: Duration::from_secs(3600),
            concurrency: 1,
            adapter_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    #[serde(with = "humantime_serde_str")]
    pub ttl: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformsConfig {
    pub enabled: Vec<String>,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            enabled: ["facebook", "instagram", "twitter", "linkedin", "tiktok", "youtube"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// `CASTWORK_DB_PATH` overrides `database.path` after the file is read.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = Self::load_from_path(&config_path)?;
        if let Ok(db_path) = std::env::var("CASTWORK_DB_PATH") {
            config.database.path = db_path;
        }
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the dispatch engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let too_large = format!("must be at most {}", MAX_BATCH_LIMIT);
        let checks: [(&str, bool, &str); 7] = [
            ("publish.batch_limit", self.publish.batch_limit == 0, "must be at least 1"),
            ("publish.batch_limit", self.publish.batch_limit > MAX_BATCH_LIMIT, too_large.as_str()),
            ("publish.concurrency", self.publish.concurrency == 0, "must be at least 1"),
            ("analytics.batch_limit", self.analytics.batch_limit == 0, "must be at least 1"),
            ("analytics.batch_limit", self.analytics.batch_limit > MAX_BATCH_LIMIT, too_large.as_str()),
            ("analytics.concurrency", self.analytics.concurrency == 0, "must be at least 1"),
            (
                "publish.on_all_failed",
                self.publish.on_all_failed == AllFailedPolicy::Requeue
                    && !self.publish.retry.enabled(),
                "\"requeue\" needs publish.retry.max_attempts > 0",
            ),
        ];

        for (field, invalid, reason) in checks {
            if invalid {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: reason.to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Expand `~` in the database path
    pub fn database_path(&self) -> String {
        shellexpand::tilde(&self.database.path).to_string()
    }
}

/// Resolve the configuration file path: `CASTWORK_CONFIG`, else the XDG config dir
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CASTWORK_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("castwork").join("config.toml"))
}

/// Durations written as humantime strings ("30s", "15m", "1h")
mod humantime_serde_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.publish.batch_limit, 50);
        assert_eq!(config.publish.concurrency, 1);
        assert_eq!(config.publish.adapter_timeout, Duration::from_secs(30));
        assert_eq!(config.publish.on_all_failed, AllFailedPolicy::Terminal);
        assert!(!config.publish.retry.enabled());
        assert_eq!(config.analytics.lookback_days, 7);
        assert_eq!(config.analytics.freshness, Duration::from_secs(3600));
        assert_eq!(config.lock.ttl, Duration::from_secs(900));
        assert!(config.platforms.enabled.contains(&"instagram".to_string()));
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml(
            r#"
[database]
path = "/tmp/castwork.db"

[publish]
batch_limit = 10
concurrency = 4
adapter_timeout = "5s"
on_all_failed = "requeue"

[publish.retry]
max_attempts = 3
delay = "2m"

[analytics]
lookback_days = 14
freshness = "30m"

[platforms]
enabled = ["facebook"]
"#,
        )
        .unwrap();

        assert_eq!(config.database.path, "/tmp/castwork.db");
        assert_eq!(config.publish.batch_limit, 10);
        assert_eq!(config.publish.concurrency, 4);
        assert_eq!(config.publish.adapter_timeout, Duration::from_secs(5));
        assert_eq!(config.publish.on_all_failed, AllFailedPolicy::Requeue);
        assert_eq!(config.publish.retry.max_attempts, 3);
        assert_eq!(config.publish.retry.delay, Duration::from_secs(120));
        assert_eq!(config.analytics.lookback_days, 14);
        assert_eq!(config.analytics.freshness, Duration::from_secs(1800));
        assert_eq!(config.analytics.batch_limit, 100);
        assert_eq!(config.platforms.enabled, vec!["facebook".to_string()]);
    }

    #[test]
    fn test_invalid_duration_is_parse_error() {
        let result = Config::from_toml("[publish]\nadapter_timeout = \"soon\"\n");
        assert!(matches!(
            result,
            Err(crate::CastworkError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = Config::from_toml("[publish]\nconcurrency = 0\n");
        let message = result.unwrap_err().to_string();
        assert!(message.contains("publish.concurrency"));
    }

    #[test]
    fn test_oversized_batch_limit_rejected() {
        let result = Config::from_toml("[analytics]\nbatch_limit = 1000000\n");
        let message = result.unwrap_err().to_string();
        assert!(message.contains("analytics.batch_limit"));
        assert!(message.contains("at most 10000"));
    }

    #[test]
    fn test_requeue_without_retry_budget_rejected() {
        let result = Config::from_toml("[publish]\non_all_failed = \"requeue\"\n");
        let message = result.unwrap_err().to_string();
        assert!(message.contains("publish.on_all_failed"));
    }
}

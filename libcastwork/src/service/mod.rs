//! Service layer for Castwork
//!
//! This module holds the scheduled dispatch engine behind a facade that the
//! batch binaries (and tests) drive.
//!
//! # Architecture
//!
//! `CastworkService` owns the shared resources and hands out the two run
//! services:
//!
//! - `PublishingService`: selects due content and publishes it per target
//! - `AnalyticsService`: refreshes metrics for recently published targets
//!
//! Both are built from the same pieces: `selector` (work selection),
//! `guard` (analytics freshness), `validation` (readiness rules),
//! `aggregate` (item status from target outcomes), `report` (run summary)
//! and `lock` (one run per kind at a time).
//!
//! # Example
//!
//! ```no_run
//! use libcastwork::service::{CastworkService, RunOptions};
//!
//! # async fn example() -> libcastwork::Result<()> {
//! let service = CastworkService::new().await?;
//!
//! let report = service.publishing().run(&RunOptions::default()).await?;
//! println!("{}", report.render_text());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod analytics;
pub mod guard;
pub mod lock;
pub mod publishing;
pub mod report;
pub mod selector;
pub mod validation;

pub use analytics::AnalyticsService;
pub use publishing::PublishingService;
pub use report::{RunKind, RunReport};
pub use selector::SelectionFilter;

use crate::config::MAX_BATCH_LIMIT;
use crate::error::CastworkError;
use crate::platforms::AdapterRegistry;
use crate::{Config, Database, Result};
use std::sync::Arc;

/// Caller-supplied knobs for one run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Validate and report only; no adapter calls, no writes, no lock
    pub dry_run: bool,
    /// Downgrade readiness rejections to warnings and ignore freshness
    pub force: bool,
    pub client_id: Option<String>,
    pub platform: Option<String>,
    /// Candidate cap; the configured batch limit when unset
    pub limit: Option<usize>,
    /// Analytics runs only
    pub lookback_days: Option<u32>,
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if self.limit == Some(0) {
            return Err(CastworkError::InvalidInput("limit must be at least 1".to_string()));
        }
        if self.limit.is_some_and(|limit| limit > MAX_BATCH_LIMIT) {
            return Err(CastworkError::InvalidInput(format!(
                "limit must be at most {}",
                MAX_BATCH_LIMIT
            )));
        }
        if self.lookback_days == Some(0) {
            return Err(CastworkError::InvalidInput(
                "lookback days must be at least 1".to_string(),
            ));
        }
        if self.platform.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(CastworkError::InvalidInput("platform cannot be empty".to_string()));
        }
        if self.client_id.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(CastworkError::InvalidInput("client cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn filter(&self) -> SelectionFilter {
        SelectionFilter {
            client_id: self.client_id.clone(),
            platform: self.platform.clone(),
            limit: self.limit,
        }
    }
}

/// Main service facade
///
/// Sub-services share the same `Arc<Database>`, `Arc<Config>` and
/// `Arc<AdapterRegistry>`.
pub struct CastworkService {
    db: Arc<Database>,
    config: Arc<Config>,
    registry: Arc<AdapterRegistry>,
    publishing: PublishingService,
    analytics: AnalyticsService,
}

impl CastworkService {
    /// Create a service from the default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration cannot be loaded
    /// - Database cannot be initialized
    /// - Database migrations fail
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service with a stub adapter for every enabled platform
    pub async fn from_config(config: Config) -> Result<Self> {
        let registry = AdapterRegistry::from_config(&config.platforms);
        Self::with_registry(config, registry).await
    }

    /// Create a service with an explicit adapter registry
    ///
    /// The configuration is validated here too, since it may not have come
    /// through [`Config::load`].
    pub async fn with_registry(config: Config, registry: AdapterRegistry) -> Result<Self> {
        config.validate()?;
        let db = Database::new(&config.database_path()).await?;

        let db = Arc::new(db);
        let config = Arc::new(config);
        let registry = Arc::new(registry);

        let publishing = PublishingService::new(Arc::clone(&db), Arc::clone(&config), Arc::clone(&registry));
        let analytics = AnalyticsService::new(Arc::clone(&db), Arc::clone(&config), Arc::clone(&registry));

        Ok(Self {
            db,
            config,
            registry,
            publishing,
            analytics,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn publishing(&self) -> &PublishingService {
        &self.publishing
    }

    pub fn analytics(&self) -> &AnalyticsService {
        &self.analytics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.database.path = temp_dir.path().join("service.db").to_string_lossy().to_string();
        config
    }

    #[test]
    fn test_run_options_validation() {
        assert!(RunOptions::default().validate().is_ok());

        let zero_limit = RunOptions {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(zero_limit.validate().unwrap_err().exit_code(), 3);

        let zero_lookback = RunOptions {
            lookback_days: Some(0),
            ..Default::default()
        };
        assert!(zero_lookback.validate().is_err());

        let huge_limit = RunOptions {
            limit: Some(usize::MAX),
            ..Default::default()
        };
        let err = huge_limit.validate().unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("at most"));

        let blank_platform = RunOptions {
            platform: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(blank_platform.validate().is_err());
    }

    #[test]
    fn test_filter_copies_options() {
        let options = RunOptions {
            client_id: Some("client-1".to_string()),
            platform: Some("facebook".to_string()),
            limit: Some(5),
            ..Default::default()
        };
        let filter = options.filter();
        assert_eq!(filter.client_id.as_deref(), Some("client-1"));
        assert_eq!(filter.platform.as_deref(), Some("facebook"));
        assert_eq!(filter.limit, Some(5));
    }

    #[tokio::test]
    async fn test_from_config_registers_stub_adapters() {
        let temp_dir = TempDir::new().unwrap();
        let service = CastworkService::from_config(test_config(&temp_dir)).await.unwrap();

        assert!(service.registry().resolve("instagram").is_ok());
        assert_eq!(service.config().publish.batch_limit, 50);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_opening_database() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        config.publish.concurrency = 0;

        let result = CastworkService::with_registry(config, AdapterRegistry::new()).await;
        let err = result.err().unwrap();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("publish.concurrency"));
        assert!(!temp_dir.path().join("service.db").exists());
    }

    #[tokio::test]
    async fn test_empty_runs_report_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let service = CastworkService::from_config(test_config(&temp_dir)).await.unwrap();

        let publish = service.publishing().run(&RunOptions::default()).await.unwrap();
        assert_eq!(publish.total, 0);
        assert_eq!(publish.exit_code(), 0);

        let analytics = service.analytics().run(&RunOptions::default()).await.unwrap();
        assert_eq!(analytics.kind, RunKind::Analytics);
        assert_eq!(analytics.total, 0);
    }
}

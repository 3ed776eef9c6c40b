//! Mock platform adapter for testing
//!
//! This module provides a configurable mock adapter that can simulate
//! successes, failures and slow responses for both publishing and analytics.
//! It's designed for use in integration tests to verify dispatch logic without
//! requiring real platform credentials or network access.
//!
//! Call counters live behind `Arc`s, so a clone kept by the test observes the
//! calls made through the copy registered with the dispatcher.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::{MetricReading, PlatformAdapter, PlatformOptions, PublishContent, PublishReceipt};
use crate::types::Credentials;

/// Configuration for mock adapter behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name (e.g., "facebook", "twitter")
    pub name: String,

    /// Error returned by every publish call, if any
    pub publish_error: Option<PlatformError>,

    /// Error returned by every analytics fetch, if any
    pub analytics_error: Option<PlatformError>,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Counters returned by analytics fetches
    pub metrics: MetricReading,

    pub publish_call_count: Arc<Mutex<usize>>,
    pub analytics_call_count: Arc<Mutex<usize>>,

    /// Content that has been published (for verification)
    pub published_content: Arc<Mutex<Vec<PublishContent>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            publish_error: None,
            analytics_error: None,
            delay: Duration::from_millis(0),
            metrics: MetricReading::default(),
            publish_call_count: Arc::new(Mutex::new(0)),
            analytics_call_count: Arc::new(Mutex::new(0)),
            published_content: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock adapter for testing
#[derive(Debug, Clone)]
pub struct MockAdapter {
    config: MockConfig,
}

impl MockAdapter {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock adapter that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock adapter whose publish calls fail with `error`
    pub fn publish_failure(name: &str, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            publish_error: Some(error),
            ..Default::default()
        })
    }

    /// Create a mock adapter whose analytics fetches fail with `error`
    pub fn analytics_failure(name: &str, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            analytics_error: Some(error),
            ..Default::default()
        })
    }

    /// Create a mock adapter with a delay
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Create a mock adapter reporting fixed counters
    pub fn with_metrics(name: &str, metrics: MetricReading) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            metrics,
            ..Default::default()
        })
    }

    pub fn publish_call_count(&self) -> usize {
        *lock(&self.config.publish_call_count)
    }

    pub fn analytics_call_count(&self) -> usize {
        *lock(&self.config.analytics_call_count)
    }

    /// Get all content that was published
    pub fn published_content(&self) -> Vec<PublishContent> {
        lock(&self.config.published_content).clone()
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }
}

// Poisoned counters stay readable
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn publish(
        &self,
        content: &PublishContent,
        _credentials: &Credentials,
        _options: &PlatformOptions,
    ) -> Result<PublishReceipt> {
        *lock(&self.config.publish_call_count) += 1;
        self.simulate_latency().await;

        if let Some(error) = &self.config.publish_error {
            return Err(error.clone().into());
        }

        lock(&self.config.published_content).push(content.clone());

        Ok(PublishReceipt {
            external_post_id: format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4()),
            published_at: chrono::Utc::now().timestamp(),
            platform_data: None,
        })
    }

    async fn fetch_analytics(
        &self,
        _credentials: &Credentials,
        _external_post_id: &str,
    ) -> Result<MetricReading> {
        *lock(&self.config.analytics_call_count) += 1;
        self.simulate_latency().await;

        if let Some(error) = &self.config.analytics_error {
            return Err(error.clone().into());
        }

        Ok(self.config.metrics.clone())
    }
}

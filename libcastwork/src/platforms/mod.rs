//! Platform adapter contract and registry
//!
//! Each external network is reached through a [`PlatformAdapter`]. Adapters
//! are stateless with respect to the dispatch engine: they receive the
//! content, the account credentials and the decoded platform options on every
//! call, and report any problem as an error that the dispatcher records
//! against the single target involved.
//!
//! Adapters are registered by platform identifier in an [`AdapterRegistry`]
//! built once at startup and handed to the dispatchers.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libcastwork::platforms::{AdapterRegistry, stub::StubAdapter};
//!
//! let registry = AdapterRegistry::new()
//!     .with(Arc::new(StubAdapter::new("facebook")))
//!     .with(Arc::new(StubAdapter::new("twitter")));
//!
//! assert!(registry.resolve("facebook").is_ok());
//! assert!(registry.resolve("myspace").is_err());
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::PlatformsConfig;
use crate::error::{PlatformError, Result};
use crate::types::{engagement_rate, Credentials, Media, MediaType, MetricSnapshot, Post};

pub mod options;
pub mod stub;

// Mock adapter is available for all builds (not just tests) to support integration tests
pub mod mock;

pub use options::PlatformOptions;

/// One media file as handed to an adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub path: String,
    pub media_type: MediaType,
    pub url: Option<String>,
}

/// Platform-agnostic content payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishContent {
    pub text: String,
    pub title: Option<String>,
    pub media: Vec<MediaRef>,
}

impl PublishContent {
    /// Build the payload for a content item and its ordered media
    pub fn from_post(post: &Post, media: &[Media]) -> Self {
        let mut ordered: Vec<&Media> = media.iter().collect();
        ordered.sort_by_key(|m| m.position);

        Self {
            text: post.body.clone(),
            title: post.title.clone(),
            media: ordered
                .into_iter()
                .map(|m| MediaRef {
                    path: m.path.clone(),
                    media_type: m.media_type,
                    url: m.url.clone(),
                })
                .collect(),
        }
    }
}

/// Result of a successful publish call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub external_post_id: String,
    pub published_at: i64,
    pub platform_data: Option<serde_json::Value>,
}

/// Raw counters returned by an analytics fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub views: i64,
    pub impressions: i64,
    pub reach: i64,
    pub clicks: i64,
    pub platform_data: Option<serde_json::Value>,
}

impl MetricReading {
    /// Turn the reading into a snapshot for `post_platform_id`
    pub fn into_snapshot(self, post_platform_id: &str, recorded_at: i64) -> MetricSnapshot {
        let rate = engagement_rate(
            self.likes,
            self.comments,
            self.shares,
            self.clicks,
            self.impressions,
            self.reach,
            self.views,
        );

        MetricSnapshot {
            id: None,
            post_platform_id: post_platform_id.to_string(),
            likes: self.likes,
            comments: self.comments,
            shares: self.shares,
            views: self.views,
            impressions: self.impressions,
            reach: self.reach,
            clicks: self.clicks,
            engagement_rate: rate,
            platform_data: self.platform_data,
            recorded_at,
        }
    }
}

/// Contract implemented once per external network
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Lowercase platform identifier this adapter serves (e.g. "facebook")
    fn name(&self) -> &str;

    /// Publish content and return the platform's identifier for it
    ///
    /// # Errors
    ///
    /// Any error is a target-level failure. Adapters should prefer
    /// `PlatformError::Authentication` for credential problems,
    /// `PlatformError::Network` for transport problems and
    /// `PlatformError::Publishing` for rejections by the platform.
    async fn publish(
        &self,
        content: &PublishContent,
        credentials: &Credentials,
        options: &PlatformOptions,
    ) -> Result<PublishReceipt>;

    /// Fetch current counters for a previously published post
    async fn fetch_analytics(
        &self,
        credentials: &Credentials,
        external_post_id: &str,
    ) -> Result<MetricReading>;
}

/// Platform identifier to adapter map
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stub adapter for every enabled platform
    pub fn from_config(config: &PlatformsConfig) -> Self {
        config.enabled.iter().fold(Self::new(), |registry, platform| {
            registry.with(Arc::new(stub::StubAdapter::new(platform)))
        })
    }

    /// Register an adapter under its own name, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(platform).cloned()
    }

    /// Like [`get`](Self::get) but a missing adapter is an error
    pub fn resolve(&self, platform: &str) -> Result<Arc<dyn PlatformAdapter>> {
        self.get(platform)
            .ok_or_else(|| PlatformError::NotFound(platform.to_string()).into())
    }

    /// Registered platform identifiers, sorted
    pub fn platforms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}

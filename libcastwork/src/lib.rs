//! Castwork - scheduled dispatch engine for multi-client social publishing
//!
//! This library selects content whose scheduled time has arrived, publishes it
//! to each of its platform targets, reconciles the per-target outcomes into
//! the content item's status, and periodically pulls performance metrics back
//! for recently published targets.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, SyncTarget, TargetWithAccount};
pub use error::{CastworkError, Result};
pub use platforms::{AdapterRegistry, PlatformAdapter, PlatformOptions};
pub use service::{CastworkService, RunKind, RunOptions, RunReport};
pub use types::{
    Credentials, Media, MediaType, MetricSnapshot, Post, PostStatus, PublishTarget, SocialAccount,
    TargetStatus,
};

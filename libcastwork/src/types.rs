//! Core types for Castwork

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::platforms::options::PlatformOptions;

/// Lifecycle of a content item
///
/// `Scheduled` moves to `Published`, `PartiallyPublished` or `Failed` only
/// through the publish run; the other transitions belong to the authoring
/// and approval flows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    PendingApproval,
    Approved,
    Scheduled,
    Published,
    PartiallyPublished,
    Failed,
    Cancelled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Scheduled => "scheduled",
            Self::Published => "published",
            Self::PartiallyPublished => "partially_published",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "pending_approval" => Ok(Self::PendingApproval),
            "approved" => Ok(Self::Approved),
            "scheduled" => Ok(Self::Scheduled),
            "published" => Ok(Self::Published),
            "partially_published" => Ok(Self::PartiallyPublished),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown post status '{}'", other)),
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one publish target
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    Published,
    Failed,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for TargetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "published" => Ok(Self::Published),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown target status '{}'", other)),
        }
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content item ("post") owned by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub client_id: String,
    pub author_id: String,
    pub title: Option<String>,
    pub body: String,
    pub status: PostStatus,
    pub scheduled_at: Option<i64>,
    pub published_at: Option<i64>,
    /// Recurrence pattern, e.g. "weekly"; carried, not interpreted
    pub recurrence: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Post {
    pub fn new(client_id: &str, author_id: &str, body: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            author_id: author_id.to_string(),
            title: None,
            body,
            status: PostStatus::Draft,
            scheduled_at: None,
            published_at: None,
            recurrence: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the item approved and scheduled for `at`
    pub fn scheduled(mut self, at: i64) -> Self {
        self.status = PostStatus::Scheduled;
        self.scheduled_at = Some(at);
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Gif,
    Document,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Gif => "gif",
            Self::Document => "document",
        }
    }

    /// GIFs count as images when checking media requirements
    pub fn is_image_or_video(&self) -> bool {
        matches!(self, Self::Image | Self::Gif | Self::Video)
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "gif" => Ok(Self::Gif),
            "document" => Ok(Self::Document),
            other => Err(format!("unknown media type '{}'", other)),
        }
    }
}

/// A media file attached to a content item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: String,
    pub post_id: String,
    pub path: String,
    pub media_type: MediaType,
    pub url: Option<String>,
    pub position: i64,
}

impl Media {
    pub fn new(post_id: &str, path: &str, media_type: MediaType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            path: path.to_string(),
            media_type,
            url: None,
            position: 0,
        }
    }
}

/// Access credentials for one external account
///
/// Tokens are held as secrets and only exposed at the adapter boundary.
#[derive(Debug)]
pub struct Credentials {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<i64>,
}

impl Credentials {
    pub fn new(access_token: &str, expires_at: Option<i64>) -> Self {
        Self {
            access_token: SecretString::from(access_token.to_string()),
            refresh_token: None,
            expires_at,
        }
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.expose_secret().trim().is_empty()
    }

    /// An unset expiry never expires
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }
}

/// One client's presence on one platform
#[derive(Debug)]
pub struct SocialAccount {
    pub id: String,
    pub client_id: String,
    pub platform: String,
    pub account_name: String,
    pub credentials: Credentials,
    pub options: PlatformOptions,
    pub created_at: i64,
}

impl SocialAccount {
    pub fn new(client_id: &str, platform: &str, account_name: &str, credentials: Credentials) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            platform: platform.to_string(),
            account_name: account_name.to_string(),
            credentials,
            options: PlatformOptions::default_for(platform),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_options(mut self, options: PlatformOptions) -> Self {
        self.options = options;
        self
    }
}

/// A (content item, external account) publishing destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishTarget {
    pub id: String,
    pub post_id: String,
    pub social_account_id: String,
    pub platform: String,
    pub external_post_id: Option<String>,
    pub status: TargetStatus,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub next_attempt_at: Option<i64>,
    pub published_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PublishTarget {
    pub fn new(post_id: &str, account: &SocialAccount) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            social_account_id: account.id.clone(),
            platform: account.platform.clone(),
            external_post_id: None,
            status: TargetStatus::Pending,
            error_message: None,
            attempts: 0,
            next_attempt_at: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One timestamped performance reading for a publish target
///
/// Snapshots are append-only; each sync inserts a new row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSnapshot {
    pub id: Option<i64>,
    pub post_platform_id: String,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub views: i64,
    pub impressions: i64,
    pub reach: i64,
    pub clicks: i64,
    pub engagement_rate: f64,
    pub platform_data: Option<serde_json::Value>,
    pub recorded_at: i64,
}

/// Interactions over audience, as a percentage with two decimals
///
/// The audience is impressions, else reach, else views.
pub fn engagement_rate(
    likes: i64,
    comments: i64,
    shares: i64,
    clicks: i64,
    impressions: i64,
    reach: i64,
    views: i64,
) -> f64 {
    let audience = [impressions, reach, views]
        .into_iter()
        .find(|n| *n > 0)
        .unwrap_or(0);
    if audience == 0 {
        return 0.0;
    }

    let interactions = (likes + comments + shares + clicks) as f64;
    (interactions / audience as f64 * 10_000.0).round() / 100.0
}

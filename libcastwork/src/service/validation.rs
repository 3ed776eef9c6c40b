//! Readiness checks for dispatch candidates
//!
//! These are pure functions: they look at a candidate and the current time
//! and decide whether it may proceed. A rejection becomes a skip in the run
//! report, never a failure.
//!
//! Rules run in order and stop at the first rejection. In force mode every
//! rejection except an empty target list is downgraded to a warning.

use serde::{Serialize, Serializer};
use std::fmt;

use crate::db::TargetWithAccount;
use crate::types::{Credentials, Media, MediaType};

/// Why a candidate was not dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoPublishTargets,
    NothingToDispatch,
    MissingAccessToken,
    AccessTokenExpired,
    RequiresMedia,
    RequiresVideo,
    SyncedRecently,
    DryRun,
}

impl SkipReason {
    /// Machine-readable reason string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoPublishTargets => "no publish targets",
            Self::NothingToDispatch => "nothing to dispatch",
            Self::MissingAccessToken => "missing access token",
            Self::AccessTokenExpired => "access token expired",
            Self::RequiresMedia => "requires at least one media file",
            Self::RequiresVideo => "requires at least one video file",
            Self::SyncedRecently => "synced recently",
            Self::DryRun => "dry run",
        }
    }
}

impl Serialize for SkipReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule that did not pass, and the target it concerns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: SkipReason,
    pub target_id: Option<String>,
    pub platform: Option<String>,
}

impl Rejection {
    pub fn candidate(reason: SkipReason) -> Self {
        Self {
            reason,
            target_id: None,
            platform: None,
        }
    }

    pub fn target(reason: SkipReason, target_id: &str, platform: &str) -> Self {
        Self {
            reason,
            target_id: Some(target_id.to_string()),
            platform: Some(platform.to_string()),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.platform {
            Some(platform) => write!(f, "{}: {}", platform, self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Dispatch; `warnings` holds rejections overridden by force mode
    Proceed { warnings: Vec<Rejection> },
    Reject(Rejection),
}

impl Readiness {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Self::Proceed { .. })
    }
}

/// Media a platform insists on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRequirement {
    None,
    ImageOrVideo,
    Video,
}

pub fn media_requirement(platform: &str) -> MediaRequirement {
    match platform {
        "instagram" => MediaRequirement::ImageOrVideo,
        "tiktok" | "youtube" => MediaRequirement::Video,
        _ => MediaRequirement::None,
    }
}

pub fn check_credentials(credentials: &Credentials, now: i64) -> Option<SkipReason> {
    if !credentials.has_access_token() {
        return Some(SkipReason::MissingAccessToken);
    }
    if credentials.is_expired(now) {
        return Some(SkipReason::AccessTokenExpired);
    }
    None
}

/// Long text is never rejected here; adapters thread or truncate
pub fn check_media(platform: &str, media: &[Media]) -> Option<SkipReason> {
    match media_requirement(platform) {
        MediaRequirement::None => None,
        MediaRequirement::ImageOrVideo => {
            if media.iter().any(|m| m.media_type.is_image_or_video()) {
                None
            } else {
                Some(SkipReason::RequiresMedia)
            }
        }
        MediaRequirement::Video => {
            if media.iter().any(|m| m.media_type == MediaType::Video) {
                None
            } else {
                Some(SkipReason::RequiresVideo)
            }
        }
    }
}

/// Decide whether a publish candidate's targets may be dispatched
pub fn validate_publish(
    targets: &[&TargetWithAccount],
    media: &[Media],
    now: i64,
    force: bool,
) -> Readiness {
    // Nothing to override when there is nothing to publish to
    if targets.is_empty() {
        return Readiness::Reject(Rejection::candidate(SkipReason::NoPublishTargets));
    }

    let credential_rule = targets.iter().filter_map(|t| {
        check_credentials(&t.account.credentials, now)
            .map(|reason| Rejection::target(reason, &t.target.id, &t.target.platform))
    });
    let media_rule = targets.iter().filter_map(|t| {
        check_media(&t.target.platform, media)
            .map(|reason| Rejection::target(reason, &t.target.id, &t.target.platform))
    });

    let mut rejections = credential_rule.chain(media_rule);
    if force {
        Readiness::Proceed {
            warnings: rejections.collect(),
        }
    } else {
        match rejections.next() {
            Some(rejection) => Readiness::Reject(rejection),
            None => Readiness::Proceed { warnings: vec![] },
        }
    }
}

/// Decide whether an analytics candidate may be fetched
pub fn validate_analytics(
    target_id: &str,
    platform: &str,
    credentials: &Credentials,
    now: i64,
    force: bool,
) -> Readiness {
    match check_credentials(credentials, now) {
        None => Readiness::Proceed { warnings: vec![] },
        Some(reason) if force => Readiness::Proceed {
            warnings: vec![Rejection::target(reason, target_id, platform)],
        },
        Some(reason) => Readiness::Reject(Rejection::target(reason, target_id, platform)),
    }
}

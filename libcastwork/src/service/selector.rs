//! Work selection for publish and analytics runs
//!
//! Selection is read-only. An empty result is the normal steady state.

use std::sync::Arc;

use crate::config::RetryConfig;
use crate::types::{Media, Post, PostStatus, PublishTarget, TargetStatus};
use crate::{Database, Result};

pub use crate::db::{SyncTarget as AnalyticsCandidate, TargetWithAccount};

/// Narrowing applied by the caller of a run
#[derive(Debug, Clone, Default)]
pub struct SelectionFilter {
    pub client_id: Option<String>,
    pub platform: Option<String>,
    pub limit: Option<usize>,
}

/// A due content item with everything needed to dispatch it
#[derive(Debug)]
pub struct PublishCandidate {
    pub post: Post,
    pub media: Vec<Media>,
    pub targets: Vec<TargetWithAccount>,
    /// Selected for target retry rather than because it came due
    pub retry_only: bool,
}

/// A failed target whose retry time has come and whose budget is not spent
pub fn is_retry_eligible(target: &PublishTarget, retry: &RetryConfig, now: i64) -> bool {
    retry.enabled()
        && target.status == TargetStatus::Failed
        && target.attempts < retry.max_attempts
        && target.next_attempt_at.is_some_and(|at| at <= now)
}

impl PublishCandidate {
    /// Targets this run should attempt
    ///
    /// Published targets are never re-sent. On a retry candidate only the
    /// retry-eligible failed targets go out; a pending target there is one
    /// whose publish went through without being recorded. On a due item
    /// failed targets go out again unless their retry budget is spent.
    pub fn dispatchable(
        &self,
        platform: Option<&str>,
        retry: &RetryConfig,
        now: i64,
    ) -> Vec<&TargetWithAccount> {
        self.targets
            .iter()
            .filter(|t| platform.map_or(true, |p| t.target.platform == p))
            .filter(|t| match t.target.status {
                TargetStatus::Published => false,
                TargetStatus::Pending => !self.retry_only,
                TargetStatus::Failed if self.retry_only => is_retry_eligible(&t.target, retry, now),
                TargetStatus::Failed => !retry.enabled() || t.target.attempts < retry.max_attempts,
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct WorkSelector {
    db: Arc<Database>,
}

impl WorkSelector {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Due content items, oldest first, each with its targets and media
    ///
    /// Targets and media for the whole batch are loaded with one query each.
    pub async fn publish_candidates(
        &self,
        filter: &SelectionFilter,
        default_limit: usize,
        retry: &RetryConfig,
        now: i64,
    ) -> Result<Vec<PublishCandidate>> {
        let posts = self
            .db
            .select_due_posts(
                now,
                filter.client_id.as_deref(),
                filter.platform.as_deref(),
                retry.enabled().then_some(retry.max_attempts),
                filter.limit.unwrap_or(default_limit),
            )
            .await?;

        let ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
        let mut targets = self.db.load_targets_for(&ids).await?;
        let mut media = self.db.load_media_for(&ids).await?;

        Ok(posts
            .into_iter()
            .map(|post| PublishCandidate {
                targets: targets.remove(&post.id).unwrap_or_default(),
                media: media.remove(&post.id).unwrap_or_default(),
                retry_only: post.status == PostStatus::PartiallyPublished,
                post,
            })
            .collect())
    }

    /// Published targets inside the lookback window, newest first
    pub async fn analytics_candidates(
        &self,
        filter: &SelectionFilter,
        default_limit: usize,
        lookback_days: u32,
        now: i64,
    ) -> Result<Vec<AnalyticsCandidate>> {
        let since = now - i64::from(lookback_days) * 86_400;
        self.db
            .select_analytics_targets(
                since,
                filter.client_id.as_deref(),
                filter.platform.as_deref(),
                filter.limit.unwrap_or(default_limit),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Credentials, SocialAccount};
    use std::time::Duration;
    use tempfile::TempDir;

    const NOW: i64 = 1_760_000_000;

    fn target_on(platform: &str, status: TargetStatus, attempts: u32, next: Option<i64>) -> TargetWithAccount {
        let account = SocialAccount::new("client-1", platform, "Acme", Credentials::new("token", None));
        let mut target = PublishTarget::new("post-1", &account);
        target.status = status;
        target.attempts = attempts;
        target.next_attempt_at = next;
        TargetWithAccount { target, account }
    }

    fn candidate(targets: Vec<TargetWithAccount>, retry_only: bool) -> PublishCandidate {
        PublishCandidate {
            post: Post::new("client-1", "author-1", "Hello".to_string()).scheduled(NOW),
            media: vec![],
            targets,
            retry_only,
        }
    }

    fn retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            delay: Duration::from_secs(60),
        }
    }

    fn platforms(targets: Vec<&TargetWithAccount>) -> Vec<&str> {
        targets.iter().map(|t| t.target.platform.as_str()).collect()
    }

    #[test]
    fn test_published_targets_are_not_resent() {
        let c = candidate(
            vec![
                target_on("facebook", TargetStatus::Published, 1, None),
                target_on("twitter", TargetStatus::Pending, 0, None),
            ],
            false,
        );
        assert_eq!(platforms(c.dispatchable(None, &retry(0), NOW)), vec!["twitter"]);
    }

    #[test]
    fn test_platform_filter_limits_dispatch() {
        let c = candidate(
            vec![
                target_on("facebook", TargetStatus::Pending, 0, None),
                target_on("twitter", TargetStatus::Pending, 0, None),
            ],
            false,
        );
        assert_eq!(platforms(c.dispatchable(Some("facebook"), &retry(0), NOW)), vec!["facebook"]);
    }

    #[test]
    fn test_retry_candidate_only_sends_eligible_failures() {
        let c = candidate(
            vec![
                target_on("facebook", TargetStatus::Published, 1, None),
                target_on("twitter", TargetStatus::Failed, 1, Some(NOW - 5)),
                target_on("linkedin", TargetStatus::Failed, 1, Some(NOW + 500)),
                target_on("tiktok", TargetStatus::Failed, 3, Some(NOW - 5)),
            ],
            true,
        );
        assert_eq!(platforms(c.dispatchable(None, &retry(3), NOW)), vec!["twitter"]);
    }

    #[test]
    fn test_retry_candidate_leaves_pending_targets_alone() {
        let c = candidate(
            vec![
                target_on("facebook", TargetStatus::Pending, 1, None),
                target_on("twitter", TargetStatus::Failed, 1, Some(NOW - 5)),
            ],
            true,
        );
        assert_eq!(platforms(c.dispatchable(None, &retry(3), NOW)), vec!["twitter"]);
    }

    #[test]
    fn test_requeued_item_skips_exhausted_targets() {
        let c = candidate(
            vec![
                target_on("twitter", TargetStatus::Failed, 1, Some(NOW + 60)),
                target_on("linkedin", TargetStatus::Failed, 3, None),
            ],
            false,
        );
        assert_eq!(platforms(c.dispatchable(None, &retry(3), NOW)), vec!["twitter"]);
        assert_eq!(
            platforms(c.dispatchable(None, &retry(0), NOW)),
            vec!["twitter", "linkedin"]
        );
    }

    #[tokio::test]
    async fn test_publish_candidates_carry_targets_and_media() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("sel.db").to_str().unwrap())
            .await
            .unwrap();

        let account = SocialAccount::new("client-1", "instagram", "Acme", Credentials::new("token", None));
        db.create_account(&account).await.unwrap();

        let post = Post::new("client-1", "author-1", "Hello".to_string()).scheduled(NOW - 5);
        db.create_post(&post).await.unwrap();
        db.create_target(&PublishTarget::new(&post.id, &account)).await.unwrap();
        db.add_media(&Media::new(&post.id, "/m/a.jpg", crate::types::MediaType::Image))
            .await
            .unwrap();

        let bare = Post::new("client-1", "author-1", "No targets".to_string()).scheduled(NOW - 1);
        db.create_post(&bare).await.unwrap();

        let selector = WorkSelector::new(Arc::new(db));
        let candidates = selector
            .publish_candidates(&SelectionFilter::default(), 50, &retry(0), NOW)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].post.id, post.id);
        assert_eq!(candidates[0].targets.len(), 1);
        assert_eq!(candidates[0].media.len(), 1);
        assert!(!candidates[0].retry_only);
        assert!(candidates[1].targets.is_empty());
    }

    #[tokio::test]
    async fn test_nothing_due_is_empty_not_error() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("sel.db").to_str().unwrap())
            .await
            .unwrap();
        let selector = WorkSelector::new(Arc::new(db));

        let publish = selector
            .publish_candidates(&SelectionFilter::default(), 50, &retry(0), NOW)
            .await
            .unwrap();
        let analytics = selector
            .analytics_candidates(&SelectionFilter::default(), 100, 7, NOW)
            .await
            .unwrap();
        assert!(publish.is_empty());
        assert!(analytics.is_empty());
    }
}

//! Content item status from its targets
//!
//! Aggregation runs once per candidate, after every target has been
//! attempted, so readers never see an item move through intermediate states.

use crate::config::{AllFailedPolicy, PublishConfig};
use crate::types::{PostStatus, TargetStatus};

/// Target-level view the aggregate is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetState {
    pub status: TargetStatus,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Published,
    PartiallyPublished,
    Failed,
    /// Some target was not attempted; the item keeps its status
    Incomplete,
}

/// Write to apply to the content item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostUpdate {
    pub status: PostStatus,
    pub published_at: Option<i64>,
    pub scheduled_at: Option<i64>,
}

pub fn derive_outcome(states: &[TargetState]) -> Outcome {
    if states.iter().any(|s| s.status == TargetStatus::Pending) {
        return Outcome::Incomplete;
    }

    let published = states
        .iter()
        .filter(|s| s.status == TargetStatus::Published)
        .count();

    match published {
        0 => Outcome::Failed,
        n if n == states.len() => Outcome::Published,
        _ => Outcome::PartiallyPublished,
    }
}

/// Turn the final target states into the item's new status
///
/// `published_at` is set whenever a target succeeded during this run. Under
/// the requeue policy an all-failed item goes back to `scheduled` while any
/// target still has retry budget.
pub fn resolve(
    current: PostStatus,
    states: &[TargetState],
    succeeded_this_run: bool,
    config: &PublishConfig,
    now: i64,
) -> PostUpdate {
    let published_at = succeeded_this_run.then_some(now);

    let status = match derive_outcome(states) {
        Outcome::Published => PostStatus::Published,
        Outcome::PartiallyPublished => PostStatus::PartiallyPublished,
        Outcome::Incomplete => current,
        Outcome::Failed => {
            let retry = &config.retry;
            let budget_left = states.iter().any(|s| s.attempts < retry.max_attempts);
            if config.on_all_failed == AllFailedPolicy::Requeue && budget_left {
                let delay = i64::try_from(retry.delay.as_secs()).unwrap_or(i64::MAX);
                return PostUpdate {
                    status: PostStatus::Scheduled,
                    published_at,
                    scheduled_at: Some(now.saturating_add(delay)),
                };
            }
            PostStatus::Failed
        }
    };

    PostUpdate {
        status,
        published_at,
        scheduled_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use std::time::Duration;

    const NOW: i64 = 1_760_000_000;

    fn state(status: TargetStatus, attempts: u32) -> TargetState {
        TargetState { status, attempts }
    }

    #[test]
    fn test_derive_outcome() {
        use TargetStatus::*;
        assert_eq!(derive_outcome(&[state(Published, 1), state(Published, 1)]), Outcome::Published);
        assert_eq!(
            derive_outcome(&[state(Published, 1), state(Failed, 1)]),
            Outcome::PartiallyPublished
        );
        assert_eq!(derive_outcome(&[state(Failed, 1), state(Failed, 1)]), Outcome::Failed);
        assert_eq!(derive_outcome(&[state(Published, 1), state(Pending, 0)]), Outcome::Incomplete);
        assert_eq!(derive_outcome(&[]), Outcome::Failed);
    }

    #[test]
    fn test_partial_success_sets_published_at() {
        let update = resolve(
            PostStatus::Scheduled,
            &[state(TargetStatus::Published, 1), state(TargetStatus::Failed, 1)],
            true,
            &PublishConfig::default(),
            NOW,
        );
        assert_eq!(update.status, PostStatus::PartiallyPublished);
        assert_eq!(update.published_at, Some(NOW));
        assert_eq!(update.scheduled_at, None);
    }

    #[test]
    fn test_all_failed_terminal_by_default() {
        let update = resolve(
            PostStatus::Scheduled,
            &[state(TargetStatus::Failed, 1)],
            false,
            &PublishConfig::default(),
            NOW,
        );
        assert_eq!(update.status, PostStatus::Failed);
        assert_eq!(update.published_at, None);
    }

    #[test]
    fn test_all_failed_requeued_while_budget_lasts() {
        let config = PublishConfig {
            on_all_failed: AllFailedPolicy::Requeue,
            retry: RetryConfig {
                max_attempts: 3,
                delay: Duration::from_secs(600),
            },
            ..Default::default()
        };

        let requeued = resolve(
            PostStatus::Scheduled,
            &[state(TargetStatus::Failed, 1), state(TargetStatus::Failed, 3)],
            false,
            &config,
            NOW,
        );
        assert_eq!(requeued.status, PostStatus::Scheduled);
        assert_eq!(requeued.scheduled_at, Some(NOW + 600));

        let exhausted = resolve(
            PostStatus::Scheduled,
            &[state(TargetStatus::Failed, 3)],
            false,
            &config,
            NOW,
        );
        assert_eq!(exhausted.status, PostStatus::Failed);
    }

    #[test]
    fn test_incomplete_keeps_current_status() {
        let update = resolve(
            PostStatus::Scheduled,
            &[state(TargetStatus::Published, 1), state(TargetStatus::Pending, 0)],
            true,
            &PublishConfig::default(),
            NOW,
        );
        assert_eq!(update.status, PostStatus::Scheduled);
        assert_eq!(update.published_at, Some(NOW));
    }
}

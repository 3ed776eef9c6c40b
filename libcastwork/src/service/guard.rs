//! Freshness guard for analytics refreshes

use std::time::Duration;

use super::validation::SkipReason;

/// Skips targets whose newest snapshot is younger than `freshness`
#[derive(Debug, Clone, Copy)]
pub struct SyncGuard {
    freshness: Duration,
}

impl SyncGuard {
    pub fn new(freshness: Duration) -> Self {
        Self { freshness }
    }

    pub fn is_fresh(&self, last_synced_at: Option<i64>, now: i64) -> bool {
        let window = i64::try_from(self.freshness.as_secs()).unwrap_or(i64::MAX);
        last_synced_at.is_some_and(|synced| now.saturating_sub(synced) < window)
    }

    /// `Some(SyncedRecently)` when the target should be left alone
    pub fn check(&self, last_synced_at: Option<i64>, now: i64, force: bool) -> Option<SkipReason> {
        if !force && self.is_fresh(last_synced_at, now) {
            Some(SkipReason::SyncedRecently)
        } else {
            None
        }
    }
}

//! Per-kind run lease
//!
//! At most one publish run and one analytics run hold a lease at a time. A
//! lease that outlives its TTL (a crashed run) is taken over by the next
//! caller.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::report::RunKind;
use crate::{Database, Result};

pub struct RunLock {
    db: Arc<Database>,
    kind: RunKind,
    holder: String,
}

impl RunLock {
    /// # Errors
    ///
    /// `CastworkError::RunInProgress` when another live run holds the lease.
    pub async fn acquire(db: Arc<Database>, kind: RunKind, holder: &str, ttl: Duration) -> Result<Self> {
        let now = chrono::Utc::now().timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2);
        db.acquire_run_lock(kind.as_str(), holder, now, ttl_secs).await?;
        debug!(kind = %kind, holder, "run lock acquired");

        Ok(Self {
            db,
            kind,
            holder: holder.to_string(),
        })
    }

    /// Release the lease; failures are logged and left to the TTL
    pub async fn release(self) {
        match self.db.release_run_lock(self.kind.as_str(), &self.holder).await {
            Ok(true) => debug!(kind = %self.kind, holder = %self.holder, "run lock released"),
            Ok(false) => warn!(
                kind = %self.kind,
                holder = %self.holder,
                "run lock was already taken over before release"
            ),
            Err(e) => warn!(
                kind = %self.kind,
                holder = %self.holder,
                error = %e,
                "failed to release run lock"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CastworkError;
    use tempfile::TempDir;

    async fn setup_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("lock.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        (Arc::new(db), temp_dir)
    }

    #[tokio::test]
    async fn test_second_acquire_is_rejected_until_release() {
        let (db, _temp) = setup_db().await;
        let ttl = Duration::from_secs(900);

        let lock = RunLock::acquire(Arc::clone(&db), RunKind::Publish, "run-1", ttl)
            .await
            .unwrap();

        let second = RunLock::acquire(Arc::clone(&db), RunKind::Publish, "run-2", ttl).await;
        assert!(matches!(second, Err(CastworkError::RunInProgress { .. })));

        lock.release().await;

        let third = RunLock::acquire(Arc::clone(&db), RunKind::Publish, "run-3", ttl).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let (db, _temp) = setup_db().await;
        let ttl = Duration::from_secs(900);

        let _publish = RunLock::acquire(Arc::clone(&db), RunKind::Publish, "run-1", ttl)
            .await
            .unwrap();
        let analytics = RunLock::acquire(Arc::clone(&db), RunKind::Analytics, "run-2", ttl).await;
        assert!(analytics.is_ok());
    }
}

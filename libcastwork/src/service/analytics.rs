//! Analytics sync run: refresh metrics for recently published targets
//!
//! Every successful fetch appends a new snapshot; prior snapshots are never
//! touched. The freshness guard keeps repeated runs from hammering platforms
//! whose numbers have not had time to move.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

use super::guard::SyncGuard;
use super::lock::RunLock;
use super::report::{CandidateOutcome, RunKind, RunReport};
use super::selector::{AnalyticsCandidate, WorkSelector};
use super::validation::{validate_analytics, Readiness, Rejection, SkipReason};
use super::RunOptions;
use crate::error::PlatformError;
use crate::platforms::{AdapterRegistry, MetricReading};
use crate::{Config, Database, Result};

#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<Database>,
    config: Arc<Config>,
    registry: Arc<AdapterRegistry>,
    selector: WorkSelector,
    guard: SyncGuard,
}

impl AnalyticsService {
    pub fn new(db: Arc<Database>, config: Arc<Config>, registry: Arc<AdapterRegistry>) -> Self {
        Self {
            selector: WorkSelector::new(Arc::clone(&db)),
            guard: SyncGuard::new(config.analytics.freshness),
            db,
            config,
            registry,
        }
    }

    /// Execute one analytics sync run
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid, another analytics run
    /// holds the lease, or candidates cannot be selected.
    pub async fn run(&self, options: &RunOptions) -> Result<RunReport> {
        options.validate()?;
        let mut report = RunReport::new(RunKind::Analytics, options.dry_run, options.force);

        let lock = if options.dry_run {
            None
        } else {
            Some(
                RunLock::acquire(
                    Arc::clone(&self.db),
                    RunKind::Analytics,
                    &report.run_id,
                    self.config.lock.ttl,
                )
                .await?,
            )
        };

        let result = self.execute(options, &mut report).await;

        if let Some(lock) = lock {
            lock.release().await;
        }
        result?;

        report.finish();
        report.emit();
        Ok(report)
    }

    async fn execute(&self, options: &RunOptions, report: &mut RunReport) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let analytics = &self.config.analytics;
        let lookback_days = options.lookback_days.unwrap_or(analytics.lookback_days);

        let candidates = self
            .selector
            .analytics_candidates(&options.filter(), analytics.batch_limit, lookback_days, now)
            .await?;

        info!(
            run_id = %report.run_id,
            candidates = candidates.len(),
            lookback_days,
            dry_run = options.dry_run,
            "analytics candidates selected"
        );

        let outcomes: Vec<CandidateOutcome> = stream::iter(candidates)
            .map(|candidate| self.process(candidate, options, now))
            .buffered(analytics.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            report.absorb(outcome);
        }

        Ok(())
    }

    async fn process(&self, candidate: AnalyticsCandidate, options: &RunOptions, now: i64) -> CandidateOutcome {
        let target = &candidate.target;
        let item_id = target.post_id.as_str();
        let platform = target.platform.as_str();

        if let Some(reason) = self.guard.check(candidate.last_synced_at, now, options.force) {
            return CandidateOutcome::skipped(item_id, Rejection::target(reason, &target.id, platform));
        }

        let mut outcome = CandidateOutcome::default();
        match validate_analytics(&target.id, platform, &candidate.account.credentials, now, options.force) {
            Readiness::Reject(rejection) => return CandidateOutcome::skipped(item_id, rejection),
            Readiness::Proceed { warnings } => outcome.warn_all(item_id, warnings),
        }

        if options.dry_run {
            outcome.plan(item_id, &target.id, platform);
            outcome.skip(item_id, Rejection::target(SkipReason::DryRun, &target.id, platform));
            return outcome;
        }

        let reading = match self.fetch(&candidate).await {
            Ok(reading) => reading,
            Err(e) => {
                debug!(item_id, platform, error = %e, "analytics fetch failed");
                outcome.fail(item_id, Some(&target.id), Some(platform), e.to_string());
                return outcome;
            }
        };

        let snapshot = reading.into_snapshot(&target.id, chrono::Utc::now().timestamp());
        match self.db.insert_snapshot(&snapshot).await {
            Ok(snapshot_id) => {
                debug!(
                    item_id,
                    platform,
                    snapshot_id,
                    engagement_rate = snapshot.engagement_rate,
                    "snapshot recorded"
                );
                outcome.successful += 1;
            }
            Err(e) => outcome.fail(
                item_id,
                Some(&target.id),
                Some(platform),
                format!("failed to record snapshot: {}", e),
            ),
        }

        outcome
    }

    async fn fetch(&self, candidate: &AnalyticsCandidate) -> Result<MetricReading> {
        let target = &candidate.target;
        let Some(external_post_id) = target.external_post_id.as_deref() else {
            return Err(PlatformError::Analytics(format!("target {} has no external post id", target.id)).into());
        };

        let adapter = self.registry.resolve(&target.platform)?;
        let timeout = self.config.analytics.adapter_timeout;

        match tokio::time::timeout(
            timeout,
            adapter.fetch_analytics(&candidate.account.credentials, external_post_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Timeout(format!(
                "{} analytics fetch timed out after {}",
                target.platform,
                humantime::format_duration(timeout)
            ))
            .into()),
        }
    }
}

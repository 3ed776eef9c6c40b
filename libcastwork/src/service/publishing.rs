//! Publish run: dispatch due content to its platforms
//!
//! Candidates go through a bounded pool (`publish.concurrency`) and results
//! come back in selection order. Targets of one candidate are sent one after
//! another, each outcome is written as soon as it is known, and the item's
//! aggregate status is written once after the last target.
//!
//! Nothing that goes wrong with a single target or candidate escapes this
//! module as an error; it becomes a failure entry in the report. Only lock
//! contention and selector errors abort the run.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::aggregate::{self, TargetState};
use super::lock::RunLock;
use super::report::{CandidateOutcome, RunKind, RunReport};
use super::selector::{PublishCandidate, TargetWithAccount, WorkSelector};
use super::validation::{validate_publish, Readiness, Rejection, SkipReason};
use super::RunOptions;
use crate::config::RetryConfig;
use crate::error::PlatformError;
use crate::platforms::{AdapterRegistry, PublishContent, PublishReceipt};
use crate::types::TargetStatus;
use crate::{Config, Database, Result};

/// Publishing service
///
/// Selects due content items and pushes each to its publish targets through
/// the registered platform adapters.
#[derive(Clone)]
pub struct PublishingService {
    db: Arc<Database>,
    config: Arc<Config>,
    registry: Arc<AdapterRegistry>,
    selector: WorkSelector,
}

impl PublishingService {
    pub fn new(db: Arc<Database>, config: Arc<Config>, registry: Arc<AdapterRegistry>) -> Self {
        Self {
            selector: WorkSelector::new(Arc::clone(&db)),
            db,
            config,
            registry,
        }
    }

    /// Execute one publish run
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid, another publish run
    /// holds the lease, or due work cannot be selected. Platform failures are
    /// reported in the returned [`RunReport`].
    pub async fn run(&self, options: &RunOptions) -> Result<RunReport> {
        options.validate()?;
        let mut report = RunReport::new(RunKind::Publish, options.dry_run, options.force);

        let lock = if options.dry_run {
            None
        } else {
            Some(
                RunLock::acquire(
                    Arc::clone(&self.db),
                    RunKind::Publish,
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
        let publish = &self.config.publish;

        let candidates = self
            .selector
            .publish_candidates(&options.filter(), publish.batch_limit, &publish.retry, now)
            .await?;

        info!(
            run_id = %report.run_id,
            candidates = candidates.len(),
            dry_run = options.dry_run,
            "publish candidates selected"
        );

        let outcomes: Vec<CandidateOutcome> = stream::iter(candidates)
            .map(|candidate| self.process(candidate, options, now))
            .buffered(publish.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            report.absorb(outcome);
        }

        Ok(())
    }

    async fn process(&self, candidate: PublishCandidate, options: &RunOptions, now: i64) -> CandidateOutcome {
        let item_id = candidate.post.id.clone();
        let retry = &self.config.publish.retry;

        let dispatchable = candidate.dispatchable(options.platform.as_deref(), retry, now);
        if !candidate.targets.is_empty() && dispatchable.is_empty() {
            let mut outcome =
                CandidateOutcome::skipped(&item_id, Rejection::candidate(SkipReason::NothingToDispatch));
            if !options.dry_run {
                self.reconcile(&candidate, &mut outcome).await;
            }
            return outcome;
        }

        let mut outcome = CandidateOutcome::default();
        match validate_publish(&dispatchable, &candidate.media, now, options.force) {
            Readiness::Reject(rejection) => return CandidateOutcome::skipped(&item_id, rejection),
            Readiness::Proceed { warnings } => outcome.warn_all(&item_id, warnings),
        }

        if options.dry_run {
            for t in &dispatchable {
                outcome.plan(&item_id, &t.target.id, &t.target.platform);
            }
            outcome.skip(&item_id, Rejection::candidate(SkipReason::DryRun));
            return outcome;
        }

        let content = PublishContent::from_post(&candidate.post, &candidate.media);
        let mut attempted: HashMap<&str, TargetState> = HashMap::new();
        let mut succeeded = false;

        for t in &dispatchable {
            let target = &t.target;
            let attempts = target.attempts.saturating_add(1);
            let written_at = chrono::Utc::now().timestamp();

            match self.dispatch_target(&content, t).await {
                Ok(receipt) => {
                    match self.record_success(&target.id, &receipt, written_at).await {
                        Ok(()) => {
                            info!(
                                item_id = %item_id,
                                platform = %target.platform,
                                external_post_id = %receipt.external_post_id,
                                "target published"
                            );
                            outcome.successful += 1;
                            succeeded = true;
                            attempted.insert(&target.id, TargetState { status: TargetStatus::Published, attempts });
                        }
                        Err(e) => {
                            outcome.fail(
                                &item_id,
                                Some(&target.id),
                                Some(&target.platform),
                                format!(
                                    "published as {} but the result was not recorded: {}",
                                    receipt.external_post_id, e
                                ),
                            );
                            // The platform has the content; the item status must keep it from going out again
                            succeeded = true;
                            attempted.insert(&target.id, TargetState { status: TargetStatus::Published, attempts });
                        }
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    debug!(item_id = %item_id, platform = %target.platform, error = %message, "target failed");

                    let next_attempt_at = next_attempt(retry, attempts, written_at);
                    if let Err(write_err) = self
                        .db
                        .record_target_failure(&target.id, &message, next_attempt_at, written_at)
                        .await
                    {
                        outcome.fail(
                            &item_id,
                            Some(&target.id),
                            Some(&target.platform),
                            format!("{} (and recording the failure failed: {})", message, write_err),
                        );
                        continue;
                    }

                    attempted.insert(&target.id, TargetState { status: TargetStatus::Failed, attempts });
                    outcome.fail(&item_id, Some(&target.id), Some(&target.platform), message);
                }
            }
        }

        let states: Vec<TargetState> = candidate
            .targets
            .iter()
            .map(|t| {
                attempted.get(t.target.id.as_str()).copied().unwrap_or(TargetState {
                    status: t.target.status,
                    attempts: t.target.attempts,
                })
            })
            .collect();

        let finished_at = chrono::Utc::now().timestamp();
        let update = aggregate::resolve(candidate.post.status, &states, succeeded, &self.config.publish, finished_at);

        match self
            .db
            .update_post_outcome(&item_id, update.status, update.published_at, update.scheduled_at, finished_at)
            .await
        {
            Ok(()) => debug!(item_id = %item_id, status = %update.status, "content item aggregated"),
            Err(e) => outcome.fail(&item_id, None, None, format!("failed to record item status: {}", e)),
        }

        outcome
    }

    /// Record a publish the platform accepted, trying the write a second time
    async fn record_success(&self, target_id: &str, receipt: &PublishReceipt, now: i64) -> Result<()> {
        let first = self
            .db
            .record_target_success(target_id, &receipt.external_post_id, receipt.published_at, now)
            .await;

        match first {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(target_id, error = %e, "recording publish failed, retrying once");
                self.db
                    .record_target_success(target_id, &receipt.external_post_id, receipt.published_at, now)
                    .await
            }
        }
    }

    /// Write the status that targets settled by earlier runs imply
    ///
    /// Covers items whose aggregate write was lost: every target is done but
    /// the item was never moved off its selectable status.
    async fn reconcile(&self, candidate: &PublishCandidate, outcome: &mut CandidateOutcome) {
        let post = &candidate.post;
        let states: Vec<TargetState> = candidate
            .targets
            .iter()
            .map(|t| TargetState {
                status: t.target.status,
                attempts: t.target.attempts,
            })
            .collect();

        let now = chrono::Utc::now().timestamp();
        let mut update = aggregate::resolve(post.status, &states, false, &self.config.publish, now);
        if update.status == post.status {
            return;
        }
        if post.published_at.is_none() {
            update.published_at = candidate.targets.iter().filter_map(|t| t.target.published_at).max();
        }

        match self
            .db
            .update_post_outcome(&post.id, update.status, update.published_at, update.scheduled_at, now)
            .await
        {
            Ok(()) => info!(
                item_id = %post.id,
                from = %post.status,
                to = %update.status,
                "content item status reconciled from settled targets"
            ),
            Err(e) => outcome.fail(&post.id, None, None, format!("failed to record item status: {}", e)),
        }
    }

    async fn dispatch_target(&self, content: &PublishContent, t: &TargetWithAccount) -> Result<PublishReceipt> {
        let adapter = self.registry.resolve(&t.target.platform)?;
        let timeout = self.config.publish.adapter_timeout;

        match tokio::time::timeout(
            timeout,
            adapter.publish(content, &t.account.credentials, &t.account.options),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Timeout(format!(
                "{} publish timed out after {}",
                t.target.platform,
                humantime::format_duration(timeout)
            ))
            .into()),
        }
    }
}

/// When a target that just failed may go out again, if at all
pub fn next_attempt(retry: &RetryConfig, attempts: u32, now: i64) -> Option<i64> {
    if !retry.enabled() || attempts >= retry.max_attempts {
        return None;
    }
    let delay = i64::try_from(retry.delay.as_secs()).unwrap_or(i64::MAX);
    Some(now.saturating_add(delay))
}

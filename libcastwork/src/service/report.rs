//! Run summary and its log records
//!
//! Each candidate produces a [`CandidateOutcome`]; the run folds them into a
//! [`RunReport`] in selection order. The report is what the binaries print
//! and what ends up in the log sink: one record per run plus one line per
//! failure.

use serde::Serialize;
use std::fmt::{self, Write as _};
use std::time::Instant;
use tracing::{error, info};

use super::validation::{Rejection, SkipReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Publish,
    Analytics,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Analytics => "analytics",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEntry {
    pub item_id: String,
    pub target_id: Option<String>,
    pub platform: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipEntry {
    pub item_id: String,
    pub target_id: Option<String>,
    pub platform: Option<String>,
    pub reason: SkipReason,
}

/// A dispatch a dry run would have made
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedEntry {
    pub item_id: String,
    pub target_id: String,
    pub platform: String,
}

/// Everything one candidate contributed to the run
#[derive(Debug, Default)]
pub struct CandidateOutcome {
    pub successful: usize,
    pub failures: Vec<FailureEntry>,
    pub skips: Vec<SkipEntry>,
    pub planned: Vec<PlannedEntry>,
    pub warnings: Vec<String>,
}

impl CandidateOutcome {
    pub fn skipped(item_id: &str, rejection: Rejection) -> Self {
        let mut outcome = Self::default();
        outcome.skip(item_id, rejection);
        outcome
    }

    pub fn skip(&mut self, item_id: &str, rejection: Rejection) {
        self.skips.push(SkipEntry {
            item_id: item_id.to_string(),
            target_id: rejection.target_id,
            platform: rejection.platform,
            reason: rejection.reason,
        });
    }

    pub fn fail(&mut self, item_id: &str, target_id: Option<&str>, platform: Option<&str>, error: String) {
        self.failures.push(FailureEntry {
            item_id: item_id.to_string(),
            target_id: target_id.map(str::to_string),
            platform: platform.map(str::to_string),
            error,
        });
    }

    pub fn plan(&mut self, item_id: &str, target_id: &str, platform: &str) {
        self.planned.push(PlannedEntry {
            item_id: item_id.to_string(),
            target_id: target_id.to_string(),
            platform: platform.to_string(),
        });
    }

    /// Record forced-through rejections as warnings
    pub fn warn_all(&mut self, item_id: &str, warnings: Vec<Rejection>) {
        self.warnings
            .extend(warnings.into_iter().map(|w| format!("{} {} (forced)", item_id, w)));
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub kind: RunKind,
    pub dry_run: bool,
    pub force: bool,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub duration_ms: u64,
    /// Candidates selected by the run
    pub candidates: usize,
    /// `successful + failed + skipped`; publish outcomes count per target, so
    /// this can exceed `candidates`
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<FailureEntry>,
    pub skips: Vec<SkipEntry>,
    pub planned: Vec<PlannedEntry>,
    pub warnings: Vec<String>,
    #[serde(skip)]
    clock: Instant,
}

impl RunReport {
    pub fn new(kind: RunKind, dry_run: bool, force: bool) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            kind,
            dry_run,
            force,
            started_at: chrono::Utc::now().timestamp(),
            finished_at: None,
            duration_ms: 0,
            candidates: 0,
            total: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            failures: Vec::new(),
            skips: Vec::new(),
            planned: Vec::new(),
            warnings: Vec::new(),
            clock: Instant::now(),
        }
    }

    pub fn absorb(&mut self, outcome: CandidateOutcome) {
        self.candidates += 1;
        self.successful += outcome.successful;
        self.failed += outcome.failures.len();
        self.skipped += outcome.skips.len();
        self.failures.extend(outcome.failures);
        self.skips.extend(outcome.skips);
        self.planned.extend(outcome.planned);
        self.warnings.extend(outcome.warnings);
    }

    pub fn finish(&mut self) {
        self.total = self.successful + self.failed + self.skipped;
        self.finished_at = Some(chrono::Utc::now().timestamp());
        self.duration_ms = u64::try_from(self.clock.elapsed().as_millis()).unwrap_or(u64::MAX);
    }

    /// Skips alone never fail a run
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Write the run to the log sink
    pub fn emit(&self) {
        for failure in &self.failures {
            error!(
                run_id = %self.run_id,
                kind = %self.kind,
                item_id = %failure.item_id,
                platform = failure.platform.as_deref().unwrap_or("-"),
                error = %failure.error,
                "dispatch failed"
            );
        }

        for skip in &self.skips {
            info!(
                run_id = %self.run_id,
                kind = %self.kind,
                item_id = %skip.item_id,
                platform = skip.platform.as_deref().unwrap_or("-"),
                reason = %skip.reason,
                "candidate skipped"
            );
        }

        let failures = serde_json::to_string(&self.failures).unwrap_or_default();
        if self.is_success() {
            info!(
                run_id = %self.run_id,
                kind = %self.kind,
                total = self.total,
                successful = self.successful,
                failed = self.failed,
                skipped = self.skipped,
                duration_ms = self.duration_ms,
                dry_run = self.dry_run,
                failures = %failures,
                "run finished"
            );
        } else {
            error!(
                run_id = %self.run_id,
                kind = %self.kind,
                total = self.total,
                successful = self.successful,
                failed = self.failed,
                skipped = self.skipped,
                duration_ms = self.duration_ms,
                dry_run = self.dry_run,
                failures = %failures,
                "run finished with failures"
            );
        }
    }

    /// Machine-readable report for `--format json`
    pub fn render_json(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|e| format!("{{\"error\":\"report serialization failed: {}\"}}", e))
    }

    /// Human-readable summary for the terminal
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let mode = if self.dry_run { " (dry run)" } else { "" };
        let _ = writeln!(
            out,
            "{} run{} finished: total={} successful={} failed={} skipped={} (candidates={}, {}ms)",
            self.kind,
            mode,
            self.total,
            self.successful,
            self.failed,
            self.skipped,
            self.candidates,
            self.duration_ms
        );

        for failure in &self.failures {
            let _ = writeln!(
                out,
                "  FAILED  {} {}: {}",
                failure.item_id,
                failure.platform.as_deref().unwrap_or("-"),
                failure.error
            );
        }
        for skip in &self.skips {
            let _ = writeln!(
                out,
                "  SKIPPED {} {}: {}",
                skip.item_id,
                skip.platform.as_deref().unwrap_or("-"),
                skip.reason
            );
        }
        for planned in &self.planned {
            let _ = writeln!(out, "  PLANNED {} {}", planned.item_id, planned.platform);
        }
        for warning in &self.warnings {
            let _ = writeln!(out, "  WARNING {}", warning);
        }

        out
    }
}

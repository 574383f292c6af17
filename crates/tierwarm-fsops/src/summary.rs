//! Per-run counters surfaced to the log, JSON output and metrics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::executor::{TransferOutcome, TransferReport};

/// Counters for one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseSummary {
    /// Items copied with the source kept.
    pub copied: u64,
    /// Items copied, verified and removed from the source tier.
    pub moved: u64,
    /// Items already on the destination tier.
    pub skipped_present: u64,
    /// Items dropped by the space budget.
    pub skipped_budget: u64,
    /// Items excluded (in use or matching an exclusion glob).
    pub skipped_excluded: u64,
    /// Items whose transfer or verification failed.
    pub failed: u64,
    /// Media bytes transferred.
    pub bytes: u64,
    /// Companion files transferred.
    pub sidecars_copied: u64,
    /// Companion files that failed.
    pub sidecars_failed: u64,
}

impl PhaseSummary {
    /// Fold one item report into the counters.
    pub fn record(&mut self, report: &TransferReport) {
        match report.outcome {
            TransferOutcome::Copied => self.copied += 1,
            TransferOutcome::Moved => self.moved += 1,
            TransferOutcome::SkippedAlreadyPresent => self.skipped_present += 1,
            TransferOutcome::SkippedOutOfBudget => self.skipped_budget += 1,
            TransferOutcome::SkippedExcluded => self.skipped_excluded += 1,
            TransferOutcome::Failed => self.failed += 1,
        }
        self.bytes += report.bytes;
        self.sidecars_copied += report.sidecars_copied;
        self.sidecars_failed += report.sidecars_failed;
    }

    /// Count for a single outcome.
    #[must_use]
    pub const fn count(&self, outcome: TransferOutcome) -> u64 {
        match outcome {
            TransferOutcome::Copied => self.copied,
            TransferOutcome::Moved => self.moved,
            TransferOutcome::SkippedAlreadyPresent => self.skipped_present,
            TransferOutcome::SkippedOutOfBudget => self.skipped_budget,
            TransferOutcome::SkippedExcluded => self.skipped_excluded,
            TransferOutcome::Failed => self.failed,
        }
    }

    /// Items that reached the destination tier this run.
    #[must_use]
    pub const fn transferred(&self) -> u64 {
        self.copied + self.moved
    }
}

/// How the run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Disposition {
    /// Every phase ran (individual items may still have failed).
    Completed,
    /// The run stopped before any transfer.
    Aborted {
        /// Stable abort reason.
        reason: String,
    },
}

impl Disposition {
    /// Whether the run stopped before transferring.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Aggregate result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Identifier shared with every log line of the run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether no tier was mutated.
    pub dry_run: bool,
    /// Completed or aborted.
    pub disposition: Disposition,
    /// Warm phase counters.
    pub warm: PhaseSummary,
    /// Demote phase counters, when the phase ran.
    pub demote: Option<PhaseSummary>,
    /// Orphaned sidecars relocated to the array.
    pub orphans_relocated: u64,
    /// Candidates dropped because they could not be mapped onto a tier.
    pub dropped_untranslatable: u64,
}

impl RunSummary {
    /// Start an empty summary.
    #[must_use]
    pub fn start(run_id: Uuid, dry_run: bool) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            disposition: Disposition::Completed,
            warm: PhaseSummary::default(),
            demote: None,
            orphans_relocated: 0,
            dropped_untranslatable: 0,
        }
    }

    /// Mark the run aborted with `reason`.
    pub fn abort(&mut self, reason: &str) {
        self.disposition = Disposition::Aborted {
            reason: reason.to_string(),
        };
    }

    /// Stamp the finish time.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: TransferOutcome, bytes: u64) -> TransferReport {
        TransferReport {
            outcome,
            bytes,
            sidecars_copied: 1,
            sidecars_failed: 0,
        }
    }

    #[test]
    fn phase_summary_counts_outcomes() {
        let mut phase = PhaseSummary::default();
        phase.record(&report(TransferOutcome::Copied, 10));
        phase.record(&report(TransferOutcome::Moved, 20));
        phase.record(&report(TransferOutcome::Failed, 0));
        phase.record(&report(TransferOutcome::SkippedOutOfBudget, 0));

        assert_eq!(phase.transferred(), 2);
        assert_eq!(phase.count(TransferOutcome::Failed), 1);
        assert_eq!(phase.skipped_budget, 1);
        assert_eq!(phase.bytes, 30);
        assert_eq!(phase.sidecars_copied, 4);
    }

    #[test]
    fn summary_serializes_disposition_with_reason() -> Result<(), serde_json::Error> {
        let mut summary = RunSummary::start(Uuid::nil(), true);
        summary.abort("insufficient_space");
        summary.finish();

        let value = serde_json::to_value(&summary)?;
        assert_eq!(value["disposition"]["status"], "aborted");
        assert_eq!(value["disposition"]["reason"], "insufficient_space");
        assert_eq!(value["warm"]["copied"], 0);
        assert!(value["demote"].is_null());
        assert!(summary.disposition.is_aborted());
        assert!(summary.finished_at.is_some());
        Ok(())
    }
}

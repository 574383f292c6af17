//! Per-item copy, verify and conditional source removal.
//!
//! # Design
//! - Each item walks `Pending -> Copying -> Verifying -> DeletingSource|Keeping -> Done`,
//!   or ends in `Failed`. The source is only removed after a passed verify.
//! - Sidecars ride along with their media item; their failures are counted, never escalated.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::budget::CandidateItem;
use crate::copier::{CopyMode, Copier};
use crate::error::{FsOpsError, FsOpsResult};
use crate::exclude::{ExclusionReason, Exclusions};
use crate::ownership::DirectoryPolicy;
use crate::paths::{Phase, TierRoots};
use crate::sidecar::SidecarResolver;

/// States of the per-item transfer machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Preconditions not yet checked.
    Pending,
    /// Copy capability running.
    Copying,
    /// Comparing source and destination.
    Verifying,
    /// Removing the verified source.
    DeletingSource,
    /// Leaving the source in place.
    Keeping,
    /// Finished.
    Done,
    /// Gave up; the source is untouched.
    Failed,
}

impl TransferState {
    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Copying => "copying",
            Self::Verifying => "verifying",
            Self::DeletingSource => "deleting_source",
            Self::Keeping => "keeping",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether the machine may move from `self` to `next`.
    ///
    /// `Pending -> DeletingSource` completes a move whose copy already
    /// verified in an earlier run; `Copying -> Done` is the dry-run path.
    #[must_use]
    pub const fn allows(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending,
                Self::Copying | Self::DeletingSource | Self::Keeping | Self::Done | Self::Failed
            ) | (Self::Copying, Self::Verifying | Self::Done | Self::Failed)
                | (
                    Self::Verifying,
                    Self::DeletingSource | Self::Keeping | Self::Failed
                )
                | (Self::DeletingSource | Self::Keeping, Self::Done)
        )
    }
}

/// Final classification of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferOutcome {
    /// Copied and verified; source kept.
    Copied,
    /// Copied, verified and source removed.
    Moved,
    /// Destination already holds the file.
    SkippedAlreadyPresent,
    /// Did not fit the space budget.
    SkippedOutOfBudget,
    /// In use or matched an exclusion.
    SkippedExcluded,
    /// Copy or verification failed; source untouched.
    Failed,
}

impl TransferOutcome {
    /// Every outcome, in reporting order.
    pub const ALL: [Self; 6] = [
        Self::Copied,
        Self::Moved,
        Self::SkippedAlreadyPresent,
        Self::SkippedOutOfBudget,
        Self::SkippedExcluded,
        Self::Failed,
    ];

    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Copied => "copied",
            Self::Moved => "moved",
            Self::SkippedAlreadyPresent => "skipped_present",
            Self::SkippedOutOfBudget => "skipped_budget",
            Self::SkippedExcluded => "skipped_excluded",
            Self::Failed => "failed",
        }
    }
}

/// Result of executing one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    /// Final outcome.
    pub outcome: TransferOutcome,
    /// Media bytes transferred (or that would be, in dry-run mode).
    pub bytes: u64,
    /// Sidecars transferred.
    pub sidecars_copied: u64,
    /// Sidecars that failed.
    pub sidecars_failed: u64,
}

impl TransferReport {
    /// Report with no bytes and no sidecars.
    #[must_use]
    pub const fn bare(outcome: TransferOutcome) -> Self {
        Self {
            outcome,
            bytes: 0,
            sidecars_copied: 0,
            sidecars_failed: 0,
        }
    }
}

/// What the executor would do with an item before copying anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precheck {
    /// Needs a copy (and budget).
    Proceed,
    /// Must not be touched.
    Excluded(ExclusionReason),
    /// Destination already holds it; no space needed.
    AlreadyPlaced,
}

/// Per-phase executor switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Phase label for logs.
    pub phase: Phase,
    /// Remove the source after a verified copy.
    pub move_source: bool,
    /// Carry companion files.
    pub sidecars: bool,
    /// Report without mutating.
    pub dry_run: bool,
}

/// Runs the transfer state machine for one item at a time.
pub struct TransferExecutor<'a> {
    copier: &'a dyn Copier,
    directories: &'a DirectoryPolicy,
    sidecars: &'a SidecarResolver,
    exclusions: &'a Exclusions,
    roots: &'a TierRoots,
    options: ExecutorOptions,
}

impl<'a> TransferExecutor<'a> {
    /// Assemble an executor from its collaborators.
    #[must_use]
    pub const fn new(
        copier: &'a dyn Copier,
        directories: &'a DirectoryPolicy,
        sidecars: &'a SidecarResolver,
        exclusions: &'a Exclusions,
        roots: &'a TierRoots,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            copier,
            directories,
            sidecars,
            exclusions,
            roots,
            options,
        }
    }

    /// Classify an item without side effects.
    #[must_use]
    pub fn precheck(&self, item: &CandidateItem) -> Precheck {
        if let Some(reason) = self.exclusions.check(item) {
            return Precheck::Excluded(reason);
        }
        let destination_len = file_len(&item.destination_path);
        match fs::metadata(&item.source_path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound && destination_len.is_some() => {
                Precheck::AlreadyPlaced
            }
            Ok(meta) if meta.is_file() && destination_len == Some(meta.len()) => {
                Precheck::AlreadyPlaced
            }
            _ => Precheck::Proceed,
        }
    }

    /// Drive one item through the state machine.
    pub fn execute(&self, item: &CandidateItem) -> TransferReport {
        let mut machine = Machine::new(self.options.phase, &item.source_path);
        let report = self.run(item, &mut machine);
        let phase = self.options.phase.as_str();
        match report.outcome {
            TransferOutcome::Failed => warn!(
                phase,
                path = %item.source_path.display(),
                destination = %item.destination_path.display(),
                "transfer failed; source left in place"
            ),
            outcome => info!(
                phase,
                outcome = outcome.as_str(),
                path = %item.source_path.display(),
                destination = %item.destination_path.display(),
                bytes = report.bytes,
                sidecars = report.sidecars_copied,
                dry_run = self.options.dry_run,
                "transfer finished"
            ),
        }
        report
    }

    /// Record an item the planner could not fit.
    #[must_use]
    pub fn skip_out_of_budget(&self, item: &CandidateItem) -> TransferReport {
        info!(
            phase = self.options.phase.as_str(),
            path = %item.source_path.display(),
            size_bytes = item.size_bytes,
            "item skipped; outside space budget"
        );
        TransferReport::bare(TransferOutcome::SkippedOutOfBudget)
    }

    fn run(&self, item: &CandidateItem, machine: &mut Machine<'_>) -> TransferReport {
        let phase = self.options.phase.as_str();
        if let Some(reason) = self.exclusions.check(item) {
            info!(
                phase,
                path = %item.source_path.display(),
                reason = reason.as_str(),
                "item excluded"
            );
            return TransferReport::bare(TransferOutcome::SkippedExcluded);
        }

        let source_len = match fs::metadata(&item.source_path) {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => {
                let err = FsOpsError::Unsupported {
                    operation: "transfer.source",
                    value: Some("not_a_regular_file".to_string()),
                };
                return machine.fail(&err);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if item.destination_path.exists() {
                    machine.advance(TransferState::Done);
                    return TransferReport::bare(TransferOutcome::SkippedAlreadyPresent);
                }
                return machine.fail(&FsOpsError::io("transfer.stat_source", &item.source_path, err));
            }
            Err(err) => {
                return machine.fail(&FsOpsError::io("transfer.stat_source", &item.source_path, err));
            }
        };

        if file_len(&item.destination_path) == Some(source_len) {
            debug!(phase, path = %item.destination_path.display(), "destination already holds item");
            return self.complete_placed(item, machine);
        }

        machine.advance(TransferState::Copying);
        if !self.options.dry_run
            && let Err(err) = self.directories.ensure_parent(&item.destination_path)
        {
            return machine.fail(&err);
        }
        let mode = if self.options.dry_run {
            CopyMode::DryRun
        } else {
            CopyMode::Standard
        };
        if let Err(err) = self
            .copier
            .copy(&item.source_path, &item.destination_path, mode)
        {
            return machine.fail(&err);
        }

        if self.options.dry_run {
            let (sidecars_copied, sidecars_failed) = self.transfer_sidecars(item);
            machine.advance(TransferState::Done);
            return TransferReport {
                outcome: self.success_outcome(),
                bytes: source_len,
                sidecars_copied,
                sidecars_failed,
            };
        }

        machine.advance(TransferState::Verifying);
        if let Err(err) = self.verify(item, source_len) {
            return machine.fail(&err);
        }

        let (sidecars_copied, sidecars_failed) = self.transfer_sidecars(item);
        let outcome = self.release_source(item, machine);
        TransferReport {
            outcome,
            bytes: source_len,
            sidecars_copied,
            sidecars_failed,
        }
    }

    fn success_outcome(&self) -> TransferOutcome {
        if self.options.move_source {
            TransferOutcome::Moved
        } else {
            TransferOutcome::Copied
        }
    }

    /// Destination already matches the source: finish an interrupted move or skip.
    fn complete_placed(&self, item: &CandidateItem, machine: &mut Machine<'_>) -> TransferReport {
        if !self.options.move_source {
            machine.advance(TransferState::Done);
            return TransferReport::bare(TransferOutcome::SkippedAlreadyPresent);
        }
        let (sidecars_copied, sidecars_failed) = self.transfer_sidecars(item);
        let outcome = if self.options.dry_run {
            machine.advance(TransferState::Done);
            TransferOutcome::Moved
        } else {
            self.release_source(item, machine)
        };
        TransferReport {
            outcome: if outcome == TransferOutcome::Copied {
                TransferOutcome::SkippedAlreadyPresent
            } else {
                outcome
            },
            bytes: 0,
            sidecars_copied,
            sidecars_failed,
        }
    }

    fn verify(&self, item: &CandidateItem, source_len: u64) -> FsOpsResult<()> {
        let copied = file_len(&item.destination_path);
        if copied == Some(source_len) {
            return Ok(());
        }
        debug!(
            path = %item.destination_path.display(),
            expected = source_len,
            actual = ?copied,
            "size mismatch after copy; retrying with checksum"
        );
        self.copier
            .copy(&item.source_path, &item.destination_path, CopyMode::Checksum)?;
        let retried = file_len(&item.destination_path);
        if retried == Some(source_len) {
            Ok(())
        } else {
            Err(FsOpsError::InvalidInput {
                field: "destination",
                reason: "size_mismatch_after_retry",
                value: Some(item.destination_path.to_string_lossy().into_owned()),
            })
        }
    }

    fn release_source(&self, item: &CandidateItem, machine: &mut Machine<'_>) -> TransferOutcome {
        if !self.options.move_source {
            machine.advance(TransferState::Keeping);
            machine.advance(TransferState::Done);
            return TransferOutcome::Copied;
        }
        machine.advance(TransferState::DeletingSource);
        let outcome = match fs::remove_file(&item.source_path) {
            Ok(()) => {
                self.remove_empty_parent(&item.source_path);
                TransferOutcome::Moved
            }
            Err(err) => {
                warn!(
                    path = %item.source_path.display(),
                    error = %err,
                    "source removal failed; verified copy kept on both tiers"
                );
                TransferOutcome::Copied
            }
        };
        machine.advance(TransferState::Done);
        outcome
    }

    fn remove_empty_parent(&self, path: &Path) {
        let Some(parent) = path.parent() else {
            return;
        };
        if self.roots.is_root(parent) {
            return;
        }
        if let Err(err) = fs::remove_dir(parent) {
            debug!(path = %parent.display(), error = %err, "source directory kept");
        }
    }

    fn transfer_sidecars(&self, item: &CandidateItem) -> (u64, u64) {
        if !self.options.sidecars {
            return (0, 0);
        }
        let found = match self.sidecars.resolve(&item.source_path) {
            Ok(found) => found,
            Err(err) => {
                warn!(path = %item.source_path.display(), error = ?err, "sidecar lookup failed");
                return (0, 1);
            }
        };
        let Some(destination_dir) = item.destination_path.parent() else {
            return (0, 0);
        };

        let mut copied = 0;
        let mut failed = 0;
        for sidecar in found {
            let Some(name) = sidecar.file_name() else {
                continue;
            };
            let destination = destination_dir.join(name);
            match self.transfer_sidecar(&sidecar, &destination) {
                Ok(()) => {
                    debug!(path = %sidecar.display(), "sidecar transferred");
                    copied += 1;
                }
                Err(err) => {
                    warn!(path = %sidecar.display(), error = ?err, "sidecar transfer failed");
                    failed += 1;
                }
            }
        }
        (copied, failed)
    }

    fn transfer_sidecar(&self, source: &Path, destination: &Path) -> FsOpsResult<()> {
        let expected = fs::metadata(source)
            .map(|meta| meta.len())
            .map_err(|err| FsOpsError::io("sidecar.stat", source, err))?;
        if self.options.dry_run {
            self.copier.copy(source, destination, CopyMode::DryRun)?;
            return Ok(());
        }
        if file_len(destination) != Some(expected) {
            self.copier.copy(source, destination, CopyMode::Standard)?;
            if file_len(destination) != Some(expected) {
                return Err(FsOpsError::InvalidInput {
                    field: "sidecar",
                    reason: "size_mismatch",
                    value: Some(destination.to_string_lossy().into_owned()),
                });
            }
        }
        if self.options.move_source {
            fs::remove_file(source).map_err(|err| FsOpsError::io("sidecar.remove_source", source, err))?;
        }
        Ok(())
    }
}

/// Tracks and logs state transitions for one item.
struct Machine<'p> {
    phase: Phase,
    path: &'p Path,
    state: TransferState,
}

impl<'p> Machine<'p> {
    const fn new(phase: Phase, path: &'p Path) -> Self {
        Self {
            phase,
            path,
            state: TransferState::Pending,
        }
    }

    fn advance(&mut self, next: TransferState) {
        debug_assert!(
            self.state.allows(next),
            "illegal transition {} -> {}",
            self.state.as_str(),
            next.as_str()
        );
        debug!(
            phase = self.phase.as_str(),
            path = %self.path.display(),
            from = self.state.as_str(),
            to = next.as_str(),
            "transfer state changed"
        );
        self.state = next;
    }

    fn fail(&mut self, err: &FsOpsError) -> TransferReport {
        warn!(
            phase = self.phase.as_str(),
            path = %self.path.display(),
            state = self.state.as_str(),
            error = ?err,
            "transfer step failed"
        );
        self.advance(TransferState::Failed);
        TransferReport::bare(TransferOutcome::Failed)
    }
}

fn file_len(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(fs::Metadata::is_file)
        .map(|meta| meta.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_machine() {
        use TransferState::{Copying, DeletingSource, Done, Failed, Keeping, Pending, Verifying};
        assert!(Pending.allows(Copying));
        assert!(Copying.allows(Verifying));
        assert!(Verifying.allows(DeletingSource));
        assert!(Verifying.allows(Keeping));
        assert!(DeletingSource.allows(Done));
        assert!(Verifying.allows(Failed));
        assert!(!Copying.allows(DeletingSource));
        assert!(!Failed.allows(DeletingSource));
        assert!(!Done.allows(Copying));
        assert!(!Keeping.allows(Failed));
    }

    #[test]
    fn outcome_labels_are_unique() {
        let mut labels: Vec<_> = TransferOutcome::ALL.iter().map(|o| o.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), TransferOutcome::ALL.len());
    }
}

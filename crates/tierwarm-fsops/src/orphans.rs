//! Relocation of sidecars stranded on the cache tier.
//!
//! # Design
//! - Runs after the demote pass; a sidecar is orphaned when no media file with
//!   a matching stem sits next to it on the cache tier.
//! - Failures are logged per file and never stop the pass.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::copier::{CopyMode, Copier};
use crate::error::{FsOpsError, FsOpsResult};
use crate::ownership::DirectoryPolicy;
use crate::paths::TierRoots;
use crate::sidecar::{SidecarResolver, owner_stem};

/// Counts from one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Orphans moved to the array tier.
    pub relocated: u64,
    /// Orphans that could not be moved.
    pub failed: u64,
}

/// Moves orphaned cache sidecars to their array equivalents.
pub struct OrphanReconciler<'a> {
    roots: &'a TierRoots,
    copier: &'a dyn Copier,
    directories: &'a DirectoryPolicy,
    sidecars: &'a SidecarResolver,
    dry_run: bool,
}

impl<'a> OrphanReconciler<'a> {
    /// Assemble a reconciler.
    #[must_use]
    pub const fn new(
        roots: &'a TierRoots,
        copier: &'a dyn Copier,
        directories: &'a DirectoryPolicy,
        sidecars: &'a SidecarResolver,
        dry_run: bool,
    ) -> Self {
        Self {
            roots,
            copier,
            directories,
            sidecars,
            dry_run,
        }
    }

    /// Scan each library root on the cache tier and relocate orphans.
    ///
    /// Roots outside the cache tier or missing on disk are skipped. An empty
    /// root list is a no-op.
    pub fn reconcile(&self, library_roots: &[PathBuf]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for root in library_roots {
            if self.roots.to_array(root).is_none() {
                warn!(path = %root.display(), "orphan root outside cache tier; skipped");
                continue;
            }
            if !root.is_dir() {
                debug!(path = %root.display(), "orphan root missing; skipped");
                continue;
            }
            for orphan in self.find_orphans(root) {
                match self.relocate(&orphan) {
                    Ok(()) => report.relocated += 1,
                    Err(err) => {
                        warn!(path = %orphan.display(), error = ?err, "orphan relocation failed");
                        report.failed += 1;
                    }
                }
            }
        }
        if report.relocated > 0 || report.failed > 0 {
            info!(
                relocated = report.relocated,
                failed = report.failed,
                dry_run = self.dry_run,
                "orphan reconciliation finished"
            );
        }
        report
    }

    fn find_orphans(&self, root: &Path) -> Vec<PathBuf> {
        let mut orphans = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let err = FsOpsError::walkdir("orphans.walk", root, err);
                    warn!(path = %root.display(), error = ?err, "orphan scan entry skipped");
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_file() && self.sidecars.is_sidecar(path) && !self.has_owner(path)
            {
                orphans.push(path.to_path_buf());
            }
        }
        orphans
    }

    fn has_owner(&self, sidecar: &Path) -> bool {
        let Some(dir) = sidecar.parent() else {
            return false;
        };
        let Ok(media_stems) = self.sidecars.media_stems(dir) else {
            return true;
        };
        owner_stem(sidecar, &media_stems).is_some()
    }

    fn relocate(&self, orphan: &Path) -> FsOpsResult<()> {
        let destination = self.roots.to_array(orphan).ok_or_else(|| FsOpsError::InvalidInput {
            field: "orphan",
            reason: "outside_cache_tier",
            value: Some(orphan.to_string_lossy().into_owned()),
        })?;
        let expected = fs::metadata(orphan)
            .map(|meta| meta.len())
            .map_err(|err| FsOpsError::io("orphans.stat", orphan, err))?;

        if self.dry_run {
            self.copier.copy(orphan, &destination, CopyMode::DryRun)?;
            info!(
                path = %orphan.display(),
                destination = %destination.display(),
                dry_run = true,
                "orphan sidecar relocated"
            );
            return Ok(());
        }

        let present = fs::metadata(&destination).map(|meta| meta.len()).ok();
        if present != Some(expected) {
            self.directories.ensure_parent(&destination)?;
            self.copier.copy(orphan, &destination, CopyMode::Standard)?;
            let copied = fs::metadata(&destination).map(|meta| meta.len()).ok();
            if copied != Some(expected) {
                return Err(FsOpsError::InvalidInput {
                    field: "orphan",
                    reason: "size_mismatch",
                    value: Some(destination.to_string_lossy().into_owned()),
                });
            }
        }
        fs::remove_file(orphan).map_err(|err| FsOpsError::io("orphans.remove", orphan, err))?;
        info!(
            path = %orphan.display(),
            destination = %destination.display(),
            "orphan sidecar relocated"
        );
        Ok(())
    }
}

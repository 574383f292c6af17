use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use tierwarm_fsops::{
    CandidateItem, CopyMode, CopyReport, Copier, DirectoryPolicy, ExclusionReason, Exclusions,
    ExecutorOptions, FsOpsError, FsOpsResult, NativeCopier, OrphanReconciler, Phase, Precheck,
    SidecarResolver, TierRoots, TransferExecutor, TransferOutcome,
};
use tierwarm_test_support::TierFixture;

/// In-memory copy capability with injectable faults.
#[derive(Default)]
struct FakeCopier {
    truncate_standard: bool,
    truncate_checksum: bool,
    fail_extension: Option<&'static str>,
    calls: Mutex<Vec<(PathBuf, CopyMode)>>,
}

impl FakeCopier {
    fn modes(&self) -> Vec<CopyMode> {
        self.calls
            .lock()
            .map(|calls| calls.iter().map(|(_, mode)| *mode).collect())
            .unwrap_or_default()
    }
}

impl Copier for FakeCopier {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn copy(&self, source: &Path, destination: &Path, mode: CopyMode) -> FsOpsResult<CopyReport> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((source.to_path_buf(), mode));
        }
        if self
            .fail_extension
            .is_some_and(|ext| source.extension().is_some_and(|found| found == ext))
        {
            return Err(FsOpsError::CopyFailed {
                program: PathBuf::from("fake"),
                status: Some(1),
                stderr: "injected".to_string(),
            });
        }
        let mut payload =
            fs::read(source).map_err(|err| FsOpsError::Io {
                operation: "fake.read",
                path: source.to_path_buf(),
                source: err,
            })?;
        let len = payload.len() as u64;
        if mode == CopyMode::DryRun {
            return Ok(CopyReport { bytes: len });
        }
        let truncate = match mode {
            CopyMode::Standard => self.truncate_standard,
            CopyMode::Checksum => self.truncate_checksum,
            CopyMode::DryRun => false,
        };
        if truncate {
            payload.truncate(payload.len() / 2);
        }
        fs::write(destination, &payload).map_err(|err| FsOpsError::Io {
            operation: "fake.write",
            path: destination.to_path_buf(),
            source: err,
        })?;
        Ok(CopyReport {
            bytes: payload.len() as u64,
        })
    }
}

struct Harness {
    fixture: TierFixture,
    roots: TierRoots,
    directories: DirectoryPolicy,
    sidecars: SidecarResolver,
    exclusions: Exclusions,
}

impl Harness {
    fn new() -> Result<Self> {
        let fixture = TierFixture::new()?;
        let roots = TierRoots::new(fixture.array_root(), fixture.cache_root(), None)?;
        Ok(Self {
            fixture,
            roots,
            directories: DirectoryPolicy::default(),
            sidecars: SidecarResolver::new(
                &["srt".to_string(), "nfo".to_string()],
                &["mkv".to_string(), "mp4".to_string()],
            ),
            exclusions: Exclusions::default(),
        })
    }

    fn executor<'a>(&'a self, copier: &'a dyn Copier, options: ExecutorOptions) -> TransferExecutor<'a> {
        TransferExecutor::new(
            copier,
            &self.directories,
            &self.sidecars,
            &self.exclusions,
            &self.roots,
            options,
        )
    }

    fn warm_item(&self, relative: &str) -> CandidateItem {
        let source = self.fixture.array(relative);
        let size_bytes = fs::metadata(&source).map(|meta| meta.len()).unwrap_or(0);
        CandidateItem {
            foreign_path: PathBuf::from("/data").join(relative),
            source_path: source,
            destination_path: self.fixture.cache(relative),
            size_bytes,
        }
    }
}

const fn warm(move_source: bool) -> ExecutorOptions {
    ExecutorOptions {
        phase: Phase::Warm,
        move_source,
        sidecars: true,
        dry_run: false,
    }
}

#[test]
fn copy_then_rerun_is_idempotent() -> Result<()> {
    let harness = Harness::new()?;
    harness.fixture.put_array("movies/Heat/Heat.mkv", 4096)?;
    let item = harness.warm_item("movies/Heat/Heat.mkv");
    let copier = NativeCopier::default();
    let executor = harness.executor(&copier, warm(false));

    let first = executor.execute(&item);
    assert_eq!(first.outcome, TransferOutcome::Copied);
    assert_eq!(first.bytes, 4096);
    assert!(item.source_path.exists());
    assert_eq!(fs::metadata(&item.destination_path)?.len(), 4096);

    assert_eq!(executor.precheck(&item), Precheck::AlreadyPlaced);
    let second = executor.execute(&item);
    assert_eq!(second.outcome, TransferOutcome::SkippedAlreadyPresent);
    assert_eq!(second.bytes, 0);
    Ok(())
}

#[test]
fn move_removes_source_and_empty_parent() -> Result<()> {
    let harness = Harness::new()?;
    harness.fixture.put_array("movies/Heat/Heat.mkv", 2048)?;
    let item = harness.warm_item("movies/Heat/Heat.mkv");
    let copier = FakeCopier::default();

    let report = harness.executor(&copier, warm(true)).execute(&item);
    assert_eq!(report.outcome, TransferOutcome::Moved);
    assert!(!item.source_path.exists());
    assert!(!harness.fixture.array("movies/Heat").exists());
    assert!(harness.fixture.array("movies").exists());
    assert_eq!(fs::metadata(&item.destination_path)?.len(), item.size_bytes);

    let rerun = harness.executor(&copier, warm(true)).execute(&item);
    assert_eq!(rerun.outcome, TransferOutcome::SkippedAlreadyPresent);
    Ok(())
}

#[test]
fn size_mismatch_retries_with_checksum() -> Result<()> {
    let harness = Harness::new()?;
    harness.fixture.put_array("tv/Show/S01E01.mkv", 1000)?;
    let item = harness.warm_item("tv/Show/S01E01.mkv");
    let copier = FakeCopier {
        truncate_standard: true,
        ..FakeCopier::default()
    };

    let report = harness.executor(&copier, warm(true)).execute(&item);
    assert_eq!(report.outcome, TransferOutcome::Moved);
    assert_eq!(copier.modes(), vec![CopyMode::Standard, CopyMode::Checksum]);
    assert_eq!(fs::metadata(&item.destination_path)?.len(), 1000);
    Ok(())
}

#[test]
fn failed_verify_never_touches_source() -> Result<()> {
    let harness = Harness::new()?;
    let source = harness.fixture.put_array("tv/Show/S01E02.mkv", 1000)?;
    let original = fs::read(&source)?;
    let item = harness.warm_item("tv/Show/S01E02.mkv");
    let copier = FakeCopier {
        truncate_standard: true,
        truncate_checksum: true,
        ..FakeCopier::default()
    };

    let report = harness.executor(&copier, warm(true)).execute(&item);
    assert_eq!(report.outcome, TransferOutcome::Failed);
    assert_eq!(fs::read(&source)?, original);
    Ok(())
}

#[test]
fn copy_failure_is_isolated_to_the_item() -> Result<()> {
    let harness = Harness::new()?;
    harness.fixture.put_array("movies/A.mkv", 10)?;
    let item = harness.warm_item("movies/A.mkv");
    let copier = FakeCopier {
        fail_extension: Some("mkv"),
        ..FakeCopier::default()
    };

    let report = harness.executor(&copier, warm(true)).execute(&item);
    assert_eq!(report.outcome, TransferOutcome::Failed);
    assert!(item.source_path.exists());
    assert!(!item.destination_path.exists());
    Ok(())
}

#[test]
fn failing_sidecar_does_not_fail_the_media_item() -> Result<()> {
    let harness = Harness::new()?;
    harness.fixture.put_array("movies/Heat/Heat.mkv", 500)?;
    harness.fixture.put_array("movies/Heat/Heat.en.srt", 20)?;
    harness.fixture.put_array("movies/Heat/Heat.nfo", 30)?;
    let item = harness.warm_item("movies/Heat/Heat.mkv");
    let copier = FakeCopier {
        fail_extension: Some("srt"),
        ..FakeCopier::default()
    };

    let report = harness.executor(&copier, warm(true)).execute(&item);
    assert_eq!(report.outcome, TransferOutcome::Moved);
    assert_eq!(report.sidecars_copied, 1);
    assert_eq!(report.sidecars_failed, 1);
    assert!(harness.fixture.cache("movies/Heat/Heat.nfo").exists());
    assert!(!harness.fixture.array("movies/Heat/Heat.nfo").exists());
    assert!(harness.fixture.array("movies/Heat/Heat.en.srt").exists());
    assert!(!item.source_path.exists());
    Ok(())
}

#[test]
fn in_use_items_are_excluded_before_copying() -> Result<()> {
    let mut harness = Harness::new()?;
    harness.fixture.put_array("tv/Live.mkv", 10)?;
    let item = harness.warm_item("tv/Live.mkv");
    harness.exclusions = Exclusions::default().with_in_use([item.destination_path.clone()]);
    let copier = FakeCopier::default();
    let executor = harness.executor(&copier, warm(true));

    assert_eq!(
        executor.precheck(&item),
        Precheck::Excluded(ExclusionReason::InUse)
    );
    let report = executor.execute(&item);
    assert_eq!(report.outcome, TransferOutcome::SkippedExcluded);
    assert!(copier.modes().is_empty());
    assert!(item.source_path.exists());
    Ok(())
}

#[test]
fn dry_run_reports_without_mutating() -> Result<()> {
    let harness = Harness::new()?;
    harness.fixture.put_array("movies/Heat/Heat.mkv", 700)?;
    harness.fixture.put_array("movies/Heat/Heat.srt", 7)?;
    let item = harness.warm_item("movies/Heat/Heat.mkv");
    let copier = FakeCopier::default();
    let options = ExecutorOptions {
        dry_run: true,
        ..warm(true)
    };

    let report = harness.executor(&copier, options).execute(&item);
    assert_eq!(report.outcome, TransferOutcome::Moved);
    assert_eq!(report.bytes, 700);
    assert_eq!(report.sidecars_copied, 1);
    assert!(item.source_path.exists());
    assert!(!harness.fixture.cache("movies").exists());
    assert!(copier.modes().iter().all(|mode| *mode == CopyMode::DryRun));
    Ok(())
}

#[test]
fn interrupted_move_is_completed_without_copying() -> Result<()> {
    let harness = Harness::new()?;
    harness.fixture.put_array("movies/B.mkv", 64)?;
    harness.fixture.put_cache("movies/B.mkv", 64)?;
    let item = harness.warm_item("movies/B.mkv");
    let copier = FakeCopier::default();

    let report = harness.executor(&copier, warm(true)).execute(&item);
    assert_eq!(report.outcome, TransferOutcome::Moved);
    assert_eq!(report.bytes, 0);
    assert!(copier.modes().is_empty());
    assert!(!item.source_path.exists());
    Ok(())
}

#[test]
fn missing_source_without_destination_fails() -> Result<()> {
    let harness = Harness::new()?;
    let item = harness.warm_item("movies/Gone.mkv");
    let copier = FakeCopier::default();
    let report = harness.executor(&copier, warm(false)).execute(&item);
    assert_eq!(report.outcome, TransferOutcome::Failed);
    Ok(())
}

#[test]
fn demote_moves_back_to_the_array() -> Result<()> {
    let harness = Harness::new()?;
    harness.fixture.put_cache("tv/Show/S02E01.mkv", 300)?;
    harness.fixture.put_cache("tv/Show/S02E01.srt", 3)?;
    let item = CandidateItem {
        foreign_path: harness.fixture.cache("tv/Show/S02E01.mkv"),
        source_path: harness.fixture.cache("tv/Show/S02E01.mkv"),
        destination_path: harness.fixture.array("tv/Show/S02E01.mkv"),
        size_bytes: 300,
    };
    let copier = NativeCopier::default();
    let options = ExecutorOptions {
        phase: Phase::Demote,
        move_source: true,
        sidecars: true,
        dry_run: false,
    };

    let report = harness.executor(&copier, options).execute(&item);
    assert_eq!(report.outcome, TransferOutcome::Moved);
    assert_eq!(report.sidecars_copied, 1);
    assert!(harness.fixture.array("tv/Show/S02E01.srt").exists());
    assert!(!harness.fixture.cache("tv/Show").exists());
    Ok(())
}

#[test]
fn demote_leaves_companions_of_longer_named_media_in_place() -> Result<()> {
    let harness = Harness::new()?;
    harness.fixture.put_cache("movies/Movie/Movie.mkv", 200)?;
    harness.fixture.put_cache("movies/Movie/Movie.srt", 4)?;
    harness.fixture.put_cache("movies/Movie/Movie.sample.mkv", 20)?;
    harness.fixture.put_cache("movies/Movie/Movie.sample.srt", 2)?;
    let item = CandidateItem {
        foreign_path: harness.fixture.cache("movies/Movie/Movie.mkv"),
        source_path: harness.fixture.cache("movies/Movie/Movie.mkv"),
        destination_path: harness.fixture.array("movies/Movie/Movie.mkv"),
        size_bytes: 200,
    };
    let copier = NativeCopier::default();
    let options = ExecutorOptions {
        phase: Phase::Demote,
        move_source: true,
        sidecars: true,
        dry_run: false,
    };

    let report = harness.executor(&copier, options).execute(&item);
    assert_eq!(report.outcome, TransferOutcome::Moved);
    assert_eq!(report.sidecars_copied, 1);
    assert!(harness.fixture.array("movies/Movie/Movie.srt").exists());
    assert!(harness.fixture.cache("movies/Movie/Movie.sample.mkv").exists());
    assert!(harness.fixture.cache("movies/Movie/Movie.sample.srt").exists());
    assert!(!harness.fixture.array("movies/Movie/Movie.sample.srt").exists());
    Ok(())
}

#[test]
fn orphaned_sidecars_are_relocated_and_owned_ones_kept() -> Result<()> {
    let harness = Harness::new()?;
    harness.fixture.put_cache("movies/Heat/Heat.en.srt", 12)?;
    harness.fixture.put_cache("movies/Alien/Alien.mkv", 100)?;
    harness.fixture.put_cache("movies/Alien/Alien.srt", 15)?;
    let copier = NativeCopier::default();
    let reconciler = OrphanReconciler::new(
        &harness.roots,
        &copier,
        &harness.directories,
        &harness.sidecars,
        false,
    );

    let report = reconciler.reconcile(&[harness.fixture.cache("movies")]);
    assert_eq!(report.relocated, 1);
    assert_eq!(report.failed, 0);
    assert!(!harness.fixture.cache("movies/Heat/Heat.en.srt").exists());
    assert_eq!(
        fs::metadata(harness.fixture.array("movies/Heat/Heat.en.srt"))?.len(),
        12
    );
    assert!(harness.fixture.cache("movies/Alien/Alien.srt").exists());
    assert!(!harness.fixture.array("movies/Alien/Alien.srt").exists());

    assert_eq!(reconciler.reconcile(&[]).relocated, 0);
    Ok(())
}

#[test]
fn orphan_dry_run_leaves_cache_untouched() -> Result<()> {
    let harness = Harness::new()?;
    harness.fixture.put_cache("tv/Show/S01E01.srt", 5)?;
    let copier = FakeCopier::default();
    let reconciler = OrphanReconciler::new(
        &harness.roots,
        &copier,
        &harness.directories,
        &harness.sidecars,
        true,
    );

    let report = reconciler.reconcile(&[harness.fixture.cache("tv"), harness.fixture.cache("missing")]);
    assert_eq!(report.relocated, 1);
    assert!(harness.fixture.cache("tv/Show/S01E01.srt").exists());
    assert!(!harness.fixture.array("tv").exists());
    Ok(())
}

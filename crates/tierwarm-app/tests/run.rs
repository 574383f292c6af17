use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tierwarm_app::{
    Cli, EXIT_ABORTED, EXIT_RAN, PathSource, RunCoordinator, RunLock, RunOutcome, StaticSource,
    execute,
};
use tierwarm_config::{RunSettings, parse_settings};
use tierwarm_fsops::{Disposition, FsOpsResult, SpaceProbe};
use tierwarm_test_support::TierFixture;
use uuid::Uuid;

struct FixedSpace(u64);

impl SpaceProbe for FixedSpace {
    fn free_bytes(&self, _path: &Path) -> FsOpsResult<u64> {
        Ok(self.0)
    }
}

fn settings(fixture: &TierFixture, extra: &str) -> Result<RunSettings> {
    let document = format!(
        "array_root: {array}\n\
         cache_root: {cache}\n\
         share_root: {share}\n\
         path_map: \"/data={share}\"\n\
         copy: {{ engine: native }}\n\
         lock_path: {lock}\n\
         {extra}\n",
        array = fixture.array_root().display(),
        cache = fixture.cache_root().display(),
        share = fixture.share_root().display(),
        lock = fixture.base().join("tierwarm.lock").display(),
    );
    Ok(parse_settings(&document, Path::new("test.yaml"))?)
}

fn coordinator(
    settings: RunSettings,
    free_bytes: u64,
    warm: &[&str],
    demote: &[&str],
    in_use: &[&str],
) -> Result<Arc<RunCoordinator>> {
    let sources: [Arc<dyn PathSource>; 3] = [
        Arc::new(StaticSource::new(warm.iter().copied())),
        Arc::new(StaticSource::new(demote.iter().copied())),
        Arc::new(StaticSource::new(in_use.iter().copied())),
    ];
    let [warm, demote, in_use] = sources;
    Ok(Arc::new(
        RunCoordinator::new(settings)?
            .with_space_probe(Arc::new(FixedSpace(free_bytes)))
            .with_sources(warm, demote, in_use),
    ))
}

#[tokio::test]
async fn greedy_budget_accepts_first_and_third_candidates() -> Result<()> {
    let fixture = TierFixture::new()?;
    fixture.put_array("movies/A/A.mkv", 40)?;
    fixture.put_array("movies/B/B.mkv", 40)?;
    fixture.put_array("movies/C/C.mkv", 10)?;
    let settings = settings(
        &fixture,
        "budget: { reserve: 10, min_free: 20, trim_on_overflow: true }",
    )?;
    let candidates = [
        "/data/movies/A/A.mkv",
        "/data/movies/B/B.mkv",
        "/data/movies/C/C.mkv",
    ];

    let summary = coordinator(settings, 100, &candidates, &[], &[])?
        .run(Uuid::new_v4())
        .await?;

    assert_eq!(summary.disposition, Disposition::Completed);
    assert_eq!(summary.warm.copied, 2);
    assert_eq!(summary.warm.skipped_budget, 1);
    assert_eq!(summary.warm.bytes, 50);
    assert!(fixture.cache("movies/A/A.mkv").exists());
    assert!(!fixture.cache("movies/B/B.mkv").exists());
    assert!(fixture.cache("movies/C/C.mkv").exists());
    assert!(fixture.array("movies/A/A.mkv").exists());
    Ok(())
}

#[tokio::test]
async fn overflow_without_trim_aborts_with_zero_transfers() -> Result<()> {
    let fixture = TierFixture::new()?;
    fixture.put_array("movies/A/A.mkv", 40)?;
    fixture.put_array("movies/B/B.mkv", 40)?;
    fixture.put_cache("movies/Old/Old.mkv", 5)?;
    let settings = settings(
        &fixture,
        "budget: { reserve: 10, min_free: 20, trim_on_overflow: false }\n\
         demote: { enabled: true }",
    )?;

    let summary = coordinator(
        settings,
        100,
        &["/data/movies/A/A.mkv", "/data/movies/B/B.mkv"],
        &["/data/movies/Old/Old.mkv"],
        &[],
    )?
    .run(Uuid::new_v4())
    .await?;

    assert_eq!(
        summary.disposition,
        Disposition::Aborted {
            reason: "overflow_without_trim".to_string()
        }
    );
    assert_eq!(summary.warm.copied, 0);
    assert!(summary.demote.is_none());
    assert!(!fixture.cache("movies/A").exists());
    assert!(fixture.cache("movies/Old/Old.mkv").exists());
    Ok(())
}

#[tokio::test]
async fn no_headroom_aborts_but_empty_list_completes() -> Result<()> {
    let fixture = TierFixture::new()?;
    fixture.put_array("tv/S01E01.mkv", 10)?;

    let aborted = coordinator(
        settings(&fixture, "budget: { reserve: 50, min_free: 50 }")?,
        100,
        &["/data/tv/S01E01.mkv"],
        &[],
        &[],
    )?
    .run(Uuid::new_v4())
    .await?;
    assert!(aborted.disposition.is_aborted());

    let empty = coordinator(
        settings(&fixture, "budget: { reserve: 50, min_free: 50 }")?,
        100,
        &[],
        &[],
        &[],
    )?
    .run(Uuid::new_v4())
    .await?;
    assert_eq!(empty.disposition, Disposition::Completed);
    assert_eq!(empty.warm.transferred(), 0);
    Ok(())
}

#[tokio::test]
async fn second_run_transfers_nothing() -> Result<()> {
    let fixture = TierFixture::new()?;
    fixture.put_array("movies/A/A.mkv", 64)?;
    fixture.put_array("movies/A/A.srt", 4)?;
    fixture.put_array("movies/B/B.mkv", 32)?;
    let candidates = ["/data/movies/A/A.mkv", "/data/movies/B/B.mkv"];

    let first = coordinator(settings(&fixture, "")?, 1 << 30, &candidates, &[], &[])?
        .run(Uuid::new_v4())
        .await?;
    assert_eq!(first.warm.copied, 2);
    assert_eq!(first.warm.sidecars_copied, 1);

    let second = coordinator(settings(&fixture, "")?, 1 << 30, &candidates, &[], &[])?
        .run(Uuid::new_v4())
        .await?;
    assert_eq!(second.warm.transferred(), 0);
    assert_eq!(second.warm.skipped_present, 2);
    assert_eq!(second.warm.bytes, 0);
    Ok(())
}

#[tokio::test]
async fn unmappable_and_in_use_candidates_are_not_transferred() -> Result<()> {
    let fixture = TierFixture::new()?;
    fixture.put_array("tv/Live/Live.mkv", 8)?;
    fixture.put_array("tv/Idle/Idle.mkv", 8)?;
    let settings = settings(&fixture, "warm: { move_files: true }")?;

    let summary = coordinator(
        settings,
        1 << 30,
        &[
            "/elsewhere/tv/x.mkv",
            "/data/tv/Live/Live.mkv",
            "/data/tv/Idle/Idle.mkv",
        ],
        &[],
        &["/data/tv/Live/Live.mkv"],
    )?
    .run(Uuid::new_v4())
    .await?;

    assert_eq!(summary.dropped_untranslatable, 1);
    assert_eq!(summary.warm.skipped_excluded, 1);
    assert_eq!(summary.warm.moved, 1);
    assert!(fixture.array("tv/Live/Live.mkv").exists());
    assert!(!fixture.cache("tv/Live/Live.mkv").exists());
    assert!(!fixture.array("tv/Idle/Idle.mkv").exists());
    assert!(fixture.cache("tv/Idle/Idle.mkv").exists());
    Ok(())
}

#[tokio::test]
async fn demote_phase_moves_back_and_reconciles_orphans() -> Result<()> {
    let fixture = TierFixture::new()?;
    fixture.put_cache("movies/Heat/Heat.mkv", 100)?;
    fixture.put_cache("movies/Heat/Heat.srt", 10)?;
    fixture.put_cache("movies/Gone/Gone.en.srt", 7)?;
    fixture.put_cache("movies/Kept/Kept.mkv", 20)?;
    fixture.put_cache("movies/Kept/Kept.srt", 2)?;
    let settings = settings(
        &fixture,
        "demote: { enabled: true, orphan_roots: [movies] }",
    )?;

    let summary = coordinator(settings, 1 << 30, &[], &["/data/movies/Heat/Heat.mkv"], &[])?
        .run(Uuid::new_v4())
        .await?;

    let demote = summary.demote.ok_or_else(|| anyhow::anyhow!("demote phase did not run"))?;
    assert_eq!(demote.moved, 1);
    assert_eq!(demote.sidecars_copied, 1);
    assert_eq!(summary.orphans_relocated, 1);
    assert_eq!(fs::metadata(fixture.array("movies/Heat/Heat.mkv"))?.len(), 100);
    assert!(fixture.array("movies/Heat/Heat.srt").exists());
    assert!(!fixture.cache("movies/Heat").exists());
    assert!(fixture.array("movies/Gone/Gone.en.srt").exists());
    assert!(!fixture.cache("movies/Gone/Gone.en.srt").exists());
    assert!(fixture.cache("movies/Kept/Kept.srt").exists());
    Ok(())
}

#[tokio::test]
async fn dry_run_reports_without_touching_tiers() -> Result<()> {
    let fixture = TierFixture::new()?;
    fixture.put_array("movies/A/A.mkv", 16)?;
    let settings = settings(&fixture, "dry_run: true\nwarm: { move_files: true }")?;

    let summary = coordinator(settings, 1 << 30, &["/data/movies/A/A.mkv"], &[], &[])?
        .run(Uuid::new_v4())
        .await?;

    assert!(summary.dry_run);
    assert_eq!(summary.warm.moved, 1);
    assert!(fixture.array("movies/A/A.mkv").exists());
    assert!(!fixture.cache("movies").exists());
    Ok(())
}

#[tokio::test]
async fn execute_reads_list_files_and_writes_metrics() -> Result<()> {
    let fixture = TierFixture::new()?;
    fixture.put_array("movies/A/A.mkv", 12)?;
    let list = fixture.base().join("warm.list");
    fs::write(&list, "/data/movies/A/A.mkv\n\n/data/movies/A/A.mkv\n")?;
    let textfile = fixture.base().join("tierwarm.prom");
    let settings = settings(
        &fixture,
        &format!(
            "warm: {{ candidates: {{ file: {} }} }}\nmetrics: {{ textfile: {} }}",
            list.display(),
            textfile.display()
        ),
    )?;
    let cli = Cli {
        config: fixture.base().join("unused.yaml"),
        dry_run: false,
        log_level: None,
        log_format: None,
        no_demote: false,
        summary_json: false,
    };

    let outcome = execute(&cli, settings).await?;
    assert_eq!(outcome.exit_code(), EXIT_RAN);
    let RunOutcome::Ran(summary) = outcome else {
        anyhow::bail!("run was skipped");
    };
    assert_eq!(summary.warm.copied, 1);
    assert!(fixture.cache("movies/A/A.mkv").exists());
    let rendered = fs::read_to_string(&textfile)?;
    assert!(rendered.contains("tierwarm_transfer_bytes_total{phase=\"warm\"} 12"));
    Ok(())
}

#[tokio::test]
async fn held_lock_skips_the_run() -> Result<()> {
    let fixture = TierFixture::new()?;
    fixture.put_array("movies/A/A.mkv", 12)?;
    let settings = settings(&fixture, "")?;
    let _held = RunLock::acquire(&settings.lock_path)?;
    let cli = Cli {
        config: fixture.base().join("unused.yaml"),
        dry_run: false,
        log_level: None,
        log_format: None,
        no_demote: false,
        summary_json: false,
    };

    let outcome = execute(&cli, settings).await?;
    assert!(matches!(outcome, RunOutcome::Skipped));
    assert_eq!(outcome.exit_code(), EXIT_RAN);
    assert_ne!(EXIT_RAN, EXIT_ABORTED);
    Ok(())
}

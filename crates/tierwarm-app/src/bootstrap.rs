//! Process wiring: configuration, logging, run lock, coordinator, reporting.

use std::sync::Arc;

use tierwarm_config::{RunSettings, load_settings};
use tierwarm_fsops::{Phase, PhaseSummary, RunSummary, TransferOutcome};
use tierwarm_telemetry::{LogFormat, LoggingConfig, Metrics, init_logging};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cli::Cli;
use crate::error::{AppError, AppResult};
use crate::lock::RunLock;
use crate::orchestrator::RunCoordinator;

/// Exit status when the run happened (even with item failures) or was skipped.
pub const EXIT_RAN: u8 = 0;
/// Exit status when the run aborted before transferring anything.
pub const EXIT_ABORTED: u8 = 1;

/// What happened to this invocation.
#[derive(Debug)]
pub enum RunOutcome {
    /// The coordinator ran and produced a summary.
    Ran(RunSummary),
    /// Another run holds the lock; nothing was done.
    Skipped,
}

impl RunOutcome {
    /// Process exit status for this outcome.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Ran(summary) if summary.disposition.is_aborted() => EXIT_ABORTED,
            Self::Ran(_) | Self::Skipped => EXIT_RAN,
        }
    }
}

/// Run the application for parsed command-line arguments and return the exit status.
pub async fn run_app(cli: Cli) -> u8 {
    let mut settings = match load_settings(&cli.config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err}: {err:?}");
            return EXIT_ABORTED;
        }
    };
    cli.apply(&mut settings);

    let logging = LoggingConfig {
        level: &settings.logging.level,
        format: LogFormat::from_setting(settings.logging.format.as_deref()),
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("error: {err}");
        return EXIT_ABORTED;
    }

    match execute(&cli, settings).await {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            error!(error = %err, detail = ?err, "run aborted");
            EXIT_ABORTED
        }
    }
}

/// Take the run lock, run the coordinator and report the summary.
///
/// # Errors
///
/// Returns an error for configuration problems or failures before any transfer.
pub async fn execute(cli: &Cli, settings: RunSettings) -> AppResult<RunOutcome> {
    let lock_path = settings.lock_path.clone();
    let _lock = match RunLock::acquire(&lock_path) {
        Ok(lock) => lock,
        Err(AppError::LockHeld { path }) => {
            info!(path = %path.display(), "another run holds the lock; nothing to do");
            return Ok(RunOutcome::Skipped);
        }
        Err(err) => return Err(err),
    };

    let textfile = settings.metrics.textfile.clone();
    let coordinator = Arc::new(RunCoordinator::new(settings)?);
    let summary = coordinator.run(Uuid::new_v4()).await?;
    report(&summary, cli.summary_json)?;
    if let Some(path) = textfile
        && let Err(err) = export_metrics(&summary).and_then(|metrics| {
            metrics
                .write_textfile(&path)
                .map_err(|source| AppError::telemetry("metrics.write", source))
        })
    {
        warn!(path = %path.display(), error = ?err, "metrics textfile not written");
    }
    Ok(RunOutcome::Ran(summary))
}

fn report(summary: &RunSummary, as_json: bool) -> AppResult<()> {
    info!(
        run_id = %summary.run_id,
        aborted = summary.disposition.is_aborted(),
        dry_run = summary.dry_run,
        warm_copied = summary.warm.copied,
        warm_moved = summary.warm.moved,
        warm_skipped = summary.warm.skipped_present + summary.warm.skipped_budget + summary.warm.skipped_excluded,
        warm_failed = summary.warm.failed,
        demote_moved = summary.demote.map_or(0, |demote| demote.moved),
        demote_failed = summary.demote.map_or(0, |demote| demote.failed),
        orphans_relocated = summary.orphans_relocated,
        dropped_untranslatable = summary.dropped_untranslatable,
        "run summary"
    );
    if as_json {
        let rendered = serde_json::to_string_pretty(summary).map_err(|source| AppError::Json {
            operation: "summary.render",
            source,
        })?;
        println!("{rendered}");
    }
    Ok(())
}

/// Mirror a summary into a fresh metrics registry.
///
/// # Errors
///
/// Returns an error when the registry cannot be built.
pub fn export_metrics(summary: &RunSummary) -> AppResult<Metrics> {
    let metrics = Metrics::new().map_err(|source| AppError::telemetry("metrics.new", source))?;
    record_phase(&metrics, Phase::Warm, &summary.warm);
    if let Some(demote) = &summary.demote {
        record_phase(&metrics, Phase::Demote, demote);
    }
    metrics.add_orphans(summary.orphans_relocated);
    let finished = summary.finished_at.unwrap_or(summary.started_at);
    metrics.record_run(finished.timestamp(), summary.disposition.is_aborted());
    Ok(metrics)
}

fn record_phase(metrics: &Metrics, phase: Phase, counters: &PhaseSummary) {
    let label = phase.as_str();
    for outcome in TransferOutcome::ALL {
        metrics.add_outcomes(label, outcome.as_str(), counters.count(outcome));
    }
    metrics.add_bytes(label, counters.bytes);
    metrics.add_sidecars(label, "copied", counters.sidecars_copied);
    metrics.add_sidecars(label, "failed", counters.sidecars_failed);
}

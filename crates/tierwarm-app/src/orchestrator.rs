//! Run coordination: candidates in, summary out.
//!
//! # Design
//! - Fetching external lists is async; everything touching the tiers runs on
//!   one blocking task, strictly sequential and in priority order.
//! - Only configuration failures and budget aborts stop a run; every other
//!   failure stays with its item.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tierwarm_config::{CopyEngine, RunSettings};
use tierwarm_fsops::{
    CandidateItem, Copier, DirectoryPolicy, Exclusions, ExecutorOptions, NativeCopier,
    OrphanReconciler, Ownership, PathTranslator, Phase, PhaseSummary, PlanAbort, Precheck,
    RsyncCopier, RunSummary, SidecarResolver, SpaceProbe, StatvfsProbe, TierRoots,
    TransferBudget, TransferExecutor, TransferOutcome, TransferReport, Unresolved, plan, resolve,
};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::sources::{PathSource, collect_lines, from_spec, normalize_candidates};

/// Sequences one warm/demote run against the configured tiers.
pub struct RunCoordinator {
    settings: Arc<RunSettings>,
    roots: TierRoots,
    translator: PathTranslator,
    sidecars: SidecarResolver,
    directories: DirectoryPolicy,
    exclusions: Exclusions,
    copier: Arc<dyn Copier>,
    probe: Arc<dyn SpaceProbe>,
    warm_source: Arc<dyn PathSource>,
    demote_source: Arc<dyn PathSource>,
    in_use_source: Arc<dyn PathSource>,
}

impl RunCoordinator {
    /// Build production collaborators from validated settings.
    ///
    /// # Errors
    ///
    /// Returns an error when tier roots, ownership overrides or exclusion
    /// globs are rejected.
    pub fn new(settings: RunSettings) -> AppResult<Self> {
        let roots = TierRoots::new(
            &settings.array_root,
            &settings.cache_root,
            settings.share_root.as_deref(),
        )
        .map_err(|err| AppError::fsops("coordinator.roots", err))?;
        let ownership = Ownership::resolve(
            settings.copy.owner.as_deref(),
            settings.copy.group.as_deref(),
        )
        .map_err(|err| AppError::fsops("coordinator.ownership", err))?;
        let exclusions = Exclusions::new(&settings.exclude)
            .map_err(|err| AppError::fsops("coordinator.exclusions", err))?;

        let copier: Arc<dyn Copier> = match settings.copy.engine {
            CopyEngine::Rsync => Arc::new(RsyncCopier::new(
                settings.copy.rsync_path.clone(),
                settings.copy.inplace,
                &ownership,
            )),
            CopyEngine::Native => Arc::new(NativeCopier::new(ownership.clone())),
        };

        Ok(Self {
            translator: PathTranslator::new(&settings.path_map),
            sidecars: SidecarResolver::new(&settings.sidecar_extensions, &settings.media_extensions),
            directories: DirectoryPolicy::new(ownership, settings.copy.dir_mode),
            warm_source: from_spec(settings.warm.candidates.as_ref()),
            demote_source: from_spec(settings.demote.candidates.as_ref()),
            in_use_source: from_spec(settings.in_use.as_ref()),
            settings: Arc::new(settings),
            roots,
            exclusions,
            copier,
            probe: Arc::new(StatvfsProbe),
        })
    }

    /// Replace the copy capability.
    #[must_use]
    pub fn with_copier(mut self, copier: Arc<dyn Copier>) -> Self {
        self.copier = copier;
        self
    }

    /// Replace the free-space probe.
    #[must_use]
    pub fn with_space_probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replace the warm, demote and in-use path sources.
    #[must_use]
    pub fn with_sources(
        mut self,
        warm: Arc<dyn PathSource>,
        demote: Arc<dyn PathSource>,
        in_use: Arc<dyn PathSource>,
    ) -> Self {
        self.warm_source = warm;
        self.demote_source = demote;
        self.in_use_source = in_use;
        self
    }

    /// Execute one run tagged with `run_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when free space cannot be sampled or the blocking
    /// transfer task fails. Budget aborts are reported in the summary.
    pub async fn run(self: Arc<Self>, run_id: Uuid) -> AppResult<RunSummary> {
        let span = info_span!("run", run_id = %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(self: Arc<Self>, run_id: Uuid) -> AppResult<RunSummary> {
        let settings = Arc::clone(&self.settings);
        info!(
            engine = self.copier.name(),
            dry_run = settings.dry_run,
            demote = settings.demote.enabled,
            "run started"
        );

        let in_use = normalize_candidates(
            collect_lines(self.in_use_source.as_ref(), "in_use").await,
            0,
        );
        let warm = normalize_candidates(
            collect_lines(self.warm_source.as_ref(), "warm").await,
            settings.warm.max_items,
        );
        let demote = if settings.demote.enabled {
            normalize_candidates(collect_lines(self.demote_source.as_ref(), "demote").await, 0)
        } else {
            Vec::new()
        };

        let span = tracing::Span::current();
        let worker = Arc::clone(&self);
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            worker.transfer(run_id, &in_use, warm, demote)
        })
        .await
        .map_err(|err| AppError::join("coordinator.transfer", err))?
    }

    fn transfer(
        &self,
        run_id: Uuid,
        in_use: &[PathBuf],
        warm: Vec<PathBuf>,
        demote: Vec<PathBuf>,
    ) -> AppResult<RunSummary> {
        let settings = &self.settings;
        let mut summary = RunSummary::start(run_id, settings.dry_run);
        let exclusions = self.exclusions.clone().with_in_use(self.in_use_paths(in_use));
        debug!(in_use = exclusions.in_use_len(), "in-use snapshot taken");

        let warm_result = self.warm_phase(&exclusions, warm, &mut summary)?;
        summary.warm = warm_result.phase;
        if let Some(abort) = warm_result.abort {
            match abort {
                PlanAbort::InsufficientSpace { allowed_bytes } => error!(
                    allowed_bytes = %allowed_bytes,
                    "insufficient space before any transfer; run aborted"
                ),
                PlanAbort::Overflow {
                    required_bytes,
                    allowed_bytes,
                } => error!(
                    required_bytes,
                    allowed_bytes,
                    "candidates exceed budget and trimming is disabled; run aborted"
                ),
            }
            summary.abort(abort.reason());
            summary.finish();
            return Ok(summary);
        }

        if settings.demote.enabled {
            let demoted = self.demote_phase(&exclusions, demote, &mut summary);
            summary.demote = Some(demoted);
            let reconciler = OrphanReconciler::new(
                &self.roots,
                self.copier.as_ref(),
                &self.directories,
                &self.sidecars,
                settings.dry_run,
            );
            summary.orphans_relocated = reconciler.reconcile(&settings.demote.orphan_roots).relocated;
        }

        summary.finish();
        Ok(summary)
    }

    fn warm_phase(
        &self,
        exclusions: &Exclusions,
        candidates: Vec<PathBuf>,
        summary: &mut RunSummary,
    ) -> AppResult<WarmResult> {
        let settings = &self.settings;
        let mut phase = PhaseSummary::default();
        let items = self.resolve_all(candidates, Phase::Warm, &mut phase, summary);
        let executor = TransferExecutor::new(
            self.copier.as_ref(),
            &self.directories,
            &self.sidecars,
            exclusions,
            &self.roots,
            ExecutorOptions {
                phase: Phase::Warm,
                move_source: settings.warm.move_files,
                sidecars: settings.warm.sidecars,
                dry_run: settings.dry_run,
            },
        );

        let checked: Vec<(CandidateItem, Precheck)> = items
            .into_iter()
            .map(|item| {
                let precheck = executor.precheck(&item);
                (item, precheck)
            })
            .collect();
        let needs_space: Vec<CandidateItem> = checked
            .iter()
            .filter(|(_, precheck)| *precheck == Precheck::Proceed)
            .map(|(item, _)| item.clone())
            .collect();

        let mut remaining = 0_u64;
        let mut accepted = HashSet::new();
        if !needs_space.is_empty() {
            // Free space is sampled once for the whole run. Another writer on
            // the cache tier can shrink the real headroom below what this plan
            // assumes; transfers are not re-checked per item.
            let free_bytes = self
                .probe
                .free_bytes(self.roots.cache())
                .map_err(|err| AppError::fsops("coordinator.free_space", err))?;
            let budget = TransferBudget {
                free_bytes,
                reserve_bytes: settings.budget.reserve_bytes,
                min_free_bytes: settings.budget.min_free_bytes,
            };
            info!(
                free_bytes,
                reserve_bytes = budget.reserve_bytes,
                min_free_bytes = budget.min_free_bytes,
                allowed_bytes = %budget.allowed_bytes(),
                candidates = needs_space.len(),
                "space budget sampled"
            );
            match plan(needs_space, &budget, settings.budget.trim_on_overflow) {
                Ok(plan) => {
                    remaining = plan.allowed_bytes;
                    accepted.extend(plan.accepted.into_iter().map(|item| item.source_path));
                }
                Err(abort) => {
                    return Ok(WarmResult {
                        phase,
                        abort: Some(abort),
                    });
                }
            }
        } else {
            info!("no warm candidates need space");
        }

        for (item, precheck) in &checked {
            let report = if *precheck != Precheck::Proceed {
                executor.execute(item)
            } else if accepted.contains(&item.source_path) {
                let report = executor.execute(item);
                if matches!(report.outcome, TransferOutcome::Copied | TransferOutcome::Moved) {
                    remaining = remaining.saturating_sub(item.size_bytes);
                }
                debug!(remaining_bytes = remaining, "planned budget remaining");
                report
            } else {
                executor.skip_out_of_budget(item)
            };
            phase.record(&report);
        }
        log_phase(Phase::Warm, &phase);
        Ok(WarmResult { phase, abort: None })
    }

    fn demote_phase(
        &self,
        exclusions: &Exclusions,
        candidates: Vec<PathBuf>,
        summary: &mut RunSummary,
    ) -> PhaseSummary {
        let settings = &self.settings;
        let mut phase = PhaseSummary::default();
        let items = self.resolve_all(candidates, Phase::Demote, &mut phase, summary);
        let executor = TransferExecutor::new(
            self.copier.as_ref(),
            &self.directories,
            &self.sidecars,
            exclusions,
            &self.roots,
            ExecutorOptions {
                phase: Phase::Demote,
                move_source: true,
                sidecars: settings.demote.sidecars,
                dry_run: settings.dry_run,
            },
        );
        for item in &items {
            phase.record(&executor.execute(item));
        }
        log_phase(Phase::Demote, &phase);
        phase
    }

    fn resolve_all(
        &self,
        candidates: Vec<PathBuf>,
        phase: Phase,
        counters: &mut PhaseSummary,
        summary: &mut RunSummary,
    ) -> Vec<CandidateItem> {
        let mut items = Vec::with_capacity(candidates.len());
        for foreign in candidates {
            match resolve(&self.translator, &self.roots, &foreign, phase) {
                Ok(paths) => {
                    let size_bytes = fs::metadata(&paths.source).map_or(0, |meta| meta.len());
                    items.push(CandidateItem {
                        foreign_path: foreign,
                        source_path: paths.source,
                        destination_path: paths.destination,
                        size_bytes,
                    });
                }
                Err(Unresolved::AlreadyOnDestination) => {
                    info!(
                        phase = phase.as_str(),
                        path = %foreign.display(),
                        "candidate already on destination tier"
                    );
                    counters.record(&TransferReport::bare(TransferOutcome::SkippedAlreadyPresent));
                }
                Err(reason) => {
                    warn!(
                        phase = phase.as_str(),
                        path = %foreign.display(),
                        reason = reason.as_str(),
                        "candidate dropped; no tier mapping"
                    );
                    summary.dropped_untranslatable += 1;
                }
            }
        }
        items
    }

    fn in_use_paths(&self, lines: &[PathBuf]) -> Vec<PathBuf> {
        lines
            .iter()
            .map(|path| {
                if self.roots.tier_of(path).is_some() {
                    path.clone()
                } else {
                    self.translator
                        .translate(path)
                        .unwrap_or_else(|| path.clone())
                }
            })
            .flat_map(|path| self.roots.equivalents(&path))
            .collect()
    }
}

struct WarmResult {
    phase: PhaseSummary,
    abort: Option<PlanAbort>,
}

fn log_phase(phase: Phase, counters: &PhaseSummary) {
    info!(
        phase = phase.as_str(),
        copied = counters.copied,
        moved = counters.moved,
        skipped_present = counters.skipped_present,
        skipped_budget = counters.skipped_budget,
        skipped_excluded = counters.skipped_excluded,
        failed = counters.failed,
        bytes = counters.bytes,
        sidecars_copied = counters.sidecars_copied,
        sidecars_failed = counters.sidecars_failed,
        "phase finished"
    );
}

#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(
    missing_docs,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

//! Cache tier transfer planning and verified moving.
//!
//! Layout: `paths.rs` (translation and tier roots), `sidecar.rs` (companion
//! discovery), `budget.rs` (space planner), `copier.rs` (copy capability),
//! `executor.rs` (per-item state machine), `orphans.rs` (demote tail),
//! `space.rs`, `ownership.rs`, `exclude.rs` and `summary.rs` (supporting pieces).

pub mod budget;
pub mod copier;
pub mod error;
pub mod exclude;
pub mod executor;
pub mod orphans;
pub mod ownership;
pub mod paths;
pub mod sidecar;
pub mod space;
pub mod summary;

pub use budget::{CandidateItem, PlanAbort, TransferBudget, TransferPlan, plan};
pub use copier::{CopyMode, CopyReport, Copier, NativeCopier, RsyncCopier, sha256_file};
pub use error::{FsOpsError, FsOpsResult};
pub use exclude::{ExclusionReason, Exclusions};
pub use executor::{
    ExecutorOptions, Precheck, TransferExecutor, TransferOutcome, TransferReport, TransferState,
};
pub use orphans::{OrphanReconciler, ReconcileReport};
pub use ownership::{DirectoryPolicy, Ownership};
pub use paths::{PathTranslator, Phase, Tier, TierRoots, TransferPaths, Unresolved, resolve};
pub use sidecar::{SidecarResolver, owner_stems};
pub use space::{SpaceProbe, StatvfsProbe};
pub use summary::{Disposition, PhaseSummary, RunSummary};

//! Space budget planning for the warm phase.
//!
//! # Design
//! - Greedy first-fit in candidate order: priority is never reordered by size.
//! - Free space is sampled once per run by the caller; the planner never re-stats.

use std::path::PathBuf;

use tracing::info;

/// A resolved transfer candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    /// Path as emitted by the candidate source.
    pub foreign_path: PathBuf,
    /// Host path on the tier being read.
    pub source_path: PathBuf,
    /// Host path on the tier being written.
    pub destination_path: PathBuf,
    /// Size of the source file when the candidate was resolved.
    pub size_bytes: u64,
}

/// Free-space inputs for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferBudget {
    /// Bytes available on the destination tier.
    pub free_bytes: u64,
    /// Bytes held back for other writers.
    pub reserve_bytes: u64,
    /// Bytes that must remain free afterwards.
    pub min_free_bytes: u64,
}

impl TransferBudget {
    /// `free - reserve - min_free`, which may be negative.
    #[must_use]
    pub fn allowed_bytes(&self) -> i128 {
        i128::from(self.free_bytes) - i128::from(self.reserve_bytes) - i128::from(self.min_free_bytes)
    }
}

/// Accepted and rejected candidates, both in candidate order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPlan {
    /// Items that fit the budget.
    pub accepted: Vec<CandidateItem>,
    /// Items skipped for lack of space.
    pub rejected: Vec<CandidateItem>,
    /// Budget the plan was computed against.
    pub allowed_bytes: u64,
    /// Sum of accepted item sizes.
    pub planned_bytes: u64,
}

/// Reasons the whole run stops before any transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAbort {
    /// Reserve and minimum-free leave no room at all.
    InsufficientSpace {
        /// Computed budget (zero or negative).
        allowed_bytes: i128,
    },
    /// Candidates exceed the budget and trimming is disabled.
    Overflow {
        /// Total size of all candidates.
        required_bytes: u64,
        /// Available budget.
        allowed_bytes: u64,
    },
}

impl PlanAbort {
    /// Stable reason label for logs and the run summary.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InsufficientSpace { .. } => "insufficient_space",
            Self::Overflow { .. } => "overflow_without_trim",
        }
    }
}

/// Fit `candidates` into `budget`.
///
/// # Errors
///
/// Returns [`PlanAbort`] when the budget is not positive, or when the
/// candidates do not fit and `trim_on_overflow` is false.
pub fn plan(
    candidates: Vec<CandidateItem>,
    budget: &TransferBudget,
    trim_on_overflow: bool,
) -> Result<TransferPlan, PlanAbort> {
    let allowed = budget.allowed_bytes();
    let Some(allowed_bytes) = u64::try_from(allowed).ok().filter(|bytes| *bytes > 0) else {
        return Err(PlanAbort::InsufficientSpace {
            allowed_bytes: allowed,
        });
    };

    let required_bytes = candidates
        .iter()
        .fold(0_u64, |total, item| total.saturating_add(item.size_bytes));
    if required_bytes <= allowed_bytes {
        return Ok(TransferPlan {
            accepted: candidates,
            rejected: Vec::new(),
            allowed_bytes,
            planned_bytes: required_bytes,
        });
    }
    if !trim_on_overflow {
        return Err(PlanAbort::Overflow {
            required_bytes,
            allowed_bytes,
        });
    }

    let mut plan = TransferPlan {
        allowed_bytes,
        ..TransferPlan::default()
    };
    for item in candidates {
        match plan.planned_bytes.checked_add(item.size_bytes) {
            Some(total) if total <= allowed_bytes => {
                plan.planned_bytes = total;
                plan.accepted.push(item);
            }
            _ => plan.rejected.push(item),
        }
    }
    info!(
        required_bytes,
        allowed_bytes,
        accepted = plan.accepted.len(),
        rejected = plan.rejected.len(),
        planned_bytes = plan.planned_bytes,
        "candidates trimmed to fit budget"
    );
    Ok(plan)
}

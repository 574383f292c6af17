//! Foreign-to-host path translation and tier root substitution.
//!
//! # Design
//! - Translation is a pure function over an ordered rule list; no filesystem access.
//! - Matching is component-wise, so `/data` matches `/data/x` but not `/database`.

use std::path::{Path, PathBuf};

use tierwarm_config::PathMapping;

use crate::error::{FsOpsError, FsOpsResult};

/// Direction of a transfer pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Array to cache promotion.
    Warm,
    /// Cache to array demotion.
    Demote,
}

impl Phase {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warm => "warm",
            Self::Demote => "demote",
        }
    }

    /// Tier this phase reads from.
    #[must_use]
    pub const fn source_tier(self) -> Tier {
        match self {
            Self::Warm => Tier::Array,
            Self::Demote => Tier::Cache,
        }
    }
}

/// One of the two storage tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Cold bulk storage.
    Array,
    /// Fast storage.
    Cache,
}

/// Ordered prefix-substitution rules.
#[derive(Debug, Clone, Default)]
pub struct PathTranslator {
    rules: Vec<(PathBuf, PathBuf)>,
}

impl PathTranslator {
    /// Build a translator from configured mappings, keeping their order.
    #[must_use]
    pub fn new(mappings: &[PathMapping]) -> Self {
        let rules = mappings
            .iter()
            .map(|mapping| (clean(&mapping.prefix), clean(&mapping.replacement)))
            .collect();
        Self { rules }
    }

    /// Rewrite `foreign` with the first matching rule, or `None` when no rule applies.
    #[must_use]
    pub fn translate(&self, foreign: &Path) -> Option<PathBuf> {
        self.rules.iter().find_map(|(prefix, replacement)| {
            foreign
                .strip_prefix(prefix)
                .ok()
                .map(|rest| rebase(replacement, rest))
        })
    }

    /// Number of configured rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The array and cache roots plus the optional union share that aliases both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierRoots {
    array: PathBuf,
    cache: PathBuf,
    share: Option<PathBuf>,
}

impl TierRoots {
    /// Validate and build the root set.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidPolicy`] when a root is relative, when the
    /// roots are identical, or when one root is nested in another (the share
    /// root included).
    pub fn new(array: &Path, cache: &Path, share: Option<&Path>) -> FsOpsResult<Self> {
        let array = absolute("array_root", array)?;
        let cache = absolute("cache_root", cache)?;
        let share = share.map(|path| absolute("share_root", path)).transpose()?;

        if array == cache {
            return Err(FsOpsError::policy(
                "cache_root",
                "identical_roots",
                cache.to_string_lossy(),
            ));
        }
        if array.starts_with(&cache) || cache.starts_with(&array) {
            return Err(FsOpsError::policy(
                "cache_root",
                "nested_roots",
                cache.to_string_lossy(),
            ));
        }
        if let Some(share) = &share {
            if share == &array || share == &cache {
                return Err(FsOpsError::policy(
                    "share_root",
                    "aliases_tier_root",
                    share.to_string_lossy(),
                ));
            }
            if [&array, &cache]
                .into_iter()
                .any(|root| share.starts_with(root) || root.starts_with(share))
            {
                return Err(FsOpsError::policy(
                    "share_root",
                    "nested_with_tier_root",
                    share.to_string_lossy(),
                ));
            }
        }
        Ok(Self {
            array,
            cache,
            share,
        })
    }

    /// Cache tier root.
    #[must_use]
    pub fn cache(&self) -> &Path {
        &self.cache
    }

    /// Root of a given tier.
    #[must_use]
    pub fn root(&self, tier: Tier) -> &Path {
        match tier {
            Tier::Array => &self.array,
            Tier::Cache => &self.cache,
        }
    }

    /// Substitute the array root with the cache root.
    #[must_use]
    pub fn to_cache(&self, array_path: &Path) -> Option<PathBuf> {
        array_path
            .strip_prefix(&self.array)
            .ok()
            .map(|rest| rebase(&self.cache, rest))
    }

    /// Substitute the cache root with the array root.
    #[must_use]
    pub fn to_array(&self, cache_path: &Path) -> Option<PathBuf> {
        cache_path
            .strip_prefix(&self.cache)
            .ok()
            .map(|rest| rebase(&self.array, rest))
    }

    /// Tier a host path lives on, if any.
    #[must_use]
    pub fn tier_of(&self, path: &Path) -> Option<Tier> {
        if path.starts_with(&self.array) {
            Some(Tier::Array)
        } else if path.starts_with(&self.cache) {
            Some(Tier::Cache)
        } else {
            None
        }
    }

    /// Whether `path` is a tier root itself (never removed during cleanup).
    #[must_use]
    pub fn is_root(&self, path: &Path) -> bool {
        path == self.array || path == self.cache
    }

    /// Rewrite a union-share path onto `tier`; other paths are returned unchanged.
    #[must_use]
    pub fn unshare(&self, path: &Path, tier: Tier) -> PathBuf {
        self.share
            .as_ref()
            .and_then(|share| path.strip_prefix(share).ok())
            .map_or_else(|| path.to_path_buf(), |rest| rebase(self.root(tier), rest))
    }

    /// Array and cache equivalents of a host path (used for liveness matching).
    #[must_use]
    pub fn equivalents(&self, path: &Path) -> Vec<PathBuf> {
        let path = self.unshare(path, Tier::Array);
        match self.tier_of(&path) {
            Some(Tier::Array) => self.to_cache(&path).into_iter().chain([path]).collect(),
            Some(Tier::Cache) => self.to_array(&path).into_iter().chain([path]).collect(),
            None => vec![path],
        }
    }

    fn is_host_path(&self, path: &Path) -> bool {
        self.tier_of(path).is_some()
            || self
                .share
                .as_ref()
                .is_some_and(|share| path.starts_with(share))
    }
}

/// Source and destination of one resolved transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPaths {
    /// Host path on the tier the phase reads from.
    pub source: PathBuf,
    /// Equivalent path on the tier the phase writes to.
    pub destination: PathBuf,
}

/// Why a candidate could not be resolved to a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    /// No translation rule matched a foreign path.
    Unmapped,
    /// The path already lives on the destination tier.
    AlreadyOnDestination,
    /// The translated path is outside both tiers.
    OutsideTiers,
}

impl Unresolved {
    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unmapped => "unmapped",
            Self::AlreadyOnDestination => "already_on_destination",
            Self::OutsideTiers => "outside_tiers",
        }
    }
}

/// Resolve a candidate path into a source/destination pair for `phase`.
///
/// Host paths under a tier or the share pass through untouched; anything else
/// must match a translation rule.
///
/// # Errors
///
/// Returns the [`Unresolved`] reason when the candidate has to be dropped.
pub fn resolve(
    translator: &PathTranslator,
    roots: &TierRoots,
    candidate: &Path,
    phase: Phase,
) -> Result<TransferPaths, Unresolved> {
    let host = if roots.is_host_path(candidate) {
        candidate.to_path_buf()
    } else {
        translator.translate(candidate).ok_or(Unresolved::Unmapped)?
    };
    let source_tier = phase.source_tier();
    let source = roots.unshare(&host, source_tier);

    match (roots.tier_of(&source), source_tier) {
        (Some(Tier::Array), Tier::Array) => roots
            .to_cache(&source)
            .map(|destination| TransferPaths {
                source,
                destination,
            })
            .ok_or(Unresolved::OutsideTiers),
        (Some(Tier::Cache), Tier::Cache) => roots
            .to_array(&source)
            .map(|destination| TransferPaths {
                source,
                destination,
            })
            .ok_or(Unresolved::OutsideTiers),
        (Some(_), _) => Err(Unresolved::AlreadyOnDestination),
        (None, _) => Err(Unresolved::OutsideTiers),
    }
}

fn clean(path: &Path) -> PathBuf {
    path.components().collect()
}

fn rebase(root: &Path, rest: &Path) -> PathBuf {
    if rest.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(rest)
    }
}

fn absolute(field: &'static str, path: &Path) -> FsOpsResult<PathBuf> {
    if !path.is_absolute() {
        return Err(FsOpsError::policy(field, "not_absolute", path.to_string_lossy()));
    }
    Ok(clean(path))
}

//! Items that must not be touched this run: static globs and files in active use.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::budget::CandidateItem;
use crate::error::{FsOpsError, FsOpsResult};

/// Why an item was excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// An external liveness source reports the file as open.
    InUse,
    /// A configured glob matches the source path.
    Pattern,
}

impl ExclusionReason {
    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InUse => "in_use",
            Self::Pattern => "pattern",
        }
    }
}

/// Static glob exclusions plus the in-use snapshot taken at run start.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    patterns: Option<GlobSet>,
    in_use: HashSet<PathBuf>,
}

impl Exclusions {
    /// Compile `patterns`; in-use paths start empty.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Glob`] for an invalid pattern and
    /// [`FsOpsError::InvalidPolicy`] for a blank one.
    pub fn new(patterns: &[String]) -> FsOpsResult<Self> {
        if patterns.is_empty() {
            return Ok(Self::default());
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            if pattern.trim().is_empty() {
                return Err(FsOpsError::policy("exclude", "empty_pattern", pattern.as_str()));
            }
            builder.add(
                Glob::new(pattern)
                    .map_err(|err| FsOpsError::glob("exclude.compile", pattern.clone(), err))?,
            );
        }
        let set = builder
            .build()
            .map_err(|err| FsOpsError::glob("exclude.build", "<set>".to_string(), err))?;
        Ok(Self {
            patterns: Some(set),
            in_use: HashSet::new(),
        })
    }

    /// Record host paths reported as in use (both tier equivalents should be supplied).
    #[must_use]
    pub fn with_in_use(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.in_use.extend(paths);
        self
    }

    /// Number of in-use paths known.
    #[must_use]
    pub fn in_use_len(&self) -> usize {
        self.in_use.len()
    }

    /// Check one item against both exclusion kinds.
    #[must_use]
    pub fn check(&self, item: &CandidateItem) -> Option<ExclusionReason> {
        if self.is_in_use(&item.source_path) || self.is_in_use(&item.destination_path) {
            return Some(ExclusionReason::InUse);
        }
        if self
            .patterns
            .as_ref()
            .is_some_and(|set| set.is_match(&item.source_path))
        {
            return Some(ExclusionReason::Pattern);
        }
        None
    }

    fn is_in_use(&self, path: &Path) -> bool {
        self.in_use.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(source: &str, destination: &str) -> CandidateItem {
        CandidateItem {
            foreign_path: PathBuf::from(source),
            source_path: PathBuf::from(source),
            destination_path: PathBuf::from(destination),
            size_bytes: 1,
        }
    }

    #[test]
    fn patterns_and_in_use_paths_exclude_items() -> FsOpsResult<()> {
        let exclusions = Exclusions::new(&["**/extras/**".to_string()])?
            .with_in_use([PathBuf::from("/mnt/cache/tv/live.mkv")]);

        assert_eq!(
            exclusions.check(&item("/mnt/user0/movies/extras/trailer.mkv", "/mnt/cache/x")),
            Some(ExclusionReason::Pattern)
        );
        assert_eq!(
            exclusions.check(&item("/mnt/user0/tv/live.mkv", "/mnt/cache/tv/live.mkv")),
            Some(ExclusionReason::InUse)
        );
        assert_eq!(
            exclusions.check(&item("/mnt/user0/tv/other.mkv", "/mnt/cache/tv/other.mkv")),
            None
        );
        assert_eq!(exclusions.in_use_len(), 1);
        Ok(())
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(matches!(
            Exclusions::new(&["a[".to_string()]),
            Err(FsOpsError::Glob { .. })
        ));
        assert!(matches!(
            Exclusions::new(&[" ".to_string()]),
            Err(FsOpsError::InvalidPolicy { .. })
        ));
    }
}

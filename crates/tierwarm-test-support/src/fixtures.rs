//! Temporary array/cache trees and environment probes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tempfile::TempDir;

/// Returns `true` if an `rsync` binary can be executed.
#[must_use]
pub fn rsync_available() -> bool {
    Command::new("rsync")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Write `len` bytes of a repeating pattern to `path`, creating parents.
///
/// # Errors
///
/// Returns an error when the file or its parents cannot be written.
pub fn write_sized(path: &Path, len: usize) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let payload: Vec<u8> = (0..len)
        .map(|idx| u8::try_from(idx % 251).unwrap_or_default())
        .collect();
    fs::write(path, payload).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// A throwaway directory holding `array/`, `cache/` and `share/` roots.
pub struct TierFixture {
    dir: TempDir,
    array: PathBuf,
    cache: PathBuf,
    share: PathBuf,
}

impl TierFixture {
    /// Create the fixture with empty tier roots.
    ///
    /// # Errors
    ///
    /// Returns an error when the temporary directories cannot be created.
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create tier fixture")?;
        let array = dir.path().join("array");
        let cache = dir.path().join("cache");
        let share = dir.path().join("share");
        for root in [&array, &cache, &share] {
            fs::create_dir_all(root)
                .with_context(|| format!("failed to create {}", root.display()))?;
        }
        Ok(Self {
            dir,
            array,
            cache,
            share,
        })
    }

    /// Fixture base directory.
    #[must_use]
    pub fn base(&self) -> &Path {
        self.dir.path()
    }

    /// Array tier root.
    #[must_use]
    pub fn array_root(&self) -> &Path {
        &self.array
    }

    /// Cache tier root.
    #[must_use]
    pub fn cache_root(&self) -> &Path {
        &self.cache
    }

    /// Union share root.
    #[must_use]
    pub fn share_root(&self) -> &Path {
        &self.share
    }

    /// Path of `relative` on the array tier.
    #[must_use]
    pub fn array(&self, relative: &str) -> PathBuf {
        self.array.join(relative)
    }

    /// Path of `relative` on the cache tier.
    #[must_use]
    pub fn cache(&self, relative: &str) -> PathBuf {
        self.cache.join(relative)
    }

    /// Write a file of `len` bytes under the array tier.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    pub fn put_array(&self, relative: &str, len: usize) -> Result<PathBuf> {
        write_sized(&self.array(relative), len)
    }

    /// Write a file of `len` bytes under the cache tier.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    pub fn put_cache(&self, relative: &str, len: usize) -> Result<PathBuf> {
        write_sized(&self.cache(relative), len)
    }
}

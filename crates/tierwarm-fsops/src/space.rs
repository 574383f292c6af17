//! Free-space sampling for the destination tier.

use std::path::Path;

use nix::sys::statvfs::statvfs;

use crate::error::{FsOpsError, FsOpsResult};

/// Reports bytes available to unprivileged writers on a filesystem.
pub trait SpaceProbe: Send + Sync {
    /// Free bytes on the filesystem holding `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the filesystem cannot be queried.
    fn free_bytes(&self, path: &Path) -> FsOpsResult<u64>;
}

/// `statvfs`-backed probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsProbe;

impl SpaceProbe for StatvfsProbe {
    #[allow(clippy::useless_conversion)]
    fn free_bytes(&self, path: &Path) -> FsOpsResult<u64> {
        let stats = statvfs(path).map_err(|err| FsOpsError::nix("space.statvfs", path, err))?;
        let blocks = u64::from(stats.blocks_available());
        let fragment = u64::from(stats.fragment_size());
        Ok(blocks.saturating_mul(fragment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statvfs_reports_space_for_existing_paths() -> FsOpsResult<()> {
        let dir = tempfile::tempdir().map_err(|err| FsOpsError::io("tempdir", "/tmp", err))?;
        let free = StatvfsProbe.free_bytes(dir.path())?;
        assert!(free > 0);
        assert!(matches!(
            StatvfsProbe.free_bytes(&dir.path().join("missing")),
            Err(FsOpsError::Nix { .. })
        ));
        Ok(())
    }
}

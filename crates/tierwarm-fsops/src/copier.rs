//! Copy capability used by the transfer executor.
//!
//! # Design
//! - `Copier` is the narrow seam the state machine depends on; tests plug in fakes.
//! - Two engines: `rsync` as a subprocess, or an in-process copy with SHA-256 verification.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{FsOpsError, FsOpsResult};
use crate::ownership::Ownership;

const STDERR_TAIL_BYTES: usize = 2048;
const HASH_BUFFER_BYTES: usize = 1024 * 1024;

/// How a copy should be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Regular copy preserving timestamps and permissions.
    Standard,
    /// Copy verified by content checksum.
    Checksum,
    /// Report what would be copied without touching the destination.
    DryRun,
}

impl CopyMode {
    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Checksum => "checksum",
            Self::DryRun => "dry_run",
        }
    }
}

/// Result of a successful copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    /// Bytes written, or that would have been written in dry-run mode.
    pub bytes: u64,
}

/// Copies one file from `source` to `destination`.
pub trait Copier: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &'static str;

    /// Copy a single regular file. Destination parents already exist unless
    /// `mode` is [`CopyMode::DryRun`].
    ///
    /// # Errors
    ///
    /// Returns an error when the copy fails or, in checksum mode, when the
    /// copy does not verify.
    fn copy(&self, source: &Path, destination: &Path, mode: CopyMode) -> FsOpsResult<CopyReport>;
}

/// Shells out to `rsync -a`.
#[derive(Debug, Clone)]
pub struct RsyncCopier {
    program: PathBuf,
    inplace: bool,
    chown: Option<String>,
}

impl RsyncCopier {
    /// Build an rsync engine.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, inplace: bool, ownership: &Ownership) -> Self {
        Self {
            program: program.into(),
            inplace,
            chown: ownership.chown_spec(),
        }
    }

    /// Arguments passed to rsync for one transfer.
    #[must_use]
    pub fn arguments(&self, source: &Path, destination: &Path, mode: CopyMode) -> Vec<String> {
        let mut args = vec!["-a".to_string()];
        args.push(if self.inplace { "--inplace" } else { "--partial" }.to_string());
        if let Some(chown) = &self.chown {
            args.push(format!("--chown={chown}"));
        }
        match mode {
            CopyMode::Standard => {}
            CopyMode::Checksum => args.push("--checksum".to_string()),
            CopyMode::DryRun => args.push("--dry-run".to_string()),
        }
        args.push(source.to_string_lossy().into_owned());
        args.push(destination.to_string_lossy().into_owned());
        args
    }
}

impl Copier for RsyncCopier {
    fn name(&self) -> &'static str {
        "rsync"
    }

    fn copy(&self, source: &Path, destination: &Path, mode: CopyMode) -> FsOpsResult<CopyReport> {
        let bytes = file_len("rsync.stat_source", source)?;
        if mode == CopyMode::DryRun && !destination.parent().is_some_and(Path::exists) {
            debug!(
                destination = %destination.display(),
                "destination directory absent; dry run reports source size"
            );
            return Ok(CopyReport { bytes });
        }

        let args = self.arguments(source, destination, mode);
        debug!(program = %self.program.display(), args = ?args, "running copy command");
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| FsOpsError::CopyCommand {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
            let tail = stderr
                .get(tail_start..)
                .unwrap_or(stderr.as_ref())
                .trim()
                .to_string();
            return Err(FsOpsError::CopyFailed {
                program: self.program.clone(),
                status: output.status.code(),
                stderr: tail,
            });
        }
        Ok(CopyReport { bytes })
    }
}

/// Copies in-process, preserving permissions and modification time.
#[derive(Debug, Clone, Default)]
pub struct NativeCopier {
    ownership: Ownership,
}

impl NativeCopier {
    /// Build a native engine applying `ownership` to every copied file.
    #[must_use]
    pub const fn new(ownership: Ownership) -> Self {
        Self { ownership }
    }
}

impl Copier for NativeCopier {
    fn name(&self) -> &'static str {
        "native"
    }

    fn copy(&self, source: &Path, destination: &Path, mode: CopyMode) -> FsOpsResult<CopyReport> {
        let metadata =
            fs::metadata(source).map_err(|err| FsOpsError::io("native.stat_source", source, err))?;
        if mode == CopyMode::DryRun {
            return Ok(CopyReport {
                bytes: metadata.len(),
            });
        }

        let bytes = fs::copy(source, destination)
            .map_err(|err| FsOpsError::io("native.copy", destination, err))?;
        let modified = metadata
            .modified()
            .map_err(|err| FsOpsError::io("native.read_mtime", source, err))?;
        File::open(destination)
            .and_then(|file| file.set_modified(modified))
            .map_err(|err| FsOpsError::io("native.set_mtime", destination, err))?;
        self.ownership.apply(destination)?;

        if mode == CopyMode::Checksum && sha256_file(source)? != sha256_file(destination)? {
            return Err(FsOpsError::ChecksumMismatch {
                source_path: source.to_path_buf(),
                destination: destination.to_path_buf(),
            });
        }
        Ok(CopyReport { bytes })
    }
}

/// Hex SHA-256 digest of a file's contents.
///
/// # Errors
///
/// Returns an IO error when the file cannot be read.
pub fn sha256_file(path: &Path) -> FsOpsResult<String> {
    let mut file = File::open(path).map_err(|err| FsOpsError::io("checksum.open", path, err))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; HASH_BUFFER_BYTES];
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(FsOpsError::io("checksum.read", path, err)),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn file_len(operation: &'static str, path: &Path) -> FsOpsResult<u64> {
    fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|err| FsOpsError::io(operation, path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, SystemTime};

    type TestResult<T> = anyhow::Result<T>;

    #[test]
    fn rsync_arguments_follow_mode_and_options() -> TestResult<()> {
        let ownership = Ownership::resolve(Some("99"), Some("100"))?;
        let copier = RsyncCopier::new("/usr/bin/rsync", true, &ownership);
        let args = copier.arguments(
            Path::new("/mnt/user0/a.mkv"),
            Path::new("/mnt/cache/a.mkv"),
            CopyMode::Checksum,
        );
        assert_eq!(
            args,
            vec![
                "-a",
                "--inplace",
                "--chown=99:100",
                "--checksum",
                "/mnt/user0/a.mkv",
                "/mnt/cache/a.mkv",
            ]
        );

        let plain = RsyncCopier::new("rsync", false, &Ownership::default());
        let args = plain.arguments(Path::new("/a"), Path::new("/b"), CopyMode::DryRun);
        assert_eq!(args, vec!["-a", "--partial", "--dry-run", "/a", "/b"]);
        Ok(())
    }

    #[test]
    fn rsync_spawn_failure_is_reported() -> TestResult<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("a.mkv");
        fs::write(&source, b"payload")?;
        let copier = RsyncCopier::new(
            dir.path().join("missing-rsync"),
            true,
            &Ownership::default(),
        );
        let result = copier.copy(&source, &dir.path().join("b.mkv"), CopyMode::Standard);
        assert!(matches!(result, Err(FsOpsError::CopyCommand { .. })));
        Ok(())
    }

    #[test]
    fn native_copy_preserves_mode_and_mtime() -> TestResult<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("a.mkv");
        let destination = dir.path().join("b.mkv");
        fs::write(&source, vec![7_u8; 4096])?;
        fs::set_permissions(&source, fs::Permissions::from_mode(0o640))?;
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        File::options().write(true).open(&source)?.set_modified(stamp)?;

        let report = NativeCopier::default().copy(&source, &destination, CopyMode::Checksum)?;
        assert_eq!(report.bytes, 4096);
        let meta = fs::metadata(&destination)?;
        assert_eq!(meta.permissions().mode() & 0o777, 0o640);
        assert_eq!(meta.modified()?, stamp);
        assert_eq!(sha256_file(&source)?, sha256_file(&destination)?);
        Ok(())
    }

    #[test]
    fn native_dry_run_does_not_touch_destination() -> TestResult<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("a.mkv");
        fs::write(&source, b"12345")?;
        let destination = dir.path().join("missing/b.mkv");

        let report = NativeCopier::default().copy(&source, &destination, CopyMode::DryRun)?;
        assert_eq!(report.bytes, 5);
        assert!(!destination.exists());
        assert!(!dir.path().join("missing").exists());
        Ok(())
    }

    #[test]
    fn sha256_matches_known_digest() -> TestResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("abc.txt");
        fs::write(&path, b"abc")?;
        assert_eq!(
            sha256_file(&path)?,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        Ok(())
    }
}

//! # Design
//!
//! - Provide structured, constant-message errors for the transfer pipeline.
//! - Capture operation context (paths, fields, inputs) so failures are reproducible in tests.
//! - Preserve source errors without interpolating context into error messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for filesystem operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced while planning or executing tier transfers.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// IO failures while interacting with the filesystem.
    #[error("fsops io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Walkdir traversal failures.
    #[error("fsops walkdir failure")]
    Walkdir {
        /// Operation that triggered the walkdir failure.
        operation: &'static str,
        /// Path involved in the walkdir failure.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// Globset compilation failures.
    #[error("fsops glob failure")]
    Glob {
        /// Operation that triggered the glob failure.
        operation: &'static str,
        /// Glob pattern that failed to compile.
        pattern: String,
        /// Underlying globset error.
        source: globset::Error,
    },
    /// The external copy program could not be started.
    #[error("fsops copy command failed to start")]
    CopyCommand {
        /// Program that was invoked.
        program: PathBuf,
        /// Underlying spawn error.
        source: io::Error,
    },
    /// The external copy program exited unsuccessfully.
    #[error("fsops copy command exited unsuccessfully")]
    CopyFailed {
        /// Program that was invoked.
        program: PathBuf,
        /// Exit code, absent when terminated by a signal.
        status: Option<i32>,
        /// Trailing standard error output.
        stderr: String,
    },
    /// Content digests of source and destination differ after a copy.
    #[error("fsops checksum mismatch")]
    ChecksumMismatch {
        /// File that was copied.
        source_path: PathBuf,
        /// Copy that failed verification.
        destination: PathBuf,
    },
    /// Configuration handed to the core was rejected.
    #[error("fsops invalid policy")]
    InvalidPolicy {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Input validation failures.
    #[error("fsops invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// User lookup failed when resolving ownership overrides.
    #[error("fsops user lookup failed")]
    UserLookup {
        /// Username that failed lookup.
        user: String,
        /// Underlying nix error.
        source: nix::Error,
    },
    /// Group lookup failed when resolving ownership overrides.
    #[error("fsops group lookup failed")]
    GroupLookup {
        /// Group name that failed lookup.
        group: String,
        /// Underlying nix error.
        source: nix::Error,
    },
    /// Nix syscall failures.
    #[error("fsops nix failure")]
    Nix {
        /// Operation that triggered the nix failure.
        operation: &'static str,
        /// Path involved in the nix failure.
        path: PathBuf,
        /// Underlying nix error.
        source: nix::Error,
    },
    /// Unsupported operation or file type.
    #[error("fsops unsupported operation")]
    Unsupported {
        /// Operation that is unsupported.
        operation: &'static str,
        /// Optional value that triggered the unsupported error.
        value: Option<String>,
    },
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) const fn glob(
        operation: &'static str,
        pattern: String,
        source: globset::Error,
    ) -> Self {
        Self::Glob {
            operation,
            pattern,
            source,
        }
    }

    pub(crate) fn nix(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: nix::Error,
    ) -> Self {
        Self::Nix {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn policy(field: &'static str, reason: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            field,
            reason,
            value: Some(value.into()),
        }
    }
}

//! # Design
//!
//! - Centralize application-level errors for bootstrap and orchestration.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: tierwarm_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: tierwarm_telemetry::TelemetryError,
    },
    /// Transfer planning or execution setup failed.
    #[error("filesystem operation failed")]
    FsOps {
        /// Operation identifier.
        operation: &'static str,
        /// Source fsops error.
        source: tierwarm_fsops::FsOpsError,
    },
    /// An external path list could not be produced.
    #[error("candidate source failed")]
    CandidateSource {
        /// Which list was being fetched (`warm`, `demote`, `in_use`).
        role: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Optional detail (exit status, path).
        detail: Option<String>,
    },
    /// Another run holds the run lock.
    #[error("run lock held by another process")]
    LockHeld {
        /// Lock file path.
        path: PathBuf,
    },
    /// Locking the run lock failed for another reason.
    #[error("run lock failed")]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Underlying nix error.
        source: nix::Error,
    },
    /// A blocking task panicked or was cancelled.
    #[error("blocking task failed")]
    Join {
        /// Operation identifier.
        operation: &'static str,
        /// Source join error.
        source: tokio::task::JoinError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
    /// JSON rendering failed.
    #[error("json operation failed")]
    Json {
        /// Operation identifier.
        operation: &'static str,
        /// Source JSON error.
        source: serde_json::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: tierwarm_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: tierwarm_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn fsops(operation: &'static str, source: tierwarm_fsops::FsOpsError) -> Self {
        Self::FsOps { operation, source }
    }

    pub(crate) const fn join(operation: &'static str, source: tokio::task::JoinError) -> Self {
        Self::Join { operation, source }
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: Some(path.into()),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "load",
            tierwarm_config::ConfigError::InvalidField {
                field: "array_root",
                reason: "not_absolute",
                value: Some("mnt".to_string()),
            },
        );
        assert!(matches!(config, AppError::Config { operation: "load", .. }));
        assert_eq!(config.to_string(), "configuration operation failed");
        assert!(config.source().is_some());

        let fsops = AppError::fsops(
            "roots",
            tierwarm_fsops::FsOpsError::InvalidPolicy {
                field: "cache_root",
                reason: "identical_roots",
                value: None,
            },
        );
        assert!(matches!(fsops, AppError::FsOps { .. }));

        let io = AppError::io("lock.open", "/tmp/x.lock", io::Error::other("denied"));
        assert!(matches!(io, AppError::Io { path: Some(_), .. }));

        let held = AppError::LockHeld {
            path: PathBuf::from("/tmp/tierwarm.lock"),
        };
        assert_eq!(held.to_string(), "run lock held by another process");
        assert!(held.source().is_none());
    }
}

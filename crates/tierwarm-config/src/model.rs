//! Typed, validated run configuration.
//!
//! # Design
//! - Pure data carriers built once at startup by the loader and shared by reference.
//! - Every value is already resolved: absolute paths, byte counts, numeric modes.

use std::path::PathBuf;
use std::time::Duration;

/// Immutable configuration for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Root of the cold bulk storage tier.
    pub array_root: PathBuf,
    /// Root of the fast cache tier.
    pub cache_root: PathBuf,
    /// Optional union-share root that aliases both tiers.
    pub share_root: Option<PathBuf>,
    /// Ordered prefix-substitution rules applied to foreign candidate paths.
    pub path_map: Vec<PathMapping>,
    /// Space budget inputs for the warm phase.
    pub budget: BudgetSettings,
    /// Array to cache promotion settings.
    pub warm: WarmSettings,
    /// Cache to array demotion settings.
    pub demote: DemoteSettings,
    /// Optional source listing files currently in active use.
    pub in_use: Option<SourceSpec>,
    /// Glob patterns excluding host source paths from any transfer.
    pub exclude: Vec<String>,
    /// Copy engine selection and ownership overrides.
    pub copy: CopySettings,
    /// Lower-case companion file extensions without the leading dot.
    pub sidecar_extensions: Vec<String>,
    /// Lower-case media file extensions without the leading dot.
    pub media_extensions: Vec<String>,
    /// Report what would happen without mutating either tier.
    pub dry_run: bool,
    /// Advisory lock file preventing overlapping runs.
    pub lock_path: PathBuf,
    /// Logging output preferences.
    pub logging: LoggingSettings,
    /// Metrics export preferences.
    pub metrics: MetricsSettings,
}

/// One `(prefix, replacement)` translation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    /// Foreign path prefix to match.
    pub prefix: PathBuf,
    /// Host path substituted for the prefix.
    pub replacement: PathBuf,
}

/// Inputs to the transfer budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BudgetSettings {
    /// Bytes held back for other writers of the cache tier.
    pub reserve_bytes: u64,
    /// Bytes that must stay free on the cache tier after the run.
    pub min_free_bytes: u64,
    /// Drop candidates that do not fit instead of aborting the run.
    pub trim_on_overflow: bool,
}

/// Warm (array to cache) phase settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmSettings {
    /// Delete the array copy once the cache copy is verified.
    pub move_files: bool,
    /// Carry companion files along with each media item.
    pub sidecars: bool,
    /// Cap on distinct candidates considered (`0` means unlimited).
    pub max_items: usize,
    /// Ranked candidate source.
    pub candidates: Option<SourceSpec>,
}

/// Demote (cache to array) phase settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoteSettings {
    /// Whether the demote phase runs at all.
    pub enabled: bool,
    /// Carry companion files along with each media item.
    pub sidecars: bool,
    /// Source of cache-resident files to move back.
    pub candidates: Option<SourceSpec>,
    /// Absolute library directories on the cache tier scanned for orphans.
    pub orphan_roots: Vec<PathBuf>,
}

/// Where an external path list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Run a command and read one path per stdout line.
    Command {
        /// Program followed by its arguments.
        argv: Vec<String>,
        /// Maximum time the command may run.
        timeout: Duration,
    },
    /// Read one path per line from a file.
    File {
        /// Path of the list file.
        path: PathBuf,
    },
}

/// Copy engine implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyEngine {
    /// Shell out to `rsync`.
    #[default]
    Rsync,
    /// Copy in-process.
    Native,
}

impl CopyEngine {
    /// Render the engine as its lowercase configuration name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rsync => "rsync",
            Self::Native => "native",
        }
    }
}

/// Copy capability settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySettings {
    /// Engine used for every transfer.
    pub engine: CopyEngine,
    /// `rsync` binary used by the rsync engine.
    pub rsync_path: PathBuf,
    /// Write destination files in place so interrupted copies can resume.
    pub inplace: bool,
    /// Owner applied to copied files and created directories.
    pub owner: Option<String>,
    /// Group applied to copied files and created directories.
    pub group: Option<String>,
    /// Permission bits applied to created directories.
    pub dir_mode: Option<u32>,
}

/// Logging preferences handed to the telemetry crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Default level filter when `RUST_LOG` is unset.
    pub level: String,
    /// Output format name (`pretty` or `json`); inferred when absent.
    pub format: Option<String>,
}

/// Metrics export preferences.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetricsSettings {
    /// Prometheus textfile written at the end of each run.
    pub textfile: Option<PathBuf>,
}

//! External path lists: warm candidates, demote candidates and in-use files.
//!
//! # Design
//! - One line per path, most relevant first; ordering is preserved.
//! - A failing source degrades to an empty list with a warning.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tierwarm_config::SourceSpec;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

/// Produces raw path lines.
#[async_trait]
pub trait PathSource: Send + Sync {
    /// Short description for logs.
    fn label(&self) -> String;

    /// Fetch the raw lines.
    ///
    /// # Errors
    ///
    /// Returns an error when the list cannot be produced.
    async fn fetch(&self, role: &'static str) -> AppResult<Vec<String>>;
}

/// Runs a command and reads its standard output.
#[derive(Debug, Clone)]
pub struct CommandSource {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandSource {
    /// Build a command source from program and arguments.
    #[must_use]
    pub const fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

#[async_trait]
impl PathSource for CommandSource {
    fn label(&self) -> String {
        self.argv.join(" ")
    }

    async fn fetch(&self, role: &'static str) -> AppResult<Vec<String>> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(AppError::CandidateSource {
                role,
                reason: "empty_command",
                detail: None,
            });
        };
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| AppError::CandidateSource {
                role,
                reason: "timeout",
                detail: Some(format!("{}s", self.timeout.as_secs())),
            })?
            .map_err(|source| AppError::io("source.spawn", program, source))?;

        if !output.status.success() {
            return Err(AppError::CandidateSource {
                role,
                reason: "exit_status",
                detail: Some(
                    output
                        .status
                        .code()
                        .map_or_else(|| "signal".to_string(), |code| code.to_string()),
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// Reads a list file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Build a file source.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PathSource for FileSource {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self, _role: &'static str) -> AppResult<Vec<String>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| AppError::io("source.read", &self.path, source))?;
        Ok(raw.lines().map(str::to_string).collect())
    }
}

/// Fixed in-memory list (also stands in for an unconfigured source).
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    lines: Vec<String>,
}

impl StaticSource {
    /// Build a source returning `lines`.
    #[must_use]
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PathSource for StaticSource {
    fn label(&self) -> String {
        format!("static({})", self.lines.len())
    }

    async fn fetch(&self, _role: &'static str) -> AppResult<Vec<String>> {
        Ok(self.lines.clone())
    }
}

/// Build the source described by configuration; absent means an empty list.
#[must_use]
pub fn from_spec(spec: Option<&SourceSpec>) -> Arc<dyn PathSource> {
    match spec {
        Some(SourceSpec::Command { argv, timeout }) => {
            Arc::new(CommandSource::new(argv.clone(), *timeout))
        }
        Some(SourceSpec::File { path }) => Arc::new(FileSource::new(path.clone())),
        None => Arc::new(StaticSource::default()),
    }
}

/// Fetch lines, degrading any failure to an empty list.
pub async fn collect_lines(source: &dyn PathSource, role: &'static str) -> Vec<String> {
    match source.fetch(role).await {
        Ok(lines) => {
            debug!(role, source = %source.label(), lines = lines.len(), "path source read");
            lines
        }
        Err(err) => {
            warn!(
                role,
                source = %source.label(),
                error = ?err,
                "path source failed; treating as empty"
            );
            Vec::new()
        }
    }
}

/// Trim, drop blank and relative lines, de-duplicate preserving first
/// occurrence, then cap at `max_items` (`0` means unlimited).
#[must_use]
pub fn normalize_candidates(lines: Vec<String>, max_items: usize) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let path = PathBuf::from(trimmed);
        if !path.is_absolute() {
            warn!(path = %trimmed, "relative candidate path dropped");
            continue;
        }
        if seen.insert(path.clone()) {
            candidates.push(path);
        }
        if max_items > 0 && candidates.len() >= max_items {
            break;
        }
    }
    candidates
}

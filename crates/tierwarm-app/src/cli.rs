//! Command-line surface for the `tierwarm` binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tierwarm_config::RunSettings;

/// Promote ranked media from the array tier to the cache tier, and demote it back.
#[derive(Debug, Clone, Parser)]
#[command(name = "tierwarm", version, about)]
pub struct Cli {
    /// Path to the YAML configuration document.
    #[arg(long, short = 'c', env = "TIERWARM_CONFIG")]
    pub config: PathBuf,

    /// Report what would happen without changing either tier.
    #[arg(long, env = "TIERWARM_DRY_RUN")]
    pub dry_run: bool,

    /// Override the configured log level (`RUST_LOG` still wins).
    #[arg(long, env = "TIERWARM_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Override the configured log format.
    #[arg(long, value_enum, env = "TIERWARM_LOG_FORMAT")]
    pub log_format: Option<LogFormatArg>,

    /// Skip the demote phase and orphan reconciliation for this run.
    #[arg(long)]
    pub no_demote: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    pub summary_json: bool,
}

/// Log output formats accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable output.
    Pretty,
    /// Structured JSON lines.
    Json,
}

impl LogFormatArg {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl Cli {
    /// Fold command-line overrides into loaded settings.
    pub fn apply(&self, settings: &mut RunSettings) {
        if self.dry_run {
            settings.dry_run = true;
        }
        if self.no_demote {
            settings.demote.enabled = false;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = Some(format.as_str().to_string());
        }
    }
}

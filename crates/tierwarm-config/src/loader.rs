//! YAML document loading and conversion into [`RunSettings`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    BudgetSettings, CopyEngine, CopySettings, DemoteSettings, LoggingSettings, MetricsSettings,
    PathMapping, RunSettings, SourceSpec, WarmSettings,
};
use crate::validate::{
    normalize_extensions, parse_byte_size, parse_octal_mode, parse_path_map, path_mapping,
    require_absolute,
};

/// Read and validate the configuration document at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not a valid document, or
/// fails validation.
pub fn load_settings(path: &Path) -> ConfigResult<RunSettings> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "config.read",
        path: path.to_path_buf(),
        source,
    })?;
    parse_settings(&raw, path)
}

/// Parse and validate a configuration document already held in memory.
///
/// `origin` is only used to label parse errors.
///
/// # Errors
///
/// Returns an error if the document is malformed or fails validation.
pub fn parse_settings(document: &str, origin: &Path) -> ConfigResult<RunSettings> {
    let raw: RawSettings = serde_yaml::from_str(document).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;
    raw.into_settings()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    array_root: PathBuf,
    cache_root: PathBuf,
    #[serde(default)]
    share_root: Option<PathBuf>,
    #[serde(default)]
    path_map: Option<RawPathMap>,
    #[serde(default)]
    budget: RawBudget,
    #[serde(default)]
    warm: RawWarm,
    #[serde(default)]
    demote: RawDemote,
    #[serde(default)]
    in_use: Option<RawSource>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    copy: RawCopy,
    #[serde(default)]
    sidecar_extensions: Option<Vec<String>>,
    #[serde(default)]
    media_extensions: Option<Vec<String>>,
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    lock_path: Option<PathBuf>,
    #[serde(default)]
    logging: RawLogging,
    #[serde(default)]
    metrics: RawMetrics,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPathMap {
    Rules(Vec<RawPathRule>),
    Compact(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPathRule {
    prefix: String,
    replacement: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawByteSize {
    Bytes(u64),
    Text(String),
}

impl Default for RawByteSize {
    fn default() -> Self {
        Self::Bytes(0)
    }
}

impl RawByteSize {
    fn resolve(&self, field: &'static str) -> ConfigResult<u64> {
        match self {
            Self::Bytes(bytes) => Ok(*bytes),
            Self::Text(text) => parse_byte_size(field, text),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBudget {
    #[serde(default)]
    reserve: RawByteSize,
    #[serde(default)]
    min_free: RawByteSize,
    #[serde(default = "enabled")]
    trim_on_overflow: bool,
}

impl Default for RawBudget {
    fn default() -> Self {
        Self {
            reserve: RawByteSize::default(),
            min_free: RawByteSize::default(),
            trim_on_overflow: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWarm {
    #[serde(default)]
    move_files: bool,
    #[serde(default = "enabled")]
    sidecars: bool,
    #[serde(default = "default_max_items")]
    max_items: usize,
    #[serde(default)]
    candidates: Option<RawSource>,
}

impl Default for RawWarm {
    fn default() -> Self {
        Self {
            move_files: false,
            sidecars: true,
            max_items: defaults::WARM_MAX_ITEMS,
            candidates: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDemote {
    #[serde(default)]
    enabled: bool,
    #[serde(default = "enabled")]
    sidecars: bool,
    #[serde(default)]
    candidates: Option<RawSource>,
    #[serde(default)]
    orphan_roots: Vec<PathBuf>,
}

impl Default for RawDemote {
    fn default() -> Self {
        Self {
            enabled: false,
            sidecars: true,
            candidates: None,
            orphan_roots: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSource {
    #[serde(default)]
    command: Option<Vec<String>>,
    #[serde(default)]
    file: Option<PathBuf>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawEngine {
    Rsync,
    Native,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCopy {
    #[serde(default)]
    engine: Option<RawEngine>,
    #[serde(default)]
    rsync_path: Option<PathBuf>,
    #[serde(default = "enabled")]
    inplace: bool,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    dir_mode: Option<String>,
}

impl Default for RawCopy {
    fn default() -> Self {
        Self {
            engine: None,
            rsync_path: None,
            inplace: true,
            owner: None,
            group: None,
            dir_mode: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLogging {
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMetrics {
    #[serde(default)]
    textfile: Option<PathBuf>,
}

const fn enabled() -> bool {
    true
}

const fn default_max_items() -> usize {
    defaults::WARM_MAX_ITEMS
}

impl RawSettings {
    fn into_settings(self) -> ConfigResult<RunSettings> {
        let array_root = require_absolute("array_root", &self.array_root)?;
        let cache_root = require_absolute("cache_root", &self.cache_root)?;
        check_roots_disjoint(&array_root, &cache_root)?;
        let share_root = self
            .share_root
            .as_deref()
            .map(|root| require_absolute("share_root", root))
            .transpose()?;
        if let Some(share) = share_root.as_ref() {
            check_share_root(share, &array_root, &cache_root)?;
        }

        let path_map = match self.path_map {
            None => Vec::new(),
            Some(RawPathMap::Compact(text)) => parse_path_map(&text)?,
            Some(RawPathMap::Rules(rules)) => rules
                .iter()
                .map(|rule| path_mapping(&rule.prefix, &rule.replacement))
                .collect::<ConfigResult<Vec<PathMapping>>>()?,
        };

        let budget = BudgetSettings {
            reserve_bytes: self.budget.reserve.resolve("budget.reserve")?,
            min_free_bytes: self.budget.min_free.resolve("budget.min_free")?,
            trim_on_overflow: self.budget.trim_on_overflow,
        };

        let warm = WarmSettings {
            move_files: self.warm.move_files,
            sidecars: self.warm.sidecars,
            max_items: self.warm.max_items,
            candidates: self
                .warm
                .candidates
                .map(|source| source.into_spec("warm.candidates"))
                .transpose()?,
        };

        let orphan_roots = self
            .demote
            .orphan_roots
            .iter()
            .map(|root| resolve_orphan_root(&cache_root, root))
            .collect::<ConfigResult<Vec<PathBuf>>>()?;
        let demote = DemoteSettings {
            enabled: self.demote.enabled,
            sidecars: self.demote.sidecars,
            candidates: self
                .demote
                .candidates
                .map(|source| source.into_spec("demote.candidates"))
                .transpose()?,
            orphan_roots,
        };

        let in_use = self
            .in_use
            .map(|source| source.into_spec("in_use"))
            .transpose()?;

        for pattern in &self.exclude {
            if pattern.trim().is_empty() {
                return Err(ConfigError::invalid("exclude", "empty_pattern", pattern.as_str()));
            }
        }

        let copy = self.copy.into_settings()?;

        let sidecar_extensions = match self.sidecar_extensions {
            Some(values) => normalize_extensions("sidecar_extensions", &values)?,
            None => owned(defaults::SIDECAR_EXTENSIONS),
        };
        let media_extensions = match self.media_extensions {
            Some(values) => normalize_extensions("media_extensions", &values)?,
            None => owned(defaults::MEDIA_EXTENSIONS),
        };
        if let Some(shared) = sidecar_extensions
            .iter()
            .find(|ext| media_extensions.contains(ext))
        {
            return Err(ConfigError::invalid(
                "sidecar_extensions",
                "overlaps_media_extensions",
                shared.as_str(),
            ));
        }

        let lock_path = match self.lock_path {
            Some(path) => require_absolute("lock_path", &path)?,
            None => PathBuf::from(defaults::LOCK_PATH),
        };

        Ok(RunSettings {
            array_root,
            cache_root,
            share_root,
            path_map,
            budget,
            warm,
            demote,
            in_use,
            exclude: self.exclude,
            copy,
            sidecar_extensions,
            media_extensions,
            dry_run: self.dry_run,
            lock_path,
            logging: LoggingSettings {
                level: self
                    .logging
                    .level
                    .unwrap_or_else(|| defaults::LOG_LEVEL.to_string()),
                format: self.logging.format,
            },
            metrics: MetricsSettings {
                textfile: self.metrics.textfile,
            },
        })
    }
}

impl RawSource {
    fn into_spec(self, field: &'static str) -> ConfigResult<SourceSpec> {
        match (self.command, self.file) {
            (Some(argv), None) => {
                if argv.first().is_none_or(|program| program.trim().is_empty()) {
                    return Err(ConfigError::InvalidField {
                        field,
                        reason: "empty_command",
                        value: None,
                    });
                }
                let secs = self.timeout_secs.unwrap_or(defaults::SOURCE_TIMEOUT_SECS);
                if secs == 0 {
                    return Err(ConfigError::invalid(field, "zero_timeout", "0"));
                }
                Ok(SourceSpec::Command {
                    argv,
                    timeout: Duration::from_secs(secs),
                })
            }
            (None, Some(path)) => Ok(SourceSpec::File { path }),
            (Some(_), Some(_)) => Err(ConfigError::InvalidField {
                field,
                reason: "command_and_file",
                value: None,
            }),
            (None, None) => Err(ConfigError::InvalidField {
                field,
                reason: "missing_command_or_file",
                value: None,
            }),
        }
    }
}

impl RawCopy {
    fn into_settings(self) -> ConfigResult<CopySettings> {
        let engine = match self.engine {
            None | Some(RawEngine::Rsync) => CopyEngine::Rsync,
            Some(RawEngine::Native) => CopyEngine::Native,
        };
        let dir_mode = self
            .dir_mode
            .as_deref()
            .map(|value| parse_octal_mode("copy.dir_mode", value))
            .transpose()?;
        Ok(CopySettings {
            engine,
            rsync_path: self
                .rsync_path
                .unwrap_or_else(|| PathBuf::from(defaults::RSYNC_PATH)),
            inplace: self.inplace,
            owner: non_blank(self.owner),
            group: non_blank(self.group),
            dir_mode,
        })
    }
}

fn check_roots_disjoint(array_root: &Path, cache_root: &Path) -> ConfigResult<()> {
    if array_root == cache_root {
        return Err(ConfigError::invalid(
            "cache_root",
            "identical_to_array_root",
            cache_root.to_string_lossy(),
        ));
    }
    if array_root.starts_with(cache_root) || cache_root.starts_with(array_root) {
        return Err(ConfigError::invalid(
            "cache_root",
            "nested_with_array_root",
            cache_root.to_string_lossy(),
        ));
    }
    Ok(())
}

fn check_share_root(share: &Path, array_root: &Path, cache_root: &Path) -> ConfigResult<()> {
    if share == array_root || share == cache_root {
        return Err(ConfigError::invalid(
            "share_root",
            "duplicates_tier_root",
            share.to_string_lossy(),
        ));
    }
    if [array_root, cache_root]
        .into_iter()
        .any(|root| share.starts_with(root) || root.starts_with(share))
    {
        return Err(ConfigError::invalid(
            "share_root",
            "nested_with_tier_root",
            share.to_string_lossy(),
        ));
    }
    Ok(())
}

fn resolve_orphan_root(cache_root: &Path, root: &Path) -> ConfigResult<PathBuf> {
    let joined = if root.is_absolute() {
        root.to_path_buf()
    } else {
        cache_root.join(root)
    };
    let resolved = require_absolute("demote.orphan_roots", &joined)?;
    if !resolved.starts_with(cache_root) {
        return Err(ConfigError::invalid(
            "demote.orphan_roots",
            "outside_cache_root",
            resolved.to_string_lossy(),
        ));
    }
    Ok(resolved)
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

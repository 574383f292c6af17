//! Validation helpers and parsing utilities for configuration documents.

use std::path::{Component, Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::model::PathMapping;

const KIB: u64 = 1024;

/// Parse a byte quantity such as `1048576`, `512M`, `10GiB` or `1.5T`.
///
/// Suffixes are case-insensitive and always binary (`G`, `GB` and `GiB` all
/// mean 2^30 bytes).
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is empty, negative,
/// carries an unknown suffix or overflows `u64`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn parse_byte_size(field: &'static str, value: &str) -> ConfigResult<u64> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);
    if number.is_empty() {
        return Err(ConfigError::invalid(field, "invalid_size", value));
    }

    let multiplier = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => KIB,
        "m" | "mb" | "mib" => KIB.pow(2),
        "g" | "gb" | "gib" => KIB.pow(3),
        "t" | "tb" | "tib" => KIB.pow(4),
        _ => return Err(ConfigError::invalid(field, "unknown_size_suffix", value)),
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| ConfigError::invalid(field, "size_overflow", value));
    }

    let fractional: f64 = number
        .parse()
        .map_err(|_| ConfigError::invalid(field, "invalid_size", value))?;
    let bytes = (fractional * multiplier as f64).floor();
    if !bytes.is_finite() || bytes < 0.0 || bytes >= u64::MAX as f64 {
        return Err(ConfigError::invalid(field, "size_overflow", value));
    }
    Ok(bytes as u64)
}

/// Parse an octal permission string (`0o775`, `0775` or `775`).
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for non-octal input or bits outside `0o7777`.
pub fn parse_octal_mode(field: &'static str, value: &str) -> ConfigResult<u32> {
    let trimmed = value.trim().trim_start_matches("0o");
    let mode = u32::from_str_radix(trimmed, 8)
        .map_err(|_| ConfigError::invalid(field, "invalid_octal", value))?;
    if mode > 0o7777 {
        return Err(ConfigError::invalid(field, "mode_out_of_range", value));
    }
    Ok(mode)
}

/// Parse the compact `"/data=/mnt/user,/media=/mnt/user"` path-map form.
///
/// Blank entries are ignored; an entry without `=` is rejected.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when an entry is malformed.
pub fn parse_path_map(value: &str) -> ConfigResult<Vec<PathMapping>> {
    let mut rules = Vec::new();
    for pair in value.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let Some((prefix, replacement)) = pair.split_once('=') else {
            return Err(ConfigError::invalid("path_map", "missing_separator", pair));
        };
        rules.push(path_mapping(prefix, replacement)?);
    }
    Ok(rules)
}

pub(crate) fn path_mapping(prefix: &str, replacement: &str) -> ConfigResult<PathMapping> {
    let prefix = prefix.trim();
    let replacement = replacement.trim();
    if prefix.trim_end_matches('/').is_empty() {
        return Err(ConfigError::invalid("path_map.prefix", "empty", prefix));
    }
    if replacement.is_empty() {
        return Err(ConfigError::invalid(
            "path_map.replacement",
            "empty",
            replacement,
        ));
    }
    Ok(PathMapping {
        prefix: PathBuf::from(prefix),
        replacement: PathBuf::from(replacement),
    })
}

/// Require an absolute path without `..` components.
pub(crate) fn require_absolute(field: &'static str, path: &Path) -> ConfigResult<PathBuf> {
    let rendered = path.to_string_lossy();
    if !path.is_absolute() {
        return Err(ConfigError::invalid(field, "not_absolute", rendered));
    }
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(ConfigError::invalid(field, "parent_traversal", rendered));
    }
    Ok(path.components().collect())
}

/// Lower-case extensions, strip leading dots and reject empty sets.
pub(crate) fn normalize_extensions(
    field: &'static str,
    values: &[String],
) -> ConfigResult<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let ext = value.trim().trim_start_matches('.').to_ascii_lowercase();
        if ext.is_empty() {
            return Err(ConfigError::invalid(field, "empty_extension", value.as_str()));
        }
        if !normalized.contains(&ext) {
            normalized.push(ext);
        }
    }
    if normalized.is_empty() {
        return Err(ConfigError::InvalidField {
            field,
            reason: "empty_list",
            value: None,
        });
    }
    Ok(normalized)
}

//! Companion file discovery.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{FsOpsError, FsOpsResult};

/// Finds subtitle, metadata and artwork files that belong to a media file.
#[derive(Debug, Clone)]
pub struct SidecarResolver {
    extensions: Vec<String>,
    media_extensions: Vec<String>,
}

impl SidecarResolver {
    /// Build a resolver from companion and media extensions (case and a
    /// leading dot are ignored).
    #[must_use]
    pub fn new(extensions: &[String], media_extensions: &[String]) -> Self {
        Self {
            extensions: normalize(extensions),
            media_extensions: normalize(media_extensions),
        }
    }

    /// Whether `path` carries one of the companion extensions.
    #[must_use]
    pub fn is_sidecar(&self, path: &Path) -> bool {
        has_extension(path, &self.extensions)
    }

    /// Whether `path` carries one of the media extensions.
    #[must_use]
    pub fn is_media(&self, path: &Path) -> bool {
        has_extension(path, &self.media_extensions)
    }

    /// Companion files next to `media`, sorted by name.
    ///
    /// A companion shares the media stem and either follows it directly
    /// (`Movie.srt`) or after a tag (`Movie.en.forced.srt`). When another
    /// media file in the directory has a longer matching stem
    /// (`Movie.sample.mkv` for `Movie.sample.srt`) the companion is its.
    /// A missing directory yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the directory exists but cannot be listed.
    pub fn resolve(&self, media: &Path) -> FsOpsResult<Vec<PathBuf>> {
        let (Some(dir), Some(stem)) = (media.parent(), media.file_stem()) else {
            return Ok(Vec::new());
        };
        let stem = stem.to_string_lossy().into_owned();

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(FsOpsError::io("sidecar.read_dir", dir, err)),
        };

        let mut media_stems = HashSet::from([stem.clone()]);
        let mut companions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| FsOpsError::io("sidecar.read_entry", dir, err))?;
            let path = entry.path();
            if path == media || !path.is_file() {
                continue;
            }
            if self.is_media(&path) {
                if let Some(other) = path.file_stem() {
                    media_stems.insert(other.to_string_lossy().into_owned());
                }
            } else if self.is_sidecar(&path) {
                companions.push(path);
            }
        }

        let mut found: Vec<PathBuf> = companions
            .into_iter()
            .filter(|path| owner_stem(path, &media_stems).is_some_and(|owner| owner == stem))
            .collect();
        found.sort();
        Ok(found)
    }

    /// Stems of the media files in `dir`.
    pub(crate) fn media_stems(&self, dir: &Path) -> io::Result<HashSet<String>> {
        Ok(fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.is_media(path))
            .filter_map(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
            .collect())
    }
}

/// Longest candidate stem of `sidecar` that names one of `media_stems`.
pub(crate) fn owner_stem(sidecar: &Path, media_stems: &HashSet<String>) -> Option<String> {
    owner_stems(sidecar)
        .into_iter()
        .find(|stem| media_stems.contains(stem))
}

fn normalize(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

/// Stems a sidecar could belong to, longest first.
///
/// `Movie.en.forced.srt` yields `Movie.en.forced`, `Movie.en`, `Movie`.
#[must_use]
pub fn owner_stems(sidecar: &Path) -> Vec<String> {
    let Some(stem) = sidecar.file_stem().map(|stem| stem.to_string_lossy().into_owned()) else {
        return Vec::new();
    };
    let mut stems = vec![stem.clone()];
    let mut rest = stem.as_str();
    while let Some((head, _)) = rest.rsplit_once('.') {
        if head.is_empty() {
            break;
        }
        stems.push(head.to_string());
        rest = head;
    }
    stems
}

pub(crate) fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| extensions.iter().any(|known| *known == ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> SidecarResolver {
        SidecarResolver::new(
            &["srt".to_string(), ".NFO".to_string(), "jpg".to_string()],
            &["mkv".to_string(), "mp4".to_string()],
        )
    }

    #[test]
    fn resolve_finds_plain_and_tagged_companions() -> FsOpsResult<()> {
        let dir = tempfile::tempdir().map_err(|err| FsOpsError::io("tempdir", "/tmp", err))?;
        let root = dir.path();
        for name in [
            "Heat (1995).mkv",
            "Heat (1995).srt",
            "Heat (1995).en.forced.srt",
            "Heat (1995).NFO",
            "Heat (1995)-fanart.jpg",
            "Heat (1995).txt",
            "Other.srt",
        ] {
            fs::write(root.join(name), b"x").map_err(|err| FsOpsError::io("write", root, err))?;
        }

        let found = resolver().resolve(&root.join("Heat (1995).mkv"))?;
        let names: Vec<_> = found
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["Heat (1995).NFO", "Heat (1995).en.forced.srt", "Heat (1995).srt"]
        );
        Ok(())
    }

    #[test]
    fn resolve_leaves_companions_of_longer_named_media() -> FsOpsResult<()> {
        let dir = tempfile::tempdir().map_err(|err| FsOpsError::io("tempdir", "/tmp", err))?;
        let root = dir.path();
        for name in ["Movie.mkv", "Movie.en.srt", "Movie.sample.mkv", "Movie.sample.srt"] {
            fs::write(root.join(name), b"x").map_err(|err| FsOpsError::io("write", root, err))?;
        }

        assert_eq!(
            resolver().resolve(&root.join("Movie.mkv"))?,
            vec![root.join("Movie.en.srt")]
        );
        assert_eq!(
            resolver().resolve(&root.join("Movie.sample.mkv"))?,
            vec![root.join("Movie.sample.srt")]
        );
        Ok(())
    }

    #[test]
    fn resolve_tolerates_missing_directory() -> FsOpsResult<()> {
        let found = resolver().resolve(Path::new("/nonexistent/tierwarm/Movie.mkv"))?;
        assert!(found.is_empty());
        Ok(())
    }

    #[test]
    fn owner_stems_strip_tags_progressively() {
        assert_eq!(
            owner_stems(Path::new("/m/Movie.en.forced.srt")),
            vec!["Movie.en.forced", "Movie.en", "Movie"]
        );
        assert_eq!(owner_stems(Path::new("/m/.hidden.srt")), vec![".hidden"]);
        assert!(resolver().is_sidecar(Path::new("/m/poster.JPG")));
        assert!(!resolver().is_sidecar(Path::new("/m/movie.mkv")));
    }
}

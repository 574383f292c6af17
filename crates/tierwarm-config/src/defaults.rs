//! Default values applied when the configuration document omits a field.

/// Lock file guarding against overlapping runs.
pub(crate) const LOCK_PATH: &str = "/tmp/tierwarm.lock";
/// Upper bound on warm candidates considered per run (`0` disables the cap).
pub(crate) const WARM_MAX_ITEMS: usize = 500;
/// Seconds an external candidate command may run before it is abandoned.
pub(crate) const SOURCE_TIMEOUT_SECS: u64 = 300;
/// Binary used by the rsync copy engine.
pub(crate) const RSYNC_PATH: &str = "rsync";
/// Log level used when neither the document nor `RUST_LOG` sets one.
pub(crate) const LOG_LEVEL: &str = "info";

/// Companion file extensions (subtitles, metadata, artwork).
pub(crate) const SIDECAR_EXTENSIONS: &[&str] = &[
    "srt", "ass", "ssa", "sub", "idx", "vtt", "sup", "smi", "nfo", "jpg", "jpeg", "png", "tbn",
];

/// Extensions recognised as media files when looking for a sidecar's owner.
pub(crate) const MEDIA_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "m4v", "avi", "mov", "ts", "m2ts", "wmv", "webm", "mpg", "mpeg", "flv",
];

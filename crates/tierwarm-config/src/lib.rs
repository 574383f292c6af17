#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(
    missing_docs,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

//! File-backed run configuration for tierwarm.
//!
//! Layout: `model.rs` (typed settings), `loader.rs` (YAML document and
//! conversion), `validate.rs` (parsing helpers), `defaults.rs` (fallback values).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_settings, parse_settings};
pub use model::{
    BudgetSettings, CopyEngine, CopySettings, DemoteSettings, LoggingSettings, MetricsSettings,
    PathMapping, RunSettings, SourceSpec, WarmSettings,
};
pub use validate::{parse_byte_size, parse_octal_mode, parse_path_map};

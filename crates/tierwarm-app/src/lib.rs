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

//! Application wiring for the tierwarm binary.
//!
//! Layout: `bootstrap.rs` (process wiring and reporting), `orchestrator.rs`
//! (run coordination), `sources.rs` (external path lists), `lock.rs` (run
//! lock), `cli.rs` (arguments), `error.rs` (application errors).

pub mod bootstrap;
pub mod cli;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod sources;

pub use bootstrap::{EXIT_ABORTED, EXIT_RAN, RunOutcome, execute, export_metrics, run_app};
pub use cli::{Cli, LogFormatArg};
pub use error::{AppError, AppResult};
pub use lock::RunLock;
pub use orchestrator::RunCoordinator;
pub use sources::{
    CommandSource, FileSource, PathSource, StaticSource, collect_lines, from_spec,
    normalize_candidates,
};

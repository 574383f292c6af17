#![forbid(unsafe_code)]

//! Binary entrypoint: parse arguments, run once, exit with the run status.

use std::process::ExitCode;

use clap::Parser;
use tierwarm_app::{Cli, run_app};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    ExitCode::from(run_app(cli).await)
}

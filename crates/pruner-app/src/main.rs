#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(
    dead_code,
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs
)]

//! Binary entrypoint for the pruner daemon.

use clap::Parser;
use pruner_app::{AppResult, Cli, run_app};

/// Parse arguments and run until the work is done or a shutdown signal arrives.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app(Cli::parse()).await
}

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

//! Pruner application wiring: load configuration, build clients, run the
//! strategies once or on a schedule.
//!
//! Layout: `cli.rs` (argument parsing), `bootstrap.rs` (start-up sequence),
//! `orchestrator.rs` (per-run driver and actions), `scheduler.rs` (daemon
//! loop and shutdown signals), `error.rs`.

/// Command-line arguments.
pub mod cli;
/// Start-up sequence for the binary.
pub mod bootstrap;
/// Application and per-strategy errors.
pub mod error;
/// Per-run driver applying strategies to client torrents.
pub mod orchestrator;
/// Periodic execution and shutdown handling.
pub mod scheduler;

pub use bootstrap::{check_rules, run_app};
pub use cli::Cli;
pub use error::{AppError, AppResult, StrategyError};
pub use orchestrator::{Orchestrator, ProfileFailure, RunReport, StrategyOutcome, StrategyReport};
pub use scheduler::{Cadence, Schedule, run_schedule, shutdown_signal};

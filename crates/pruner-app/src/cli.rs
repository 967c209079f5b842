use std::path::PathBuf;

use clap::Parser;
use pruner_config::CONFIG_ENV_VAR;

/// Retire torrents from download clients according to configured strategies.
#[derive(Debug, Clone, Parser)]
#[command(name = "pruner", version, about)]
pub struct Cli {
    /// Configuration file; defaults to `config.yaml` next to the executable.
    #[arg(short, long, env = CONFIG_ENV_VAR, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Log what would be done without touching any client.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
    /// Run once and exit, even when the daemon is enabled.
    #[arg(long)]
    pub once: bool,
    /// Load the configuration, compile every rule and exit.
    #[arg(long)]
    pub check: bool,
}

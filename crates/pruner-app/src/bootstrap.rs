//! Start-up sequence: configuration, logging, clients, then one run or the
//! daemon loop.

use std::sync::Arc;

use pruner_clients::build_clients;
use pruner_config::{Config, LogSection, load, resolve_config_path};
use pruner_telemetry::{LogFormat, LoggingConfig, init_logging};
use pruner_torrent_core::cancel_pair;
use tracing::{error, info};

use crate::cli::Cli;
use crate::error::{AppError, AppResult};
use crate::orchestrator::Orchestrator;
use crate::scheduler::{Schedule, cancel_on_signal, run_schedule};

/// Entry point for the binary.
///
/// # Errors
///
/// Returns an error when the configuration cannot be loaded, logging cannot
/// be installed, no client can be built, or `--check` finds a broken rule.
pub async fn run_app(cli: Cli) -> AppResult<()> {
    let path = resolve_config_path(cli.config.as_deref())
        .map_err(|err| AppError::config("config.resolve", err))?;
    let config = load(&path).map_err(|err| AppError::config("config.load", err))?;
    init_logging(&logging_config(&config.log))
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    info!(path = %path.display(), dry_run = cli.dry_run, "pruner starting");

    if cli.check {
        return check_rules(&config);
    }

    let clients = build_clients(&config.clients);
    if clients.is_empty() {
        return Err(AppError::NoUsableClients {
            configured: config.clients.len(),
        });
    }

    let config = Arc::new(config);
    let orchestrator = Orchestrator::new(Arc::clone(&config), clients, cli.dry_run);
    let (handle, cancel) = cancel_pair();
    cancel_on_signal(handle);

    if cli.once || !config.daemon.enabled {
        orchestrator.run(&cancel).await;
    } else {
        run_schedule(&orchestrator, Schedule::from(&config.daemon), &cancel).await;
    }
    info!("pruner stopped");
    Ok(())
}

/// Compile every strategy rule, logging each failure.
///
/// # Errors
///
/// Returns [`AppError::RuleCheck`] when any rule fails to compile.
pub fn check_rules(config: &Config) -> AppResult<()> {
    let mut failed = 0;
    for (index, profile) in config.profiles.iter().enumerate() {
        for strategy in &profile.strategy {
            match strategy.rule() {
                Ok(rule) => info!(
                    profile = index,
                    strategy = %strategy.name,
                    uses_disk = rule.uses_disk(),
                    "rule compiles"
                ),
                Err(err) => {
                    failed += 1;
                    error!(
                        profile = index,
                        strategy = %strategy.name,
                        rule = %strategy.remove_expr,
                        error = %err,
                        "rule does not compile"
                    );
                }
            }
        }
    }
    if failed == 0 {
        Ok(())
    } else {
        Err(AppError::RuleCheck { failed })
    }
}

fn logging_config(log: &LogSection) -> LoggingConfig<'_> {
    LoggingConfig {
        enabled: log.enabled,
        level: &log.level,
        format: match log.format {
            pruner_config::LogFormat::Pretty => LogFormat::Pretty,
            pruner_config::LogFormat::Json => LogFormat::Json,
        },
        build_sha: option_env!("PRUNER_BUILD_SHA").unwrap_or("dev"),
    }
}

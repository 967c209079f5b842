//! One pass over every profile: fetch torrents, narrow them with the
//! structural filter and the strategy rule, then act on what remains.
//!
//! # Design
//!
//! - Profiles and strategies run sequentially; a failing strategy is logged
//!   and the pass continues with the next one.
//! - Dry runs stop after logging the matched torrents, before any mutating
//!   client call.
//! - Free space is only requested when the filter or the rule can use it.

use std::sync::Arc;

use pruner_clients::ClientRegistry;
use pruner_config::{Action, Config, Profile, Strategy};
use pruner_rules::EvalContext;
use pruner_telemetry::build_sha;
use pruner_torrent_core::{
    Bytes, CancelToken, ProtocolTimings, RemoveRequest, Torrent, TorrentClient, apply_filters,
};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::StrategyError;

/// How a single strategy ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// Nothing survived filtering and evaluation.
    NoMatch,
    /// Torrents matched but the run was a dry run.
    DryRun {
        /// Number of matched torrents.
        matched: usize,
    },
    /// The action was applied to every matched torrent.
    Applied {
        /// Action performed.
        action: Action,
        /// Number of matched torrents.
        matched: usize,
    },
    /// The strategy stopped at `stage`.
    Failed {
        /// Stage that failed (`compile`, `evaluate` or a client operation).
        stage: &'static str,
        /// Rendered error.
        error: String,
    },
}

/// Result of one strategy within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyReport {
    /// Index of the profile in the configuration.
    pub profile: usize,
    /// Client the profile is bound to.
    pub client: String,
    /// Strategy name.
    pub strategy: String,
    /// What happened.
    pub outcome: StrategyOutcome,
}

/// A profile whose strategies could not run at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFailure {
    /// Index of the profile in the configuration.
    pub profile: usize,
    /// Client the profile is bound to.
    pub client: String,
    /// Rendered reason.
    pub reason: String,
}

/// Summary of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Identifier attached to the run's log span.
    pub run_id: Uuid,
    /// Strategy results in execution order.
    pub strategies: Vec<StrategyReport>,
    /// Profiles skipped before any strategy ran.
    pub failed_profiles: Vec<ProfileFailure>,
}

impl RunReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            strategies: Vec::new(),
            failed_profiles: Vec::new(),
        }
    }

    /// Number of strategies that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.strategies
            .iter()
            .filter(|report| matches!(report.outcome, StrategyOutcome::Failed { .. }))
            .count()
    }

    /// Total torrents matched across strategies, dry-run or not.
    #[must_use]
    pub fn matched(&self) -> usize {
        self.strategies
            .iter()
            .map(|report| match report.outcome {
                StrategyOutcome::DryRun { matched } | StrategyOutcome::Applied { matched, .. } => {
                    matched
                }
                StrategyOutcome::NoMatch | StrategyOutcome::Failed { .. } => 0,
            })
            .sum()
    }
}

/// Drives runs over a loaded configuration and its clients.
pub struct Orchestrator {
    config: Arc<Config>,
    clients: ClientRegistry,
    dry_run: bool,
    timings: ProtocolTimings,
}

impl Orchestrator {
    /// Bind a configuration to its clients.
    #[must_use]
    pub fn new(config: Arc<Config>, clients: ClientRegistry, dry_run: bool) -> Self {
        let timings = config.timings.protocol();
        Self {
            config,
            clients,
            dry_run,
            timings,
        }
    }

    /// Execute every profile once.
    pub async fn run(&self, cancel: &CancelToken) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "run",
            run_id = %run_id,
            dry_run = self.dry_run,
            build_sha = %build_sha()
        );
        async {
            let mut report = RunReport::new(run_id);
            for (index, profile) in self.config.profiles.iter().enumerate() {
                if cancel.is_cancelled() {
                    info!("run cancelled; remaining profiles skipped");
                    break;
                }
                let span = info_span!("profile", index, client = %profile.client);
                self.run_profile(index, profile, cancel, &mut report)
                    .instrument(span)
                    .await;
            }
            info!(
                strategies = report.strategies.len(),
                failed = report.failed(),
                matched = report.matched(),
                "run finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn run_profile(
        &self,
        index: usize,
        profile: &Profile,
        cancel: &CancelToken,
        report: &mut RunReport,
    ) {
        let fail = |reason: String| ProfileFailure {
            profile: index,
            client: profile.client.clone(),
            reason,
        };

        let Some(client) = self.clients.get(&profile.client) else {
            warn!("client not available; profile skipped");
            report
                .failed_profiles
                .push(fail("client not available".to_string()));
            return;
        };

        let torrents = match client.get_torrents(cancel).await {
            Ok(torrents) => torrents,
            Err(err) => {
                error!(error = %err, "failed to fetch torrents; profile skipped");
                report.failed_profiles.push(fail(err.to_string()));
                return;
            }
        };
        debug!(count = torrents.len(), "torrents fetched");

        match client.session_stats(cancel).await {
            Ok(stats) => debug!(
                download_rate = stats.download_rate,
                upload_rate = stats.upload_rate,
                "session stats"
            ),
            Err(err) => warn!(error = %err, "failed to fetch session stats"),
        }

        for strategy in &profile.strategy {
            let span = info_span!("strategy", name = %strategy.name, action = %strategy.action);
            let outcome = self
                .run_strategy(client.as_ref(), profile, strategy, &torrents, cancel)
                .instrument(span)
                .await
                .unwrap_or_else(|err| StrategyOutcome::Failed {
                    stage: err.stage(),
                    error: render_error(&err),
                });
            report.strategies.push(StrategyReport {
                profile: index,
                client: profile.client.clone(),
                strategy: strategy.name.clone(),
                outcome,
            });
        }
    }

    async fn run_strategy(
        &self,
        client: &dyn TorrentClient,
        profile: &Profile,
        strategy: &Strategy,
        torrents: &[Torrent],
        cancel: &CancelToken,
    ) -> Result<StrategyOutcome, StrategyError> {
        let result = self
            .apply_strategy(client, profile, strategy, torrents, cancel)
            .await;
        if let Err(err) = &result {
            error!(stage = err.stage(), error = %render_error(err), "strategy failed");
        }
        result
    }

    async fn apply_strategy(
        &self,
        client: &dyn TorrentClient,
        profile: &Profile,
        strategy: &Strategy,
        torrents: &[Torrent],
        cancel: &CancelToken,
    ) -> Result<StrategyOutcome, StrategyError> {
        let rule = strategy.rule()?;
        let settings = profile.settings_for(strategy);

        let free_space = if strategy.filter.disk.is_zero() && !rule.uses_disk() {
            Bytes::ZERO
        } else {
            let free = client
                .free_space(cancel, &settings.mount_path)
                .await
                .map_err(|err| StrategyError::client("free_space", err))?;
            debug!(free_space = free.get(), path = %settings.mount_path, "free space");
            free
        };

        let candidates = apply_filters(&strategy.filter, free_space, torrents);
        let matched = rule
            .evaluate(&candidates, &EvalContext::new(free_space))
            .inspect_err(|_| {
                warn!(
                    rule = rule.source(),
                    candidates = candidates.len(),
                    "rule evaluation failed"
                );
            })?;
        if matched.is_empty() {
            debug!(candidates = candidates.len(), "no torrents matched");
            return Ok(StrategyOutcome::NoMatch);
        }

        for torrent in &matched {
            log_match(torrent);
        }

        if self.dry_run {
            info!(matched = matched.len(), "dry run; no action taken");
            return Ok(StrategyOutcome::DryRun {
                matched: matched.len(),
            });
        }

        match strategy.action {
            Action::Remove => {
                let request = RemoveRequest {
                    strategy: &strategy.name,
                    reannounce: settings.reannounce,
                    delete_files: settings.delete_files,
                    timings: self.timings.with_delete_delay(settings.delete_delay),
                };
                client
                    .delete_torrents(cancel, &matched, &request)
                    .await
                    .map_err(|err| StrategyError::client("delete_torrents", err))?;
            }
            Action::Pause => client
                .pause_torrents(cancel, &matched)
                .await
                .map_err(|err| StrategyError::client("pause_torrents", err))?,
            Action::Resume => client
                .resume_torrents(cancel, &matched)
                .await
                .map_err(|err| StrategyError::client("resume_torrents", err))?,
            Action::Throttle => {
                let limit = strategy.limit.ok_or(StrategyError::MissingLimit)?;
                client
                    .throttle_torrents(cancel, &matched, limit)
                    .await
                    .map_err(|err| StrategyError::client("throttle_torrents", err))?;
            }
        }

        info!(matched = matched.len(), "action applied");
        Ok(StrategyOutcome::Applied {
            action: strategy.action,
            matched: matched.len(),
        })
    }
}

fn log_match(torrent: &Torrent) {
    info!(
        hash = %torrent.hash,
        name = %torrent.name,
        progress = torrent.progress,
        status = ?torrent.status,
        size = torrent.size,
        ratio = torrent.ratio,
        added = %torrent.added_time,
        last_activity = ?torrent.last_activity,
        category = %torrent.category,
        tags = ?torrent.tags,
        trackers = ?torrent.tracker_urls().collect::<Vec<_>>(),
        "torrent matched"
    );
}

/// The error with its source chain, joined by `: `.
fn render_error(err: &StrategyError) -> String {
    let mut rendered = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

//! Daemon loop and shutdown signal handling.
//!
//! # Design
//!
//! - Runs never overlap. Interval ticks that fall due during a run are
//!   dropped, and cron fire times are looked up only after a run ends.
//! - Cron fire times are resolved against a wall clock anchored to tokio's
//!   monotonic clock when the loop starts.

use std::io;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pruner_config::{CronExpr, DaemonSection};
use pruner_torrent_core::{CancelHandle, CancelToken};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, info, warn};

use crate::orchestrator::Orchestrator;

/// How often runs happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed time between run starts.
    Every(Duration),
    /// Fire times of a cron expression.
    Cron(CronExpr),
}

/// When runs happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Interval or cron expression.
    pub cadence: Cadence,
    /// Run immediately instead of waiting for the first tick.
    pub run_on_start: bool,
}

impl Schedule {
    /// Fixed-interval schedule.
    #[must_use]
    pub const fn every(interval: Duration, run_on_start: bool) -> Self {
        Self {
            cadence: Cadence::Every(interval),
            run_on_start,
        }
    }

    /// Cron schedule.
    #[must_use]
    pub const fn cron(expr: CronExpr, run_on_start: bool) -> Self {
        Self {
            cadence: Cadence::Cron(expr),
            run_on_start,
        }
    }
}

impl From<&DaemonSection> for Schedule {
    fn from(daemon: &DaemonSection) -> Self {
        daemon.cron_exp.clone().map_or_else(
            || Self::every(daemon.interval, daemon.run_on_start),
            |expr| Self::cron(expr, daemon.run_on_start),
        )
    }
}

/// Run `orchestrator` on `schedule` until `cancel` fires.
///
/// Returns the number of runs started.
pub async fn run_schedule(
    orchestrator: &Orchestrator,
    schedule: Schedule,
    cancel: &CancelToken,
) -> usize {
    run_schedule_from(orchestrator, schedule, cancel, Utc::now()).await
}

/// [`run_schedule`] with the wall-clock time of the loop start supplied.
pub(crate) async fn run_schedule_from(
    orchestrator: &Orchestrator,
    schedule: Schedule,
    cancel: &CancelToken,
    wall_start: DateTime<Utc>,
) -> usize {
    let runs = match schedule.cadence {
        Cadence::Every(interval) => {
            info!(
                interval_secs = interval.as_secs(),
                run_on_start = schedule.run_on_start,
                "daemon started"
            );
            run_every(orchestrator, interval, schedule.run_on_start, cancel).await
        }
        Cadence::Cron(expr) => {
            info!(
                cron_exp = %expr,
                run_on_start = schedule.run_on_start,
                "daemon started"
            );
            let clock = AnchoredClock::new(wall_start);
            run_cron(orchestrator, &expr, schedule.run_on_start, cancel, &clock).await
        }
    };
    info!(runs, "daemon stopped");
    runs
}

async fn run_every(
    orchestrator: &Orchestrator,
    interval: Duration,
    run_on_start: bool,
    cancel: &CancelToken,
) -> usize {
    let start = if run_on_start {
        Instant::now()
    } else {
        Instant::now() + interval
    };
    let mut ticker = interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut runs = 0;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        runs += 1;
        run_once(orchestrator, cancel).await;
        if cancel.is_cancelled() {
            break;
        }
    }
    runs
}

async fn run_cron(
    orchestrator: &Orchestrator,
    expr: &CronExpr,
    run_on_start: bool,
    cancel: &CancelToken,
    clock: &AnchoredClock,
) -> usize {
    let mut runs = 0;
    if run_on_start {
        runs += 1;
        run_once(orchestrator, cancel).await;
    }
    while !cancel.is_cancelled() {
        let now = clock.now();
        let Some(next) = expr.next_after(&now) else {
            warn!(cron_exp = %expr, "cron expression has no further fire times");
            break;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        debug!(next = %next, wait_secs = wait.as_secs(), "next run scheduled");
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = sleep_until(Instant::now() + wait) => {}
        }
        runs += 1;
        run_once(orchestrator, cancel).await;
    }
    runs
}

async fn run_once(orchestrator: &Orchestrator, cancel: &CancelToken) {
    let report = orchestrator.run(cancel).await;
    if report.failed() > 0 {
        warn!(run_id = %report.run_id, failed = report.failed(), "run finished with failures");
    }
}

/// Wall-clock time derived from tokio's clock since a fixed anchor.
struct AnchoredClock {
    wall: DateTime<Utc>,
    instant: Instant,
}

impl AnchoredClock {
    fn new(wall: DateTime<Utc>) -> Self {
        Self {
            wall,
            instant: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        chrono::TimeDelta::from_std(self.instant.elapsed())
            .ok()
            .and_then(|elapsed| self.wall.checked_add_signed(elapsed))
            .unwrap_or(self.wall)
    }
}

/// Resolve on SIGINT or SIGTERM (ctrl-c elsewhere).
///
/// # Errors
///
/// Returns the IO error raised while installing the handlers.
pub async fn shutdown_signal() -> io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Cancel `handle` once a shutdown signal arrives.
pub(crate) fn cancel_on_signal(handle: CancelHandle) {
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => {
                info!("shutdown requested");
                handle.cancel();
            }
            Err(err) => warn!(error = %err, "failed to listen for shutdown signals"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use pruner_clients::ClientRegistry;
    use pruner_config::from_yaml_str;
    use pruner_test_support::fixtures::scenario_torrents;
    use pruner_test_support::mocks::{ClientCall, RecordingClient};
    use pruner_torrent_core::{TorrentClient, cancel_pair};

    fn orchestrator(profiles: &str) -> (Orchestrator, Arc<RecordingClient>) {
        let config = from_yaml_str(&format!(
            "clients: {{ mock: {{ type: qbittorrent }} }}\n{profiles}"
        ))
        .unwrap();
        let client = Arc::new(RecordingClient::new(scenario_torrents(Utc::now())));
        let mut clients: ClientRegistry = BTreeMap::new();
        clients.insert("mock".into(), Arc::clone(&client) as Arc<dyn TorrentClient>);
        (Orchestrator::new(Arc::new(config), clients, false), client)
    }

    fn midnight() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    async fn run_for(
        orchestrator: &Orchestrator,
        schedule: Schedule,
        duration: Duration,
    ) -> usize {
        let (handle, cancel) = cancel_pair();
        let stop = async {
            tokio::time::sleep(duration).await;
            handle.cancel();
        };
        let (runs, ()) = tokio::join!(
            run_schedule_from(orchestrator, schedule, &cancel, midnight()),
            stop
        );
        runs
    }

    async fn fetches(client: &RecordingClient) -> usize {
        client
            .calls()
            .await
            .into_iter()
            .filter(|call| *call == ClientCall::GetTorrents)
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn cron_fires_on_schedule_boundaries() {
        let (orchestrator, client) =
            orchestrator("profiles: [ { client: mock, strategy: [] } ]\n");
        let every_ten = CronExpr::parse("0 */10 * * * *").unwrap();

        let runs = run_for(
            &orchestrator,
            Schedule::cron(every_ten.clone(), false),
            Duration::from_secs(25 * 60),
        )
        .await;
        assert_eq!(runs, 2);
        assert_eq!(fetches(&client).await, 2);

        let runs = run_for(
            &orchestrator,
            Schedule::cron(every_ten, true),
            Duration::from_secs(25 * 60),
        )
        .await;
        assert_eq!(runs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cron_skips_fire_times_missed_during_a_run() {
        // Each run pauses, resumes and reannounces before deleting: 8s of waits.
        let (orchestrator, client) = orchestrator(
            "profiles:\n  - client: mock\n    reannounce: true\n    strategy: [ { name: all, remove: torrents } ]\n",
        );
        let every_five = CronExpr::parse("*/5 * * * * *").unwrap();

        let runs = run_for(
            &orchestrator,
            Schedule::cron(every_five, false),
            Duration::from_secs(30),
        )
        .await;

        // Fires at 5s, 15s and 25s; 10s and 20s fall inside earlier runs.
        assert_eq!(runs, 3);
        assert_eq!(fetches(&client).await, 3);
    }

    #[test]
    fn daemon_section_prefers_cron_over_interval() {
        let config = from_yaml_str(
            "daemon: { cron_exp: '0 0 * * * *', interval: 5m, run_on_start: false }\nclients: { qb: { type: qbittorrent } }\nprofiles: [ { client: qb } ]\n",
        )
        .unwrap();
        let schedule = Schedule::from(&config.daemon);
        assert!(matches!(schedule.cadence, Cadence::Cron(ref expr) if expr.as_str() == "0 0 * * * *"));
        assert!(!schedule.run_on_start);

        let config = from_yaml_str(
            "daemon: { interval: 5m }\nclients: { qb: { type: qbittorrent } }\nprofiles: [ { client: qb } ]\n",
        )
        .unwrap();
        assert_eq!(
            Schedule::from(&config.daemon),
            Schedule::every(Duration::from_secs(300), true)
        );
    }
}

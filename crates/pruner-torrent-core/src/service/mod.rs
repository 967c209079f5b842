//! Client capability implemented by back-end adapters, plus the canonical
//! removal protocol every adapter shares.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::{ClientError, ClientResult};
use crate::model::{SessionStats, Torrent};
use crate::units::{Bytes, RateLimit};

/// Waits between the steps of the reannounce-before-delete protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolTimings {
    /// Pause settle time before resuming.
    pub pause_wait: Duration,
    /// Resume settle time before forcing a reannounce.
    pub resume_wait: Duration,
    /// Time given to trackers after the reannounce before the final delete.
    pub reannounce_wait: Duration,
}

impl Default for ProtocolTimings {
    fn default() -> Self {
        Self {
            pause_wait: Duration::from_secs(2),
            resume_wait: Duration::from_secs(2),
            reannounce_wait: Duration::from_secs(4),
        }
    }
}

impl ProtocolTimings {
    /// Replace the final wait when a `delete_delay` is configured.
    #[must_use]
    pub fn with_delete_delay(self, delete_delay: Option<Duration>) -> Self {
        Self {
            reannounce_wait: delete_delay.unwrap_or(self.reannounce_wait),
            ..self
        }
    }
}

/// Parameters of one delete request.
#[derive(Debug, Clone, Copy)]
pub struct RemoveRequest<'a> {
    /// Strategy name, for logging.
    pub strategy: &'a str,
    /// Run pause/resume/reannounce before deleting.
    pub reannounce: bool,
    /// Remove downloaded data along with the torrent.
    pub delete_files: bool,
    /// Waits between protocol steps.
    pub timings: ProtocolTimings,
}

/// Operations the orchestrator needs from a torrent client.
///
/// Every call is a bulk call over the given torrents and observes `cancel`.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Short back-end name used in logs (e.g. `qbittorrent`).
    fn kind(&self) -> &'static str;

    /// Fetch every torrent currently known to the client.
    async fn get_torrents(&self, cancel: &CancelToken) -> ClientResult<Vec<Torrent>>;

    /// Pause the given torrents.
    async fn pause_torrents(&self, cancel: &CancelToken, torrents: &[Torrent]) -> ClientResult<()>;

    /// Resume the given torrents.
    async fn resume_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
    ) -> ClientResult<()>;

    /// Remove the given torrents, optionally deleting their data.
    async fn remove_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
        delete_files: bool,
    ) -> ClientResult<()>;

    /// Force an announce to every tracker; default implementation reports lack of support.
    async fn reannounce_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
    ) -> ClientResult<()> {
        let _ = (cancel, torrents);
        Err(ClientError::Unsupported {
            operation: "reannounce_torrents",
        })
    }

    /// Cap the upload rate; default implementation reports lack of support.
    async fn throttle_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
        limit: RateLimit,
    ) -> ClientResult<()> {
        let _ = (cancel, torrents, limit);
        Err(ClientError::Unsupported {
            operation: "throttle_torrents",
        })
    }

    /// Free space at `path`, or the client's default location when empty.
    async fn free_space(&self, cancel: &CancelToken, path: &str) -> ClientResult<Bytes> {
        let _ = (cancel, path);
        Err(ClientError::Unsupported {
            operation: "free_space",
        })
    }

    /// Client-wide transfer rates.
    async fn session_stats(&self, cancel: &CancelToken) -> ClientResult<SessionStats> {
        let _ = cancel;
        Err(ClientError::Unsupported {
            operation: "session_stats",
        })
    }

    /// Delete the given torrents, running the reannounce protocol first when
    /// requested. Adapters should not override this.
    async fn delete_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
        request: &RemoveRequest<'_>,
    ) -> ClientResult<()> {
        run_removal_protocol(self, cancel, torrents, request).await
    }
}

/// Pause, wait, resume, wait, reannounce, wait, delete.
///
/// Without `reannounce` only the delete runs. The first failing step aborts the
/// rest; completed steps are not rolled back.
///
/// # Errors
///
/// Returns the first client or cancellation error encountered.
pub async fn run_removal_protocol<C>(
    client: &C,
    cancel: &CancelToken,
    torrents: &[Torrent],
    request: &RemoveRequest<'_>,
) -> ClientResult<()>
where
    C: TorrentClient + ?Sized,
{
    let strategy = request.strategy;
    let count = torrents.len();

    if request.reannounce {
        let timings = request.timings;

        debug!(strategy, count, "pausing torrents before reannounce");
        client.pause_torrents(cancel, torrents).await?;
        cancel.sleep("pause_wait", timings.pause_wait).await?;

        debug!(strategy, count, "resuming torrents");
        client.resume_torrents(cancel, torrents).await?;
        cancel.sleep("resume_wait", timings.resume_wait).await?;

        debug!(strategy, count, "forcing tracker reannounce");
        client.reannounce_torrents(cancel, torrents).await?;
        debug!(
            strategy,
            wait_ms = u64::try_from(timings.reannounce_wait.as_millis()).unwrap_or(u64::MAX),
            "waiting before delete"
        );
        cancel
            .sleep("reannounce_wait", timings.reannounce_wait)
            .await?;
    }

    debug!(
        strategy,
        count,
        delete_files = request.delete_files,
        "removing torrents"
    );
    client
        .remove_torrents(cancel, torrents, request.delete_files)
        .await
}

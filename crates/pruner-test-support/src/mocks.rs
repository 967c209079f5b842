//! In-memory torrent client that records every call.

use std::collections::HashSet;

use async_trait::async_trait;
use pruner_torrent_core::{
    Bytes, CancelToken, ClientError, ClientResult, RateLimit, SessionStats, Torrent,
    TorrentClient,
};
use tokio::sync::RwLock;
use tokio::time::Instant;

/// One recorded client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    /// `get_torrents`.
    GetTorrents,
    /// `pause_torrents` with the affected hashes.
    Pause(Vec<String>),
    /// `resume_torrents` with the affected hashes.
    Resume(Vec<String>),
    /// `reannounce_torrents` with the affected hashes.
    Reannounce(Vec<String>),
    /// `remove_torrents` with the affected hashes.
    Remove {
        /// Affected hashes.
        hashes: Vec<String>,
        /// Whether data deletion was requested.
        delete_files: bool,
    },
    /// `throttle_torrents` with the affected hashes.
    Throttle {
        /// Affected hashes.
        hashes: Vec<String>,
        /// Requested cap.
        limit: RateLimit,
    },
    /// `free_space` for a path.
    FreeSpace(String),
    /// `session_stats`.
    SessionStats,
}

impl ClientCall {
    /// Whether the call mutates client state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Pause(_)
                | Self::Resume(_)
                | Self::Reannounce(_)
                | Self::Remove { .. }
                | Self::Throttle { .. }
        )
    }
}

/// Fake client backed by a fixed torrent list.
///
/// Calls are recorded with the (possibly paused) tokio clock so tests can
/// assert on protocol waits.
#[derive(Debug, Default)]
pub struct RecordingClient {
    torrents: Vec<Torrent>,
    free_space: Bytes,
    stats: SessionStats,
    failures: HashSet<&'static str>,
    calls: RwLock<Vec<(ClientCall, Instant)>>,
}

impl RecordingClient {
    /// Client returning `torrents` from `get_torrents`.
    #[must_use]
    pub fn new(torrents: Vec<Torrent>) -> Self {
        Self {
            torrents,
            ..Self::default()
        }
    }

    /// Report `free_space` from every free-space query.
    #[must_use]
    pub const fn with_free_space(mut self, free_space: Bytes) -> Self {
        self.free_space = free_space;
        self
    }

    /// Report `stats` from `session_stats`.
    #[must_use]
    pub const fn with_session_stats(mut self, stats: SessionStats) -> Self {
        self.stats = stats;
        self
    }

    /// Make `operation` (e.g. `reannounce_torrents`) fail after being recorded.
    #[must_use]
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failures.insert(operation);
        self
    }

    /// Calls in order.
    pub async fn calls(&self) -> Vec<ClientCall> {
        self.calls
            .read()
            .await
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    /// Calls with the instant each was made.
    pub async fn timeline(&self) -> Vec<(ClientCall, Instant)> {
        self.calls.read().await.clone()
    }

    /// Mutating calls only.
    pub async fn mutations(&self) -> Vec<ClientCall> {
        self.calls()
            .await
            .into_iter()
            .filter(ClientCall::is_mutation)
            .collect()
    }

    async fn record(&self, operation: &'static str, call: ClientCall) -> ClientResult<()> {
        self.calls.write().await.push((call, Instant::now()));
        if self.failures.contains(operation) {
            return Err(ClientError::Rejected {
                operation,
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

fn hash_list(torrents: &[Torrent]) -> Vec<String> {
    torrents.iter().map(|torrent| torrent.hash.clone()).collect()
}

#[async_trait]
impl TorrentClient for RecordingClient {
    fn kind(&self) -> &'static str {
        "recording"
    }

    async fn get_torrents(&self, cancel: &CancelToken) -> ClientResult<Vec<Torrent>> {
        cancel
            .run("get_torrents", async {
                self.record("get_torrents", ClientCall::GetTorrents).await?;
                Ok(self.torrents.clone())
            })
            .await
    }

    async fn pause_torrents(&self, cancel: &CancelToken, torrents: &[Torrent]) -> ClientResult<()> {
        cancel
            .run(
                "pause_torrents",
                self.record("pause_torrents", ClientCall::Pause(hash_list(torrents))),
            )
            .await
    }

    async fn resume_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
    ) -> ClientResult<()> {
        cancel
            .run(
                "resume_torrents",
                self.record("resume_torrents", ClientCall::Resume(hash_list(torrents))),
            )
            .await
    }

    async fn remove_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
        delete_files: bool,
    ) -> ClientResult<()> {
        let call = ClientCall::Remove {
            hashes: hash_list(torrents),
            delete_files,
        };
        cancel
            .run("remove_torrents", self.record("remove_torrents", call))
            .await
    }

    async fn reannounce_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
    ) -> ClientResult<()> {
        cancel
            .run(
                "reannounce_torrents",
                self.record(
                    "reannounce_torrents",
                    ClientCall::Reannounce(hash_list(torrents)),
                ),
            )
            .await
    }

    async fn throttle_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
        limit: RateLimit,
    ) -> ClientResult<()> {
        let call = ClientCall::Throttle {
            hashes: hash_list(torrents),
            limit,
        };
        cancel
            .run("throttle_torrents", self.record("throttle_torrents", call))
            .await
    }

    async fn free_space(&self, cancel: &CancelToken, path: &str) -> ClientResult<Bytes> {
        cancel
            .run("free_space", async {
                self.record("free_space", ClientCall::FreeSpace(path.to_string()))
                    .await?;
                Ok(self.free_space)
            })
            .await
    }

    async fn session_stats(&self, cancel: &CancelToken) -> ClientResult<SessionStats> {
        cancel
            .run("session_stats", async {
                self.record("session_stats", ClientCall::SessionStats)
                    .await?;
                Ok(self.stats)
            })
            .await
    }
}

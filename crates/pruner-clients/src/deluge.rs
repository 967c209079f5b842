//! Deluge adapter over the Web UI's JSON-RPC endpoint.
//!
//! # Design
//!
//! - `auth.login` opens a cookie session. A reply with error code `1`
//!   ("Not authenticated") triggers one re-login and retry.
//! - The Web UI proxies `core.*` calls to a daemon; when it is not connected
//!   yet, the first configured host is connected on login.
//! - Deluge 1.x and 2.x disagree on a few method names; `v2` selects the 2.x
//!   names.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use pruner_torrent_core::{
    Bytes, CancelToken, ClientError, ClientResult, RateLimit, SessionStats, Status, Torrent,
    TorrentClient, TorrentTracker, average_rate, hashes, parse_status,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AdapterResult;
use crate::http::{build_http, decode_settings, ensure_success, normalise_host, read_json, transport};

const DEFAULT_RPC_PATH: &str = "/json";
const NOT_AUTHENTICATED: i64 = 1;

const TORRENT_KEYS: &[&str] = &[
    "hash",
    "name",
    "state",
    "label",
    "ratio",
    "progress",
    "total_size",
    "total_peers",
    "total_seeds",
    "download_payload_rate",
    "upload_payload_rate",
    "all_time_download",
    "total_uploaded",
    "active_time",
    "seeding_time",
    "time_added",
    "time_since_transfer",
    "last_seen_complete",
    "trackers",
    "tracker_status",
];

/// Keys accepted under `config:` for a `deluge` or `deluge_v2` client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DelugeSettings {
    /// Web UI URL; a bare `http://host:port` gets `/json` appended.
    pub host: String,
    /// Web UI password.
    pub password: String,
    /// Use the 2.x method names; implied by the `deluge_v2` type.
    pub v2: bool,
    /// Accept invalid TLS certificates.
    pub insecure_tls: bool,
}

/// [`TorrentClient`] backed by the Deluge Web UI.
pub struct DelugeClient {
    http: Client,
    endpoint: String,
    settings: DelugeSettings,
    authenticated: AtomicBool,
    login_lock: Mutex<()>,
    next_id: AtomicU64,
}

impl DelugeClient {
    /// Build an adapter for the `clients:` entry called `name`.
    ///
    /// # Errors
    ///
    /// Returns an [`AdapterError`](crate::AdapterError) when `host` is not an
    /// absolute http(s) URL or the HTTP client cannot be built.
    pub fn new(name: &str, settings: DelugeSettings) -> AdapterResult<Self> {
        let base = normalise_host(name, &settings.host)?;
        let has_path = base
            .split_once("://")
            .is_some_and(|(_, rest)| rest.contains('/'));
        let endpoint = if has_path {
            base
        } else {
            format!("{base}{DEFAULT_RPC_PATH}")
        };
        Ok(Self {
            http: build_http(name, settings.insecure_tls, true)?,
            endpoint,
            settings,
            authenticated: AtomicBool::new(false),
            login_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Decode `config` and build the adapter; `v2` forces the 2.x dialect.
    ///
    /// # Errors
    ///
    /// See [`DelugeClient::new`]; also fails when `config` does not decode.
    pub fn from_config(name: &str, config: &serde_yaml::Value, v2: bool) -> AdapterResult<Self> {
        let mut settings: DelugeSettings = decode_settings(name, config)?;
        settings.v2 |= v2;
        Self::new(name, settings)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: &str,
        params: &Value,
    ) -> ClientResult<RpcReply<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "method": method, "params": params, "id": id });
        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(transport(operation))?;
        read_json(operation, ensure_success(operation, response).await?).await
    }

    /// Call `method` on an established session without retrying.
    async fn post_result<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: &str,
        params: &Value,
    ) -> ClientResult<Option<T>> {
        let reply: RpcReply<T> = self.post(operation, method, params).await?;
        match reply.error {
            Some(error) => Err(error.into_client_error(operation)),
            None => Ok(reply.result),
        }
    }

    async fn login(&self, operation: &'static str) -> ClientResult<()> {
        let _guard = self.login_lock.lock().await;
        let accepted: Option<bool> = self
            .post_result(operation, "auth.login", &json!([self.settings.password]))
            .await?;
        if accepted != Some(true) {
            return Err(ClientError::Rejected {
                operation,
                status: StatusCode::UNAUTHORIZED.as_u16(),
                message: "invalid web UI password".to_string(),
            });
        }

        let connected: Option<bool> = self
            .post_result(operation, "web.connected", &json!([]))
            .await?;
        if connected != Some(true) {
            let hosts: Option<Vec<Vec<Value>>> = self
                .post_result(operation, "web.get_hosts", &json!([]))
                .await?;
            let host_id = hosts
                .unwrap_or_default()
                .into_iter()
                .find_map(|host| host.first().and_then(Value::as_str).map(str::to_string))
                .ok_or_else(|| ClientError::InvalidResponse {
                    operation,
                    detail: "web UI has no daemon configured".to_string(),
                })?;
            self.post_result::<IgnoredAny>(operation, "web.connect", &json!([host_id]))
                .await?;
            debug!(host_id = %host_id, "deluge web UI connected to daemon");
        }

        self.authenticated.store(true, Ordering::Release);
        debug!(endpoint = %self.endpoint, "deluge session established");
        Ok(())
    }

    /// Issue one call, logging in first and once more on an expired session.
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: &str,
        params: Value,
    ) -> ClientResult<Option<T>> {
        if !self.authenticated.load(Ordering::Acquire) {
            self.login(operation).await?;
        }
        let reply: RpcReply<T> = self.post(operation, method, &params).await?;
        match reply.error {
            None => return Ok(reply.result),
            Some(error) if error.code != NOT_AUTHENTICATED => {
                return Err(error.into_client_error(operation));
            }
            Some(_) => {}
        }

        debug!(operation, "deluge session expired; logging in again");
        self.authenticated.store(false, Ordering::Release);
        self.login(operation).await?;
        self.post_result(operation, method, &params).await
    }

    async fn call_required<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: &str,
        params: Value,
    ) -> ClientResult<T> {
        self.call(operation, method, params)
            .await?
            .ok_or_else(|| ClientError::InvalidResponse {
                operation,
                detail: format!("{method} returned no result"),
            })
    }

    async fn call_unit(&self, operation: &'static str, method: &str, params: Value) -> ClientResult<()> {
        self.call::<IgnoredAny>(operation, method, params)
            .await
            .map(drop)
    }

    const fn method(&self, v1: &'static str, v2: &'static str) -> &'static str {
        if self.settings.v2 { v2 } else { v1 }
    }

    async fn fetch_torrents(&self) -> ClientResult<Vec<Torrent>> {
        let listed: BTreeMap<String, DeTorrent> = self
            .call_required(
                "get_torrents",
                "core.get_torrents_status",
                json!([{}, TORRENT_KEYS]),
            )
            .await?;
        let now = Utc::now();
        Ok(listed
            .into_iter()
            .map(|(hash, torrent)| torrent.into_torrent(hash, now))
            .collect())
    }

    async fn remove(&self, torrents: &[Torrent], delete_files: bool) -> ClientResult<()> {
        const OP: &str = "remove_torrents";
        if self.settings.v2 {
            let failures: Vec<(String, String)> = self
                .call(OP, "core.remove_torrents", json!([hashes(torrents), delete_files]))
                .await?
                .unwrap_or_default();
            if failures.is_empty() {
                return Ok(());
            }
            let message = failures
                .into_iter()
                .map(|(hash, reason)| format!("{hash}: {reason}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ClientError::Rejected {
                operation: OP,
                status: StatusCode::OK.as_u16(),
                message,
            });
        }
        for hash in hashes(torrents) {
            self.call_unit(OP, "core.remove_torrent", json!([hash, delete_files]))
                .await?;
        }
        Ok(())
    }

    async fn fetch_free_space(&self, path: &str) -> ClientResult<Bytes> {
        let params = if path.is_empty() {
            json!([])
        } else {
            json!([path])
        };
        let size: i64 = self
            .call_required("free_space", "core.get_free_space", params)
            .await?;
        Ok(Bytes(size))
    }
}

#[async_trait]
impl TorrentClient for DelugeClient {
    fn kind(&self) -> &'static str {
        "deluge"
    }

    async fn get_torrents(&self, cancel: &CancelToken) -> ClientResult<Vec<Torrent>> {
        cancel.run("get_torrents", self.fetch_torrents()).await
    }

    async fn pause_torrents(&self, cancel: &CancelToken, torrents: &[Torrent]) -> ClientResult<()> {
        if torrents.is_empty() {
            return Ok(());
        }
        let method = self.method("core.pause_torrent", "core.pause_torrents");
        cancel
            .run(
                "pause_torrents",
                self.call_unit("pause_torrents", method, json!([hashes(torrents)])),
            )
            .await
    }

    async fn resume_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
    ) -> ClientResult<()> {
        if torrents.is_empty() {
            return Ok(());
        }
        let method = self.method("core.resume_torrent", "core.resume_torrents");
        cancel
            .run(
                "resume_torrents",
                self.call_unit("resume_torrents", method, json!([hashes(torrents)])),
            )
            .await
    }

    async fn remove_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
        delete_files: bool,
    ) -> ClientResult<()> {
        if torrents.is_empty() {
            return Ok(());
        }
        cancel
            .run("remove_torrents", self.remove(torrents, delete_files))
            .await
    }

    async fn reannounce_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
    ) -> ClientResult<()> {
        if torrents.is_empty() {
            return Ok(());
        }
        cancel
            .run(
                "reannounce_torrents",
                self.call_unit(
                    "reannounce_torrents",
                    "core.force_reannounce",
                    json!([hashes(torrents)]),
                ),
            )
            .await
    }

    /// Deluge limits are expressed in KiB/s; byte rates round up.
    async fn throttle_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
        limit: RateLimit,
    ) -> ClientResult<()> {
        if torrents.is_empty() {
            return Ok(());
        }
        let max_upload_speed = match limit {
            RateLimit::Unlimited => json!(-1),
            RateLimit::BytesPerSecond(bytes) => json!(bytes.div_ceil(1024)),
        };
        cancel
            .run(
                "throttle_torrents",
                self.call_unit(
                    "throttle_torrents",
                    "core.set_torrent_options",
                    json!([hashes(torrents), { "max_upload_speed": max_upload_speed }]),
                ),
            )
            .await
    }

    /// An empty `path` means the daemon's download location.
    async fn free_space(&self, cancel: &CancelToken, path: &str) -> ClientResult<Bytes> {
        cancel.run("free_space", self.fetch_free_space(path)).await
    }

    async fn session_stats(&self, cancel: &CancelToken) -> ClientResult<SessionStats> {
        let status: SessionStatus = cancel
            .run(
                "session_stats",
                self.call_required(
                    "session_stats",
                    "core.get_session_status",
                    json!([["download_rate", "upload_rate"]]),
                ),
            )
            .await?;
        Ok(SessionStats {
            download_rate: whole(status.download_rate),
            upload_rate: whole(status.upload_rate),
        })
    }
}

/// Map a Deluge state name; paused and queued torrents also get the
/// activity implied by their progress.
fn map_state(state: &str, progress: f64) -> Status {
    let status = parse_status(state).unwrap_or_else(|_| {
        match state.to_ascii_lowercase().as_str() {
            "allocating" | "moving" => Status::CHECKING,
            _ => Status::empty(),
        }
    });
    if status == Status::PAUSED || status == Status::QUEUED {
        if progress >= 100.0 {
            status | Status::UPLOADING
        } else {
            status | Status::DOWNLOADING
        }
    } else {
        status
    }
}

#[allow(clippy::cast_possible_truncation)]
fn whole(value: f64) -> i64 {
    value.round() as i64
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[derive(Debug, Deserialize)]
struct RpcReply<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
}

impl RpcError {
    fn into_client_error(self, operation: &'static str) -> ClientError {
        ClientError::Rejected {
            operation,
            status: StatusCode::OK.as_u16(),
            message: if self.message.is_empty() {
                format!("deluge error code {}", self.code)
            } else {
                self.message
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SessionStatus {
    download_rate: f64,
    upload_rate: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeTorrent {
    name: String,
    state: String,
    label: String,
    ratio: f64,
    progress: f64,
    total_size: i64,
    total_peers: i64,
    total_seeds: i64,
    download_payload_rate: f64,
    upload_payload_rate: f64,
    all_time_download: i64,
    total_uploaded: i64,
    active_time: i64,
    seeding_time: i64,
    time_added: f64,
    time_since_transfer: Option<i64>,
    last_seen_complete: i64,
    trackers: Vec<DeTracker>,
    tracker_status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeTracker {
    url: String,
}

impl DeTorrent {
    fn into_torrent(self, hash: String, now: DateTime<Utc>) -> Torrent {
        let added = from_unix(whole(self.time_added));
        let mut torrent = Torrent::new(hash, self.name);
        torrent.status = map_state(&self.state, self.progress);
        torrent.category = self.label;
        torrent.size = self.total_size;
        torrent.downloaded = self.all_time_download;
        torrent.uploaded = self.total_uploaded;
        torrent.dl_speed = whole(self.download_payload_rate);
        torrent.up_speed = whole(self.upload_payload_rate);
        torrent.avg_dl_speed = average_rate(
            self.all_time_download,
            self.active_time.saturating_sub(self.seeding_time),
        );
        torrent.avg_up_speed = average_rate(self.total_uploaded, self.active_time);
        torrent.added_time = added;
        torrent.last_activity = match self.time_since_transfer {
            Some(idle) if idle >= 0 => now.checked_sub_signed(TimeDelta::seconds(idle)),
            _ => (self.last_seen_complete > 0).then(|| from_unix(self.last_seen_complete)),
        };
        torrent.seeding_time = Duration::from_secs(u64::try_from(self.seeding_time).unwrap_or(0));
        torrent.time_elapsed = (now - added).to_std().unwrap_or_default();
        torrent.leecher = self.total_peers.max(0);
        torrent.seeder = self.total_seeds.max(0);
        torrent.ratio = self.ratio;
        torrent.progress = self.progress;
        let message = self.tracker_status;
        torrent.trackers = self
            .trackers
            .into_iter()
            .map(|tracker| TorrentTracker {
                url: tracker.url,
                status: 0,
                message: message.clone(),
            })
            .collect();
        torrent
    }
}

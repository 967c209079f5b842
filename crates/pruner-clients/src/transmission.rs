//! Transmission JSON-RPC adapter.
//!
//! Transmission guards its RPC endpoint with a CSRF token: the first request
//! is answered with `409` and an `X-Transmission-Session-Id` header that must
//! be echoed on every later call. The token is cached and refreshed whenever
//! the daemon rotates it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pruner_torrent_core::{
    Bytes, CancelToken, ClientError, ClientResult, RateLimit, SessionStats, Status, Torrent,
    TorrentClient, TorrentTracker, average_rate,
};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::AdapterResult;
use crate::http::{build_http, decode_settings, ensure_success, normalise_host, read_json, transport};

const SESSION_HEADER: &str = "X-Transmission-Session-Id";
const DEFAULT_RPC_PATH: &str = "/transmission/rpc";

const TORRENT_FIELDS: &[&str] = &[
    "id",
    "hashString",
    "name",
    "status",
    "error",
    "labels",
    "totalSize",
    "downloadedEver",
    "uploadedEver",
    "rateDownload",
    "rateUpload",
    "addedDate",
    "activityDate",
    "secondsSeeding",
    "secondsDownloading",
    "uploadRatio",
    "percentDone",
    "trackerStats",
];

/// Keys accepted under `config:` for a `transmission` client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransmissionSettings {
    /// RPC URL; a bare `http://host:port` gets `/transmission/rpc` appended.
    pub host: String,
    /// RPC user name.
    pub username: String,
    /// RPC password.
    pub password: String,
}

/// [`TorrentClient`] backed by Transmission's RPC interface.
pub struct TransmissionClient {
    http: Client,
    endpoint: String,
    settings: TransmissionSettings,
    session_id: RwLock<Option<String>>,
}

impl TransmissionClient {
    /// Build an adapter for the `clients:` entry called `name`.
    ///
    /// # Errors
    ///
    /// Returns an [`AdapterError`](crate::AdapterError) when `host` is not an
    /// absolute http(s) URL or the HTTP client cannot be built.
    pub fn new(name: &str, settings: TransmissionSettings) -> AdapterResult<Self> {
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
            http: build_http(name, false, false)?,
            endpoint,
            settings,
            session_id: RwLock::new(None),
        })
    }

    /// Decode `config` and build the adapter.
    ///
    /// # Errors
    ///
    /// See [`TransmissionClient::new`]; also fails when `config` does not decode.
    pub fn from_config(name: &str, config: &serde_yaml::Value) -> AdapterResult<Self> {
        Self::new(name, decode_settings(name, config)?)
    }

    async fn post(&self, operation: &'static str, body: &Value) -> ClientResult<Response> {
        let mut request = self.http.post(&self.endpoint).json(body);
        if let Some(id) = self.session_id.read().await.as_deref() {
            request = request.header(SESSION_HEADER, id);
        }
        if !self.settings.username.is_empty() {
            request = request.basic_auth(&self.settings.username, Some(&self.settings.password));
        }
        request.send().await.map_err(transport(operation))
    }

    async fn remember_session(&self, operation: &'static str, response: &Response) -> ClientResult<()> {
        let id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ClientError::InvalidResponse {
                operation,
                detail: format!("409 without {SESSION_HEADER}"),
            })?;
        debug!(operation, "transmission session id refreshed");
        *self.session_id.write().await = Some(id.to_string());
        Ok(())
    }

    /// Issue one RPC call and return its `arguments` object, if any.
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: &str,
        arguments: Value,
    ) -> ClientResult<Option<T>> {
        let body = json!({ "method": method, "arguments": arguments });
        let mut response = self.post(operation, &body).await?;
        if response.status() == StatusCode::CONFLICT {
            self.remember_session(operation, &response).await?;
            response = self.post(operation, &body).await?;
        }
        let reply: RpcReply<T> = read_json(operation, ensure_success(operation, response).await?).await?;
        if reply.result != "success" {
            return Err(ClientError::Rejected {
                operation,
                status: StatusCode::OK.as_u16(),
                message: reply.result,
            });
        }
        Ok(reply.arguments)
    }

    async fn call_required<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: &str,
        arguments: Value,
    ) -> ClientResult<T> {
        self.call(operation, method, arguments)
            .await?
            .ok_or_else(|| ClientError::InvalidResponse {
                operation,
                detail: format!("{method} reply carried no arguments"),
            })
    }

    async fn call_ids(
        &self,
        operation: &'static str,
        method: &str,
        torrents: &[Torrent],
        mut arguments: Value,
    ) -> ClientResult<()> {
        if let Value::Object(map) = &mut arguments {
            map.insert("ids".to_string(), Value::Array(ids(torrents)));
        }
        self.call::<IgnoredAny>(operation, method, arguments)
            .await
            .map(drop)
    }

    async fn fetch_torrents(&self) -> ClientResult<Vec<Torrent>> {
        let reply: TorrentGet = self
            .call_required("get_torrents", "torrent-get", json!({ "fields": TORRENT_FIELDS }))
            .await?;
        let now = Utc::now();
        Ok(reply
            .torrents
            .into_iter()
            .map(|torrent| torrent.into_torrent(now))
            .collect())
    }

    async fn fetch_free_space(&self, path: &str) -> ClientResult<Bytes> {
        const OP: &str = "free_space";
        let path = if path.is_empty() {
            let session: SessionGet = self
                .call_required(OP, "session-get", json!({ "fields": ["download-dir"] }))
                .await?;
            session.download_dir
        } else {
            path.to_string()
        };
        let reply: FreeSpace = self
            .call_required(OP, "free-space", json!({ "path": path }))
            .await?;
        Ok(Bytes(reply.size_bytes))
    }
}

#[async_trait]
impl TorrentClient for TransmissionClient {
    fn kind(&self) -> &'static str {
        "transmission"
    }

    async fn get_torrents(&self, cancel: &CancelToken) -> ClientResult<Vec<Torrent>> {
        cancel.run("get_torrents", self.fetch_torrents()).await
    }

    async fn pause_torrents(&self, cancel: &CancelToken, torrents: &[Torrent]) -> ClientResult<()> {
        if torrents.is_empty() {
            return Ok(());
        }
        cancel
            .run(
                "pause_torrents",
                self.call_ids("pause_torrents", "torrent-stop", torrents, json!({})),
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
        cancel
            .run(
                "resume_torrents",
                self.call_ids("resume_torrents", "torrent-start", torrents, json!({})),
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
            .run(
                "remove_torrents",
                self.call_ids(
                    "remove_torrents",
                    "torrent-remove",
                    torrents,
                    json!({ "delete-local-data": delete_files }),
                ),
            )
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
                self.call_ids("reannounce_torrents", "torrent-reannounce", torrents, json!({})),
            )
            .await
    }

    /// Transmission limits are expressed in KiB/s; byte rates round up.
    async fn throttle_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
        limit: RateLimit,
    ) -> ClientResult<()> {
        if torrents.is_empty() {
            return Ok(());
        }
        let arguments = match limit {
            RateLimit::Unlimited => json!({ "uploadLimited": false }),
            RateLimit::BytesPerSecond(bytes) => json!({
                "uploadLimited": true,
                "uploadLimit": bytes.div_ceil(1024),
            }),
        };
        cancel
            .run(
                "throttle_torrents",
                self.call_ids("throttle_torrents", "torrent-set", torrents, arguments),
            )
            .await
    }

    /// An empty `path` means the daemon's configured download directory.
    async fn free_space(&self, cancel: &CancelToken, path: &str) -> ClientResult<Bytes> {
        cancel.run("free_space", self.fetch_free_space(path)).await
    }

    async fn session_stats(&self, cancel: &CancelToken) -> ClientResult<SessionStats> {
        let stats: StatsReply = cancel
            .run(
                "session_stats",
                self.call_required("session_stats", "session-stats", json!({})),
            )
            .await?;
        Ok(SessionStats {
            download_rate: stats.download_speed,
            upload_rate: stats.upload_speed,
        })
    }
}

/// Numeric ids where known, hash strings otherwise; the RPC accepts both.
fn ids(torrents: &[Torrent]) -> Vec<Value> {
    torrents
        .iter()
        .map(|torrent| {
            torrent
                .native_id
                .map_or_else(|| Value::from(torrent.hash.as_str()), Value::from)
        })
        .collect()
}

/// Translate the RPC status code; a non-zero `error` adds [`Status::ERROR`].
fn map_status(code: i64, error: i64) -> Status {
    let status = match code {
        0 => Status::STOPPED,
        1 => Status::QUEUED | Status::CHECKING,
        2 => Status::CHECKING,
        3 => Status::QUEUED | Status::DOWNLOADING,
        4 => Status::DOWNLOADING,
        5 => Status::QUEUED | Status::UPLOADING,
        6 => Status::UPLOADING,
        7 => Status::STALLED,
        _ => Status::empty(),
    };
    if error == 0 {
        status
    } else {
        status | Status::ERROR
    }
}

#[derive(Debug, Deserialize)]
struct RpcReply<T> {
    result: String,
    arguments: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TorrentGet {
    #[serde(default)]
    torrents: Vec<TrTorrent>,
}

#[derive(Debug, Deserialize)]
struct SessionGet {
    #[serde(rename = "download-dir", default)]
    download_dir: String,
}

#[derive(Debug, Deserialize)]
struct FreeSpace {
    #[serde(rename = "size-bytes")]
    size_bytes: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StatsReply {
    download_speed: i64,
    upload_speed: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TrTorrent {
    id: Option<i64>,
    hash_string: String,
    name: String,
    status: i64,
    error: i64,
    labels: Vec<String>,
    total_size: i64,
    downloaded_ever: i64,
    uploaded_ever: i64,
    rate_download: i64,
    rate_upload: i64,
    added_date: i64,
    activity_date: i64,
    seconds_seeding: i64,
    seconds_downloading: i64,
    upload_ratio: f64,
    percent_done: f64,
    tracker_stats: Vec<TrTrackerStat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TrTrackerStat {
    announce: String,
    announce_state: i32,
    last_announce_result: String,
    leecher_count: i64,
    seeder_count: i64,
}

impl TrTorrent {
    fn into_torrent(self, now: DateTime<Utc>) -> Torrent {
        let added = from_unix(self.added_date);
        let mut torrent = Torrent::new(self.hash_string, self.name);
        torrent.native_id = self.id;
        torrent.status = map_status(self.status, self.error);
        torrent.tags = self.labels.into_iter().collect();
        torrent.size = self.total_size;
        torrent.downloaded = self.downloaded_ever;
        torrent.uploaded = self.uploaded_ever;
        torrent.dl_speed = self.rate_download;
        torrent.up_speed = self.rate_upload;
        torrent.avg_dl_speed = average_rate(self.downloaded_ever, self.seconds_downloading);
        torrent.avg_up_speed = average_rate(self.uploaded_ever, self.seconds_seeding);
        torrent.added_time = added;
        torrent.last_activity = (self.activity_date > 0).then(|| from_unix(self.activity_date));
        torrent.seeding_time = Duration::from_secs(u64::try_from(self.seconds_seeding).unwrap_or(0));
        torrent.time_elapsed = (now - added).to_std().unwrap_or_default();
        torrent.leecher = self.tracker_stats.iter().map(|stat| stat.leecher_count.max(0)).sum();
        torrent.seeder = self.tracker_stats.iter().map(|stat| stat.seeder_count.max(0)).sum();
        torrent.ratio = self.upload_ratio;
        torrent.progress = self.percent_done * 100.0;
        torrent.trackers = self
            .tracker_stats
            .into_iter()
            .map(|stat| TorrentTracker {
                url: stat.announce,
                status: stat.announce_state,
                message: stat.last_announce_result,
            })
            .collect();
        torrent
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const RPC: &str = "/transmission/rpc";

    fn client(server: &MockServer) -> TransmissionClient {
        TransmissionClient::new(
            "tr",
            TransmissionSettings {
                host: server.base_url(),
                ..TransmissionSettings::default()
            },
        )
        .expect("client")
    }

    fn with_id(hash: &str, id: Option<i64>) -> Torrent {
        let mut torrent = Torrent::new(hash, hash);
        torrent.native_id = id;
        torrent
    }

    #[test]
    fn bare_hosts_get_the_default_rpc_path() {
        let tr = TransmissionClient::new(
            "tr",
            TransmissionSettings {
                host: "http://seedbox:9091".to_string(),
                ..TransmissionSettings::default()
            },
        )
        .expect("client");
        assert_eq!(tr.endpoint, "http://seedbox:9091/transmission/rpc");

        let tr = TransmissionClient::new(
            "tr",
            TransmissionSettings {
                host: "http://seedbox:9091/custom/rpc".to_string(),
                ..TransmissionSettings::default()
            },
        )
        .expect("client");
        assert_eq!(tr.endpoint, "http://seedbox:9091/custom/rpc");
    }

    #[tokio::test]
    async fn session_id_is_learned_from_a_conflict() {
        let server = MockServer::start_async().await;
        let mut conflict = server.mock(|when, then| {
            when.method(POST).path(RPC);
            then.status(409).header(SESSION_HEADER, "token-1");
        });
        let tr = client(&server);
        let cancel = CancelToken::never();

        let err = tr.session_stats(&cancel).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 409, .. }), "{err:?}");
        conflict.assert_hits(2);
        assert_eq!(tr.session_id.read().await.as_deref(), Some("token-1"));
        conflict.delete();

        let stats = server.mock(|when, then| {
            when.method(POST).path(RPC).header(SESSION_HEADER, "token-1");
            then.status(200).json_body(json!({
                "result": "success",
                "arguments": { "downloadSpeed": 5, "uploadSpeed": 9 }
            }));
        });
        let reply = tr.session_stats(&cancel).await.expect("stats");
        assert_eq!((reply.download_rate, reply.upload_rate), (5, 9));
        stats.assert();
    }

    #[tokio::test]
    async fn torrents_are_translated() {
        let server = MockServer::start_async().await;
        let added = Utc::now().timestamp() - 3_600;
        server.mock(|when, then| {
            when.method(POST).path(RPC);
            then.status(200).json_body(json!({
                "result": "success",
                "arguments": { "torrents": [{
                    "id": 7,
                    "hashString": "abc",
                    "name": "Distro",
                    "status": 5,
                    "error": 2,
                    "labels": ["linux"],
                    "totalSize": 1000,
                    "downloadedEver": 1000,
                    "uploadedEver": 3000,
                    "rateDownload": 0,
                    "rateUpload": 10,
                    "addedDate": added,
                    "activityDate": 0,
                    "secondsSeeding": 100,
                    "secondsDownloading": 10,
                    "uploadRatio": 3.0,
                    "percentDone": 0.5,
                    "trackerStats": [
                        {"announce": "https://a/announce", "announceState": 1, "lastAnnounceResult": "Success", "leecherCount": 2, "seederCount": 4},
                        {"announce": "https://b/announce", "announceState": 0, "lastAnnounceResult": "", "leecherCount": -1, "seederCount": 1}
                    ]
                }]}
            }));
        });

        let torrents = client(&server)
            .get_torrents(&CancelToken::never())
            .await
            .expect("torrents");
        let [torrent] = torrents.as_slice() else {
            panic!("expected one torrent, got {torrents:?}");
        };
        assert_eq!(torrent.native_id, Some(7));
        assert_eq!(
            torrent.status,
            Status::QUEUED | Status::UPLOADING | Status::ERROR
        );
        assert_eq!((torrent.leecher, torrent.seeder), (2, 5));
        assert_eq!((torrent.avg_dl_speed, torrent.avg_up_speed), (100, 30));
        assert!((torrent.progress - 50.0).abs() < f64::EPSILON);
        assert_eq!(torrent.last_activity, None);
        assert!(torrent.time_elapsed >= Duration::from_secs(3_600));
        assert_eq!(torrent.tracker_urls().count(), 2);
        assert!(torrent.tags.contains("linux"));
    }

    #[tokio::test]
    async fn remove_sends_ids_and_the_data_flag() {
        let server = MockServer::start_async().await;
        let remove = server.mock(|when, then| {
            when.method(POST).path(RPC).json_body(json!({
                "method": "torrent-remove",
                "arguments": { "ids": [7, "def"], "delete-local-data": true }
            }));
            then.status(200).json_body(json!({ "result": "success", "arguments": {} }));
        });

        client(&server)
            .remove_torrents(
                &CancelToken::never(),
                &[with_id("abc", Some(7)), with_id("def", None)],
                true,
            )
            .await
            .expect("remove");
        remove.assert();
    }

    #[tokio::test]
    async fn throttle_rounds_up_to_kibibytes() {
        let server = MockServer::start_async().await;
        let set = server.mock(|when, then| {
            when.method(POST).path(RPC).json_body(json!({
                "method": "torrent-set",
                "arguments": { "ids": [1], "uploadLimited": true, "uploadLimit": 2 }
            }));
            then.status(200).json_body(json!({ "result": "success" }));
        });

        client(&server)
            .throttle_torrents(
                &CancelToken::never(),
                &[with_id("a", Some(1))],
                RateLimit::BytesPerSecond(1_025),
            )
            .await
            .expect("throttle");
        set.assert();
    }

    #[tokio::test]
    async fn rpc_failures_are_rejections() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path(RPC);
            then.status(200)
                .json_body(json!({ "result": "invalid or corrupt torrent file" }));
        });

        let err = client(&server)
            .pause_torrents(&CancelToken::never(), &[with_id("a", Some(1))])
            .await
            .unwrap_err();
        assert!(
            matches!(&err, ClientError::Rejected { message, .. } if message.contains("corrupt")),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn free_space_defaults_to_the_download_dir() {
        let server = MockServer::start_async().await;
        let session = server.mock(|when, then| {
            when.method(POST).path(RPC).json_body(json!({
                "method": "session-get",
                "arguments": { "fields": ["download-dir"] }
            }));
            then.status(200).json_body(json!({
                "result": "success",
                "arguments": { "download-dir": "/data" }
            }));
        });
        let free = server.mock(|when, then| {
            when.method(POST).path(RPC).json_body(json!({
                "method": "free-space",
                "arguments": { "path": "/data" }
            }));
            then.status(200).json_body(json!({
                "result": "success",
                "arguments": { "path": "/data", "size-bytes": 42 }
            }));
        });

        let space = client(&server)
            .free_space(&CancelToken::never(), "")
            .await
            .expect("free space");
        assert_eq!(space, Bytes(42));
        session.assert();
        free.assert();
    }

    #[test]
    fn status_codes_map_onto_flags() {
        assert_eq!(map_status(0, 0), Status::STOPPED);
        assert_eq!(map_status(1, 0), Status::QUEUED | Status::CHECKING);
        assert_eq!(map_status(4, 0), Status::DOWNLOADING);
        assert_eq!(map_status(7, 0), Status::STALLED);
        assert_eq!(map_status(6, 3), Status::UPLOADING | Status::ERROR);
        assert_eq!(map_status(99, 0), Status::empty());
    }
}

//! qBittorrent WebAPI v2 adapter.
//!
//! # Design
//!
//! - Authentication is lazy: the first call logs in and the session cookie is
//!   kept by reqwest's cookie store. A `403` triggers one re-login and retry.
//! - `stop`/`start` are tried before the pre-5.0 `pause`/`resume` endpoints.
//! - Tracker lists exclude the `[DHT]`, `[PeX]` and `[LSD]` pseudo entries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pruner_torrent_core::{
    Bytes, CancelToken, ClientError, ClientResult, RateLimit, SessionStats, Status, Torrent,
    TorrentClient, TorrentTracker, hashes, parse_status,
};
use reqwest::header::REFERER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AdapterResult;
use crate::http::{build_http, decode_settings, ensure_success, normalise_host, read_json, transport};

const PSEUDO_TRACKERS: [&str; 3] = ["[DHT]", "[PeX]", "[LSD]"];

/// Keys accepted under `config:` for a `qbittorrent` client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QbittorrentSettings {
    /// WebUI base URL, e.g. `http://127.0.0.1:8080`.
    pub host: String,
    /// WebUI user name.
    pub username: String,
    /// WebUI password.
    pub password: String,
    /// HTTP basic auth user for a fronting reverse proxy.
    pub basic_user: String,
    /// HTTP basic auth password for a fronting reverse proxy.
    pub basic_pass: String,
    /// Accept invalid TLS certificates.
    pub insecure_tls: bool,
}

/// [`TorrentClient`] backed by the qBittorrent WebAPI.
pub struct QbittorrentClient {
    http: Client,
    base: String,
    settings: QbittorrentSettings,
    authenticated: AtomicBool,
    login_lock: Mutex<()>,
}

impl QbittorrentClient {
    /// Build an adapter for the `clients:` entry called `name`.
    ///
    /// # Errors
    ///
    /// Returns an [`AdapterError`](crate::AdapterError) when `host` is not an
    /// absolute http(s) URL or the HTTP client cannot be built.
    pub fn new(name: &str, settings: QbittorrentSettings) -> AdapterResult<Self> {
        let base = normalise_host(name, &settings.host)?;
        let http = build_http(name, settings.insecure_tls, true)?;
        Ok(Self {
            http,
            base,
            settings,
            authenticated: AtomicBool::new(false),
            login_lock: Mutex::new(()),
        })
    }

    /// Decode `config` and build the adapter.
    ///
    /// # Errors
    ///
    /// See [`QbittorrentClient::new`]; also fails when `config` does not decode.
    pub fn from_config(name: &str, config: &serde_yaml::Value) -> AdapterResult<Self> {
        Self::new(name, decode_settings(name, config)?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v2/{path}", self.base)
    }

    fn authorise(&self, request: RequestBuilder) -> RequestBuilder {
        if self.settings.basic_user.is_empty() {
            request
        } else {
            request.basic_auth(&self.settings.basic_user, Some(&self.settings.basic_pass))
        }
    }

    async fn login(&self, operation: &'static str) -> ClientResult<()> {
        let _guard = self.login_lock.lock().await;
        let response = self
            .authorise(self.http.post(self.endpoint("auth/login")))
            .header(REFERER, &self.base)
            .form(&[
                ("username", self.settings.username.as_str()),
                ("password", self.settings.password.as_str()),
            ])
            .send()
            .await
            .map_err(transport(operation))?;
        let body = ensure_success(operation, response)
            .await?
            .text()
            .await
            .map_err(transport(operation))?;
        if body.trim() == "Fails." {
            return Err(ClientError::Rejected {
                operation,
                status: StatusCode::UNAUTHORIZED.as_u16(),
                message: "invalid username or password".to_string(),
            });
        }
        self.authenticated.store(true, Ordering::Release);
        debug!(host = %self.base, "qbittorrent session established");
        Ok(())
    }

    async fn send<F>(&self, operation: &'static str, build: F) -> ClientResult<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        if !self.authenticated.load(Ordering::Acquire) {
            self.login(operation).await?;
        }
        let response = self
            .authorise(build())
            .send()
            .await
            .map_err(transport(operation))?;
        if response.status() != StatusCode::FORBIDDEN {
            return ensure_success(operation, response).await;
        }

        debug!(operation, "qbittorrent session expired; logging in again");
        self.authenticated.store(false, Ordering::Release);
        self.login(operation).await?;
        let response = self
            .authorise(build())
            .send()
            .await
            .map_err(transport(operation))?;
        ensure_success(operation, response).await
    }

    async fn post_hashes(
        &self,
        operation: &'static str,
        path: &str,
        torrents: &[Torrent],
        extra: &[(&str, String)],
    ) -> ClientResult<()> {
        let url = self.endpoint(path);
        let mut form = vec![("hashes", hashes(torrents).join("|"))];
        form.extend(extra.iter().map(|(key, value)| (*key, value.clone())));
        self.send(operation, || self.http.post(&url).form(&form))
            .await
            .map(drop)
    }

    /// POST to `primary`, falling back to `legacy` when the server is too old
    /// to know the newer endpoint.
    async fn post_with_fallback(
        &self,
        operation: &'static str,
        primary: &str,
        legacy: &str,
        torrents: &[Torrent],
    ) -> ClientResult<()> {
        match self.post_hashes(operation, primary, torrents, &[]).await {
            Err(ClientError::Rejected { status: 404, .. }) => {
                debug!(operation, endpoint = legacy, "using legacy qbittorrent endpoint");
                self.post_hashes(operation, legacy, torrents, &[]).await
            }
            other => other,
        }
    }

    async fn torrent_list(&self) -> ClientResult<Vec<QbTorrent>> {
        const OP: &str = "get_torrents";
        let url = self.endpoint("torrents/info");
        let response = self
            .send(OP, || {
                self.http
                    .get(&url)
                    .query(&[("includeTrackers", "true")])
            })
            .await?;
        read_json(OP, response).await
    }

    async fn properties(&self, hash: &str) -> ClientResult<QbProperties> {
        const OP: &str = "torrent_properties";
        let url = self.endpoint("torrents/properties");
        let response = self
            .send(OP, || self.http.get(&url).query(&[("hash", hash)]))
            .await?;
        read_json(OP, response).await
    }

    async fn trackers(&self, hash: &str) -> ClientResult<Vec<QbTracker>> {
        const OP: &str = "torrent_trackers";
        let url = self.endpoint("torrents/trackers");
        let response = self
            .send(OP, || self.http.get(&url).query(&[("hash", hash)]))
            .await?;
        read_json(OP, response).await
    }

    async fn server_state(&self, operation: &'static str) -> ClientResult<ServerState> {
        let url = self.endpoint("sync/maindata");
        let response = self
            .send(operation, || self.http.get(&url).query(&[("rid", "0")]))
            .await?;
        let maindata: MainData = read_json(operation, response).await?;
        Ok(maindata.server_state)
    }

    async fn collect_torrents(&self) -> ClientResult<Vec<Torrent>> {
        let listed = self.torrent_list().await?;
        let mut torrents = Vec::with_capacity(listed.len());
        for mut entry in listed {
            // Snapshots are all-or-nothing: no torrent leaves without its trackers.
            let properties = self.properties(&entry.hash).await?;
            if entry.trackers.is_empty() {
                entry.trackers = self.trackers(&entry.hash).await?;
            }
            torrents.push(entry.into_torrent(&properties));
        }
        Ok(torrents)
    }
}

#[async_trait]
impl TorrentClient for QbittorrentClient {
    fn kind(&self) -> &'static str {
        "qbittorrent"
    }

    async fn get_torrents(&self, cancel: &CancelToken) -> ClientResult<Vec<Torrent>> {
        cancel.run("get_torrents", self.collect_torrents()).await
    }

    async fn pause_torrents(&self, cancel: &CancelToken, torrents: &[Torrent]) -> ClientResult<()> {
        if torrents.is_empty() {
            return Ok(());
        }
        cancel
            .run(
                "pause_torrents",
                self.post_with_fallback("pause_torrents", "torrents/stop", "torrents/pause", torrents),
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
                self.post_with_fallback(
                    "resume_torrents",
                    "torrents/start",
                    "torrents/resume",
                    torrents,
                ),
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
        let extra = [("deleteFiles", delete_files.to_string())];
        cancel
            .run(
                "remove_torrents",
                self.post_hashes("remove_torrents", "torrents/delete", torrents, &extra),
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
                self.post_hashes("reannounce_torrents", "torrents/reannounce", torrents, &[]),
            )
            .await
    }

    async fn throttle_torrents(
        &self,
        cancel: &CancelToken,
        torrents: &[Torrent],
        limit: RateLimit,
    ) -> ClientResult<()> {
        if torrents.is_empty() {
            return Ok(());
        }
        let value = match limit {
            RateLimit::Unlimited => "-1".to_string(),
            RateLimit::BytesPerSecond(bytes) => bytes.to_string(),
        };
        let extra = [("limit", value)];
        cancel
            .run(
                "throttle_torrents",
                self.post_hashes("throttle_torrents", "torrents/setUploadLimit", torrents, &extra),
            )
            .await
    }

    /// qBittorrent only reports free space for its default save path, so
    /// `path` is not consulted.
    async fn free_space(&self, cancel: &CancelToken, path: &str) -> ClientResult<Bytes> {
        if !path.is_empty() {
            debug!(path, "qbittorrent reports free space for its default save path only");
        }
        let state = cancel
            .run("free_space", self.server_state("free_space"))
            .await?;
        Ok(Bytes(state.free_space_on_disk))
    }

    async fn session_stats(&self, cancel: &CancelToken) -> ClientResult<SessionStats> {
        let state = cancel
            .run("session_stats", self.server_state("session_stats"))
            .await?;
        Ok(SessionStats {
            download_rate: state.dl_info_speed,
            upload_rate: state.up_info_speed,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QbTorrent {
    hash: String,
    name: String,
    state: String,
    category: String,
    tags: String,
    size: i64,
    downloaded: i64,
    uploaded: i64,
    dlspeed: i64,
    upspeed: i64,
    added_on: i64,
    last_activity: i64,
    ratio: f64,
    progress: f64,
    trackers: Vec<QbTracker>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QbTracker {
    url: String,
    status: i32,
    msg: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QbProperties {
    time_elapsed: i64,
    seeding_time: i64,
    dl_speed_avg: i64,
    up_speed_avg: i64,
    peers_total: i64,
    seeds_total: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MainData {
    server_state: ServerState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerState {
    free_space_on_disk: i64,
    dl_info_speed: i64,
    up_info_speed: i64,
}

impl QbTorrent {
    fn into_torrent(self, properties: &QbProperties) -> Torrent {
        let mut torrent = Torrent::new(self.hash, self.name);
        torrent.status = map_state(&self.state);
        torrent.category = self.category;
        torrent.tags = self
            .tags
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();
        torrent.size = self.size;
        torrent.downloaded = self.downloaded;
        torrent.uploaded = self.uploaded;
        torrent.dl_speed = self.dlspeed;
        torrent.up_speed = self.upspeed;
        torrent.avg_dl_speed = properties.dl_speed_avg;
        torrent.avg_up_speed = properties.up_speed_avg;
        torrent.added_time = from_unix(self.added_on);
        torrent.last_activity = (self.last_activity > 0).then(|| from_unix(self.last_activity));
        torrent.seeding_time = seconds(properties.seeding_time);
        torrent.time_elapsed = seconds(properties.time_elapsed);
        torrent.leecher = properties.peers_total;
        torrent.seeder = properties.seeds_total;
        torrent.ratio = self.ratio;
        torrent.progress = self.progress * 100.0;
        torrent.trackers = self
            .trackers
            .into_iter()
            .filter(|tracker| !PSEUDO_TRACKERS.iter().any(|pseudo| tracker.url.contains(pseudo)))
            .map(|tracker| TorrentTracker {
                url: tracker.url,
                status: tracker.status,
                message: tracker.msg,
            })
            .collect();
        torrent
    }
}

/// Native state names outside the shared vocabulary are folded onto the
/// closest flags; anything unknown maps to the empty status.
fn map_state(state: &str) -> Status {
    if let Ok(status) = parse_status(state) {
        return status;
    }
    match state.to_ascii_lowercase().as_str() {
        "forcedup" => Status::UPLOADING,
        "forceddl" | "metadl" | "forcedmetadl" => Status::DOWNLOADING,
        "checkingresumedata" | "allocating" | "moving" => Status::CHECKING,
        "missingfiles" => Status::ERROR,
        _ => Status::empty(),
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn seconds(value: i64) -> Duration {
    Duration::from_secs(u64::try_from(value).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> QbittorrentClient {
        QbittorrentClient::new(
            "qb",
            QbittorrentSettings {
                host: server.base_url(),
                username: "admin".to_string(),
                password: "secret".to_string(),
                ..QbittorrentSettings::default()
            },
        )
        .expect("client")
    }

    fn login_mock(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/auth/login")
                .form_urlencoded_tuple("username", "admin")
                .form_urlencoded_tuple("password", "secret");
            then.status(200)
                .header("set-cookie", "SID=session-1; path=/")
                .body("Ok.");
        })
    }

    fn sample(hash: &str) -> Torrent {
        Torrent::new(hash, hash)
    }

    #[tokio::test]
    async fn listing_merges_properties_and_filters_pseudo_trackers() {
        let server = MockServer::start_async().await;
        let login = login_mock(&server);
        let info = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v2/torrents/info")
                .query_param("includeTrackers", "true");
            then.status(200).json_body(json!([{
                "hash": "abc",
                "name": "Linux ISO",
                "state": "stalledUP",
                "category": "iso",
                "tags": "linux, keep,",
                "size": 4_000_000_000_i64,
                "downloaded": 4_000_000_000_i64,
                "uploaded": 8_000_000_000_i64,
                "dlspeed": 0,
                "upspeed": 1024,
                "added_on": 1_700_000_000,
                "last_activity": 0,
                "num_leechs": 1,
                "num_seeds": 3,
                "ratio": 2.0,
                "progress": 1.0,
                "trackers": []
            }]));
        });
        let properties = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v2/torrents/properties")
                .query_param("hash", "abc");
            then.status(200).json_body(json!({
                "time_elapsed": 7200,
                "seeding_time": 3600,
                "dl_speed_avg": 500,
                "up_speed_avg": 250,
                "peers_total": 2,
                "seeds_total": 7
            }));
        });
        let trackers = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v2/torrents/trackers")
                .query_param("hash", "abc");
            then.status(200).json_body(json!([
                {"url": "** [DHT] **", "status": 2, "msg": ""},
                {"url": "** [PeX] **", "status": 2, "msg": ""},
                {"url": "** [LSD] **", "status": 2, "msg": ""},
                {"url": "https://tracker.example/announce", "status": 2, "msg": "ok"}
            ]));
        });

        let torrents = client(&server)
            .get_torrents(&CancelToken::never())
            .await
            .expect("torrents");

        login.assert();
        info.assert();
        properties.assert();
        trackers.assert();
        let [torrent] = torrents.as_slice() else {
            panic!("expected one torrent, got {torrents:?}");
        };
        assert_eq!(torrent.status, Status::STALLED | Status::UPLOADING);
        assert_eq!(
            torrent.tags.iter().map(String::as_str).collect::<Vec<_>>(),
            ["keep", "linux"]
        );
        assert!((torrent.progress - 100.0).abs() < f64::EPSILON);
        assert_eq!(torrent.last_activity, None);
        assert_eq!(torrent.seeding_time, Duration::from_secs(3600));
        assert_eq!(torrent.time_elapsed, Duration::from_secs(7200));
        assert_eq!((torrent.leecher, torrent.seeder), (2, 7));
        assert_eq!(torrent.avg_up_speed, 250);
        assert_eq!(
            torrent.tracker_urls().collect::<Vec<_>>(),
            ["https://tracker.example/announce"]
        );
    }

    #[tokio::test]
    async fn failed_tracker_lookup_fails_the_listing() {
        let server = MockServer::start_async().await;
        login_mock(&server);
        server.mock(|when, then| {
            when.method(GET).path("/api/v2/torrents/info");
            then.status(200)
                .json_body(json!([{"hash": "abc", "name": "private", "trackers": []}]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v2/torrents/properties");
            then.status(200).json_body(json!({"seeding_time": 60}));
        });
        let trackers = server.mock(|when, then| {
            when.method(GET).path("/api/v2/torrents/trackers");
            then.status(500).body("boom");
        });

        let err = client(&server)
            .get_torrents(&CancelToken::never())
            .await
            .unwrap_err();
        trackers.assert();
        assert!(
            matches!(
                err,
                ClientError::Rejected {
                    operation: "torrent_trackers",
                    status: 500,
                    ..
                }
            ),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn failed_properties_lookup_fails_the_listing() {
        let server = MockServer::start_async().await;
        login_mock(&server);
        server.mock(|when, then| {
            when.method(GET).path("/api/v2/torrents/info");
            then.status(200).json_body(json!([{"hash": "abc", "name": "x"}]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v2/torrents/properties");
            then.status(404);
        });

        let err = client(&server)
            .get_torrents(&CancelToken::never())
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                ClientError::Rejected {
                    operation: "torrent_properties",
                    ..
                }
            ),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn rejected_credentials_surface_as_rejections() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/v2/auth/login");
            then.status(200).body("Fails.");
        });

        let err = client(&server)
            .get_torrents(&CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 401, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn pause_falls_back_to_the_legacy_endpoint() {
        let server = MockServer::start_async().await;
        login_mock(&server);
        let stop = server.mock(|when, then| {
            when.method(POST).path("/api/v2/torrents/stop");
            then.status(404);
        });
        let pause = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/torrents/pause")
                .form_urlencoded_tuple("hashes", "a|b");
            then.status(200);
        });

        client(&server)
            .pause_torrents(&CancelToken::never(), &[sample("a"), sample("b")])
            .await
            .expect("pause");
        stop.assert();
        pause.assert();
    }

    #[tokio::test]
    async fn delete_and_throttle_send_their_parameters() {
        let server = MockServer::start_async().await;
        login_mock(&server);
        let delete = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/torrents/delete")
                .form_urlencoded_tuple("hashes", "a|b")
                .form_urlencoded_tuple("deleteFiles", "true");
            then.status(200);
        });
        let throttle = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/torrents/setUploadLimit")
                .form_urlencoded_tuple("hashes", "a")
                .form_urlencoded_tuple("limit", "-1");
            then.status(200);
        });

        let qb = client(&server);
        let cancel = CancelToken::never();
        qb.remove_torrents(&cancel, &[sample("a"), sample("b")], true)
            .await
            .expect("delete");
        qb.throttle_torrents(&cancel, &[sample("a")], RateLimit::Unlimited)
            .await
            .expect("throttle");
        delete.assert();
        throttle.assert();
    }

    #[tokio::test]
    async fn server_state_feeds_free_space_and_session_stats() {
        let server = MockServer::start_async().await;
        login_mock(&server);
        let maindata = server.mock(|when, then| {
            when.method(GET).path("/api/v2/sync/maindata");
            then.status(200).json_body(json!({
                "rid": 1,
                "server_state": {
                    "free_space_on_disk": 123_456_789,
                    "dl_info_speed": 10,
                    "up_info_speed": 20
                }
            }));
        });

        let qb = client(&server);
        let cancel = CancelToken::never();
        assert_eq!(qb.free_space(&cancel, "").await.expect("free"), Bytes(123_456_789));
        let stats = qb.session_stats(&cancel).await.expect("stats");
        assert_eq!((stats.download_rate, stats.upload_rate), (10, 20));
        maindata.assert_hits(2);
    }

    #[tokio::test]
    async fn empty_batches_skip_the_network() {
        let server = MockServer::start_async().await;
        let login = login_mock(&server);
        client(&server)
            .pause_torrents(&CancelToken::never(), &[])
            .await
            .expect("pause");
        login.assert_hits(0);
    }

    #[test]
    fn native_states_map_onto_flags() {
        assert_eq!(map_state("pausedDL"), Status::PAUSED | Status::DOWNLOADING);
        assert_eq!(map_state("uploading"), Status::UPLOADING);
        assert_eq!(map_state("forcedUP"), Status::UPLOADING);
        assert_eq!(map_state("metaDL"), Status::DOWNLOADING);
        assert_eq!(map_state("missingFiles"), Status::ERROR);
        assert_eq!(map_state("unknown"), Status::empty());
    }
}

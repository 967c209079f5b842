//! Back-end neutral torrent snapshot shared across the workspace.
//!
//! Adapters are responsible for normalising units before building a
//! [`Torrent`]: byte counters are bytes, rates are bytes per second and
//! `progress` is a percentage in `0..=100`.

pub mod status;

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use status::{Status, contains_status, parse_status};

/// Tracker entry attached to a torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TorrentTracker {
    /// Announce URL.
    pub url: String,
    /// Back-end specific status code.
    pub status: i32,
    /// Last announce message.
    pub message: String,
}

impl TorrentTracker {
    /// Tracker with only a URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Snapshot of a torrent as reported by a client at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Torrent {
    /// Info-hash; the cross-back-end identity.
    pub hash: String,
    /// Back-end native identifier, used only by the adapter that produced it.
    pub native_id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Category, empty when uncategorised.
    pub category: String,
    /// Tags; order is irrelevant.
    pub tags: BTreeSet<String>,
    /// Lifecycle and activity flags.
    pub status: Status,
    /// Total payload size in bytes.
    pub size: i64,
    /// Bytes downloaded over the torrent's lifetime.
    pub downloaded: i64,
    /// Bytes uploaded over the torrent's lifetime.
    pub uploaded: i64,
    /// Current download rate in bytes per second.
    pub dl_speed: i64,
    /// Current upload rate in bytes per second.
    pub up_speed: i64,
    /// Lifetime average download rate.
    pub avg_dl_speed: i64,
    /// Lifetime average upload rate.
    pub avg_up_speed: i64,
    /// When the torrent was added.
    pub added_time: DateTime<Utc>,
    /// Last transfer activity; `None` when the back-end never saw any.
    pub last_activity: Option<DateTime<Utc>>,
    /// Time spent seeding.
    pub seeding_time: Duration,
    /// Time spent active in total.
    pub time_elapsed: Duration,
    /// Peers without the full payload, summed across trackers.
    pub leecher: i64,
    /// Peers with the full payload, summed across trackers.
    pub seeder: i64,
    /// Share ratio.
    pub ratio: f64,
    /// Completion percentage, `0..=100`.
    pub progress: f64,
    /// Trackers in back-end order.
    pub trackers: Vec<TorrentTracker>,
}

impl Torrent {
    /// Empty snapshot carrying only identity; handy for adapters and tests.
    #[must_use]
    pub fn new(hash: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            native_id: None,
            name: name.into(),
            category: String::new(),
            tags: BTreeSet::new(),
            status: Status::empty(),
            size: 0,
            downloaded: 0,
            uploaded: 0,
            dl_speed: 0,
            up_speed: 0,
            avg_dl_speed: 0,
            avg_up_speed: 0,
            added_time: DateTime::<Utc>::UNIX_EPOCH,
            last_activity: None,
            seeding_time: Duration::ZERO,
            time_elapsed: Duration::ZERO,
            leecher: 0,
            seeder: 0,
            ratio: 0.0,
            progress: 0.0,
            trackers: Vec::new(),
        }
    }

    /// Tracker URLs in order.
    pub fn tracker_urls(&self) -> impl Iterator<Item = &str> {
        self.trackers.iter().map(|tracker| tracker.url.as_str())
    }
}

impl fmt::Display for Torrent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}

/// Client-wide transfer rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionStats {
    /// Aggregate download rate in bytes per second.
    pub download_rate: i64,
    /// Aggregate upload rate in bytes per second.
    pub upload_rate: i64,
}

/// Lifetime average rate, `0` when no time has elapsed.
#[must_use]
pub const fn average_rate(total: i64, elapsed_secs: i64) -> i64 {
    if elapsed_secs <= 0 {
        0
    } else {
        total / elapsed_secs
    }
}

/// Hashes of the given torrents, in order.
#[must_use]
pub fn hashes(torrents: &[Torrent]) -> Vec<&str> {
    torrents.iter().map(|torrent| torrent.hash.as_str()).collect()
}

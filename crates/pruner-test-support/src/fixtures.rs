//! Sample torrent sets used by filter, rule and orchestration tests.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use pruner_torrent_core::{Status, Torrent, TorrentTracker};

const HOUR: u64 = 3_600;

/// Three seeding torrents with distinct sizes, ages and swarm health.
///
/// `t1` is small and recently active, `t2` is large and well seeded, `t3` has
/// more leechers than seeders and has been idle for five hours.
#[must_use]
pub fn scenario_torrents(now: DateTime<Utc>) -> Vec<Torrent> {
    vec![
        scenario(
            "t1",
            "Test Torrent 1",
            ScenarioStats {
                ratio: 1.234,
                progress: 34.421,
                size: 10_240_000,
                up_speed: 1_048_576,
                seeding: Duration::from_secs(2 * HOUR),
                idle: TimeDelta::hours(2),
                leecher: 12,
                seeder: 128,
            },
            now,
        ),
        scenario(
            "t2",
            "Test Torrent 2",
            ScenarioStats {
                ratio: 2.5,
                progress: 100.0,
                size: 5_368_709_120,
                up_speed: 20_971_520,
                seeding: Duration::from_secs(168 * HOUR),
                idle: TimeDelta::minutes(30),
                leecher: 52,
                seeder: 1,
            },
            now,
        ),
        scenario(
            "t3",
            "Test Torrent 3",
            ScenarioStats {
                ratio: 0.85,
                progress: 75.12,
                size: 2_147_483_648,
                up_speed: 524_288,
                seeding: Duration::from_secs(3 * HOUR),
                idle: TimeDelta::hours(5),
                leecher: 30,
                seeder: 20,
            },
            now,
        ),
    ]
}

struct ScenarioStats {
    ratio: f64,
    progress: f64,
    size: i64,
    up_speed: i64,
    seeding: Duration,
    idle: TimeDelta,
    leecher: i64,
    seeder: i64,
}

fn scenario(hash: &str, name: &str, stats: ScenarioStats, now: DateTime<Utc>) -> Torrent {
    let mut torrent = Torrent::new(hash, name);
    torrent.status = Status::UPLOADING;
    torrent.ratio = stats.ratio;
    torrent.progress = stats.progress;
    torrent.size = stats.size;
    torrent.up_speed = stats.up_speed;
    torrent.seeding_time = stats.seeding;
    torrent.time_elapsed = stats.seeding;
    torrent.added_time = now - TimeDelta::days(30);
    torrent.last_activity = Some(now - stats.idle);
    torrent.leecher = stats.leecher;
    torrent.seeder = stats.seeder;
    torrent
}

/// Seven torrents across categories, tags, statuses and trackers.
///
/// Index order: Movie A, TV Show B, Game C, Music D, Movie E, TV Show F, TV Show G.
#[must_use]
pub fn catalog_torrents() -> Vec<Torrent> {
    vec![
        catalog(
            "movie-a",
            "Movie A",
            "Movies",
            &["hd", "2023"],
            Status::UPLOADING,
            &["tracker.a.com", "tracker.b.com"],
        ),
        catalog(
            "tv-show-b",
            "TV Show B",
            "TV Shows",
            &["4k", "series"],
            Status::DOWNLOADING,
            &["tracker.c.com"],
        ),
        catalog(
            "game-c",
            "Game C",
            "Games",
            &["pc", "rpg"],
            Status::PAUSED,
            &["tracker.d.com"],
        ),
        catalog(
            "music-d",
            "Music D",
            "Music",
            &["flac"],
            Status::UPLOADING,
            &["tracker.e.com"],
        ),
        catalog(
            "movie-e",
            "Movie E",
            "Movies",
            &["sd", "old"],
            Status::STOPPED | Status::UPLOADING,
            &["tracker.a.com", "tracker.f.com"],
        ),
        catalog(
            "tv-show-f",
            "TV Show F",
            "TV Shows",
            &["anime"],
            Status::UPLOADING,
            &["tracker.g.com"],
        ),
        catalog(
            "tv-show-g",
            "TV Show G",
            "TV Shows",
            &["hd"],
            Status::ERROR,
            &["tracker.a.com"],
        ),
    ]
}

fn catalog(
    hash: &str,
    name: &str,
    category: &str,
    tags: &[&str],
    status: Status,
    trackers: &[&str],
) -> Torrent {
    let mut torrent = Torrent::new(hash, name);
    torrent.category = category.to_string();
    torrent.tags = tags.iter().map(|tag| (*tag).to_string()).collect();
    torrent.status = status;
    torrent.trackers = trackers
        .iter()
        .map(|url| TorrentTracker::new(format!("https://{url}/announce")))
        .collect();
    torrent
}

/// Pick torrents from `set` by index, preserving the given order.
#[must_use]
pub fn pick(set: &[Torrent], indices: &[usize]) -> Vec<Torrent> {
    indices
        .iter()
        .filter_map(|index| set.get(*index).cloned())
        .collect()
}

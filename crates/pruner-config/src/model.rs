//! Typed configuration models.
//!
//! # Design
//! - Pure data carriers deserialised from YAML; IO lives in `loader.rs`.
//! - Strategy settings fall back to their profile through [`Profile::settings_for`].
//! - Rule compilation is memoised on the strategy and happens on first use.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use pruner_rules::{CompileResult, CompiledRule};
use pruner_torrent_core::{Filters, ProtocolTimings, RateLimit};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::defaults;
use crate::validate::{deserialize_duration, deserialize_optional_duration};

/// Root configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Logging switches.
    #[serde(default)]
    pub log: LogSection,
    /// Scheduling of repeated runs.
    #[serde(default)]
    pub daemon: DaemonSection,
    /// Waits used by the reannounce-before-delete protocol.
    #[serde(default)]
    pub timings: TimingsSection,
    /// Named torrent client connections.
    #[serde(default)]
    pub clients: BTreeMap<String, ClientConfig>,
    /// Profiles evaluated in declaration order.
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

/// Output format of log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per record.
    Json,
}

/// `log:` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// Emit log records at all.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    #[serde(default = "defaults::log_level")]
    pub level: String,
    /// Record format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: defaults::log_level(),
            format: LogFormat::default(),
        }
    }
}

/// `daemon:` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonSection {
    /// Keep running and repeat on a schedule; otherwise run once.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// Time between the start of two runs when no `cron_exp` is set.
    #[serde(
        default = "defaults::daemon_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub interval: Duration,
    /// Cron schedule with a leading seconds field; replaces `interval`.
    #[serde(default, alias = "cronexp")]
    pub cron_exp: Option<CronExpr>,
    /// Run immediately instead of waiting for the first tick.
    #[serde(default = "defaults::enabled")]
    pub run_on_start: bool,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: defaults::DEFAULT_DAEMON_INTERVAL,
            cron_exp: None,
            run_on_start: true,
        }
    }
}

/// A parsed cron expression: `sec min hour day-of-month month day-of-week [year]`.
#[derive(Debug, Clone)]
pub struct CronExpr {
    source: String,
    schedule: cron::Schedule,
}

impl CronExpr {
    /// Parse `source`.
    ///
    /// # Errors
    ///
    /// Returns the parser's error for malformed expressions, including the
    /// five-field form without seconds.
    pub fn parse(source: &str) -> Result<Self, cron::error::Error> {
        let source = source.trim();
        Ok(Self {
            source: source.to_string(),
            schedule: cron::Schedule::from_str(source)?,
        })
    }

    /// Expression as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// First fire time strictly after `after`, if the schedule has one.
    #[must_use]
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(after).next()
    }
}

impl PartialEq for CronExpr {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CronExpr {}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for CronExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::parse(&source)
            .map_err(|err| D::Error::custom(format!("invalid cron expression {source:?}: {err}")))
    }
}

/// `timings:` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingsSection {
    /// Wait after pausing.
    #[serde(deserialize_with = "deserialize_duration")]
    pub pause_wait: Duration,
    /// Wait after resuming.
    #[serde(deserialize_with = "deserialize_duration")]
    pub resume_wait: Duration,
    /// Wait after reannouncing, unless a `delete_delay` applies.
    #[serde(deserialize_with = "deserialize_duration")]
    pub reannounce_wait: Duration,
}

impl Default for TimingsSection {
    fn default() -> Self {
        let timings = ProtocolTimings::default();
        Self {
            pause_wait: timings.pause_wait,
            resume_wait: timings.resume_wait,
            reannounce_wait: timings.reannounce_wait,
        }
    }
}

impl TimingsSection {
    /// Convert into the protocol timings understood by clients.
    #[must_use]
    pub const fn protocol(&self) -> ProtocolTimings {
        ProtocolTimings {
            pause_wait: self.pause_wait,
            resume_wait: self.resume_wait,
            reannounce_wait: self.reannounce_wait,
        }
    }
}

/// Back-end families the application knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    /// qBittorrent WebAPI v2.
    QBittorrent,
    /// Transmission RPC.
    Transmission,
    /// Deluge through its Web UI JSON-RPC endpoint.
    Deluge {
        /// Speak the 2.x method names (`deluge_v2`).
        v2: bool,
    },
    /// Anything else; skipped with a warning.
    Unsupported,
}

/// One entry of the `clients:` map.
///
/// `config` is left untyped here; each adapter decodes the keys it needs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Back-end type as written (`qbittorrent`, `transmission`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Adapter specific connection settings.
    #[serde(default)]
    pub config: serde_yaml::Value,
}

impl ClientConfig {
    /// Classify the declared `type`.
    #[must_use]
    pub fn client_kind(&self) -> ClientKind {
        match self.kind.to_ascii_lowercase().as_str() {
            "qbittorrent" | "qbit" => ClientKind::QBittorrent,
            "transmission" => ClientKind::Transmission,
            "deluge" => ClientKind::Deluge { v2: false },
            "deluge_v2" => ClientKind::Deluge { v2: true },
            _ => ClientKind::Unsupported,
        }
    }
}

/// A client binding with defaults shared by its strategies.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Name of an entry in `clients:`.
    pub client: String,
    /// Default for [`Strategy::reannounce`].
    #[serde(default)]
    pub reannounce: bool,
    /// Default for [`Strategy::delete_files`].
    #[serde(default)]
    pub delete_files: bool,
    /// Default for [`Strategy::delete_delay`].
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub delete_delay: Option<Duration>,
    /// Default for [`Strategy::mount_path`].
    #[serde(default)]
    pub mount_path: Option<String>,
    /// Strategies evaluated in order.
    #[serde(default)]
    pub strategy: Vec<Strategy>,
}

/// Settings a strategy runs with after profile defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategySettings {
    /// Run pause/resume/reannounce before deleting.
    pub reannounce: bool,
    /// Delete downloaded data together with the torrent.
    pub delete_files: bool,
    /// Replacement for the post-reannounce wait.
    pub delete_delay: Option<Duration>,
    /// Path whose free space feeds the disk gate; empty means the client default.
    pub mount_path: String,
}

impl Profile {
    /// Merge this profile's defaults with `strategy`'s overrides.
    #[must_use]
    pub fn settings_for(&self, strategy: &Strategy) -> StrategySettings {
        StrategySettings {
            reannounce: strategy.reannounce.unwrap_or(self.reannounce),
            delete_files: strategy.delete_files.unwrap_or(self.delete_files),
            delete_delay: strategy.delete_delay.or(self.delete_delay),
            mount_path: strategy
                .mount_path
                .as_deref()
                .filter(|path| !path.is_empty())
                .or_else(|| self.mount_path.as_deref())
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// What to do with the torrents a strategy selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Remove the torrents (optionally reannouncing first).
    #[default]
    #[serde(alias = "delete")]
    Remove,
    /// Pause the torrents.
    Pause,
    /// Resume the torrents.
    Resume,
    /// Cap the upload rate of the torrents.
    Throttle,
}

impl Action {
    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remove => "remove",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Throttle => "throttle",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retirement rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Strategy {
    /// Name used in logs and reports.
    #[serde(default)]
    pub name: String,
    /// Structural filter applied before the rule.
    #[serde(default)]
    pub filter: Filters,
    /// Rule expression source.
    #[serde(rename = "remove")]
    pub remove_expr: String,
    /// Action applied to matches.
    #[serde(default)]
    pub action: Action,
    /// Override of [`Profile::reannounce`].
    #[serde(default)]
    pub reannounce: Option<bool>,
    /// Override of [`Profile::delete_files`].
    #[serde(default)]
    pub delete_files: Option<bool>,
    /// Override of [`Profile::delete_delay`].
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub delete_delay: Option<Duration>,
    /// Override of [`Profile::mount_path`].
    #[serde(default)]
    pub mount_path: Option<String>,
    /// Upload cap for the throttle action.
    #[serde(default)]
    pub limit: Option<RateLimit>,
    #[serde(skip)]
    compiled: OnceCell<CompiledRule>,
}

impl Strategy {
    /// Strategy named `name` with the given rule and defaults elsewhere.
    #[must_use]
    pub fn new(name: impl Into<String>, remove_expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter: Filters::default(),
            remove_expr: remove_expr.into(),
            action: Action::default(),
            reannounce: None,
            delete_files: None,
            delete_delay: None,
            mount_path: None,
            limit: None,
            compiled: OnceCell::new(),
        }
    }

    /// Compiled rule, compiling and caching it on first use.
    ///
    /// A failed compilation is not cached, so it is reported again on the
    /// next run.
    ///
    /// # Errors
    ///
    /// Returns the [`pruner_rules::CompileError`] of the rule source.
    pub fn rule(&self) -> CompileResult<&CompiledRule> {
        self.compiled
            .get_or_try_init(|| CompiledRule::compile(&self.remove_expr))
    }
}

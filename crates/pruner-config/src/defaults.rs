//! Default values for optional configuration sections.
//!
//! # Design
//! - Centralize defaults so serde attributes and docs stay consistent.

use std::time::Duration;

/// File name looked up next to the executable when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable that overrides the configuration path.
pub const CONFIG_ENV_VAR: &str = "PRUNER_CONFIG";

pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";
pub(crate) const DEFAULT_DAEMON_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub(crate) const fn enabled() -> bool {
    true
}

pub(crate) fn log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

pub(crate) const fn daemon_interval() -> Duration {
    DEFAULT_DAEMON_INTERVAL
}

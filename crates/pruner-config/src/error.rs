//! Error types for configuration loading and validation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The executable location needed for the default path is unavailable.
    #[error("failed to locate the running executable")]
    ExecutablePath {
        /// Source IO error.
        source: io::Error,
    },
    /// The document is not valid YAML or does not match the schema.
    #[error("failed to parse configuration from {origin}")]
    Parse {
        /// File path or `<inline>`.
        origin: String,
        /// Source YAML error.
        source: serde_yaml::Error,
    },
    /// A strategy was declared without a name.
    #[error("profiles[{profile}].strategy[{strategy}] needs a name")]
    MissingStrategyName {
        /// Profile index.
        profile: usize,
        /// Strategy index within the profile.
        strategy: usize,
    },
    /// A throttle strategy has no `limit`.
    #[error("strategy '{strategy}' uses the throttle action without a limit")]
    ThrottleWithoutLimit {
        /// Strategy name.
        strategy: String,
    },
    /// A profile references a client that is not configured.
    #[error("profiles[{profile}] references unknown client '{client}'")]
    UnknownClient {
        /// Profile index.
        profile: usize,
        /// Referenced client name.
        client: String,
    },
    /// The document configures no clients.
    #[error("no client is configured")]
    NoClients,
    /// The document configures no profiles.
    #[error("no profile is configured")]
    NoProfiles,
    /// Field contained an invalid value.
    #[error("invalid value for '{field}' in '{section}': {reason}")]
    InvalidField {
        /// Section that failed validation.
        section: String,
        /// Field that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

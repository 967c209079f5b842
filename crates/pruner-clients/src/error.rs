//! Failures raised while constructing adapters.
//!
//! Runtime failures use [`pruner_torrent_core::ClientError`]; this type only
//! covers turning a `clients:` entry into a working adapter.

use thiserror::Error;

/// An adapter could not be built from its configuration.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The `config:` map did not decode into the adapter settings.
    #[error("client {client}: invalid settings")]
    InvalidSettings {
        /// Name of the `clients:` entry.
        client: String,
        /// Underlying decode failure.
        #[source]
        source: serde_yaml::Error,
    },
    /// `host` was empty or not an absolute URL.
    #[error("client {client}: invalid host {host:?}: {reason}")]
    InvalidHost {
        /// Name of the `clients:` entry.
        client: String,
        /// Value as configured.
        host: String,
        /// Parser message.
        reason: String,
    },
    /// The HTTP client could not be constructed.
    #[error("client {client}: failed to build HTTP client")]
    Http {
        /// Name of the `clients:` entry.
        client: String,
        /// Underlying reqwest failure.
        #[source]
        source: reqwest::Error,
    },
    /// The declared `type` has no adapter.
    #[error("client {client}: unsupported client type {kind:?}")]
    Unsupported {
        /// Name of the `clients:` entry.
        client: String,
        /// Declared type.
        kind: String,
    },
}

/// Convenience alias for adapter construction results.
pub type AdapterResult<T> = Result<T, AdapterError>;

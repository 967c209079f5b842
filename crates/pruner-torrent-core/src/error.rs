//! Error types for torrent core services.
//!
//! # Design
//!
//! - Parsing failures (`StatusError`, `UnitError`) surface at configuration load.
//! - `ClientError` covers every back-end call; the core never distinguishes
//!   transient from permanent failures.

use std::error::Error;

use thiserror::Error;

/// A native status string did not map onto any known flag combination.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatusError {
    /// The value is not part of the recognised vocabulary.
    #[error("invalid torrent status: {value:?}")]
    InvalidStatus {
        /// Offending input.
        value: String,
    },
}

/// Byte-size, rate or duration strings that failed to parse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnitError {
    /// A byte quantity such as `10GiB` could not be parsed.
    #[error("invalid byte size {value:?}: {reason}")]
    InvalidBytes {
        /// Offending input.
        value: String,
        /// Short description of the failure.
        reason: &'static str,
    },
    /// A duration such as `1h30m` could not be parsed.
    #[error("invalid duration {value:?}: {reason}")]
    InvalidDuration {
        /// Offending input.
        value: String,
        /// Short description of the failure.
        reason: &'static str,
    },
}

/// Failure reported by a torrent client back-end.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connection, TLS, decoding of the HTTP body).
    #[error("{operation} request failed")]
    Request {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The back-end answered but refused the request.
    #[error("{operation} rejected by client (status {status}): {message}")]
    Rejected {
        /// Operation identifier.
        operation: &'static str,
        /// HTTP status code or RPC result code.
        status: u16,
        /// Message returned by the back-end.
        message: String,
    },
    /// The response could not be interpreted.
    #[error("{operation} returned an invalid response: {detail}")]
    InvalidResponse {
        /// Operation identifier.
        operation: &'static str,
        /// What was wrong with the payload.
        detail: String,
    },
    /// The caller cancelled the operation before it completed.
    #[error("{operation} cancelled")]
    Cancelled {
        /// Operation identifier.
        operation: &'static str,
    },
    /// The back-end does not implement the operation.
    #[error("{operation} not supported by this client")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
}

impl ClientError {
    /// Wrap an arbitrary transport error.
    pub fn request(operation: &'static str, source: impl Error + Send + Sync + 'static) -> Self {
        Self::Request {
            operation,
            source: Box::new(source),
        }
    }

    /// Operation that produced the error.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Request { operation, .. }
            | Self::Rejected { operation, .. }
            | Self::InvalidResponse { operation, .. }
            | Self::Cancelled { operation }
            | Self::Unsupported { operation } => operation,
        }
    }

    /// Whether the failure came from the cancellation signal.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Convenience alias for client operation results.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn client_error_messages_name_the_operation() {
        let cases = vec![
            (
                ClientError::request("get_torrents", io::Error::other("refused")),
                "get_torrents request failed",
            ),
            (
                ClientError::Rejected {
                    operation: "pause_torrents",
                    status: 403,
                    message: "Forbidden".into(),
                },
                "pause_torrents rejected by client (status 403): Forbidden",
            ),
            (
                ClientError::InvalidResponse {
                    operation: "free_space",
                    detail: "missing field".into(),
                },
                "free_space returned an invalid response: missing field",
            ),
            (
                ClientError::Cancelled {
                    operation: "remove_torrents",
                },
                "remove_torrents cancelled",
            ),
            (
                ClientError::Unsupported {
                    operation: "throttle_torrents",
                },
                "throttle_torrents not supported by this client",
            ),
        ];

        for (err, message) in cases {
            assert_eq!(err.to_string(), message);
        }
    }

    #[test]
    fn request_errors_keep_their_source() {
        let err = ClientError::request("session_stats", io::Error::other("reset"));
        assert_eq!(err.operation(), "session_stats");
        assert!(err.source().is_some());
        assert!(!err.is_cancelled());
        assert!(
            ClientError::Cancelled {
                operation: "resume_torrents"
            }
            .is_cancelled()
        );
    }
}

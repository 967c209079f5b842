//! # Design
//!
//! - `AppError` covers start-up failures; they end the process.
//! - `StrategyError` covers one strategy's run; it is logged and the run
//!   moves on to the next strategy.

use pruner_rules::{CompileError, EvaluationError};
use pruner_torrent_core::ClientError;
use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be located, read or validated.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: pruner_config::ConfigError,
    },
    /// The tracing subscriber could not be installed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: pruner_telemetry::TelemetryError,
    },
    /// None of the configured clients could be built.
    #[error("no usable client configured")]
    NoUsableClients {
        /// Number of `clients:` entries that were tried.
        configured: usize,
    },
    /// `--check` found rules that do not compile.
    #[error("rule check failed")]
    RuleCheck {
        /// Number of strategies whose rule failed to compile.
        failed: usize,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: pruner_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: pruner_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }
}

/// Failure of a single strategy within a run.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The strategy's rule did not compile.
    #[error("rule compilation failed")]
    Compile {
        /// Source compile error.
        #[from]
        source: CompileError,
    },
    /// The rule failed while evaluating against the torrent set.
    #[error("rule evaluation failed")]
    Evaluate {
        /// Source evaluation error.
        #[from]
        source: EvaluationError,
    },
    /// A client call failed.
    #[error("client call {operation} failed")]
    Client {
        /// Operation identifier.
        operation: &'static str,
        /// Source client error.
        source: ClientError,
    },
    /// A throttle strategy reached execution without a limit.
    #[error("throttle action has no limit")]
    MissingLimit,
}

impl StrategyError {
    pub(crate) const fn client(operation: &'static str, source: ClientError) -> Self {
        Self::Client { operation, source }
    }

    /// Short label of the stage that failed, used in reports.
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Compile { .. } => "compile",
            Self::Evaluate { .. } => "evaluate",
            Self::Client { operation, .. } => operation,
            Self::MissingLimit => "throttle",
        }
    }
}

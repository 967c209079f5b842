#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(
    dead_code,
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs
)]

//! YAML configuration surface: clients, profiles and strategies.
//!
//! Layout: `model.rs` (typed sections), `loader.rs` (file IO and path
//! resolution), `validate.rs` (cross-field checks and duration parsing),
//! `defaults.rs`, `error.rs`.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use defaults::{CONFIG_ENV_VAR, DEFAULT_CONFIG_FILE};
pub use error::{ConfigError, ConfigResult};
pub use loader::{default_config_path, from_yaml_str, load, resolve_config_path};
pub use model::{
    Action, ClientConfig, ClientKind, Config, CronExpr, DaemonSection, LogFormat, LogSection, Profile,
    Strategy, StrategySettings, TimingsSection,
};
pub use validate::validate;

//! Reading configuration documents from disk.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::defaults::DEFAULT_CONFIG_FILE;
use crate::error::{ConfigError, ConfigResult};
use crate::model::Config;
use crate::validate::validate;

/// Read, parse and validate the configuration at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read,
/// [`ConfigError::Parse`] for malformed YAML, and any validation failure.
pub fn load(path: &Path) -> ConfigResult<Config> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse(&text, &path.display().to_string())?;
    debug!(
        path = %path.display(),
        clients = config.clients.len(),
        profiles = config.profiles.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Parse and validate an in-memory document.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for malformed YAML and any validation failure.
pub fn from_yaml_str(text: &str) -> ConfigResult<Config> {
    parse(text, "<inline>")
}

fn parse(text: &str, origin: &str) -> ConfigResult<Config> {
    let config: Config = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    })?;
    validate(&config)?;
    Ok(config)
}

/// `config.yaml` in the directory of the running executable.
///
/// # Errors
///
/// Returns [`ConfigError::ExecutablePath`] when the executable cannot be located.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    let executable = env::current_exe().map_err(|source| ConfigError::ExecutablePath { source })?;
    Ok(executable
        .parent()
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), |dir| {
            dir.join(DEFAULT_CONFIG_FILE)
        }))
}

/// Use `explicit` when given, otherwise [`default_config_path`].
///
/// # Errors
///
/// See [`default_config_path`].
pub fn resolve_config_path(explicit: Option<&Path>) -> ConfigResult<PathBuf> {
    explicit.map_or_else(default_config_path, |path| Ok(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let resolved = resolve_config_path(Some(Path::new("/etc/pruner.yaml"))).unwrap();
        assert_eq!(resolved, PathBuf::from("/etc/pruner.yaml"));
    }

    #[test]
    fn default_path_sits_next_to_the_executable() {
        let resolved = resolve_config_path(None).unwrap();
        assert_eq!(
            resolved.file_name().and_then(|name| name.to_str()),
            Some(DEFAULT_CONFIG_FILE)
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load(Path::new("/nonexistent/pruner/config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

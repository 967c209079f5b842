//! Validation helpers and parsing utilities for configuration documents.

use std::fmt;
use std::time::Duration;

use pruner_torrent_core::parse_duration;
use serde::Deserializer;
use serde::de::{self, Visitor};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{Action, Config};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Check cross-field constraints serde cannot express.
///
/// # Errors
///
/// Returns the first [`ConfigError`] found, in document order.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_log_level(&config.log.level)?;

    if config.daemon.enabled && config.daemon.cron_exp.is_none() && config.daemon.interval.is_zero() {
        return Err(ConfigError::InvalidField {
            section: "daemon".to_string(),
            field: "interval",
            value: Some("0s".to_string()),
            reason: "must be greater than zero",
        });
    }

    if config.clients.is_empty() {
        return Err(ConfigError::NoClients);
    }
    if config.profiles.is_empty() {
        return Err(ConfigError::NoProfiles);
    }

    for (index, profile) in config.profiles.iter().enumerate() {
        if !config.clients.contains_key(&profile.client) {
            return Err(ConfigError::UnknownClient {
                profile: index,
                client: profile.client.clone(),
            });
        }
        for (position, strategy) in profile.strategy.iter().enumerate() {
            if strategy.name.trim().is_empty() {
                return Err(ConfigError::MissingStrategyName {
                    profile: index,
                    strategy: position,
                });
            }
            if strategy.action == Action::Throttle && strategy.limit.is_none() {
                return Err(ConfigError::ThrottleWithoutLimit {
                    strategy: strategy.name.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_log_level(level: &str) -> ConfigResult<()> {
    if LOG_LEVELS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(level.trim()))
    {
        Ok(())
    } else {
        Err(ConfigError::InvalidField {
            section: "log".to_string(),
            field: "level",
            value: Some(level.to_string()),
            reason: "must be one of trace, debug, info, warn, error",
        })
    }
}

struct DurationVisitor;

impl Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number of seconds or a duration string such as `90s` or `2h`")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
        Ok(Duration::from_secs(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
        u64::try_from(value)
            .map(Duration::from_secs)
            .map_err(|_| E::custom("duration must not be negative"))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
        parse_duration(value)
            .map_err(E::custom)?
            .to_std()
            .map_err(|_| E::custom("duration must not be negative"))
    }
}

/// Deserialize seconds or a duration string into a [`Duration`].
pub(crate) fn deserialize_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Duration, D::Error> {
    deserializer.deserialize_any(DurationVisitor)
}

/// Like [`deserialize_duration`], mapping a null or zero delay to `None`.
pub(crate) fn deserialize_optional_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    struct OptionalVisitor;

    impl<'de> Visitor<'de> for OptionalVisitor {
        type Value = Option<Duration>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            DurationVisitor.expecting(f)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(
            self,
            deserializer: D,
        ) -> Result<Self::Value, D::Error> {
            deserialize_optional_duration(deserializer)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            DurationVisitor.visit_u64(value).map(non_zero)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            DurationVisitor.visit_i64(value).map(non_zero)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            DurationVisitor.visit_str(value).map(non_zero)
        }
    }

    deserializer.deserialize_any(OptionalVisitor)
}

fn non_zero(value: Duration) -> Option<Duration> {
    (!value.is_zero()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Durations {
        #[serde(deserialize_with = "deserialize_duration")]
        wait: Duration,
        #[serde(default, deserialize_with = "deserialize_optional_duration")]
        delay: Option<Duration>,
    }

    fn durations(yaml: &str) -> Result<Durations, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn durations_accept_seconds_and_strings() {
        let parsed = durations("wait: 90\ndelay: 1m30s").unwrap();
        assert_eq!(parsed.wait, Duration::from_secs(90));
        assert_eq!(parsed.delay, Some(Duration::from_secs(90)));

        let parsed = durations("wait: 2h").unwrap();
        assert_eq!(parsed.wait, Duration::from_secs(7_200));
        assert_eq!(parsed.delay, None);
    }

    #[test]
    fn zero_or_null_delay_means_unset() {
        assert_eq!(durations("wait: 1s\ndelay: 0").unwrap().delay, None);
        assert_eq!(durations("wait: 1s\ndelay: ~").unwrap().delay, None);
    }

    #[test]
    fn negative_or_malformed_durations_are_rejected() {
        assert!(durations("wait: -5").is_err());
        assert!(durations("wait: -5s").is_err());
        assert!(durations("wait: soon").is_err());
    }

    #[test]
    fn log_levels_are_checked() {
        assert!(validate_log_level("INFO").is_ok());
        assert!(matches!(
            validate_log_level("loud"),
            Err(ConfigError::InvalidField { field: "level", .. })
        ));
    }
}

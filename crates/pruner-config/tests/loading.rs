use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use pruner_config::{Action, ClientKind, ConfigError, LogFormat, from_yaml_str, load};
use pruner_torrent_core::{Bytes, ProtocolTimings, RateLimit, Status};

const FULL: &str = r#"
log:
  enabled: true
  level: debug
  format: json
daemon:
  enabled: true
  interval: 15m
  run_on_start: false
timings:
  pause_wait: 1s
  resume_wait: 3s
clients:
  qb:
    type: qbittorrent
    config:
      host: http://127.0.0.1:8080
      username: admin
      password: secret
  old:
    type: deluge
    config:
      host: 127.0.0.1
profiles:
  - client: qb
    reannounce: true
    delete_files: true
    delete_delay: 10
    mount_path: /downloads
    strategy:
      - name: stale movies
        filter:
          categories: Movies
          excluded_status: [pausedUP, error]
          disk: 50GB
        remove: 'filter(torrents, .seeding_time > duration("168h"))'
      - name: cap uploads
        action: throttle
        limit: 1MiB
        reannounce: false
        remove: filter(torrents, .ratio > 5)
      - name: pause idle
        action: pause
        delete_delay: 1m
        remove: 'filter(torrents, now() - .last_activity > duration("24h"))'
"#;

#[test]
fn full_document_round_trips_into_typed_sections() -> Result<()> {
    let config = from_yaml_str(FULL)?;

    assert_eq!(config.log.level, "debug");
    assert_eq!(config.log.format, LogFormat::Json);
    assert_eq!(config.daemon.interval, Duration::from_secs(900));
    assert!(!config.daemon.run_on_start);

    let timings = config.timings.protocol();
    assert_eq!(timings.pause_wait, Duration::from_secs(1));
    assert_eq!(timings.resume_wait, Duration::from_secs(3));
    assert_eq!(timings.reannounce_wait, Duration::from_secs(4));

    assert_eq!(config.clients["qb"].client_kind(), ClientKind::QBittorrent);
    assert_eq!(
        config.clients["old"].client_kind(),
        ClientKind::Deluge { v2: false }
    );

    let profile = &config.profiles[0];
    assert_eq!(profile.delete_delay, Some(Duration::from_secs(10)));
    let [stale, cap, pause] = profile.strategy.as_slice() else {
        anyhow::bail!("expected three strategies");
    };

    assert_eq!(stale.action, Action::Remove);
    assert_eq!(stale.filter.categories, ["Movies"]);
    assert_eq!(
        stale.filter.excluded_status,
        [Status::PAUSED | Status::UPLOADING, Status::ERROR]
    );
    assert_eq!(stale.filter.disk, Bytes(50_000_000_000));
    let settings = profile.settings_for(stale);
    assert!(settings.reannounce && settings.delete_files);
    assert_eq!(settings.mount_path, "/downloads");

    assert_eq!(cap.action, Action::Throttle);
    assert_eq!(cap.limit, Some(RateLimit::BytesPerSecond(1_048_576)));
    assert!(!profile.settings_for(cap).reannounce);

    assert_eq!(pause.action, Action::Pause);
    assert_eq!(
        profile.settings_for(pause).delete_delay,
        Some(Duration::from_secs(60))
    );

    for strategy in &profile.strategy {
        strategy.rule()?;
    }
    Ok(())
}

#[test]
fn loads_from_a_file() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(FULL.as_bytes())?;
    let config = load(file.path())?;
    assert_eq!(config.profiles.len(), 1);
    Ok(())
}

#[test]
fn defaults_fill_omitted_sections() -> Result<()> {
    let config = from_yaml_str(
        "clients: { tr: { type: transmission } }\nprofiles: [ { client: tr, strategy: [] } ]\n",
    )?;
    assert!(config.log.enabled);
    assert_eq!(config.log.level, "info");
    assert_eq!(config.log.format, LogFormat::Pretty);
    assert!(config.daemon.enabled);
    assert_eq!(config.daemon.interval, Duration::from_secs(600));
    assert_eq!(config.timings.protocol(), ProtocolTimings::default());
    Ok(())
}

#[test]
fn delete_is_an_alias_of_remove() -> Result<()> {
    let config = from_yaml_str(
        "clients: { qb: { type: qbittorrent } }\nprofiles:\n  - client: qb\n    strategy:\n      - { name: a, action: delete, remove: torrents }\n",
    )?;
    assert_eq!(config.profiles[0].strategy[0].action, Action::Remove);
    Ok(())
}

#[test]
fn validation_failures_are_reported() {
    let cases: [(&str, fn(&ConfigError) -> bool); 6] = [
        (
            "clients: { qb: { type: qbittorrent } }\nprofiles: [ { client: qb, strategy: [ { remove: torrents } ] } ]",
            |err| {
                matches!(
                    err,
                    ConfigError::MissingStrategyName {
                        profile: 0,
                        strategy: 0
                    }
                )
            },
        ),
        (
            "clients: { qb: { type: qbittorrent } }\nprofiles: [ { client: qb, strategy: [ { name: t, action: throttle, remove: torrents } ] } ]",
            |err| matches!(err, ConfigError::ThrottleWithoutLimit { .. }),
        ),
        (
            "clients: { qb: { type: qbittorrent } }\nprofiles: [ { client: tr } ]",
            |err| matches!(err, ConfigError::UnknownClient { profile: 0, .. }),
        ),
        (
            "profiles: [ { client: tr } ]",
            |err| matches!(err, ConfigError::NoClients),
        ),
        (
            "clients: { qb: { type: qbittorrent } }",
            |err| matches!(err, ConfigError::NoProfiles),
        ),
        (
            "clients: { qb: { type: qbittorrent } }\nprofiles: [ { client: qb, strategy: [ { name: s, remove: torrents, filter: { status: sleeping } } ] } ]",
            |err| matches!(err, ConfigError::Parse { .. }),
        ),
    ];

    for (yaml, check) in cases {
        let err = from_yaml_str(yaml).unwrap_err();
        assert!(check(&err), "{yaml}: {err:?}");
    }
}

#[test]
fn unknown_keys_are_rejected() {
    let err = from_yaml_str(
        "clients: { qb: { type: qbittorrent } }\nprofiles: [ { client: qb, strategy: [ { name: s, remove: torrents, actoin: pause } ] } ]",
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn cron_schedules_are_parsed_at_load() -> Result<()> {
    let config = from_yaml_str(
        "daemon: { cronexp: '0 */15 * * * *', interval: 0 }\nclients: { qb: { type: qbittorrent } }\nprofiles: [ { client: qb } ]\n",
    )?;
    let cron = config
        .daemon
        .cron_exp
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("cron_exp missing"))?;
    assert_eq!(cron.as_str(), "0 */15 * * * *");

    let err = from_yaml_str(
        "daemon: { cron_exp: '*/15 * * * *' }\nclients: { qb: { type: qbittorrent } }\nprofiles: [ { client: qb } ]\n",
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "{err:?}");
    Ok(())
}

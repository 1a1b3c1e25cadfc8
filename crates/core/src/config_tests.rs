// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn minimal_config_uses_defaults() {
    let config = WardenConfig::from_toml_str(
        r#"
        [node]
        data_dir = "/var/lib/warden"
        "#,
    )
    .unwrap();

    assert_eq!(config.node.ha_policy, HaPolicy::Primary);
    assert!(config.node.allow_failback);
    assert_eq!(config.node.domain, Domain::live());
    assert_eq!(
        config.node.identity_path(),
        PathBuf::from("/var/lib/warden/node.id")
    );
    assert_eq!(config.lease.retry_interval, Duration::from_secs(1));
    assert_eq!(config.lease.expiry, Duration::from_secs(10));
    assert!(matches!(config.store, StoreConfig::Memory));
}

#[test]
fn full_config_parses_humantime_durations() {
    let config = WardenConfig::from_toml_str(
        r#"
        [node]
        data_dir = "/data"
        identity_file = "server.id"
        ha_policy = "backup"
        allow_failback = false
        domain = "pair-1"

        [lease]
        retry_interval = "250ms"
        renew_interval = "500ms"
        store_timeout = "200ms"
        expiry = "3s"
        retry_log_every = 4

        [store]
        kind = "sqlite"
        path = "/data/locks.db"
        table = "HA_LOCKS"
        busy_timeout = "1s"
        "#,
    )
    .unwrap();

    assert_eq!(config.node.ha_policy, HaPolicy::Backup);
    assert!(!config.node.allow_failback);
    assert_eq!(config.node.domain.as_str(), "pair-1");
    assert_eq!(config.lease.retry_interval, Duration::from_millis(250));
    assert_eq!(config.lease.store_timeout, Duration::from_millis(200));
    assert_eq!(config.lease.retry_log_every, 4);
    let StoreConfig::Sqlite(sqlite) = config.store else {
        panic!("expected sqlite store");
    };
    assert_eq!(sqlite.table, "HA_LOCKS");
    assert_eq!(sqlite.busy_timeout, Duration::from_secs(1));
    assert!(sqlite.create_table);
}

#[parameterized(
    renew_not_shorter_than_expiry = { "renew_interval = \"10s\"\nexpiry = \"10s\"" },
    timeout_longer_than_renew = { "store_timeout = \"3s\"\nrenew_interval = \"2s\"" },
    zero_retry = { "retry_interval = \"0s\"" },
    zero_log_every = { "retry_log_every = 0" },
    renewal_can_outlive_expiry = { "renew_interval = \"6s\"\nstore_timeout = \"5s\"\nexpiry = \"10s\"" },
    renewal_inside_margin = { "renew_interval = \"5s\"\nstore_timeout = \"3s\"\nexpiry = \"10s\"" },
)]
fn invalid_lease_timing_is_rejected(lease: &str) {
    let text = format!("[node]\ndata_dir = \"/d\"\n\n[lease]\n{lease}\n");
    let err = WardenConfig::from_toml_str(&text).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
}

#[test]
fn hold_window_leaves_a_margin_before_expiry() {
    let lease = LeaseSettings::default().with_expiry(Duration::from_secs(10));
    assert_eq!(lease.hold_window(), Duration::from_secs(8));

    let tight = lease
        .with_renew_interval(Duration::from_secs(4))
        .with_store_timeout(Duration::from_millis(3999));
    assert!(tight.validate().is_ok());
    assert!(tight.with_store_timeout(Duration::from_secs(4)).validate().is_err());
}

#[test]
fn unknown_store_kind_is_a_parse_error() {
    let err = WardenConfig::from_toml_str(
        "[node]\ndata_dir = \"/d\"\n\n[store]\nkind = \"oracle\"\n",
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn load_resolves_relative_paths_against_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warden.toml");
    std::fs::write(
        &path,
        "[node]\ndata_dir = \"data\"\n\n[store]\nkind = \"sqlite\"\npath = \"locks.db\"\n",
    )
    .unwrap();

    let config = WardenConfig::load(&path).unwrap();

    assert_eq!(config.node.data_dir, dir.path().join("data"));
    let StoreConfig::Sqlite(sqlite) = config.store else {
        panic!("expected sqlite store");
    };
    assert_eq!(sqlite.path, dir.path().join("locks.db"));
}

#[test]
fn load_missing_file_reports_path() {
    let err = WardenConfig::load(Path::new("/nonexistent/warden.toml")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/warden.toml"));
}

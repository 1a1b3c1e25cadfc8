//! Configuration error specs
//!
//! Bad configuration is reported with a suggestion and a non-zero exit.

use crate::prelude::*;

#[test]
fn missing_config_suggests_flag() {
    let project = Project::empty();

    project
        .wardenctl()
        .args(&["node-id"])
        .fails()
        .stderr_has("Cannot use configuration 'warden.toml'")
        .stderr_has("wardenctl --config");
}

#[test]
fn renew_interval_must_be_below_expiry() {
    let project = Project::with_config(
        r#"
[node]
data_dir = "data"

[lease]
renew_interval = "10s"
expiry = "5s"
"#,
    );

    project
        .wardenctl()
        .args(&["status"])
        .fails()
        .stderr_has("renew_interval");
}

#[test]
fn unknown_store_kind_is_rejected() {
    let project = Project::with_config(
        r#"
[node]
data_dir = "data"

[store]
kind = "zookeeper"
"#,
    );

    project
        .wardenctl()
        .args(&["status"])
        .fails()
        .stderr_has("Cannot use configuration");
}

#[test]
fn unsafe_table_name_is_rejected() {
    let project = Project::with_config(
        r#"
[node]
data_dir = "data"

[store]
kind = "sqlite"
path = "locks.db"
table = "locks; DROP TABLE x"
"#,
    );

    project
        .wardenctl()
        .args(&["status"])
        .fails()
        .stderr_has("invalid lock table name");
}

#[test]
fn explicit_config_path_is_used() {
    let project = Project::empty();
    project.file("conf/node-a.toml", MEMORY_CONFIG);

    project
        .wardenctl()
        .args(&["--config", "conf/node-a.toml", "node-id"])
        .passes();

    // data_dir resolves against the config file's directory
    assert!(project.join("conf/data/node.id").exists());
}

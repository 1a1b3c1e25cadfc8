//! Status specs

use crate::prelude::*;

#[test]
fn status_before_first_run_has_no_node_or_holder() {
    let project = Project::with_config(MEMORY_CONFIG);

    project
        .wardenctl()
        .args(&["status"])
        .passes()
        .stdout_eq("domain:  live\nnode:    -\nholder:  none\n");

    // Reporting never mints an identity
    assert!(!project.join("data/node.id").exists());
}

#[test]
fn status_json_reports_identity() {
    let project = Project::with_config(SQLITE_CONFIG);
    let id = project.wardenctl().args(&["node-id"]).passes().stdout();

    let stdout = project
        .wardenctl()
        .args(&["status", "--output", "json"])
        .passes()
        .stdout();
    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    assert_eq!(status["domain"], "live");
    assert_eq!(status["node_id"], id.trim());
    assert!(status["lock"].is_null());
}

#[test]
fn status_uses_configured_domain() {
    let project = Project::with_config(
        r#"
[node]
data_dir = "data"
domain = "orders-live"
"#,
    );

    project
        .wardenctl()
        .args(&["status"])
        .passes()
        .stdout_has("domain:  orders-live");
}

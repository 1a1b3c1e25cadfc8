//! Node identity specs
//!
//! The identity is created once and survives restarts.

use crate::prelude::*;

#[test]
fn node_id_is_created_and_stable() {
    let project = Project::with_config(MEMORY_CONFIG);

    let first = project.wardenctl().args(&["node-id"]).passes().stdout();
    let second = project.wardenctl().args(&["node-id"]).passes().stdout();

    assert!(!first.trim().is_empty());
    assert_eq!(first, second);
    assert_eq!(project.read("data/node.id").trim(), first.trim());
}

#[test]
fn existing_identity_is_reused() {
    let project = Project::with_config(MEMORY_CONFIG);
    project.file("data/node.id", "broker-a\n");

    project
        .wardenctl()
        .args(&["node-id"])
        .passes()
        .stdout_eq("broker-a\n");
}

#[test]
fn corrupt_identity_is_not_replaced() {
    let project = Project::with_config(MEMORY_CONFIG);
    project.file("data/node.id", "   \n");

    project
        .wardenctl()
        .args(&["node-id"])
        .fails()
        .stderr_has("empty or corrupt");

    assert_eq!(project.read("data/node.id"), "   \n");
}

//! Release specs

use crate::prelude::*;

#[test]
fn release_without_record_is_a_no_op() {
    let project = Project::with_config(SQLITE_CONFIG);
    project.wardenctl().args(&["node-id"]).passes();

    project
        .wardenctl()
        .args(&["release"])
        .passes()
        .stdout_has("No lock record for 'live'");
}

#[test]
fn release_needs_an_identity_or_holder() {
    let project = Project::with_config(SQLITE_CONFIG);

    project
        .wardenctl()
        .args(&["release"])
        .fails()
        .stderr_has("node identity");
}

#[test]
fn release_for_named_holder_without_record() {
    let project = Project::with_config(SQLITE_CONFIG);

    project
        .wardenctl()
        .args(&["release", "--holder", "broker-a"])
        .passes()
        .stdout_has("No lock record");
}

//! Help and version specs

use crate::prelude::*;

#[test]
fn help_lists_commands() {
    let project = Project::empty();

    project
        .wardenctl()
        .args(&["--help"])
        .passes()
        .stdout_has("run")
        .stdout_has("status")
        .stdout_has("node-id")
        .stdout_has("release");
}

#[test]
fn run_help_shows_policy_override() {
    let project = Project::empty();

    project
        .wardenctl()
        .args(&["run", "--help"])
        .passes()
        .stdout_has("--policy")
        .stdout_has("--no-failback");
}

#[test]
fn version_is_printed() {
    let project = Project::empty();

    project
        .wardenctl()
        .args(&["--version"])
        .passes()
        .stdout_has("wardenctl");
}

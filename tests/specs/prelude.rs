//! Shared helpers for CLI specs
//!
//! A `Project` is a scratch directory holding a `warden.toml`; commands run
//! with it as the working directory so the default `--config` applies.

#![allow(dead_code)]

use assert_cmd::assert::Assert;
use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Config using the in-process store, so every command sees an empty table
pub const MEMORY_CONFIG: &str = r#"
[node]
data_dir = "data"
"#;

/// Config sharing a SQLite lock table next to the config file
pub const SQLITE_CONFIG: &str = r#"
[node]
data_dir = "data"

[lease]
expiry = "1s"
renew_interval = "200ms"
store_timeout = "200ms"

[store]
kind = "sqlite"
path = "locks.db"
"#;

pub struct Project {
    dir: TempDir,
}

impl Project {
    /// Scratch directory with no files
    pub fn empty() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Scratch directory with a `warden.toml`
    pub fn with_config(config: &str) -> Self {
        let project = Self::empty();
        project.file("warden.toml", config);
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn file(&self, rel: &str, contents: &str) {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.join(rel)).unwrap()
    }

    pub fn wardenctl(&self) -> Cli {
        let mut cmd = Command::cargo_bin("wardenctl").unwrap();
        cmd.current_dir(self.path()).env("RUST_LOG", "warn");
        Cli { cmd }
    }
}

pub struct Cli {
    cmd: Command,
}

impl Cli {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn passes(mut self) -> Run {
        Run {
            assert: self.cmd.assert().success(),
        }
    }

    pub fn fails(mut self) -> Run {
        Run {
            assert: self.cmd.assert().failure(),
        }
    }
}

pub struct Run {
    assert: Assert,
}

impl Run {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.assert.get_output().stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.assert.get_output().stderr).into_owned()
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(
            stdout.contains(expected),
            "stdout missing {expected:?}:\n{stdout}"
        );
        self
    }

    pub fn stdout_eq(self, expected: &str) -> Self {
        similar_asserts::assert_eq!(self.stdout(), expected);
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(
            stderr.contains(expected),
            "stderr missing {expected:?}:\n{stderr}"
        );
        self
    }
}

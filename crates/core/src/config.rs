// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node manager configuration
//!
//! Loaded from TOML. Durations use humantime notation (`"500ms"`, `"2s"`).

use crate::store::Domain;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WardenConfig {
    pub node: NodeSettings,
    #[serde(default)]
    pub lease: LeaseSettings,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Which role a node takes when it starts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HaPolicy {
    /// Contend for the live lease at startup
    #[default]
    Primary,
    /// Wait as a standby until the live lease becomes available
    Backup,
}

/// Per-node settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Directory holding the node identity file
    pub data_dir: PathBuf,
    #[serde(default = "default_identity_file")]
    pub identity_file: String,
    #[serde(default)]
    pub ha_policy: HaPolicy,
    /// Whether a returning primary may reclaim the live role
    #[serde(default = "default_true")]
    pub allow_failback: bool,
    #[serde(default)]
    pub domain: Domain,
}

impl NodeSettings {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            identity_file: default_identity_file(),
            ha_policy: HaPolicy::default(),
            allow_failback: true,
            domain: Domain::live(),
        }
    }

    pub fn with_ha_policy(mut self, policy: HaPolicy) -> Self {
        self.ha_policy = policy;
        self
    }

    pub fn with_allow_failback(mut self, allow: bool) -> Self {
        self.allow_failback = allow;
        self
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    /// Full path of the identity file
    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join(&self.identity_file)
    }
}

/// Lease timing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeaseSettings {
    /// Pause between failed acquisition attempts
    #[serde(with = "humantime_serde", default = "default_retry_interval")]
    pub retry_interval: Duration,
    /// How often the holder renews its record
    #[serde(with = "humantime_serde", default = "default_renew_interval")]
    pub renew_interval: Duration,
    /// Upper bound on a single store call made while holding the lease
    #[serde(with = "humantime_serde", default = "default_store_timeout")]
    pub store_timeout: Duration,
    /// How long an unrenewed record stays valid before takeover
    #[serde(with = "humantime_serde", default = "default_expiry")]
    pub expiry: Duration,
    /// Log a "still retrying" notice every this many failed attempts
    #[serde(default = "default_retry_log_every")]
    pub retry_log_every: u32,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            retry_interval: default_retry_interval(),
            renew_interval: default_renew_interval(),
            store_timeout: default_store_timeout(),
            expiry: default_expiry(),
            retry_log_every: default_retry_log_every(),
        }
    }
}

impl LeaseSettings {
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_renew_interval(mut self, interval: Duration) -> Self {
        self.renew_interval = interval;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_interval.is_zero() || self.renew_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "retry_interval and renew_interval must be non-zero".into(),
            ));
        }
        if self.store_timeout.is_zero() || self.store_timeout > self.renew_interval {
            return Err(ConfigError::Invalid(format!(
                "store_timeout ({:?}) must be non-zero and no longer than renew_interval ({:?})",
                self.store_timeout, self.renew_interval
            )));
        }
        if self.retry_log_every == 0 {
            return Err(ConfigError::Invalid("retry_log_every must be at least 1".into()));
        }
        if self.renew_interval >= self.expiry {
            return Err(ConfigError::Invalid(format!(
                "renew_interval ({:?}) must be shorter than expiry ({:?})",
                self.renew_interval, self.expiry
            )));
        }
        let worst_case = self.renew_interval + self.store_timeout;
        if worst_case >= self.hold_window() {
            return Err(ConfigError::Invalid(format!(
                "renew_interval plus store_timeout ({:?}) must be shorter than {:?}, \
                 four fifths of expiry ({:?})",
                worst_case,
                self.hold_window(),
                self.expiry
            )));
        }
        Ok(())
    }

    /// How long a holder may go without confirming its record before it
    /// must consider the lease lost. Shorter than `expiry`, so the holder
    /// steps down before anyone else may take the record over.
    pub fn hold_window(&self) -> Duration {
        self.expiry - self.expiry / 5
    }
}

/// Which lock store backs the node manager
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local store, only useful for single-process setups and tests
    #[default]
    Memory,
    /// Relational lock table in a SQLite database file
    Sqlite(SqliteSettings),
}

/// Connection parameters for the SQLite store
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqliteSettings {
    pub path: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
    /// How long a connection waits on a locked database before failing
    #[serde(with = "humantime_serde", default = "default_busy_timeout")]
    pub busy_timeout: Duration,
    #[serde(default = "default_true")]
    pub create_table: bool,
}

impl SqliteSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: default_table(),
            busy_timeout: default_busy_timeout(),
            create_table: true,
        }
    }
}

impl WardenConfig {
    pub fn new(node: NodeSettings) -> Self {
        Self {
            node,
            lease: LeaseSettings::default(),
            store: StoreConfig::default(),
        }
    }

    /// Load and validate a configuration file.
    ///
    /// A relative `data_dir` or sqlite `path` is resolved against the
    /// directory containing the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lease.validate()?;
        if self.node.domain.as_str().is_empty() {
            return Err(ConfigError::Invalid("node.domain must not be empty".into()));
        }
        if self.node.identity_file.is_empty() {
            return Err(ConfigError::Invalid(
                "node.identity_file must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        if self.node.data_dir.is_relative() {
            self.node.data_dir = base.join(&self.node.data_dir);
        }
        if let StoreConfig::Sqlite(sqlite) = &mut self.store {
            if sqlite.path.is_relative() {
                sqlite.path = base.join(&sqlite.path);
            }
        }
    }
}

fn default_identity_file() -> String {
    "node.id".to_string()
}

fn default_true() -> bool {
    true
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_renew_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_expiry() -> Duration {
    Duration::from_secs(10)
}

fn default_retry_log_every() -> u32 {
    10
}

fn default_table() -> String {
    "NODE_MANAGER_STORE".to_string()
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

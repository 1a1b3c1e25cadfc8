// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node identity generation and persistence
//!
//! A node's identity is generated once, written next to its data, and read
//! back on every start. Lock records are keyed on it, so a restarted node is
//! recognised as the same holder regardless of its network address.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Persistent identifier of a broker instance
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generates unique identifiers
pub trait IdGen: Send + Sync {
    fn next(&self) -> String;
}

/// UUID-based ID generator for production use
#[derive(Clone, Debug, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Sequential ID generator for testing
#[derive(Clone, Debug)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialIdGen {
    fn default() -> Self {
        Self::new("node")
    }
}

impl IdGen for SequentialIdGen {
    fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

/// Errors from reading or writing the identity file
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to access node identity at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("node identity file {0} is empty or corrupt")]
    Corrupt(PathBuf),
}

/// Read the identity stored at `path`, creating it with `id_gen` on first run.
///
/// An existing but unreadable or empty file is an error rather than a reason
/// to mint a new identity: a fresh id would make the node a stranger to the
/// lock it may still hold.
pub fn load_or_create(path: &Path, id_gen: &dyn IdGen) -> Result<NodeId, IdentityError> {
    match fs::read_to_string(path) {
        Ok(contents) => parse(path, &contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let id = NodeId::new(id_gen.next());
            write_atomic(path, &id)?;
            tracing::info!(node_id = %id, path = %path.display(), "generated new node identity");
            Ok(id)
        }
        Err(source) => Err(IdentityError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Read an identity that must already exist
pub fn load(path: &Path) -> Result<NodeId, IdentityError> {
    let contents = fs::read_to_string(path).map_err(|source| IdentityError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(path, &contents)
}

fn parse(path: &Path, contents: &str) -> Result<NodeId, IdentityError> {
    let id = contents.trim();
    if id.is_empty() || id.chars().any(char::is_whitespace) {
        return Err(IdentityError::Corrupt(path.to_path_buf()));
    }
    Ok(NodeId::new(id))
}

fn write_atomic(path: &Path, id: &NodeId) -> Result<(), IdentityError> {
    let io_err = |source| IdentityError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        writeln!(file, "{}", id).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&tmp, path).map_err(io_err)
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;

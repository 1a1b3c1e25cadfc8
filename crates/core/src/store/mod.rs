// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock store contract
//!
//! A lock store is the shared substrate cooperating nodes use for mutual
//! exclusion. It holds at most one [`LockRecord`] per [`Domain`] and exposes
//! only atomic conditional operations on it. Exclusivity decisions go through
//! [`LockSession::try_acquire`] and [`LockSession::renew`]; [`LockSession::read`]
//! is for status reporting.

mod memory;

pub use memory::{MemoryLockStore, StoreCall};

use crate::clock::elapsed_since;
use crate::identity::NodeId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Name of the role protected by a lock record (e.g. `live`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(pub String);

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The default domain guarding the live role
    pub fn live() -> Self {
        Self::new("live")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::live()
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current ownership of a domain as stored in the lock store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub domain: Domain,
    pub holder: NodeId,
    pub acquired_at: DateTime<Utc>,
    pub renewed_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn is_held_by(&self, holder: &NodeId) -> bool {
        &self.holder == holder
    }

    /// True once the holder has gone longer than `expiry` without renewing
    pub fn is_expired(&self, now: DateTime<Utc>, expiry: Duration) -> bool {
        elapsed_since(now, self.renewed_at) > expiry
    }
}

/// Errors from lock store operations
///
/// None of these mean "acquired" or "renewed". Callers treat every error as
/// a failed attempt.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lock store unavailable: {0}")]
    Unavailable(String),
    #[error("lock store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("lock store backend error: {0}")]
    Backend(String),
    #[error("invalid lock store configuration: {0}")]
    Config(String),
}

/// A shared lock store that hands out independent sessions
pub trait LockStore: Send + Sync + 'static {
    /// Open a new session with its own connection to the store.
    ///
    /// Sessions connect lazily; the first operation opens the connection.
    fn session(&self) -> Box<dyn LockSession>;

    /// How long a record may go unrenewed before another holder may take it over
    fn lease_expiry(&self) -> Duration;

    /// The store's notion of the current time
    fn now(&self) -> DateTime<Utc>;

    /// Whether `record` still protects its domain
    fn is_current(&self, record: &LockRecord) -> bool {
        !record.is_expired(self.now(), self.lease_expiry())
    }
}

/// One connection to a lock store
///
/// Methods take `&mut self`, so calls on a session are strictly sequential.
#[async_trait]
pub trait LockSession: Send + 'static {
    /// Create the record for `domain` owned by `holder`.
    ///
    /// Succeeds when no record exists, when the existing record has expired,
    /// or when `holder` already owns it. Returns `Ok(false)` when another
    /// holder owns an unexpired record.
    async fn try_acquire(&mut self, domain: &Domain, holder: &NodeId) -> Result<bool, StoreError>;

    /// Refresh `renewed_at` if `holder` still owns the record.
    ///
    /// `Ok(false)` means the record is gone or owned by someone else.
    async fn renew(&mut self, domain: &Domain, holder: &NodeId) -> Result<bool, StoreError>;

    /// Remove the record if `holder` owns it; a no-op otherwise
    async fn release(&mut self, domain: &Domain, holder: &NodeId) -> Result<(), StoreError>;

    /// Current record for `domain`, for diagnostics only
    async fn read(&mut self, domain: &Domain) -> Result<Option<LockRecord>, StoreError>;

    /// Drop the underlying connection; the next call reconnects
    fn reset(&mut self);
}

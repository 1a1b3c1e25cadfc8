// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock table in a SQLite database
//!
//! Every node manager sharing the database file contends on one row per
//! domain. Acquisition is a single conditional upsert, so the database's own
//! write lock arbitrates between contenders:
//!
//! ```text
//! CREATE TABLE NODE_MANAGER_STORE (
//!     domain      TEXT PRIMARY KEY,
//!     holder      TEXT NOT NULL,
//!     acquired_at INTEGER NOT NULL,  -- unix millis
//!     renewed_at  INTEGER NOT NULL   -- unix millis
//! )
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use warden_core::{
    Clock, Domain, LockRecord, LockSession, LockStore, NodeId, SqliteSettings, StoreError,
    SystemClock,
};

/// SQL for one lock table
struct Statements {
    create: String,
    acquire: String,
    renew: String,
    release: String,
    read: String,
}

impl Statements {
    fn for_table(table: &str) -> Result<Self, StoreError> {
        let valid = table
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(StoreError::Config(format!("invalid lock table name {table:?}")));
        }

        Ok(Self {
            create: format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    domain TEXT PRIMARY KEY,
                    holder TEXT NOT NULL,
                    acquired_at INTEGER NOT NULL,
                    renewed_at INTEGER NOT NULL
                )"
            ),
            // Insert, re-acquire our own row, or take over an expired one
            acquire: format!(
                "INSERT INTO {table} (domain, holder, acquired_at, renewed_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(domain) DO UPDATE SET
                     acquired_at = CASE WHEN {table}.holder = excluded.holder
                                        THEN {table}.acquired_at
                                        ELSE excluded.acquired_at END,
                     holder = excluded.holder,
                     renewed_at = excluded.renewed_at
                 WHERE {table}.holder = excluded.holder OR {table}.renewed_at < ?4"
            ),
            renew: format!("UPDATE {table} SET renewed_at = ?3 WHERE domain = ?1 AND holder = ?2"),
            release: format!("DELETE FROM {table} WHERE domain = ?1 AND holder = ?2"),
            read: format!(
                "SELECT holder, acquired_at, renewed_at FROM {table} WHERE domain = ?1"
            ),
        })
    }
}

struct Shared {
    path: PathBuf,
    busy_timeout: Duration,
    expiry: Duration,
    statements: Statements,
}

impl Shared {
    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path).map_err(classify)?;
        conn.busy_timeout(self.busy_timeout).map_err(classify)?;
        debug!(path = %self.path.display(), "opened lock store connection");
        Ok(conn)
    }
}

/// Lock store backed by a table in a SQLite database file
///
/// Sessions open their own connection lazily and drop it on
/// [`LockSession::reset`], so a failed call is retried on a fresh one.
#[derive(Clone)]
pub struct SqliteLockStore<C: Clock = SystemClock> {
    shared: Arc<Shared>,
    clock: C,
}

impl SqliteLockStore {
    pub fn open(settings: &SqliteSettings, expiry: Duration) -> Result<Self, StoreError> {
        Self::with_clock(settings, expiry, SystemClock)
    }
}

impl<C: Clock> SqliteLockStore<C> {
    /// Open the store, creating the lock table if `create_table` is set
    pub fn with_clock(
        settings: &SqliteSettings,
        expiry: Duration,
        clock: C,
    ) -> Result<Self, StoreError> {
        let shared = Shared {
            path: settings.path.clone(),
            busy_timeout: settings.busy_timeout,
            expiry,
            statements: Statements::for_table(&settings.table)?,
        };

        if settings.create_table {
            let conn = shared.connect()?;
            conn.execute(&shared.statements.create, [])
                .map_err(classify)?;
        }

        Ok(Self {
            shared: Arc::new(shared),
            clock,
        })
    }
}

impl<C: Clock> LockStore for SqliteLockStore<C> {
    fn session(&self) -> Box<dyn LockSession> {
        Box::new(SqliteSession {
            shared: Arc::clone(&self.shared),
            clock: self.clock.clone(),
            conn: None,
        })
    }

    fn lease_expiry(&self) -> Duration {
        self.shared.expiry
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

struct SqliteSession<C: Clock> {
    shared: Arc<Shared>,
    clock: C,
    conn: Option<Connection>,
}

impl<C: Clock> SqliteSession<C> {
    /// Run `op` on this session's connection off the async runtime.
    ///
    /// If the returned future is dropped mid-call the connection goes with
    /// it and the next call opens a new one.
    async fn run<T, F>(&mut self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &Statements) -> rusqlite::Result<T> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let conn = self.conn.take();
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let conn = match conn {
                Some(conn) => conn,
                None => match shared.connect() {
                    Ok(conn) => conn,
                    Err(e) => return (None, Err(e)),
                },
            };
            let result = op(&conn, &shared.statements).map_err(classify);
            (Some(conn), result)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("lock store task failed: {e}")))?;

        self.conn = conn;
        result
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

#[async_trait]
impl<C: Clock> LockSession for SqliteSession<C> {
    async fn try_acquire(&mut self, domain: &Domain, holder: &NodeId) -> Result<bool, StoreError> {
        let now = self.now_millis();
        let expiry = i64::try_from(self.shared.expiry.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(expiry);
        let (domain, holder) = (domain.0.clone(), holder.0.clone());

        let rows = self
            .run(move |conn, sql| {
                conn.prepare_cached(&sql.acquire)?
                    .execute(params![domain, holder, now, cutoff])
            })
            .await?;
        Ok(rows == 1)
    }

    async fn renew(&mut self, domain: &Domain, holder: &NodeId) -> Result<bool, StoreError> {
        let now = self.now_millis();
        let (domain, holder) = (domain.0.clone(), holder.0.clone());

        let rows = self
            .run(move |conn, sql| {
                conn.prepare_cached(&sql.renew)?
                    .execute(params![domain, holder, now])
            })
            .await?;
        Ok(rows == 1)
    }

    async fn release(&mut self, domain: &Domain, holder: &NodeId) -> Result<(), StoreError> {
        let (domain, holder) = (domain.0.clone(), holder.0.clone());
        self.run(move |conn, sql| {
            conn.prepare_cached(&sql.release)?
                .execute(params![domain, holder])
        })
        .await?;
        Ok(())
    }

    async fn read(&mut self, domain: &Domain) -> Result<Option<LockRecord>, StoreError> {
        let key = domain.0.clone();
        let row = self
            .run(move |conn, sql| {
                conn.prepare_cached(&sql.read)?
                    .query_row(params![key], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    })
                    .optional()
            })
            .await?;

        row.map(|(holder, acquired_at, renewed_at)| -> Result<LockRecord, StoreError> {
            Ok(LockRecord {
                domain: domain.clone(),
                holder: NodeId::new(holder),
                acquired_at: from_millis(acquired_at)?,
                renewed_at: from_millis(renewed_at)?,
            })
        })
        .transpose()
    }

    fn reset(&mut self) {
        if self.conn.take().is_some() {
            debug!(path = %self.shared.path.display(), "dropped lock store connection");
        }
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Backend(format!("invalid timestamp {millis} in lock table")))
}

/// Contention and unreachable files are transient; everything else is not
fn classify(e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen) => {
            StoreError::Unavailable(e.to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable lock store backends for warden

mod sqlite;

pub use sqlite::SqliteLockStore;

use std::sync::Arc;
use warden_core::{LockStore, MemoryLockStore, StoreConfig, StoreError, WardenConfig};

/// Build the lock store a configuration asks for
pub fn connect(config: &WardenConfig) -> Result<Arc<dyn LockStore>, StoreError> {
    let expiry = config.lease.expiry;
    match &config.store {
        StoreConfig::Memory => Ok(Arc::new(MemoryLockStore::new(expiry))),
        StoreConfig::Sqlite(settings) => Ok(Arc::new(SqliteLockStore::open(settings, expiry)?)),
    }
}

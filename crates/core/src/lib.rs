// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-core: lease-based live/backup coordination for broker nodes
//!
//! This crate provides:
//! - Persistent node identity
//! - The `LockStore` abstraction and an in-memory store
//! - Leases: blocking acquisition, heartbeat renewal, release
//! - The node manager state machine with activation callbacks
//! - TOML configuration

pub mod clock;
pub mod config;
pub mod identity;
pub mod lease;
pub mod manager;
pub mod store;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    ConfigError, HaPolicy, LeaseSettings, NodeSettings, SqliteSettings, StoreConfig, WardenConfig,
};
pub use identity::{IdGen, IdentityError, NodeId, SequentialIdGen, UuidIdGen};
pub use lease::{Interrupted, Lease, LeaseState};
pub use manager::{
    ActivationCallbacks, NodeManager, NodeManagerError, NodeStatus, Role, Transition,
};
pub use store::{Domain, LockRecord, LockSession, LockStore, MemoryLockStore, StoreError};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

//! Integration tests for failover between node managers sharing one store.
//!
//! Each node runs its election on its own task, the way a broker would.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use warden_core::{
    ActivationCallbacks, Domain, HaPolicy, LeaseSettings, LockRecord, LockSession, LockStore,
    MemoryLockStore, NodeId, NodeManager, NodeManagerError, NodeSettings, Role, SequentialIdGen,
    StoreError,
};

const WAIT: Duration = Duration::from_secs(5);

fn fast() -> LeaseSettings {
    LeaseSettings::default()
        .with_retry_interval(Duration::from_millis(20))
        .with_renew_interval(Duration::from_millis(40))
        .with_store_timeout(Duration::from_millis(30))
        .with_expiry(Duration::from_millis(250))
}

fn manager(
    store: &MemoryLockStore,
    dir: &TempDir,
    name: &str,
    policy: HaPolicy,
    callbacks: ActivationCallbacks,
) -> NodeManager {
    let settings = NodeSettings::new(dir.path().join(name)).with_ha_policy(policy);
    NodeManager::builder(settings, Arc::new(store.clone()))
        .lease_settings(fast())
        .callbacks(callbacks)
        .id_gen(SequentialIdGen::new(name))
        .build()
}

async fn wait_for_role(manager: &NodeManager, expected: Role) {
    let mut rx = manager.subscribe();
    tokio::time::timeout(WAIT, rx.wait_for(|r| *r == expected))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {expected}"))
        .unwrap();
}

async fn find_live(nodes: &[NodeManager]) -> NodeManager {
    tokio::time::timeout(WAIT, async {
        loop {
            if let Some(node) = nodes.iter().find(|n| n.is_live()) {
                return node.clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap()
}

// =============================================================================
// Failover
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn backup_takes_over_when_live_node_crashes() {
    let dir = TempDir::new().unwrap();
    let store = MemoryLockStore::new(Duration::from_millis(250));
    let primary = manager(&store, &dir, "primary", HaPolicy::Primary, ActivationCallbacks::new());
    let backup = manager(&store, &dir, "backup", HaPolicy::Backup, ActivationCallbacks::new());
    primary.start().unwrap();
    backup.start().unwrap();

    assert_eq!(primary.start_live_node().await.unwrap(), Role::Live);
    let standby = tokio::spawn({
        let backup = backup.clone();
        async move { backup.await_live_node().await }
    });

    // The heartbeat keeps the standby waiting well past the expiry
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!standby.is_finished());
    assert_eq!(backup.role(), Role::BackupWaiting);

    primary.crash_live_server().await.unwrap();
    tokio::time::timeout(WAIT, standby)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(backup.is_live());
    assert!(!primary.is_live());
    let record = store.record(&Domain::live()).unwrap();
    assert_eq!(record.holder, backup.read_node_id().unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn store_outage_crashes_live_node_and_backup_waits_it_out() {
    let dir = TempDir::new().unwrap();
    let store = MemoryLockStore::new(Duration::from_millis(250));
    let deactivations = Arc::new(AtomicUsize::new(0));
    let callbacks = ActivationCallbacks::new().on_de_activate({
        let deactivations = Arc::clone(&deactivations);
        move || {
            deactivations.fetch_add(1, Ordering::SeqCst);
        }
    });
    let primary = manager(&store, &dir, "primary", HaPolicy::Primary, callbacks);
    let backup = manager(&store, &dir, "backup", HaPolicy::Backup, ActivationCallbacks::new());
    primary.start().unwrap();
    backup.start().unwrap();
    primary.start_live_node().await.unwrap();

    let standby = tokio::spawn({
        let backup = backup.clone();
        async move { backup.await_live_node().await }
    });

    store.set_unavailable(true);
    wait_for_role(&primary, Role::Crashed).await;
    assert_eq!(deactivations.load(Ordering::SeqCst), 1);

    // Undecided while the store is down: nobody is live
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!backup.is_live());
    assert!(!standby.is_finished());

    store.set_unavailable(false);
    tokio::time::timeout(WAIT, standby)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(backup.is_live());
}

// =============================================================================
// Failback
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn primary_reclaims_live_role_from_backup() {
    let dir = TempDir::new().unwrap();
    let store = MemoryLockStore::new(Duration::from_millis(250));
    let first = manager(&store, &dir, "primary", HaPolicy::Primary, ActivationCallbacks::new());
    let backup = manager(&store, &dir, "backup", HaPolicy::Backup, ActivationCallbacks::new());
    first.start().unwrap();
    backup.start().unwrap();
    first.start_live_node().await.unwrap();
    first.pause_live_server().await.unwrap();
    tokio::time::timeout(WAIT, backup.await_live_node())
        .await
        .unwrap()
        .unwrap();

    let restarted = manager(&store, &dir, "primary", HaPolicy::Primary, ActivationCallbacks::new());
    restarted.start().unwrap();
    assert_eq!(restarted.read_node_id().unwrap(), first.read_node_id().unwrap());

    let contender = tokio::spawn({
        let restarted = restarted.clone();
        async move { restarted.start_live_node().await }
    });
    wait_for_role(&restarted, Role::AwaitingFailback).await;
    assert!(backup.is_live());

    backup.release_backup().await.unwrap();
    let role = tokio::time::timeout(WAIT, contender)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(role, Role::Live);
    assert_eq!(backup.role(), Role::BackupWaiting);
    assert!(!restarted.is_backup_live().await.unwrap());
}

// =============================================================================
// Mutual exclusion
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_node_is_live() {
    let dir = TempDir::new().unwrap();
    let store = MemoryLockStore::new(Duration::from_millis(250));
    let live_now = Arc::new(AtomicIsize::new(0));
    let max_live = Arc::new(AtomicIsize::new(0));

    let mut nodes = Vec::new();
    for i in 0..8 {
        let callbacks = ActivationCallbacks::new()
            .on_activated({
                let live_now = Arc::clone(&live_now);
                let max_live = Arc::clone(&max_live);
                move || {
                    let n = live_now.fetch_add(1, Ordering::SeqCst) + 1;
                    max_live.fetch_max(n, Ordering::SeqCst);
                }
            })
            .on_de_activate({
                let live_now = Arc::clone(&live_now);
                move || {
                    live_now.fetch_sub(1, Ordering::SeqCst);
                }
            });
        let policy = if i % 2 == 0 {
            HaPolicy::Primary
        } else {
            HaPolicy::Backup
        };
        let node = manager(&store, &dir, &format!("n{i}"), policy, callbacks);
        node.start().unwrap();
        nodes.push(node);
    }

    let mut waiters = Vec::new();
    for node in &nodes {
        let node = node.clone();
        waiters.push(tokio::spawn(async move { node.await_live_node().await }));
    }

    // Hand the live role around by pausing whoever holds it
    for _ in 0..4 {
        let live = find_live(&nodes).await;
        assert_eq!(nodes.iter().filter(|n| n.is_live()).count(), 1);
        live.pause_live_server().await.unwrap();
    }
    find_live(&nodes).await;

    for node in &nodes {
        node.stop().await;
    }
    for waiter in waiters {
        let result = waiter.await.unwrap();
        assert!(matches!(result, Ok(()) | Err(NodeManagerError::Interrupted)));
    }

    assert_eq!(max_live.load(Ordering::SeqCst), 1);
    assert_eq!(live_now.load(Ordering::SeqCst), 0);
}

/// Memory store whose renewals can be made to hang forever
#[derive(Clone)]
struct StallingStore {
    inner: MemoryLockStore,
    stall_renewals: Arc<AtomicBool>,
}

struct StallingSession {
    inner: Box<dyn LockSession>,
    stall_renewals: Arc<AtomicBool>,
}

impl LockStore for StallingStore {
    fn session(&self) -> Box<dyn LockSession> {
        Box::new(StallingSession {
            inner: self.inner.session(),
            stall_renewals: Arc::clone(&self.stall_renewals),
        })
    }

    fn lease_expiry(&self) -> Duration {
        self.inner.lease_expiry()
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.now()
    }
}

#[async_trait]
impl LockSession for StallingSession {
    async fn try_acquire(&mut self, domain: &Domain, holder: &NodeId) -> Result<bool, StoreError> {
        self.inner.try_acquire(domain, holder).await
    }

    async fn renew(&mut self, domain: &Domain, holder: &NodeId) -> Result<bool, StoreError> {
        if self.stall_renewals.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.renew(domain, holder).await
    }

    async fn release(&mut self, domain: &Domain, holder: &NodeId) -> Result<(), StoreError> {
        self.inner.release(domain, holder).await
    }

    async fn read(&mut self, domain: &Domain) -> Result<Option<LockRecord>, StoreError> {
        self.inner.read(domain).await
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hung_renewal_steps_down_before_record_expires() {
    let dir = TempDir::new().unwrap();
    let expiry = Duration::from_millis(200);
    let store = StallingStore {
        inner: MemoryLockStore::new(expiry),
        stall_renewals: Arc::new(AtomicBool::new(false)),
    };
    // A renewal may stay pending past expiry with these timings, which
    // configuration rejects; the holder still steps down in time.
    let lease = LeaseSettings::default()
        .with_retry_interval(Duration::from_millis(5))
        .with_renew_interval(Duration::from_millis(150))
        .with_store_timeout(Duration::from_millis(140))
        .with_expiry(expiry);
    assert!(lease.validate().is_err());

    let live_now = Arc::new(AtomicIsize::new(0));
    let max_live = Arc::new(AtomicIsize::new(0));
    let build = |name: &str, policy: HaPolicy| {
        let callbacks = ActivationCallbacks::new()
            .on_activated({
                let live_now = Arc::clone(&live_now);
                let max_live = Arc::clone(&max_live);
                move || {
                    let n = live_now.fetch_add(1, Ordering::SeqCst) + 1;
                    max_live.fetch_max(n, Ordering::SeqCst);
                }
            })
            .on_de_activate({
                let live_now = Arc::clone(&live_now);
                move || {
                    live_now.fetch_sub(1, Ordering::SeqCst);
                }
            });
        NodeManager::builder(
            NodeSettings::new(dir.path().join(name)).with_ha_policy(policy),
            Arc::new(store.clone()),
        )
        .lease_settings(lease.clone())
        .callbacks(callbacks)
        .id_gen(SequentialIdGen::new(name))
        .build()
    };
    let primary = build("primary", HaPolicy::Primary);
    let backup = build("backup", HaPolicy::Backup);

    primary.start().unwrap();
    primary.start_live_node().await.unwrap();
    store.stall_renewals.store(true, Ordering::SeqCst);

    backup.start().unwrap();
    let standby = tokio::spawn({
        let backup = backup.clone();
        async move { backup.await_live_node().await }
    });

    wait_for_role(&backup, Role::Live).await;
    standby.await.unwrap().unwrap();

    assert_eq!(primary.role(), Role::Crashed);
    assert_eq!(max_live.load(Ordering::SeqCst), 1);
    assert_eq!(live_now.load(Ordering::SeqCst), 1);

    store.stall_renewals.store(false, Ordering::SeqCst);
    backup.stop().await;
    primary.stop().await;
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interrupt_from_another_thread_wakes_standby() {
    let dir = TempDir::new().unwrap();
    let store = MemoryLockStore::new(Duration::from_millis(250));
    let slow = fast().with_retry_interval(Duration::from_secs(60));
    let backup = NodeManager::builder(
        NodeSettings::new(dir.path().join("backup")).with_ha_policy(HaPolicy::Backup),
        Arc::new(store.clone()),
    )
    .lease_settings(slow.with_renew_interval(Duration::from_millis(100)))
    .build();
    backup.start().unwrap();

    // Someone else holds the lock, so the standby settles into its long sleep
    let holder = manager(&store, &dir, "holder", HaPolicy::Primary, ActivationCallbacks::new());
    holder.start().unwrap();
    holder.start_live_node().await.unwrap();

    let standby = tokio::spawn({
        let backup = backup.clone();
        async move { backup.await_live_node().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let interrupter = backup.clone();
    std::thread::spawn(move || interrupter.interrupt())
        .join()
        .unwrap();

    let result = tokio::time::timeout(Duration::from_millis(500), standby)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(NodeManagerError::Interrupted)));
    assert_eq!(backup.role(), Role::Stopped);
    assert!(holder.is_live());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node manager: the live/backup state machine of one broker instance
//!
//! Owns the node identity and a [`Lease`] on the live domain, drives the
//! failover and failback transitions, and runs the broker's
//! [`ActivationCallbacks`] at the points where the broker may start or must
//! stop serving.
//!
//! ```text
//! NOT_STARTED ──start──▶ AWAITING_LIVE ──lease──▶ LIVE ──lost──▶ CRASHED
//!      │                      ▲                   │  └─pause──▶ PAUSED
//!      └──start(backup)──▶ BACKUP_WAITING ────────┘
//!                             │  ▲       (release_backup from LIVE)
//!                 start_backup▼  │
//!                         BACKUP_ACTIVE ──release_backup──▶ AWAITING_FAILBACK
//! ```

mod callbacks;
mod role;

pub use callbacks::ActivationCallbacks;
pub use role::Role;

use crate::config::{HaPolicy, LeaseSettings, NodeSettings};
use crate::identity::{self, IdGen, IdentityError, NodeId, UuidIdGen};
use crate::lease::{Interrupted, Lease, LeaseState};
use crate::store::{Domain, LockRecord, LockStore, StoreError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors surfaced by node manager operations
#[derive(Debug, Error)]
pub enum NodeManagerError {
    /// The operation is not valid in the current role
    #[error("cannot {operation} while {role}")]
    IllegalState { operation: &'static str, role: Role },
    /// The wait for the live lease was cancelled
    #[error("interrupted while waiting for the live lease")]
    Interrupted,
    #[error("live lease lost during activation")]
    LeaseLost,
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<Interrupted> for NodeManagerError {
    fn from(_: Interrupted) -> Self {
        NodeManagerError::Interrupted
    }
}

/// One role change, as delivered by [`NodeManager::transitions`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: Role,
    pub to: Role,
}

// Slow transition readers lag rather than block the manager
const TRANSITION_BUFFER: usize = 64;

/// Point-in-time view of a node manager for status reporting
#[derive(Clone, Debug, Serialize)]
pub struct NodeStatus {
    pub node_id: Option<NodeId>,
    pub domain: Domain,
    pub role: Role,
    pub lease: LeaseState,
    pub live: bool,
    pub awaiting_failback: bool,
}

/// Builder for [`NodeManager`]
pub struct NodeManagerBuilder {
    settings: NodeSettings,
    lease_settings: LeaseSettings,
    store: Arc<dyn LockStore>,
    callbacks: ActivationCallbacks,
    id_gen: Box<dyn IdGen>,
}

impl NodeManagerBuilder {
    pub fn lease_settings(mut self, settings: LeaseSettings) -> Self {
        self.lease_settings = settings;
        self
    }

    pub fn callbacks(mut self, callbacks: ActivationCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Generator used when the node has no identity file yet
    pub fn id_gen(mut self, id_gen: impl IdGen + 'static) -> Self {
        self.id_gen = Box::new(id_gen);
        self
    }

    pub fn build(self) -> NodeManager {
        let (role, _) = watch::channel(Role::NotStarted);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        NodeManager {
            inner: Arc::new(Inner {
                settings: self.settings,
                lease_settings: self.lease_settings,
                store: self.store,
                callbacks: self.callbacks,
                id_gen: self.id_gen,
                node_id: OnceLock::new(),
                lease: OnceLock::new(),
                role,
                transitions,
                cancel: CancellationToken::new(),
                start_lock: Mutex::new(()),
                hooks: Mutex::new(()),
                electing: AtomicBool::new(false),
                promoted_from_backup: AtomicBool::new(false),
            }),
        }
    }
}

/// Coordinates which broker instance is live
///
/// Cheap to clone; clones share the same state, so one task can block in
/// [`await_live_node`](Self::await_live_node) while another calls
/// [`interrupt`](Self::interrupt).
#[derive(Clone)]
pub struct NodeManager {
    inner: Arc<Inner>,
}

struct Inner {
    settings: NodeSettings,
    lease_settings: LeaseSettings,
    store: Arc<dyn LockStore>,
    callbacks: ActivationCallbacks,
    id_gen: Box<dyn IdGen>,
    node_id: OnceLock<NodeId>,
    lease: OnceLock<Lease>,
    role: watch::Sender<Role>,
    transitions: broadcast::Sender<Transition>,
    cancel: CancellationToken,
    start_lock: Mutex<()>,
    // Held across entering LIVE plus `activated`, and across every way out
    // of LIVE, so `de_activate` can never overtake `activated`
    hooks: Mutex<()>,
    electing: AtomicBool,
    // Became live by taking over from a backup role
    promoted_from_backup: AtomicBool,
}

impl NodeManager {
    pub fn builder(settings: NodeSettings, store: Arc<dyn LockStore>) -> NodeManagerBuilder {
        NodeManagerBuilder {
            settings,
            lease_settings: LeaseSettings::default(),
            store,
            callbacks: ActivationCallbacks::default(),
            id_gen: Box::new(UuidIdGen),
        }
    }

    /// Load (or create) the node identity and enter the configured role:
    /// AWAITING_LIVE for a primary, BACKUP_WAITING for a backup.
    pub fn start(&self) -> Result<Role, NodeManagerError> {
        let inner = &self.inner;
        let _guard = inner.start_lock.lock().unwrap_or_else(|e| e.into_inner());

        let role = inner.current_role();
        if role != Role::NotStarted {
            return Err(NodeManagerError::IllegalState {
                operation: "start",
                role,
            });
        }

        let node_id =
            identity::load_or_create(&inner.settings.identity_path(), inner.id_gen.as_ref())?;
        let lease = Lease::new(
            inner.settings.domain.clone(),
            node_id.clone(),
            inner.lease_settings.clone(),
            Arc::clone(&inner.store),
            inner.cancel.child_token(),
        );
        // Guarded by start_lock and the NOT_STARTED check above
        let _ = inner.node_id.set(node_id);
        let _ = inner.lease.set(lease);

        let next = match inner.settings.ha_policy {
            HaPolicy::Primary => Role::AwaitingLive,
            HaPolicy::Backup => Role::BackupWaiting,
        };
        inner.transition(&[Role::NotStarted], next, "start")?;
        Ok(next)
    }

    /// Block until this node holds the live lease, then activate it.
    ///
    /// Never gives up on its own: an unreachable store or a healthy live node
    /// keeps it waiting. Only [`interrupt`](Self::interrupt) ends the wait,
    /// with [`NodeManagerError::Interrupted`].
    pub async fn await_live_node(&self) -> Result<(), NodeManagerError> {
        let inner = &self.inner;
        let lease = inner.lease("await live node")?;

        let role = inner.current_role();
        if !role.is_electable() || inner.electing.swap(true, Ordering::SeqCst) {
            return Err(NodeManagerError::IllegalState {
                operation: "await live node",
                role,
            });
        }
        let _electing = ElectionGuard(&inner.electing);

        info!(node_id = %inner.label(), role = %role, "waiting for live lease");
        lease.acquire_blocking().await?;

        if inner
            .transition(
                &[Role::BackupWaiting, Role::BackupActive],
                Role::AwaitingLive,
                "await live node",
            )
            .is_ok()
        {
            inner.promoted_from_backup.store(true, Ordering::SeqCst);
        }

        inner.activate(lease).await
    }

    /// Primary entry point: contend for the live role.
    ///
    /// When another node currently holds the live lease this node either
    /// waits in AWAITING_FAILBACK for it to be handed back, or, with failback
    /// disabled, settles as BACKUP_WAITING and returns without waiting.
    /// Returns the role the node ended up in.
    pub async fn start_live_node(&self) -> Result<Role, NodeManagerError> {
        let inner = &self.inner;
        let node_id = inner.node_id("start live node")?;

        let role = inner.current_role();
        if !matches!(role, Role::AwaitingLive | Role::AwaitingFailback) {
            return Err(NodeManagerError::IllegalState {
                operation: "start live node",
                role,
            });
        }

        match inner.read_live_record().await {
            Ok(Some(record)) if !record.is_held_by(node_id) && inner.store.is_current(&record) => {
                if inner.settings.allow_failback {
                    inner.transition(
                        &[Role::AwaitingLive, Role::AwaitingFailback],
                        Role::AwaitingFailback,
                        "start live node",
                    )?;
                    info!(
                        node_id = %node_id,
                        holder = %record.holder,
                        "live lease held by another node, awaiting failback"
                    );
                } else {
                    inner.transition(
                        &[Role::AwaitingLive, Role::AwaitingFailback],
                        Role::BackupWaiting,
                        "start live node",
                    )?;
                    info!(
                        node_id = %node_id,
                        holder = %record.holder,
                        "live lease held by another node and failback is disabled, continuing as backup"
                    );
                    return Ok(Role::BackupWaiting);
                }
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "could not read live lock record, contending anyway");
            }
        }

        self.await_live_node().await?;
        Ok(inner.current_role())
    }

    /// Administratively give up the live role: LIVE to PAUSED.
    ///
    /// The heartbeat stops, `de_activate` runs, then the lease is released so
    /// a backup can take over without waiting for expiry.
    pub async fn pause_live_server(&self) -> Result<(), NodeManagerError> {
        let inner = &self.inner;
        let lease = inner.lease("pause live server")?;
        inner.leave_live(&[Role::Live], Role::Paused, "pause live server")?;

        lease.stop_heartbeat().await;
        inner.callbacks.de_activate();
        lease.release().await;
        Ok(())
    }

    /// Simulate a crash of the live node: LIVE to CRASHED.
    ///
    /// The heartbeat stops and `de_activate` runs, but the lock record is left
    /// in place to expire, exactly as after a real crash.
    pub async fn crash_live_server(&self) -> Result<(), NodeManagerError> {
        let inner = &self.inner;
        let lease = inner.lease("crash live server")?;
        inner.leave_live(&[Role::Live], Role::Crashed, "crash live server")?;

        lease.abandon().await;
        inner.callbacks.de_activate();
        Ok(())
    }

    /// Start serving in backup capacity: BACKUP_WAITING to BACKUP_ACTIVE
    pub fn start_backup(&self) -> Result<(), NodeManagerError> {
        self.inner
            .transition(&[Role::BackupWaiting], Role::BackupActive, "start backup")?;
        Ok(())
    }

    /// Step a backup aside for the original live node.
    ///
    /// A backup that took over the live role deactivates, releases the lease
    /// and returns to BACKUP_WAITING, letting a node in AWAITING_FAILBACK
    /// reclaim it. A BACKUP_ACTIVE node moves to AWAITING_FAILBACK (or
    /// BACKUP_WAITING when failback is disabled).
    pub async fn release_backup(&self) -> Result<(), NodeManagerError> {
        let inner = &self.inner;
        let lease = inner.lease("release backup")?;

        match inner.current_role() {
            Role::Live if inner.serves_as_backup() => {
                inner.leave_live(&[Role::Live], Role::BackupWaiting, "release backup")?;
                lease.stop_heartbeat().await;
                inner.callbacks.de_activate();
                lease.release().await;
                inner.promoted_from_backup.store(false, Ordering::SeqCst);
                Ok(())
            }
            Role::BackupActive => {
                let next = if inner.settings.allow_failback {
                    Role::AwaitingFailback
                } else {
                    Role::BackupWaiting
                };
                inner.transition(&[Role::BackupActive], next, "release backup")?;
                Ok(())
            }
            role => Err(NodeManagerError::IllegalState {
                operation: "release backup",
                role,
            }),
        }
    }

    pub fn is_awaiting_failback(&self) -> bool {
        self.inner.current_role() == Role::AwaitingFailback
    }

    /// Whether a backup currently holds the live role.
    ///
    /// On a live node: whether it serves as a backup. On a primary that is not
    /// live: whether some other node holds a current live lock, since that
    /// node can only be a backup standing in for it. A waiting backup answers
    /// false.
    pub async fn is_backup_live(&self) -> Result<bool, NodeManagerError> {
        let inner = &self.inner;
        let node_id = inner.node_id("query backup status")?;

        if inner.current_role() == Role::Live {
            return Ok(inner.serves_as_backup());
        }
        if inner.settings.ha_policy == HaPolicy::Backup {
            return Ok(false);
        }

        let record = inner.read_live_record().await?;
        Ok(record.is_some_and(|r| !r.is_held_by(node_id) && inner.store.is_current(&r)))
    }

    /// Cheap, non-blocking check the broker consults before any live-only
    /// side effect
    pub fn is_live(&self) -> bool {
        let inner = &self.inner;
        inner.current_role() == Role::Live && inner.lease.get().is_some_and(Lease::is_held)
    }

    pub fn role(&self) -> Role {
        self.inner.current_role()
    }

    pub fn ha_policy(&self) -> HaPolicy {
        self.inner.settings.ha_policy
    }

    /// Watch the current role. Rapid changes may be coalesced; use
    /// [`transitions`](Self::transitions) to see every step.
    pub fn subscribe(&self) -> watch::Receiver<Role> {
        self.inner.role.subscribe()
    }

    /// Every role change from now on, in order
    pub fn transitions(&self) -> broadcast::Receiver<Transition> {
        self.inner.transitions.subscribe()
    }

    pub fn status(&self) -> NodeStatus {
        let inner = &self.inner;
        let role = inner.current_role();
        NodeStatus {
            node_id: inner.node_id.get().cloned(),
            domain: inner.settings.domain.clone(),
            role,
            lease: inner
                .lease
                .get()
                .map_or(LeaseState::Unheld, Lease::state),
            live: self.is_live(),
            awaiting_failback: role == Role::AwaitingFailback,
        }
    }

    /// The persisted node identity; fails before [`start`](Self::start)
    pub fn read_node_id(&self) -> Result<NodeId, NodeManagerError> {
        self.inner.node_id("read node id").cloned()
    }

    /// Cancel any blocking wait and stop the node.
    ///
    /// Idempotent and synchronous, so it can be called from a signal handler
    /// or another thread. A live node runs `de_activate` first. When called
    /// inside a tokio runtime the lease is released in the background; use
    /// [`stop`](Self::stop) to wait for that.
    pub fn interrupt(&self) {
        let inner = &self.inner;
        let mut previous = Role::Stopped;
        {
            let _hooks = inner.hooks();
            inner.cancel.cancel();
            inner.role.send_if_modified(|role| {
                previous = std::mem::replace(role, Role::Stopped);
                inner.announce(previous, Role::Stopped)
            });
        }
        if previous == Role::Stopped {
            return;
        }

        info!(node_id = %inner.label(), from = %previous, to = %Role::Stopped, "role transition");
        if previous == Role::Live {
            inner.callbacks.de_activate();
        }

        if inner.lease.get().is_some() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let inner = Arc::clone(inner);
                handle.spawn(async move {
                    if let Some(lease) = inner.lease.get() {
                        lease.release().await;
                    }
                });
            }
        }
    }

    /// Interrupt and wait until the lease has been released
    pub async fn stop(&self) {
        self.interrupt();
        if let Some(lease) = self.inner.lease.get() {
            lease.release().await;
        }
    }
}

impl Inner {
    fn current_role(&self) -> Role {
        *self.role.borrow()
    }

    fn label(&self) -> String {
        self.node_id
            .get()
            .map_or_else(|| "-".to_string(), NodeId::to_string)
    }

    fn node_id(&self, operation: &'static str) -> Result<&NodeId, NodeManagerError> {
        self.node_id.get().ok_or(NodeManagerError::IllegalState {
            operation,
            role: self.current_role(),
        })
    }

    fn lease(&self, operation: &'static str) -> Result<&Lease, NodeManagerError> {
        self.lease.get().ok_or(NodeManagerError::IllegalState {
            operation,
            role: self.current_role(),
        })
    }

    fn hooks(&self) -> std::sync::MutexGuard<'_, ()> {
        self.hooks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Transition that may leave LIVE; waits for an activation in progress
    fn leave_live(
        &self,
        from: &[Role],
        to: Role,
        operation: &'static str,
    ) -> Result<Role, NodeManagerError> {
        let _hooks = self.hooks();
        self.transition(from, to, operation)
    }

    fn serves_as_backup(&self) -> bool {
        self.settings.ha_policy == HaPolicy::Backup
            || self.promoted_from_backup.load(Ordering::SeqCst)
    }

    /// Publish a role change to transition readers; false if the role is
    /// unchanged. Called with the role channel locked, which keeps the
    /// published order identical to the order of changes.
    fn announce(&self, from: Role, to: Role) -> bool {
        if from == to {
            return false;
        }
        let _ = self.transitions.send(Transition { from, to });
        true
    }

    /// Atomically move from one of `from` to `to`
    fn transition(
        &self,
        from: &[Role],
        to: Role,
        operation: &'static str,
    ) -> Result<Role, NodeManagerError> {
        let mut previous = None;
        self.role.send_if_modified(|role| {
            if from.contains(role) {
                let before = std::mem::replace(role, to);
                previous = Some(before);
                self.announce(before, to)
            } else {
                false
            }
        });

        match previous {
            Some(previous) => {
                info!(node_id = %self.label(), from = %previous, to = %to, "role transition");
                Ok(previous)
            }
            None => Err(NodeManagerError::IllegalState {
                operation,
                role: self.current_role(),
            }),
        }
    }

    async fn activate(self: &Arc<Self>, lease: &Lease) -> Result<(), NodeManagerError> {
        self.callbacks.pre_activate();

        let entered = {
            let _hooks = self.hooks();
            let entered = self.transition(
                &[Role::AwaitingLive, Role::AwaitingFailback],
                Role::Live,
                "activate",
            );
            if entered.is_ok() {
                self.callbacks.activated();
            }
            entered
        };
        if let Err(e) = entered {
            // Interrupted between winning the lease and activating
            lease.release().await;
            return Err(self.interrupted_or(e));
        }

        let weak = Arc::downgrade(self);
        lease.start_heartbeat(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_lease_lost();
            }
        });

        {
            let _hooks = self.hooks();
            if self.current_role() != Role::Live {
                return Err(self.interrupted_or(NodeManagerError::LeaseLost));
            }
            self.callbacks.activation_complete();
        }
        info!(node_id = %self.label(), domain = %self.settings.domain, "node is live");
        Ok(())
    }

    fn interrupted_or(&self, e: NodeManagerError) -> NodeManagerError {
        if self.cancel.is_cancelled() {
            NodeManagerError::Interrupted
        } else {
            e
        }
    }

    fn on_lease_lost(&self) {
        if self
            .leave_live(&[Role::Live], Role::Crashed, "lose lease")
            .is_ok()
        {
            warn!(node_id = %self.label(), "live lease lost, deactivating");
            self.callbacks.de_activate();
        }
    }

    async fn read_live_record(&self) -> Result<Option<LockRecord>, StoreError> {
        // A fresh session: the election and heartbeat sessions stay dedicated
        let mut session = self.store.session();
        let timeout = self.lease_settings.store_timeout;
        tokio::time::timeout(timeout, session.read(&self.settings.domain))
            .await
            .unwrap_or(Err(StoreError::Timeout(timeout)))
    }
}

struct ElectionGuard<'a>(&'a AtomicBool);

impl Drop for ElectionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

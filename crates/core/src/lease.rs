// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease protocol on top of a lock store
//!
//! Turns one-shot store operations into a continuously held claim:
//! - `acquire_blocking` retries `try_acquire` until it wins or is cancelled
//! - a heartbeat renews the record on a fixed period
//! - the first failed renewal marks the lease lost and stops the heartbeat
//! - a lease not confirmed within `hold_window` is lost, even while a renewal
//!   is still in flight
//!
//! A failed renewal is never retried. A node that may already have been
//! replaced must stop acting as the holder at once, and a retry would open a
//! window where two nodes both believe they own the domain.

use crate::config::LeaseSettings;
use crate::identity::NodeId;
use crate::store::{Domain, LockSession, LockStore, StoreError};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Holder-side view of a lease
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaseState {
    Unheld,
    Held,
    Lost,
}

impl std::fmt::Display for LeaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LeaseState::Unheld => "UNHELD",
            LeaseState::Held => "HELD",
            LeaseState::Lost => "LOST",
        };
        write!(f, "{}", s)
    }
}

/// The wait for a lease was cancelled before it was acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("lease acquisition interrupted")]
pub struct Interrupted;

struct Shared {
    domain: Domain,
    holder: NodeId,
    settings: LeaseSettings,
    store: Arc<dyn LockStore>,
    state: watch::Sender<LeaseState>,
    cancel: CancellationToken,
    /// Start of the last store call that confirmed the record
    confirmed_at: Mutex<Option<Instant>>,
}

impl Shared {
    fn confirm(&self, attempt_started: Instant) {
        *self.confirmed_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(attempt_started);
    }

    fn confirmed_at(&self) -> Option<Instant> {
        *self.confirmed_at.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct Heartbeat {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// A claim on one domain, owned by a single node
///
/// Acquisition/release and the heartbeat each use their own store session, so
/// a stuck connection in one cannot starve the other.
pub struct Lease {
    shared: Arc<Shared>,
    election: tokio::sync::Mutex<Box<dyn LockSession>>,
    heartbeat: Mutex<Option<Heartbeat>>,
}

impl Lease {
    /// Create an unheld lease. Cancelling `cancel` interrupts acquisition and
    /// stops any running heartbeat.
    pub fn new(
        domain: Domain,
        holder: NodeId,
        settings: LeaseSettings,
        store: Arc<dyn LockStore>,
        cancel: CancellationToken,
    ) -> Self {
        let election = store.session();
        let (state, _) = watch::channel(LeaseState::Unheld);
        Self {
            shared: Arc::new(Shared {
                domain,
                holder,
                settings,
                store,
                state,
                cancel,
                confirmed_at: Mutex::new(None),
            }),
            election: tokio::sync::Mutex::new(election),
            heartbeat: Mutex::new(None),
        }
    }

    pub fn domain(&self) -> &Domain {
        &self.shared.domain
    }

    pub fn holder(&self) -> &NodeId {
        &self.shared.holder
    }

    pub fn state(&self) -> LeaseState {
        *self.shared.state.borrow()
    }

    pub fn is_held(&self) -> bool {
        self.state() == LeaseState::Held
    }

    /// Watch lease state changes
    pub fn subscribe(&self) -> watch::Receiver<LeaseState> {
        self.shared.state.subscribe()
    }

    /// Loop on `try_acquire` until the record is ours.
    ///
    /// Has no timeout: a standby waits here for as long as the live node
    /// keeps its lease. Store errors count as "not acquired"; the session is
    /// reset and the attempt repeated after `retry_interval`. Returns
    /// `Err(Interrupted)` promptly once the cancellation token fires, even in
    /// the middle of a sleep or a store call.
    pub async fn acquire_blocking(&self) -> Result<(), Interrupted> {
        let shared = &self.shared;
        let settings = &shared.settings;
        let mut session = tokio::select! {
            _ = shared.cancel.cancelled() => return Err(Interrupted),
            session = self.election.lock() => session,
        };

        if self.is_held() {
            return Ok(());
        }

        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            let attempt_started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => return Err(Interrupted),
                outcome = tokio::time::timeout(
                    settings.store_timeout,
                    session.try_acquire(&shared.domain, &shared.holder),
                ) => outcome.unwrap_or(Err(StoreError::Timeout(settings.store_timeout))),
            };

            match outcome {
                Ok(true) => {
                    shared.confirm(attempt_started);
                    shared.state.send_replace(LeaseState::Held);
                    info!(
                        domain = %shared.domain,
                        holder = %shared.holder,
                        attempts,
                        "acquired lease"
                    );
                    return Ok(());
                }
                Ok(false) => {
                    debug!(domain = %shared.domain, "lease held by another node");
                }
                Err(e) => {
                    debug!(domain = %shared.domain, error = %e, "lock failure");
                    session.reset();
                }
            }

            if attempts % u64::from(settings.retry_log_every.max(1)) == 0 {
                info!(
                    domain = %shared.domain,
                    attempts,
                    "failed to acquire lease, still retrying every {:?}",
                    settings.retry_interval
                );
            }

            tokio::select! {
                _ = shared.cancel.cancelled() => return Err(Interrupted),
                _ = tokio::time::sleep(settings.retry_interval) => {}
            }
        }
    }

    /// Start renewing the record every `renew_interval`.
    ///
    /// `on_lost` runs on the heartbeat task right after the first renewal
    /// that fails, times out, or finds the record gone, or once `hold_window`
    /// has passed since the record was last confirmed. The heartbeat then
    /// exits. It does not run when the heartbeat is stopped.
    pub fn start_heartbeat(&self, on_lost: impl FnOnce() + Send + 'static) {
        let stop = self.shared.cancel.child_token();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&self.shared),
            self.shared.store.session(),
            stop.clone(),
            on_lost,
        ));

        let previous = self
            .heartbeat
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Heartbeat { stop, handle });
        if let Some(previous) = previous {
            previous.stop.cancel();
        }
    }

    /// Whether a heartbeat task is still renewing
    pub fn is_heartbeat_running(&self) -> bool {
        self.heartbeat
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|hb| !hb.handle.is_finished())
    }

    /// Stop the heartbeat and wait for its task to exit
    pub async fn stop_heartbeat(&self) {
        let heartbeat = self
            .heartbeat
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(heartbeat) = heartbeat {
            heartbeat.stop.cancel();
            if let Err(e) = heartbeat.handle.await {
                warn!(error = %e, "heartbeat task ended abnormally");
            }
        }
    }

    /// Stop renewing without touching the store.
    ///
    /// The record stays behind and expires on its own, which is what a
    /// crashed holder looks like to everyone else.
    pub async fn abandon(&self) {
        self.stop_heartbeat().await;
        self.shared.state.send_replace(LeaseState::Lost);
        warn!(domain = %self.shared.domain, holder = %self.shared.holder, "lease abandoned");
    }

    /// Give the domain up explicitly.
    ///
    /// Best-effort and idempotent: the record is only removed if this holder
    /// still owns it, and store errors are logged rather than returned. Runs
    /// even when the lease is not held, which also clears a record left by an
    /// acquisition whose outcome was never observed.
    pub async fn release(&self) {
        self.stop_heartbeat().await;

        let shared = &self.shared;
        let mut session = self.election.lock().await;
        let outcome = tokio::time::timeout(
            shared.settings.store_timeout,
            session.release(&shared.domain, &shared.holder),
        )
        .await
        .unwrap_or(Err(StoreError::Timeout(shared.settings.store_timeout)));

        match outcome {
            Ok(()) => info!(domain = %shared.domain, holder = %shared.holder, "released lease"),
            Err(e) => {
                warn!(domain = %shared.domain, error = %e, "failed to release lease");
                session.reset();
            }
        }
        shared.state.send_replace(LeaseState::Unheld);
    }
}

async fn run_heartbeat(
    shared: Arc<Shared>,
    mut session: Box<dyn LockSession>,
    stop: CancellationToken,
    on_lost: impl FnOnce(),
) {
    let settings = &shared.settings;
    let hold_window = settings.hold_window();
    let mut ticker = tokio::time::interval_at(
        Instant::now() + settings.renew_interval,
        settings.renew_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut deadline = shared.confirmed_at().unwrap_or_else(Instant::now) + hold_window;

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep_until(deadline) => {
                warn!(domain = %shared.domain, window = ?hold_window, "lease not confirmed in time");
                break;
            }
            _ = ticker.tick() => {}
        }

        if *shared.state.borrow() != LeaseState::Held {
            return;
        }

        // Other nodes may take the record over once it expires, so a pending
        // renewal only gets until the local deadline.
        let attempt_started = Instant::now();
        let budget = settings
            .store_timeout
            .min(deadline.saturating_duration_since(attempt_started));
        let outcome = tokio::time::timeout(budget, session.renew(&shared.domain, &shared.holder))
            .await
            .unwrap_or(Err(StoreError::Timeout(budget)));

        match outcome {
            Ok(true) => {
                debug!(domain = %shared.domain, "renewed lease");
                shared.confirm(attempt_started);
                deadline = attempt_started + hold_window;
                continue;
            }
            Ok(false) => {
                warn!(
                    domain = %shared.domain,
                    holder = %shared.holder,
                    "lease record missing or taken over"
                );
            }
            Err(e) => {
                warn!(domain = %shared.domain, error = %e, "lease renewal failed");
                session.reset();
            }
        }
        break;
    }

    if stop.is_cancelled() {
        return;
    }
    shared.state.send_replace(LeaseState::Lost);
    warn!(domain = %shared.domain, holder = %shared.holder, "lease lost");
    on_lost();
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;

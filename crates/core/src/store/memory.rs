// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process lock store
//!
//! All sessions created from one [`MemoryLockStore`] share a single table, so
//! several node managers in one process can contend for the same domain.
//! Failure modes can be switched on to exercise retry and lease-loss paths.

use super::{Domain, LockRecord, LockSession, LockStore, StoreError};
use crate::clock::{Clock, SystemClock};
use crate::identity::NodeId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Recorded call to a memory store session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    TryAcquire { domain: String, holder: String },
    Renew { domain: String, holder: String },
    Release { domain: String, holder: String },
    Read { domain: String },
    Reset,
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<Domain, LockRecord>,
    recording: bool,
    calls: Vec<StoreCall>,
    // Configurable failure modes
    unavailable: bool,
    fail_renewals: bool,
    latency: Option<Duration>,
}

impl MemoryState {
    fn record_call(&mut self, call: StoreCall) {
        if self.recording {
            self.calls.push(call);
        }
    }
}

/// Lock store backed by a shared in-memory table
#[derive(Clone)]
pub struct MemoryLockStore<C: Clock = SystemClock> {
    state: Arc<Mutex<MemoryState>>,
    clock: C,
    expiry: Duration,
}

impl MemoryLockStore<SystemClock> {
    pub fn new(expiry: Duration) -> Self {
        Self::with_clock(expiry, SystemClock)
    }
}

impl<C: Clock> MemoryLockStore<C> {
    pub fn with_clock(expiry: Duration, clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            clock,
            expiry,
        }
    }

    /// Keep a log of every session call, readable through [`calls`](Self::calls).
    /// Off by default; the log grows without bound.
    pub fn with_recording(self) -> Self {
        self.lock().recording = true;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every operation fail as if the store were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Make renewals fail while other operations keep working
    pub fn fail_renewals(&self, fail: bool) {
        self.lock().fail_renewals = fail;
    }

    /// Delay every operation, simulating a hung connection
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Snapshot of the record for `domain`
    pub fn record(&self, domain: &Domain) -> Option<LockRecord> {
        self.lock().records.get(domain).cloned()
    }

    /// Number of records currently stored
    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    /// All calls made through sessions of this store, if recording
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls matching `pred`
    pub fn count_calls(&self, pred: impl Fn(&StoreCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    async fn enter(&self, call: StoreCall) -> Result<(), StoreError> {
        let latency = {
            let mut state = self.lock();
            state.record_call(call);
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.lock().unavailable {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }

    fn try_acquire_now(&self, domain: &Domain, holder: &NodeId) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        let fresh = LockRecord {
            domain: domain.clone(),
            holder: holder.clone(),
            acquired_at: now,
            renewed_at: now,
        };
        match state.records.entry(domain.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                true
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if record.is_held_by(holder) {
                    record.renewed_at = now;
                    true
                } else if record.is_expired(now, self.expiry) {
                    *record = fresh;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn renew_now(&self, domain: &Domain, holder: &NodeId) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut state = self.lock();
        if state.fail_renewals {
            return Err(StoreError::Unavailable("renewals disabled".into()));
        }
        match state.records.get_mut(domain) {
            Some(record) if record.is_held_by(holder) => {
                record.renewed_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn release_now(&self, domain: &Domain, holder: &NodeId) {
        let mut state = self.lock();
        if state
            .records
            .get(domain)
            .is_some_and(|record| record.is_held_by(holder))
        {
            state.records.remove(domain);
        }
    }
}

impl<C: Clock> LockStore for MemoryLockStore<C> {
    fn session(&self) -> Box<dyn LockSession> {
        Box::new(MemorySession {
            store: self.clone(),
        })
    }

    fn lease_expiry(&self) -> Duration {
        self.expiry
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

struct MemorySession<C: Clock> {
    store: MemoryLockStore<C>,
}

#[async_trait]
impl<C: Clock> LockSession for MemorySession<C> {
    async fn try_acquire(&mut self, domain: &Domain, holder: &NodeId) -> Result<bool, StoreError> {
        self.store
            .enter(StoreCall::TryAcquire {
                domain: domain.0.clone(),
                holder: holder.0.clone(),
            })
            .await?;
        Ok(self.store.try_acquire_now(domain, holder))
    }

    async fn renew(&mut self, domain: &Domain, holder: &NodeId) -> Result<bool, StoreError> {
        self.store
            .enter(StoreCall::Renew {
                domain: domain.0.clone(),
                holder: holder.0.clone(),
            })
            .await?;
        self.store.renew_now(domain, holder)
    }

    async fn release(&mut self, domain: &Domain, holder: &NodeId) -> Result<(), StoreError> {
        self.store
            .enter(StoreCall::Release {
                domain: domain.0.clone(),
                holder: holder.0.clone(),
            })
            .await?;
        self.store.release_now(domain, holder);
        Ok(())
    }

    async fn read(&mut self, domain: &Domain) -> Result<Option<LockRecord>, StoreError> {
        self.store
            .enter(StoreCall::Read {
                domain: domain.0.clone(),
            })
            .await?;
        Ok(self.store.record(domain))
    }

    fn reset(&mut self) {
        self.store.lock().record_call(StoreCall::Reset);
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status command

use crate::output::{self, OutputFormat};
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use std::fmt;
use warden_core::{identity, Domain, LockRecord, LockStore, NodeId, WardenConfig};

#[derive(Args)]
pub struct StatusArgs {
    #[arg(long, short, value_enum, default_value_t)]
    output: OutputFormat,
}

#[derive(Serialize)]
struct StatusReport {
    domain: Domain,
    /// None until the node has run once
    node_id: Option<NodeId>,
    lock: Option<LockInfo>,
}

#[derive(Serialize)]
struct LockInfo {
    holder: NodeId,
    acquired_at: DateTime<Utc>,
    renewed_at: DateTime<Utc>,
    expired: bool,
    held_by_self: bool,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "domain:  {}", self.domain)?;
        match &self.node_id {
            Some(id) => writeln!(f, "node:    {}", id)?,
            None => writeln!(f, "node:    -")?,
        }
        match &self.lock {
            Some(lock) => {
                let suffix = match (lock.held_by_self, lock.expired) {
                    (true, true) => " (this node, expired)",
                    (true, false) => " (this node)",
                    (false, true) => " (expired)",
                    (false, false) => "",
                };
                writeln!(f, "holder:  {}{}", lock.holder, suffix)?;
                writeln!(f, "renewed: {}", lock.renewed_at.to_rfc3339())?;
            }
            None => writeln!(f, "holder:  none")?,
        }
        Ok(())
    }
}

pub async fn status(args: StatusArgs, config: &WardenConfig) -> Result<()> {
    // Do not mint an identity just to report on it
    let node_id = identity::load(&config.node.identity_path()).ok();

    let store = warden_storage::connect(config)?;
    let mut session = store.session();
    let record = session.read(&config.node.domain).await?;

    let report = StatusReport {
        domain: config.node.domain.clone(),
        lock: record.map(|record| lock_info(store.as_ref(), record, node_id.as_ref())),
        node_id,
    };
    output::print(&report, args.output);
    Ok(())
}

fn lock_info(store: &dyn LockStore, record: LockRecord, own: Option<&NodeId>) -> LockInfo {
    LockInfo {
        expired: !store.is_current(&record),
        held_by_self: own.is_some_and(|id| record.is_held_by(id)),
        holder: record.holder,
        acquired_at: record.acquired_at,
        renewed_at: record.renewed_at,
    }
}

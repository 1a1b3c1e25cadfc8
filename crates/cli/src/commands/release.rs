// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Release command

use crate::error::CliError;
use anyhow::Result;
use clap::Args;
use warden_core::clock::elapsed_since;
use warden_core::{identity, LockStore, NodeId, WardenConfig};

#[derive(Args)]
pub struct ReleaseArgs {
    /// Holder to release for (defaults to this node's identity)
    #[arg(long)]
    holder: Option<String>,

    /// Release even if the record is still being renewed
    #[arg(long)]
    force: bool,
}

pub async fn release(args: ReleaseArgs, config: &WardenConfig) -> Result<()> {
    let holder = match args.holder {
        Some(holder) => NodeId::new(holder),
        None => identity::load(&config.node.identity_path())?,
    };
    let domain = &config.node.domain;

    let store = warden_storage::connect(config)?;
    let mut session = store.session();
    let Some(record) = session.read(domain).await? else {
        println!("No lock record for '{}'", domain);
        return Ok(());
    };

    if !record.is_held_by(&holder) {
        let held = elapsed_since(store.now(), record.renewed_at);
        return Err(CliError::lock_held(domain.as_str(), record.holder.as_str(), held.as_secs()).into());
    }
    if store.is_current(&record) && !args.force {
        return Err(CliError::lock_current(domain.as_str(), record.holder.as_str()).into());
    }

    session.release(domain, &holder).await?;
    println!("Released '{}' held by {}", domain, holder);
    Ok(())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node identity command

use anyhow::Result;
use warden_core::{identity, UuidIdGen, WardenConfig};

pub fn node_id(config: &WardenConfig) -> Result<()> {
    let id = identity::load_or_create(&config.node.identity_path(), &UuidIdGen)?;
    println!("{}", id);
    Ok(())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod node_id;
pub mod release;
pub mod run;
pub mod status;

use crate::error::CliError;
use std::path::Path;
use warden_core::WardenConfig;

pub fn load_config(path: &Path) -> Result<WardenConfig, CliError> {
    WardenConfig::load(path).map_err(|e| CliError::config_unusable(path, e))
}

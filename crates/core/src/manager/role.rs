// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node manager roles

use serde::Serialize;

/// Where a node manager is in the failover lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    NotStarted,
    /// Contending for the live lease
    AwaitingLive,
    /// Holding the live lease and serving
    Live,
    /// Live role given up administratively; lease released
    Paused,
    /// Live role lost or crash simulated; lease left to expire
    Crashed,
    /// Standby, waiting for the live node to go away
    BackupWaiting,
    /// Standby serving in replica capacity, without the live lease
    BackupActive,
    /// Returning node waiting for the current live node to hand back
    AwaitingFailback,
    Stopped,
}

impl Role {
    /// Roles from which an election may be entered
    pub const ELECTABLE: [Role; 4] = [
        Role::AwaitingLive,
        Role::AwaitingFailback,
        Role::BackupWaiting,
        Role::BackupActive,
    ];

    pub fn is_electable(&self) -> bool {
        Self::ELECTABLE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::NotStarted => "NOT_STARTED",
            Role::AwaitingLive => "AWAITING_LIVE",
            Role::Live => "LIVE",
            Role::Paused => "PAUSED",
            Role::Crashed => "CRASHED",
            Role::BackupWaiting => "BACKUP_WAITING",
            Role::BackupActive => "BACKUP_ACTIVE",
            Role::AwaitingFailback => "AWAITING_FAILBACK",
            Role::Stopped => "STOPPED",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run command: host a node manager in the foreground
//!
//! Prints one `role: <ROLE>` line per transition on stdout. Exits cleanly on
//! SIGINT/SIGTERM after deactivating and releasing the lease, and with an
//! error when the live lease is lost so a supervisor can restart the node.

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{info, warn};
use warden_core::{
    ActivationCallbacks, HaPolicy, NodeManager, NodeManagerError, Role, WardenConfig,
};

#[derive(Args)]
pub struct RunArgs {
    /// Override the configured HA policy
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Never hand the live role back to a restarted primary
    #[arg(long)]
    no_failback: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Primary,
    Backup,
}

impl From<PolicyArg> for HaPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Primary => HaPolicy::Primary,
            PolicyArg::Backup => HaPolicy::Backup,
        }
    }
}

pub async fn run(args: RunArgs, mut config: WardenConfig) -> Result<()> {
    if let Some(policy) = args.policy {
        config.node.ha_policy = policy.into();
    }
    if args.no_failback {
        config.node.allow_failback = false;
    }
    config.validate()?;

    let store = warden_storage::connect(&config)?;
    let manager = NodeManager::builder(config.node.clone(), store)
        .lease_settings(config.lease.clone())
        .callbacks(
            ActivationCallbacks::new()
                .on_activated(|| info!("accepting clients"))
                .on_de_activate(|| info!("stopped accepting clients")),
        )
        .build();

    // Subscribe before start so no transition is missed
    let mut transitions = manager.transitions();
    manager.start()?;
    info!(node_id = %manager.read_node_id()?, "node manager started");

    let mut election = tokio::spawn(elect(manager.clone()));
    let mut election_done = false;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let outcome: Result<()> = loop {
        tokio::select! {
            transition = transitions.recv() => match transition {
                Ok(transition) => {
                    println!("role: {}", transition.to);
                    if transition.to == Role::Crashed {
                        break Err(NodeManagerError::LeaseLost.into());
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "missed role transitions");
                }
                Err(RecvError::Closed) => break Ok(()),
            },

            result = &mut election, if !election_done => {
                election_done = true;
                match result {
                    Ok(Ok(())) | Ok(Err(NodeManagerError::Interrupted)) => {}
                    Ok(Err(e)) => break Err(e.into()),
                    Err(e) => break Err(e.into()),
                }
            }

            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break Ok(());
            }

            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                break Ok(());
            }
        }
    };

    manager.stop().await;
    if !election_done {
        if let Err(e) = election.await {
            warn!(error = %e, "election task ended abnormally");
        }
    }
    loop {
        match transitions.try_recv() {
            Ok(transition) => println!("role: {}", transition.to),
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    match outcome {
        Ok(()) => Ok(()),
        Err(e) => bail!("node stopped: {:#}", e),
    }
}

/// Contend for the live role according to the node's policy
async fn elect(manager: NodeManager) -> Result<(), NodeManagerError> {
    match manager.ha_policy() {
        HaPolicy::Primary => match manager.start_live_node().await? {
            // Failback disabled and another node is live
            Role::BackupWaiting => manager.await_live_node().await,
            _ => Ok(()),
        },
        HaPolicy::Backup => manager.await_live_node().await,
    }
}

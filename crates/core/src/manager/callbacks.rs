// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activation hooks the broker registers with its node manager

type Hook = Box<dyn Fn() + Send + Sync>;

/// Four ordered hooks run around role transitions.
///
/// On activation: `pre_activate`, then the role becomes LIVE, then
/// `activated`, then the heartbeat starts, then `activation_complete`.
/// The broker must not open client acceptors before `activated` returns.
///
/// `de_activate` runs whenever the node stops being live. On an explicit
/// pause, failback or shutdown it runs before the lease is released. On
/// lease loss it runs as soon as the failed renewal is observed. It never
/// runs before `activated` has returned.
///
/// Hooks run with the manager's activation lock held and must not call back
/// into the manager's role-changing operations.
#[derive(Default)]
pub struct ActivationCallbacks {
    pre_activate: Option<Hook>,
    activated: Option<Hook>,
    de_activate: Option<Hook>,
    activation_complete: Option<Hook>,
}

impl ActivationCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_pre_activate(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.pre_activate = Some(Box::new(hook));
        self
    }

    pub fn on_activated(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.activated = Some(Box::new(hook));
        self
    }

    pub fn on_de_activate(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.de_activate = Some(Box::new(hook));
        self
    }

    pub fn on_activation_complete(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.activation_complete = Some(Box::new(hook));
        self
    }

    pub(crate) fn pre_activate(&self) {
        run(&self.pre_activate);
    }

    pub(crate) fn activated(&self) {
        run(&self.activated);
    }

    pub(crate) fn de_activate(&self) {
        run(&self.de_activate);
    }

    pub(crate) fn activation_complete(&self) {
        run(&self.activation_complete);
    }
}

fn run(hook: &Option<Hook>) {
    if let Some(hook) = hook {
        hook();
    }
}

impl std::fmt::Debug for ActivationCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationCallbacks")
            .field("pre_activate", &self.pre_activate.is_some())
            .field("activated", &self.activated.is_some())
            .field("de_activate", &self.de_activate.is_some())
            .field("activation_complete", &self.activation_complete.is_some())
            .finish()
    }
}

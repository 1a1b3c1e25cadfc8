// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-friendly error display with context and suggestions.

use std::fmt;
use std::path::Path;

/// Error with context and recovery suggestions for user-friendly display.
#[derive(Debug)]
pub struct CliError {
    /// What went wrong
    pub message: String,
    /// Why it might have happened
    pub context: Vec<String>,
    /// How to fix it
    pub suggestions: Vec<String>,
    /// Original error if any
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
            source: None,
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            for ctx in &self.context {
                writeln!(f, "  -> {}", ctx)?;
            }
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            writeln!(f, "suggestions:")?;
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Common error builders for typical failure scenarios.
impl CliError {
    /// The configuration file could not be loaded
    pub fn config_unusable<E: std::error::Error + Send + Sync + 'static>(
        path: &Path,
        source: E,
    ) -> Self {
        CliError::new(format!("Cannot use configuration '{}'", path.display()))
            .with_context(source.to_string())
            .with_suggestion("Pass the right file with: wardenctl --config <path>")
            .with_suggestion("Durations are humantime strings, e.g. retry_interval = \"1s\"")
            .with_source(source)
    }

    /// The lock is held by a different node than the one named
    pub fn lock_held(domain: &str, holder: &str, held_secs: u64) -> Self {
        CliError::new(format!("Lock '{}' is not held by the given node", domain))
            .with_context(format!("Lock is currently held by '{}'", holder))
            .with_context(format!("Lock was last renewed {} seconds ago", held_secs))
            .with_suggestion("Check the current holder: wardenctl status")
            .with_suggestion(format!(
                "Release on behalf of the holder: wardenctl release --holder {}",
                holder
            ))
    }

    /// The lock record is still being renewed
    pub fn lock_current(domain: &str, holder: &str) -> Self {
        CliError::new(format!("Lock '{}' is still being renewed by '{}'", domain, holder))
            .with_context("Releasing a live node's lock lets a backup activate alongside it")
            .with_suggestion("Stop the live node first")
            .with_suggestion("Override with: wardenctl release --force")
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

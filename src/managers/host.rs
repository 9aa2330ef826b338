//! Hooks into the application whose files are being backed up.
//!
//! The backup pipeline only needs a few things from its host: a way to hold
//! off restarts while a restore rewrites files, a way to make the host pick
//! up restored files, and somewhere to show what is going on.

use crate::utils::command::run_shell_command;
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

pub trait HostHooks: Send + Sync {
    /// `false` blocks host restarts until a matching `true`
    fn set_restart_ready(&self, ready: bool);

    /// Ask the host to reload its configuration from disk
    fn reload_configuration(&self) -> Result<()>;

    /// Set the user-visible status line; empty clears it
    fn set_status_message(&self, message: &str);

    fn status_message(&self) -> String;
}

/// Blocks host restarts while alive
pub struct RestartSuspension<'a> {
    host: &'a dyn HostHooks,
}

impl<'a> RestartSuspension<'a> {
    pub fn new(host: &'a dyn HostHooks) -> Self {
        host.set_restart_ready(false);
        Self { host }
    }
}

impl Drop for RestartSuspension<'_> {
    fn drop(&mut self) {
        self.host.set_restart_ready(true);
    }
}

/// Shows a status message while alive and clears it on drop
pub struct StatusMessage<'a> {
    host: &'a dyn HostHooks,
}

impl<'a> StatusMessage<'a> {
    pub fn new(host: &'a dyn HostHooks, message: &str) -> Self {
        host.set_status_message(message);
        Self { host }
    }
}

impl Drop for StatusMessage<'_> {
    fn drop(&mut self) {
        self.host.set_status_message("");
    }
}

/// Host used by the command line: reloads through a shell command
#[derive(Debug, Default)]
pub struct CliHost {
    reload_command: Option<String>,
    restart_blockers: AtomicUsize,
    status: Mutex<String>,
}

impl CliHost {
    pub fn new(reload_command: Option<String>) -> Self {
        Self {
            reload_command,
            ..Default::default()
        }
    }

    /// True while at least one restore holds off restarts
    pub fn restart_blocked(&self) -> bool {
        self.restart_blockers.load(Ordering::Acquire) > 0
    }
}

impl HostHooks for CliHost {
    fn set_restart_ready(&self, ready: bool) {
        if ready {
            let _ = self
                .restart_blockers
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        } else {
            self.restart_blockers.fetch_add(1, Ordering::AcqRel);
        }
        debug!("Restart blockers: {}", self.restart_blockers.load(Ordering::Acquire));
    }

    fn reload_configuration(&self) -> Result<()> {
        match self.reload_command {
            Some(ref command) => {
                info!("Reloading host configuration");
                run_shell_command(command, None)?;
                Ok(())
            }
            None => {
                debug!("No reload command configured");
                Ok(())
            }
        }
    }

    fn set_status_message(&self, message: &str) {
        if !message.is_empty() {
            info!("{}", message);
        }
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = message.to_string();
    }

    fn status_message(&self) -> String {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Host that ignores every hook
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHost;

impl HostHooks for NoopHost {
    fn set_restart_ready(&self, _ready: bool) {}

    fn reload_configuration(&self) -> Result<()> {
        Ok(())
    }

    fn set_status_message(&self, _message: &str) {}

    fn status_message(&self) -> String {
        String::new()
    }
}

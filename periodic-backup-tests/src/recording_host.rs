//! Host hooks that remember every call

use parking_lot::Mutex;
use periodic_backup::managers::host::HostHooks;
use std::sync::Arc;

/// Recorded hook call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    RestartReady(bool),
    Reload,
    Status(String),
}

/// Mock host for testing
#[derive(Clone, Default)]
pub struct RecordingHost {
    /// Recorded hook calls, in order
    pub events: Arc<Mutex<Vec<HostEvent>>>,
    /// Whether reload_configuration should fail
    pub should_fail_reload: Arc<Mutex<bool>>,
    status: Arc<Mutex<String>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure reload_configuration to fail
    pub fn with_failing_reload(self) -> Self {
        *self.should_fail_reload.lock() = true;
        self
    }

    /// Get all recorded events
    pub fn get_events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    /// Every status message set, in order
    pub fn status_history(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                HostEvent::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn reload_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, HostEvent::Reload))
            .count()
    }

    /// Net number of restart blocks still held
    pub fn open_restart_blocks(&self) -> i64 {
        self.events.lock().iter().fold(0, |n, e| match e {
            HostEvent::RestartReady(false) => n + 1,
            HostEvent::RestartReady(true) => n - 1,
            _ => n,
        })
    }
}

impl HostHooks for RecordingHost {
    fn set_restart_ready(&self, ready: bool) {
        self.events.lock().push(HostEvent::RestartReady(ready));
    }

    fn reload_configuration(&self) -> anyhow::Result<()> {
        self.events.lock().push(HostEvent::Reload);
        if *self.should_fail_reload.lock() {
            anyhow::bail!("Mock reload failure");
        }
        Ok(())
    }

    fn set_status_message(&self, message: &str) {
        self.events.lock().push(HostEvent::Status(message.to_string()));
        *self.status.lock() = message.to_string();
    }

    fn status_message(&self) -> String {
        self.status.lock().clone()
    }
}

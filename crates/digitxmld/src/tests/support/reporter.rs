//! Test double for [`HealthReporter`] that records lifecycle events.

use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use digitxml_config::Config;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::safety_harness::Backup;

/// Health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// The start-up document was opened.
    SessionLoaded(Utf8PathBuf),
    /// A backup landed in the ephemeral fallback.
    BackupFellBack(Utf8PathBuf),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn session_loaded(&self, path: &Utf8Path) {
        self.record(HealthEvent::SessionLoaded(path.to_path_buf()));
    }

    fn backup_fell_back(&self, backup: &Backup) {
        self.record(HealthEvent::BackupFellBack(backup.original_path().to_path_buf()));
    }
}

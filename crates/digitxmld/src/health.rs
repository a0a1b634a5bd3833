//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use camino::Utf8Path;
use digitxml_config::Config;

use crate::bootstrap::BootstrapError;
use crate::safety_harness::Backup;

const HEALTH_TARGET: &str = "digitxmld::health";

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked when the start-up document has been loaded.
    fn session_loaded(&self, path: &Utf8Path);

    /// Invoked for each backup stored in the ephemeral fallback; primary
    /// snapshots are never reported.
    fn backup_fell_back(&self, backup: &Backup);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn session_loaded(&self, path: &Utf8Path) {
        (**self).session_loaded(path);
    }

    fn backup_fell_back(&self, backup: &Backup) {
        (**self).backup_fell_back(backup);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            data = %config.xml_data_path(),
            schema = config.xml_schema_path().map_or("none", Utf8Path::as_str),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn session_loaded(&self, path: &Utf8Path) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "session_loaded",
            %path,
            "start-up document loaded"
        );
    }

    fn backup_fell_back(&self, backup: &Backup) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "backup_fell_back",
            original = %backup.original_path(),
            location = %backup.location(),
            "backup stored in ephemeral fallback"
        );
    }
}

//! Structured telemetry initialisation for the daemon.
//!
//! Events go to stderr and, when the log directory can be created, are also
//! appended to the log file inside it. Stdout carries tool responses only.

use std::fs::{self, OpenOptions};
use std::io::{self, IsTerminal};
use std::sync::Arc;

use camino::Utf8Path;
use digitxml_config::{Config, LogFormat, log_file_in};
use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent: only the first invocation installs the
/// global subscriber. `log_dir` is the resolved log directory; when it
/// cannot be created or opened, logging continues on stderr alone.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter is invalid or another
/// subscriber is already installed.
pub fn initialise(
    config: &Config,
    log_dir: Option<&Utf8Path>,
) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config, log_dir))
        .map(|()| TelemetryHandle)
}

fn install_subscriber(config: &Config, log_dir: Option<&Utf8Path>) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let log_file = log_dir.and_then(|dir| {
        fs::create_dir_all(dir).ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_in(dir))
            .ok()
    });
    let ansi = log_file.is_none() && io::stderr().is_terminal();
    let writer = match log_file {
        Some(file) => BoxMakeWriter::new(io::stderr.and(Arc::new(file))),
        None => BoxMakeWriter::new(io::stderr),
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

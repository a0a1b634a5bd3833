//! Daemon bootstrap orchestration.
//!
//! Loads configuration, anchors it at the installation root, installs
//! telemetry, assembles the commit pipeline over the configured toolchain and
//! opens the start-up document when one is configured.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use digitxml_config::{Config, ConfigError, LogFormat, ResolveError, WorkspaceResolver};
use digitxml_engine::{CommandValidator, ToolchainEngine};
use thiserror::Error;
use tracing::warn;

use crate::dispatch::{self, DispatchError, ToolRouter};
use crate::health::HealthReporter;
use crate::safety_harness::{
    ApplyPipeline, BackupStore, MonotonicClock, TransformationExecutor, ValidationGate,
};
use crate::session::WorkspaceContext;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::workspace::WorkspaceManager;

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration exists but is unusable.
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Loader reading a JSON file relative to the installation root, with
/// command-line overrides for the logging fields.
#[derive(Debug, Clone)]
pub struct FileConfigLoader {
    root: Utf8PathBuf,
    path: Utf8PathBuf,
    log_filter: Option<String>,
    log_format: Option<LogFormat>,
}

impl FileConfigLoader {
    /// Creates a loader for `path`, interpreted against `root` when relative.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            path: path.into(),
            log_filter: None,
            log_format: None,
        }
    }

    /// Overrides the configured log filter.
    #[must_use]
    pub fn with_log_filter(mut self, filter: Option<String>) -> Self {
        self.log_filter = filter;
        self
    }

    /// Overrides the configured log format.
    #[must_use]
    pub const fn with_log_format(mut self, format: Option<LogFormat>) -> Self {
        self.log_format = format;
        self
    }
}

impl ConfigLoader for FileConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        let mut config = Config::load(&self.root, &self.path)?;
        if let Some(filter) = &self.log_filter {
            config = config.with_log_filter(filter.clone());
        }
        if let Some(format) = self.log_format {
            config = config.with_log_format(format);
        }
        Ok(config)
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: ConfigError,
    },
    /// Configured paths could not be anchored at the installation root.
    #[error("failed to resolve workspace paths: {source}")]
    Workspace {
        /// Underlying resolver error.
        #[source]
        source: ResolveError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    router: ToolRouter,
    context: WorkspaceContext,
    telemetry: TelemetryHandle,
    cancel: Arc<AtomicBool>,
}

impl Daemon {
    /// Accessor for the loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Session state the daemon serves requests against.
    #[must_use]
    pub const fn context(&self) -> &WorkspaceContext {
        &self.context
    }

    /// Flag that stops the serve loop and cancels running batches.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Serves tool requests from `input` until it is exhausted or the cancel
    /// flag is raised.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Io`] when the streams fail.
    pub fn serve<R: BufRead, W: Write>(&mut self, input: R, output: W) -> Result<(), DispatchError> {
        dispatch::serve(&self.router, &mut self.context, input, output, &self.cancel)
    }
}

/// Assembles the workspace manager for a resolved configuration.
#[must_use]
pub fn build_manager(
    config: &Config,
    resolver: WorkspaceResolver,
    reporter: Arc<dyn HealthReporter>,
) -> WorkspaceManager {
    let clock = Arc::new(MonotonicClock::default());
    let toolchain = config.toolchain().clone();
    let pipeline = ApplyPipeline::new(
        BackupStore::new(resolver.backup_dir().to_path_buf(), Arc::clone(&clock)),
        ValidationGate::new(
            Arc::new(CommandValidator::new(toolchain.clone())),
            resolver.schema_path().map(Utf8Path::to_path_buf),
        ),
        TransformationExecutor::new(Arc::new(ToolchainEngine::new(toolchain))),
        clock,
    )
    .with_unavailable_policy(config.unavailable_validator());
    WorkspaceManager::new(resolver, pipeline)
        .with_lock_timeout(config.lock_timeout_ms().map(Duration::from_millis))
        .with_reporter(reporter)
}

/// Bootstraps the daemon anchored at `root` using the supplied
/// collaborators.
///
/// A start-up document that cannot be opened is logged and the daemon starts
/// with no active session.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration, path resolution or
/// telemetry fails.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    root: &Utf8Path,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let resolver = match WorkspaceResolver::new(root, &config) {
        Ok(resolver) => resolver,
        Err(source) => {
            let error = BootstrapError::Workspace { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config, Some(resolver.log_dir())) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let default_document = resolver.default_document().map(Utf8Path::to_path_buf);
    let manager = build_manager(&config, resolver, Arc::clone(&reporter));
    let mut context = WorkspaceContext::new();
    if let Some(path) = default_document {
        match manager.load_or_switch(&mut context, path.as_str()) {
            Ok(_) => reporter.session_loaded(&path),
            Err(error) => warn!(
                target: "digitxmld::bootstrap",
                %path,
                %error,
                "start-up document could not be opened"
            ),
        }
    }

    reporter.bootstrap_succeeded(&config);
    let cancel = Arc::new(AtomicBool::new(false));
    Ok(Daemon {
        config,
        router: ToolRouter::new(manager, Arc::clone(&cancel)),
        context,
        telemetry,
        cancel,
    })
}

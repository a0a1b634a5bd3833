//! Workspace and session manager.
//!
//! The manager is the façade dispatch talks to. It owns no session state:
//! callers pass the [`WorkspaceContext`] they operate on, so two contexts
//! never observe each other's documents. Read-only operations go straight
//! to the executor or the gate; mutations go through the
//! [`ApplyPipeline`].

mod mutations;
mod queries;

use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use digitxml_config::{WorkspaceResolver, is_pattern};
use digitxml_engine::XmlDocument;
use serde::Serialize;
use tracing::{info, warn};

use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::safety_harness::{ApplyOptions, ApplyPipeline, Backup, StorageKind, WorkspaceError};
use crate::session::{DocumentSession, SessionDescriptor, WorkspaceContext};

pub use mutations::{PreviewReport, TransformReport};
pub use queries::{CheckResult, IrregularityCheck, IrregularityReport, QueryReport, SummaryReport};

const WORKSPACE_TARGET: &str = "digitxmld::workspace";

/// Result of closing the active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseReport {
    /// Document that was active, if any.
    pub closed: Option<Utf8PathBuf>,
    /// Whether uncommitted in-memory changes were dropped.
    pub discarded_changes: bool,
}

/// Top-level workspace operations.
pub struct WorkspaceManager {
    resolver: WorkspaceResolver,
    pipeline: ApplyPipeline,
    lock_timeout: Option<Duration>,
    reporter: Arc<dyn HealthReporter>,
}

impl WorkspaceManager {
    /// Creates a manager over `resolver` and `pipeline`.
    #[must_use]
    pub fn new(resolver: WorkspaceResolver, pipeline: ApplyPipeline) -> Self {
        Self {
            resolver,
            pipeline,
            lock_timeout: None,
            reporter: Arc::new(StructuredHealthReporter::new()),
        }
    }

    /// Replaces the health reporter notified about backup fallbacks.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Sets the default per-path lock timeout for mutations.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Path resolver.
    #[must_use]
    pub const fn resolver(&self) -> &WorkspaceResolver {
        &self.resolver
    }

    /// Commit pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &ApplyPipeline {
        &self.pipeline
    }

    /// Options for a mutation with the manager's lock timeout.
    #[must_use]
    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            lock_timeout: self.lock_timeout,
            ..ApplyOptions::default()
        }
    }

    /// Loads `requested` (a path or a glob pattern) as the active document.
    ///
    /// Any unsaved changes in the previous session are discarded, never
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::WorkspaceAmbiguous`] when a pattern matches
    /// zero or several files, [`WorkspaceError::PathNotFound`] for a missing
    /// path, and load errors from [`DocumentSession::load`].
    pub fn load_or_switch(
        &self,
        context: &mut WorkspaceContext,
        requested: &str,
    ) -> Result<SessionDescriptor, WorkspaceError> {
        let path = self.resolve_single(requested)?;
        let session = DocumentSession::load(&path)?;
        let descriptor = session.descriptor();
        if let Some(previous) = context.replace(session) {
            if previous.is_dirty() {
                warn!(
                    target: WORKSPACE_TARGET,
                    previous = %previous.source_path(),
                    "discarding uncommitted changes on switch"
                );
            }
        }
        info!(target: WORKSPACE_TARGET, %path, "switched document");
        Ok(descriptor)
    }

    /// Re-reads the active document from disk into a fresh session.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::SessionNotLoaded`] in the empty state and
    /// load errors from [`DocumentSession::load`].
    pub fn reload(
        &self,
        context: &mut WorkspaceContext,
    ) -> Result<SessionDescriptor, WorkspaceError> {
        let path = context.current()?.source_path().to_path_buf();
        let session = DocumentSession::load(&path)?;
        let descriptor = session.descriptor();
        context.replace(session);
        info!(target: WORKSPACE_TARGET, %path, "reloaded document");
        Ok(descriptor)
    }

    /// Drops the active session without writing it.
    pub fn close(&self, context: &mut WorkspaceContext) -> CloseReport {
        let closed = context.close();
        if let Some(session) = &closed {
            info!(target: WORKSPACE_TARGET, path = %session.source_path(), "closed document");
        }
        CloseReport {
            discarded_changes: closed.as_ref().is_some_and(DocumentSession::is_dirty),
            closed: closed.map(|session| session.source_path().to_path_buf()),
        }
    }

    /// Describes the active session.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::SessionNotLoaded`] in the empty state.
    pub fn current(&self, context: &WorkspaceContext) -> Result<SessionDescriptor, WorkspaceError> {
        Ok(context.current()?.descriptor())
    }

    /// Lists workspace files matching `pattern` (all XML files by default).
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::InvalidRequest`] for malformed patterns.
    pub fn list_workspace_files(
        &self,
        pattern: Option<&str>,
    ) -> Result<Vec<Utf8PathBuf>, WorkspaceError> {
        Ok(self.resolver.discover(pattern)?)
    }

    fn resolve_single(&self, requested: &str) -> Result<Utf8PathBuf, WorkspaceError> {
        if !is_pattern(requested) {
            return Ok(self.resolver.locate(requested)?);
        }
        let mut candidates = self.resolver.discover(Some(requested))?;
        if candidates.len() == 1 {
            if let Some(only) = candidates.pop() {
                return Ok(only);
            }
        }
        Err(WorkspaceError::WorkspaceAmbiguous {
            pattern: requested.to_owned(),
            candidates,
        })
    }

    /// Resolves an operation target: the active session when `requested` is
    /// `None`, otherwise a workspace file. The session tree is used whenever
    /// the target is the session's own file.
    fn target(
        &self,
        context: &WorkspaceContext,
        requested: Option<&str>,
    ) -> Result<(Utf8PathBuf, XmlDocument), WorkspaceError> {
        let Some(requested) = requested else {
            let session = context.current()?;
            return Ok((session.source_path().to_path_buf(), session.tree().clone()));
        };
        let path = self.resolver.locate(requested)?;
        if let Some(session) = context.session().filter(|session| session.source_path() == path) {
            return Ok((path, session.tree().clone()));
        }
        let document = crate::safety_harness::load_document(&path)?;
        Ok((path, document))
    }

    /// Resolves a target path without loading it.
    fn target_path(
        &self,
        context: &WorkspaceContext,
        requested: Option<&str>,
    ) -> Result<Utf8PathBuf, WorkspaceError> {
        match requested {
            None => Ok(context.current()?.source_path().to_path_buf()),
            Some(requested) => Ok(self.resolver.locate(requested)?),
        }
    }
}

impl WorkspaceManager {
    fn report_backup(&self, backup: Option<&Backup>) {
        let fell_back = backup.filter(|backup| backup.storage() == StorageKind::EphemeralFallback);
        if let Some(backup) = fell_back {
            self.reporter.backup_fell_back(backup);
        }
    }
}

/// Updates the session after a commit to `path`.
fn refresh_session(context: &mut WorkspaceContext, path: &Utf8Path, document: &XmlDocument) {
    if let Some(session) = context
        .session_mut()
        .filter(|session| session.source_path() == path)
    {
        session.mark_committed(document.clone());
    }
}

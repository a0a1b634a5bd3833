//! Workspace operations that may write.

use std::sync::atomic::AtomicBool;

use camino::Utf8PathBuf;
use digitxml_engine::Script;
use serde::Serialize;
use similar::TextDiff;
use tracing::info;

use super::{WORKSPACE_TARGET, WorkspaceManager, refresh_session};
use crate::safety_harness::{
    ApplyOptions, Backup, BatchReport, CommitOutcome, CorrectionBatch, CorrectionOutcome,
    WorkspaceError,
};
use crate::session::WorkspaceContext;

/// Uncommitted transform result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewReport {
    /// Document the transform ran against.
    pub path: Utf8PathBuf,
    /// Whether the candidate differs from the current tree.
    pub changed: bool,
    /// Unified line diff from the current tree to the candidate.
    pub diff: String,
}

/// Result of a transform request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TransformReport {
    /// The candidate was only compared with the current tree.
    Preview(PreviewReport),
    /// The candidate went through the commit pipeline.
    Commit(CommitOutcome),
}

impl WorkspaceManager {
    /// Transforms a target, either previewing the change or committing it.
    ///
    /// # Errors
    ///
    /// Returns target resolution errors, engine errors, and the errors of
    /// [`WorkspaceManager::apply_transformation`] when committing.
    pub fn transform(
        &self,
        context: &mut WorkspaceContext,
        target: Option<&str>,
        script: &Script,
        commit: bool,
    ) -> Result<TransformReport, WorkspaceError> {
        if commit {
            return self
                .apply_transformation(context, target, script, self.apply_options())
                .map(TransformReport::Commit);
        }
        let (path, document) = self.target(context, target)?;
        let candidate = self.pipeline.executor().transform(&document, script)?;
        let current = document.to_xml_string();
        let proposed = candidate.to_xml_string();
        let old_header = format!("a/{path}");
        let new_header = format!("b/{path}");
        let diff = TextDiff::from_lines(&current, &proposed)
            .unified_diff()
            .context_radius(3)
            .header(&old_header, &new_header)
            .to_string();
        Ok(TransformReport::Preview(PreviewReport {
            path,
            changed: current != proposed,
            diff,
        }))
    }

    /// Runs the commit pipeline against a target and refreshes the session
    /// when the target is the active document.
    ///
    /// # Errors
    ///
    /// Returns target resolution errors and the errors of
    /// [`crate::safety_harness::ApplyPipeline::apply`].
    pub fn apply_transformation(
        &self,
        context: &mut WorkspaceContext,
        target: Option<&str>,
        script: &Script,
        options: ApplyOptions,
    ) -> Result<CommitOutcome, WorkspaceError> {
        let path = self.target_path(context, target)?;
        let outcome = match context.session().filter(|session| session.source_path() == path) {
            Some(session) => self.pipeline.apply(&path, session.tree(), script, &options)?,
            None => self.pipeline.apply_to_path(&path, script, &options)?,
        };
        self.report_backup(outcome.backup());
        if let CommitOutcome::Committed { document, .. } = &outcome {
            refresh_session(context, &path, document);
        }
        Ok(outcome)
    }

    /// Runs a correction batch, refreshing the session for every committed
    /// item that targets the active document.
    pub fn batch(
        &self,
        context: &mut WorkspaceContext,
        batch: &CorrectionBatch,
        cancel: &AtomicBool,
    ) -> BatchReport {
        let report = self.pipeline.apply_batch(
            batch,
            &self.apply_options(),
            cancel,
            &mut |path, document| refresh_session(context, path, document),
        );
        for outcome in &report.outcomes {
            if let CorrectionOutcome::Committed { backup, .. } = outcome {
                self.report_backup(backup.as_ref());
            }
        }
        report
    }

    /// Snapshots a target's on-disk bytes.
    ///
    /// # Errors
    ///
    /// Returns target resolution errors, [`WorkspaceError::Busy`] when the
    /// path lock times out, and snapshot errors.
    pub fn create_backup(
        &self,
        context: &WorkspaceContext,
        target: Option<&str>,
    ) -> Result<Backup, WorkspaceError> {
        let path = self.target_path(context, target)?;
        let _guard = self.pipeline.locks().acquire(&path, self.lock_timeout)?;
        let backup = self.pipeline.store().snapshot(&path)?;
        info!(
            target: WORKSPACE_TARGET,
            %path,
            backup = %backup.location(),
            storage = ?backup.storage(),
            "backup created"
        );
        self.report_backup(Some(&backup));
        Ok(backup)
    }
}

//! Single-document apply/commit pipeline.
//!
//! Every mutation runs the same sequence under a per-path lock:
//!
//! 1. Optionally validate the current on-disk bytes.
//! 2. Snapshot the current bytes, or record that no prior file exists.
//! 3. Transform the input document into a candidate.
//! 4. Optionally validate the candidate; an invalid candidate is rejected
//!    and never written.
//! 5. Write the candidate atomically.
//! 6. If the write fails, restore the snapshot.
//!
//! A commit timestamp is always taken after the snapshot timestamp from the
//! same monotonic clock.

use std::fs;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use digitxml_config::UnavailableValidatorPolicy;
use digitxml_engine::{Diagnostic, Script, ScriptKind, XmlDocument};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use super::backup::{Backup, BackupStore};
use super::clock::MonotonicClock;
use super::commit::{AtomicWriter, DocumentWriter, restore};
use super::error::WorkspaceError;
use super::executor::TransformationExecutor;
use super::gate::{ValidationGate, ValidationOutcome, ValidationResult};
use super::locks::PathLocks;

const PIPELINE_TARGET: &str = "digitxmld::pipeline";

/// Per-request knobs for [`ApplyPipeline::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Validate the current bytes before changing anything.
    pub validate_before: bool,
    /// Abort with [`WorkspaceError::PreconditionInvalid`] when the
    /// pre-change validation fails. Only meaningful with `validate_before`.
    pub require_prior_validity: bool,
    /// Validate the candidate before writing it.
    pub validate_after: bool,
    /// How long to wait for the per-path lock; `None` waits indefinitely.
    pub lock_timeout: Option<Duration>,
    /// Operator-supplied note logged with the commit.
    pub description: Option<String>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            validate_before: false,
            require_prior_validity: false,
            validate_after: true,
            lock_timeout: None,
            description: None,
        }
    }
}

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    /// The candidate was written to its path.
    Committed {
        /// Written file.
        path: Utf8PathBuf,
        /// Snapshot of the previous bytes; `None` for a first-ever write.
        backup: Option<Backup>,
        /// Moment of the write, always after the snapshot timestamp.
        #[serde(with = "time::serde::rfc3339")]
        committed_at: OffsetDateTime,
        /// Post-transform validation, when it ran.
        #[serde(skip_serializing_if = "Option::is_none")]
        validation: Option<ValidationResult>,
        /// Non-fatal conditions such as a soft-passed validator outage.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
        /// The committed tree.
        #[serde(skip)]
        document: XmlDocument,
    },
    /// The candidate failed validation; nothing was written.
    Rejected {
        /// Untouched file.
        path: Utf8PathBuf,
        /// Snapshot taken before the transform; kept as evidence.
        backup: Option<Backup>,
        /// Validator diagnostics.
        diagnostics: Vec<Diagnostic>,
    },
    /// The write failed and the previous state was restored.
    Failed {
        /// Target file.
        path: Utf8PathBuf,
        /// Snapshot used for the restore.
        backup: Option<Backup>,
        /// Description of the write failure.
        reason: String,
        /// Whether the restore itself succeeded.
        restored: bool,
    },
}

impl CommitOutcome {
    /// Target path of the run.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::Committed { path, .. } | Self::Rejected { path, .. } | Self::Failed { path, .. } => {
                path
            }
        }
    }

    /// Snapshot taken by the run, if any.
    #[must_use]
    pub const fn backup(&self) -> Option<&Backup> {
        match self {
            Self::Committed { backup, .. }
            | Self::Rejected { backup, .. }
            | Self::Failed { backup, .. } => backup.as_ref(),
        }
    }

    /// Returns true when the candidate was written.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Orchestrates backup, transform, validation and write for one document.
pub struct ApplyPipeline {
    store: BackupStore,
    gate: ValidationGate,
    executor: TransformationExecutor,
    locks: PathLocks,
    writer: Box<dyn DocumentWriter>,
    policy: UnavailableValidatorPolicy,
    clock: Arc<MonotonicClock>,
}

impl ApplyPipeline {
    /// Builds a pipeline writing atomically with the soft-pass policy.
    ///
    /// `clock` must be the clock `store` stamps snapshots with.
    #[must_use]
    pub fn new(
        store: BackupStore,
        gate: ValidationGate,
        executor: TransformationExecutor,
        clock: Arc<MonotonicClock>,
    ) -> Self {
        Self {
            store,
            gate,
            executor,
            locks: PathLocks::new(),
            writer: Box::new(AtomicWriter),
            policy: UnavailableValidatorPolicy::default(),
            clock,
        }
    }

    /// Replaces the document writer.
    #[must_use]
    pub fn with_writer(mut self, writer: Box<dyn DocumentWriter>) -> Self {
        self.writer = writer;
        self
    }

    /// Sets how a validator outage is treated.
    #[must_use]
    pub const fn with_unavailable_policy(mut self, policy: UnavailableValidatorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Snapshot store shared with explicit backup requests.
    #[must_use]
    pub const fn store(&self) -> &BackupStore {
        &self.store
    }

    /// Validation gate.
    #[must_use]
    pub const fn gate(&self) -> &ValidationGate {
        &self.gate
    }

    /// Script executor.
    #[must_use]
    pub const fn executor(&self) -> &TransformationExecutor {
        &self.executor
    }

    /// Per-path locks.
    #[must_use]
    pub const fn locks(&self) -> &PathLocks {
        &self.locks
    }

    /// Transforms `input` and commits the result to `path`.
    ///
    /// Rejected candidates and failed writes are reported as outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::InvalidRequest`] for query scripts,
    /// [`WorkspaceError::Busy`] when the lock times out,
    /// [`WorkspaceError::PreconditionInvalid`] when prior validity is
    /// required and absent, [`WorkspaceError::BackupUnavailable`] when no
    /// snapshot can be stored, and engine errors from the transform.
    pub fn apply(
        &self,
        path: &Utf8Path,
        input: &XmlDocument,
        script: &Script,
        options: &ApplyOptions,
    ) -> Result<CommitOutcome, WorkspaceError> {
        ensure_committable(script)?;
        let _guard = self.locks.acquire(path, options.lock_timeout)?;
        self.apply_locked(path, input, script, options)
    }

    /// Loads `path` from disk and applies `script` to it.
    ///
    /// The document is read only after the path lock is held, so the
    /// transform, the snapshot and the write all see the same bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::SourceUnreadable`] or
    /// [`WorkspaceError::DocumentMalformed`] when the file cannot be loaded,
    /// plus the errors of [`ApplyPipeline::apply`].
    pub fn apply_to_path(
        &self,
        path: &Utf8Path,
        script: &Script,
        options: &ApplyOptions,
    ) -> Result<CommitOutcome, WorkspaceError> {
        ensure_committable(script)?;
        let _guard = self.locks.acquire(path, options.lock_timeout)?;
        let input = load_document(path)?;
        self.apply_locked(path, &input, script, options)
    }

    /// Runs the commit sequence; the caller holds the lock for `path`.
    fn apply_locked(
        &self,
        path: &Utf8Path,
        input: &XmlDocument,
        script: &Script,
        options: &ApplyOptions,
    ) -> Result<CommitOutcome, WorkspaceError> {
        info!(
            target: PIPELINE_TARGET,
            %path,
            language = script.language(),
            description = options.description.as_deref().unwrap_or(""),
            "applying transformation"
        );

        if options.validate_before {
            self.check_prior_validity(path, input, options)?;
        }

        let backup = self.store.snapshot_if_present(path)?;
        let candidate = self.executor.transform(input, script)?;

        let mut warnings = Vec::new();
        let validation = if options.validate_after {
            let result = self.gate.validate(&candidate);
            if let Some(diagnostics) = self.rejection(&result, &mut warnings) {
                warn!(
                    target: PIPELINE_TARGET,
                    %path,
                    diagnostics = diagnostics.len(),
                    "candidate rejected by validation"
                );
                return Ok(CommitOutcome::Rejected {
                    path: path.to_path_buf(),
                    backup,
                    diagnostics,
                });
            }
            Some(result)
        } else {
            None
        };

        let bytes = candidate.to_bytes();
        let committed_at = self.clock.tick();
        if let Err(write_error) = self.writer.write(path, &bytes) {
            error!(target: PIPELINE_TARGET, %path, error = %write_error, "write failed");
            let restored = restore(path, backup.as_ref()).is_ok();
            return Ok(CommitOutcome::Failed {
                path: path.to_path_buf(),
                backup,
                reason: WorkspaceError::io(path, &write_error).to_string(),
                restored,
            });
        }

        info!(
            target: PIPELINE_TARGET,
            %path,
            backup = backup.as_ref().map_or("none", |backup| backup.location().as_str()),
            bytes = bytes.len(),
            "committed"
        );
        Ok(CommitOutcome::Committed {
            path: path.to_path_buf(),
            backup,
            committed_at,
            validation,
            warnings,
            document: candidate,
        })
    }

    /// Validates the bytes currently stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::SourceUnreadable`] when the file cannot be
    /// read.
    pub fn validate_path(&self, path: &Utf8Path) -> Result<ValidationResult, WorkspaceError> {
        let bytes = fs::read(path).map_err(|error| WorkspaceError::source_unreadable(path, &error))?;
        Ok(self.gate.validate_bytes(&bytes))
    }

    fn check_prior_validity(
        &self,
        path: &Utf8Path,
        input: &XmlDocument,
        options: &ApplyOptions,
    ) -> Result<(), WorkspaceError> {
        let prior = match fs::read(path) {
            Ok(bytes) => self.gate.validate_bytes(&bytes),
            Err(error) if error.kind() == io::ErrorKind::NotFound => self.gate.validate(input),
            Err(error) => return Err(WorkspaceError::source_unreadable(path, &error)),
        };
        if prior.outcome() != ValidationOutcome::Invalid {
            return Ok(());
        }
        warn!(target: PIPELINE_TARGET, %path, "document invalid before change");
        if options.require_prior_validity {
            return Err(WorkspaceError::PreconditionInvalid {
                path: path.to_path_buf(),
                diagnostics: prior.into_diagnostics(),
            });
        }
        Ok(())
    }

    /// Returns the diagnostics to reject with, or `None` to proceed.
    fn rejection(
        &self,
        result: &ValidationResult,
        warnings: &mut Vec<String>,
    ) -> Option<Vec<Diagnostic>> {
        match result.outcome() {
            ValidationOutcome::Valid => None,
            ValidationOutcome::Invalid => Some(result.diagnostics().to_vec()),
            ValidationOutcome::ValidatorUnavailable => {
                let reason = result.reason().unwrap_or("validator unavailable");
                match self.policy {
                    UnavailableValidatorPolicy::Reject => Some(vec![Diagnostic::new(format!(
                        "no validation verdict: {reason}"
                    ))]),
                    UnavailableValidatorPolicy::SoftPass => {
                        warn!(target: PIPELINE_TARGET, reason, "committing without validation");
                        warnings.push(format!("not validated: {reason}"));
                        None
                    }
                }
            }
        }
    }
}

fn ensure_committable(script: &Script) -> Result<(), WorkspaceError> {
    if script.kind() == ScriptKind::Transform {
        return Ok(());
    }
    Err(WorkspaceError::invalid_request(format!(
        "{} scripts do not produce documents and cannot be committed",
        script.language()
    )))
}

/// Reads and parses a document from disk.
///
/// # Errors
///
/// Returns [`WorkspaceError::SourceUnreadable`] or
/// [`WorkspaceError::DocumentMalformed`].
pub fn load_document(path: &Utf8Path) -> Result<XmlDocument, WorkspaceError> {
    let bytes = fs::read(path).map_err(|error| WorkspaceError::source_unreadable(path, &error))?;
    XmlDocument::from_bytes(&bytes).map_err(|error| WorkspaceError::DocumentMalformed {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use digitxml_engine::{BuiltinTransform, EngineError, EngineOutput, TransformEngine};
    use std::thread;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;
    use crate::safety_harness::test_doubles::{ConfigurableValidator, FailingWriter};

    /// Engine running built-in transforms only.
    struct BuiltinEngine;

    impl TransformEngine for BuiltinEngine {
        fn evaluate(
            &self,
            document: &XmlDocument,
            script: &Script,
        ) -> Result<EngineOutput, EngineError> {
            match script {
                Script::Builtin { transform } => Ok(EngineOutput::Document(transform.apply(document))),
                _ => Err(EngineError::unavailable("only built-in transforms")),
            }
        }
    }

    struct Workspace {
        _dir: TempDir,
        root: Utf8PathBuf,
    }

    impl Workspace {
        fn document(&self) -> Utf8PathBuf {
            self.root.join("items.xml")
        }

        fn pipeline(&self, validator: ConfigurableValidator) -> ApplyPipeline {
            let clock = Arc::new(MonotonicClock::default());
            ApplyPipeline::new(
                BackupStore::new(self.root.join("backups"), Arc::clone(&clock)),
                ValidationGate::new(Arc::new(validator), Some(self.root.join("schema.rnc"))),
                TransformationExecutor::new(Arc::new(BuiltinEngine)),
                clock,
            )
        }
    }

    #[fixture]
    fn workspace() -> Workspace {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        fs::write(root.join("items.xml"), "<items><item quant=\"5 10\"/></items>\n")
            .expect("seed document");
        Workspace { _dir: dir, root }
    }

    fn split_quant() -> Script {
        Script::Builtin {
            transform: BuiltinTransform::SplitQuant,
        }
    }

    #[rstest]
    fn commit_is_preceded_by_backup(workspace: Workspace) {
        let pipeline = workspace.pipeline(ConfigurableValidator::passing());
        let outcome = pipeline
            .apply_to_path(&workspace.document(), &split_quant(), &ApplyOptions::default())
            .expect("apply");

        let CommitOutcome::Committed {
            backup: Some(backup),
            committed_at,
            ..
        } = &outcome
        else {
            panic!("expected a commit with a backup, got {outcome:?}");
        };
        assert_eq!(backup.original_path(), workspace.document());
        assert!(backup.timestamp() < *committed_at);
        assert_eq!(
            fs::read_to_string(backup.location()).expect("backup"),
            "<items><item quant=\"5 10\"/></items>\n"
        );
        let written = fs::read_to_string(workspace.document()).expect("written");
        assert!(written.contains("quantMin=\"5\" quantMax=\"10\""), "{written}");
    }

    #[rstest]
    fn invalid_candidate_leaves_bytes_untouched(workspace: Workspace) {
        let before = fs::read(workspace.document()).expect("before");
        let pipeline =
            workspace.pipeline(ConfigurableValidator::failing(vec![Diagnostic::new("bad")]));
        let outcome = pipeline
            .apply_to_path(&workspace.document(), &split_quant(), &ApplyOptions::default())
            .expect("apply");

        assert!(matches!(outcome, CommitOutcome::Rejected { ref diagnostics, .. } if diagnostics.len() == 1));
        assert!(outcome.backup().is_some(), "backup is kept as evidence");
        assert_eq!(fs::read(workspace.document()).expect("after"), before);
    }

    #[rstest]
    fn unavailable_validator_soft_passes_with_warning(workspace: Workspace) {
        let pipeline = workspace.pipeline(ConfigurableValidator::unavailable());
        let outcome = pipeline
            .apply_to_path(&workspace.document(), &split_quant(), &ApplyOptions::default())
            .expect("apply");
        let CommitOutcome::Committed { warnings, .. } = outcome else {
            panic!("soft pass must commit");
        };
        assert_eq!(warnings.len(), 1);
    }

    #[rstest]
    fn unavailable_validator_rejects_under_strict_policy(workspace: Workspace) {
        let before = fs::read(workspace.document()).expect("before");
        let pipeline = workspace
            .pipeline(ConfigurableValidator::unavailable())
            .with_unavailable_policy(UnavailableValidatorPolicy::Reject);
        let outcome = pipeline
            .apply_to_path(&workspace.document(), &split_quant(), &ApplyOptions::default())
            .expect("apply");
        assert!(matches!(outcome, CommitOutcome::Rejected { .. }));
        assert_eq!(fs::read(workspace.document()).expect("after"), before);
    }

    #[rstest]
    fn prior_invalidity_aborts_before_backup(workspace: Workspace) {
        let pipeline =
            workspace.pipeline(ConfigurableValidator::failing(vec![Diagnostic::new("old")]));
        let options = ApplyOptions {
            validate_before: true,
            require_prior_validity: true,
            ..ApplyOptions::default()
        };
        let error = pipeline
            .apply_to_path(&workspace.document(), &split_quant(), &options)
            .expect_err("precondition");
        assert_eq!(error.kind(), "precondition_invalid");
        assert!(!workspace.root.join("backups").exists());
    }

    #[rstest]
    fn failed_write_restores_backup(workspace: Workspace) {
        let before = fs::read(workspace.document()).expect("before");
        let pipeline = workspace
            .pipeline(ConfigurableValidator::passing())
            .with_writer(Box::new(FailingWriter));
        let outcome = pipeline
            .apply_to_path(&workspace.document(), &split_quant(), &ApplyOptions::default())
            .expect("apply");
        assert!(matches!(outcome, CommitOutcome::Failed { restored: true, .. }));
        assert_eq!(fs::read(workspace.document()).expect("after"), before);
    }

    #[rstest]
    fn query_scripts_cannot_be_committed(workspace: Workspace) {
        let pipeline = workspace.pipeline(ConfigurableValidator::passing());
        let error = pipeline
            .apply_to_path(&workspace.document(), &Script::xpath("//item"), &ApplyOptions::default())
            .expect_err("query");
        assert_eq!(error.kind(), "invalid_request");
    }

    #[rstest]
    fn identity_commit_is_structurally_stable(workspace: Workspace) {
        let original = load_document(&workspace.document()).expect("load");
        let pipeline = workspace.pipeline(ConfigurableValidator::passing());
        let identity = Script::Builtin {
            transform: BuiltinTransform::Identity,
        };
        pipeline
            .apply_to_path(&workspace.document(), &identity, &ApplyOptions::default())
            .expect("apply");
        let reloaded = load_document(&workspace.document()).expect("reload");
        assert!(original.structurally_eq(&reloaded));
    }

    #[rstest]
    fn held_lock_reports_busy(workspace: Workspace) {
        let pipeline = workspace.pipeline(ConfigurableValidator::passing());
        let _guard = pipeline
            .locks()
            .acquire(&workspace.document(), None)
            .expect("lock");
        let options = ApplyOptions {
            lock_timeout: Some(Duration::from_millis(10)),
            ..ApplyOptions::default()
        };
        let error = pipeline
            .apply_to_path(&workspace.document(), &split_quant(), &options)
            .expect_err("busy");
        assert_eq!(error.kind(), "busy");
    }

    #[rstest]
    fn waiting_commit_reads_the_holders_bytes(workspace: Workspace) {
        let pipeline = workspace.pipeline(ConfigurableValidator::passing());
        let document = workspace.document();
        let guard = pipeline.locks().acquire(&document, None).expect("lock");

        let outcome = thread::scope(|scope| {
            let worker = scope.spawn(|| {
                pipeline.apply_to_path(&document, &split_quant(), &ApplyOptions::default())
            });
            thread::sleep(Duration::from_millis(50));
            fs::write(&document, "<items><item quant=\"1 2\"/><added/></items>\n")
                .expect("holder write");
            drop(guard);
            worker.join().expect("worker thread")
        })
        .expect("apply");

        let backup = outcome.backup().expect("backup");
        assert_eq!(
            fs::read_to_string(backup.location()).expect("backup"),
            "<items><item quant=\"1 2\"/><added/></items>\n"
        );
        let written = fs::read_to_string(&document).expect("written");
        assert!(written.contains("<added/>"), "{written}");
        assert!(written.contains("quantMin=\"1\" quantMax=\"2\""), "{written}");
    }
}

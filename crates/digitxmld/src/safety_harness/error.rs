//! Error taxonomy for workspace operations.
//!
//! These errors describe operations that could not run to a verdict.
//! Validation failures of a candidate document are reported as
//! [`CommitOutcome::Rejected`](super::CommitOutcome::Rejected), not as errors.

use camino::{Utf8Path, Utf8PathBuf};
use digitxml_config::ResolveError;
use digitxml_engine::{Diagnostic, EngineError};
use strum::IntoStaticStr;
use thiserror::Error;

/// Errors surfaced by the session manager and the commit pipeline.
#[derive(Debug, Clone, Error, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum WorkspaceError {
    /// A path did not resolve to an existing file.
    #[error("path not found: {path}")]
    PathNotFound {
        /// Path as supplied by the caller.
        path: String,
    },

    /// A pattern matched zero or several files where exactly one was needed.
    #[error("pattern '{pattern}' matched {} files; exactly one is required", candidates.len())]
    WorkspaceAmbiguous {
        /// Pattern as supplied by the caller.
        pattern: String,
        /// Files the pattern matched.
        candidates: Vec<Utf8PathBuf>,
    },

    /// The operation needs a loaded document and none is active.
    #[error("no document is loaded")]
    SessionNotLoaded,

    /// A source document could not be read.
    #[error("failed to read {path}: {message}")]
    SourceUnreadable {
        /// File that could not be read.
        path: Utf8PathBuf,
        /// Description of the I/O error.
        message: String,
    },

    /// A source document is not well-formed XML.
    #[error("{path} is not well-formed XML: {message}")]
    DocumentMalformed {
        /// Offending file.
        path: Utf8PathBuf,
        /// Parser message.
        message: String,
    },

    /// Neither the backup directory nor the ephemeral fallback accepted the
    /// snapshot.
    #[error("cannot back up {path}: primary store failed ({primary}); fallback failed ({fallback})")]
    BackupUnavailable {
        /// File being backed up.
        path: Utf8PathBuf,
        /// Failure reported by the primary store.
        primary: String,
        /// Failure reported by the ephemeral store.
        fallback: String,
    },

    /// The document was invalid before the change and prior validity was
    /// required.
    #[error("{path} failed validation before the change ({} diagnostics)", diagnostics.len())]
    PreconditionInvalid {
        /// Document that failed validation.
        path: Utf8PathBuf,
        /// Validator diagnostics.
        diagnostics: Vec<Diagnostic>,
    },

    /// The script could not be compiled or failed while running.
    #[error("script error: {message}")]
    ScriptError {
        /// Engine diagnostic.
        message: String,
    },

    /// No engine could run the script.
    #[error("engine unavailable: {message}")]
    EngineUnavailable {
        /// Why the engine could not be used.
        message: String,
    },

    /// Writing or renaming a file failed.
    #[error("I/O error on {path}: {message}")]
    Io {
        /// File being written.
        path: Utf8PathBuf,
        /// Description of the I/O error.
        message: String,
    },

    /// The target path stayed locked for longer than the caller allowed.
    #[error("{path} is locked by another operation")]
    Busy {
        /// Locked path.
        path: Utf8PathBuf,
    },

    /// The request is well-formed JSON but cannot be honoured.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// What is wrong with the request.
        message: String,
    },
}

impl WorkspaceError {
    /// Stable, machine-readable error tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Creates a source read error.
    pub fn source_unreadable(path: &Utf8Path, error: &std::io::Error) -> Self {
        Self::SourceUnreadable {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }

    /// Creates a write error.
    pub fn io(path: &Utf8Path, error: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

impl From<EngineError> for WorkspaceError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Script { message } => Self::ScriptError { message },
            EngineError::Unavailable { message } => Self::EngineUnavailable { message },
        }
    }
}

impl From<ResolveError> for WorkspaceError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::PathNotFound { path } => Self::PathNotFound { path },
            other => Self::invalid_request(other.to_string()),
        }
    }
}

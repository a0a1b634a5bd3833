//! The active document of a workspace context.

use camino::{Utf8Path, Utf8PathBuf};
use digitxml_engine::XmlDocument;
use serde::Serialize;
use strum::Display;
use tracing::debug;

use crate::safety_harness::{ValidationResult, WorkspaceError, load_document};

const SESSION_TARGET: &str = "digitxmld::session";

/// Lifecycle state reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    /// No document is loaded.
    Empty,
    /// The tree matches the last committed bytes.
    Loaded,
    /// The tree differs from the last committed bytes.
    Dirty,
}

/// One loaded document.
///
/// The session owns its tree exclusively. It is dirty exactly when the tree
/// differs from the tree of the last committed (or loaded) bytes.
#[derive(Debug, Clone)]
pub struct DocumentSession {
    source_path: Utf8PathBuf,
    tree: XmlDocument,
    baseline: XmlDocument,
    last_validation: Option<ValidationResult>,
}

impl DocumentSession {
    /// Reads and parses `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::SourceUnreadable`] or
    /// [`WorkspaceError::DocumentMalformed`].
    pub fn load(path: &Utf8Path) -> Result<Self, WorkspaceError> {
        let tree = load_document(path)?;
        debug!(target: SESSION_TARGET, %path, root = tree.root().name(), "document loaded");
        Ok(Self {
            source_path: path.to_path_buf(),
            baseline: tree.clone(),
            tree,
            last_validation: None,
        })
    }

    /// Source file.
    #[must_use]
    pub fn source_path(&self) -> &Utf8Path {
        &self.source_path
    }

    /// In-memory tree.
    #[must_use]
    pub const fn tree(&self) -> &XmlDocument {
        &self.tree
    }

    /// Most recent validation of this document, if any ran.
    #[must_use]
    pub const fn last_validation(&self) -> Option<&ValidationResult> {
        self.last_validation.as_ref()
    }

    /// Whether the tree differs from the committed bytes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.tree != self.baseline
    }

    /// Replaces the in-memory tree without writing it.
    #[cfg(test)]
    pub fn stage(&mut self, tree: XmlDocument) {
        self.tree = tree;
    }

    /// Records that `tree` is now the on-disk content.
    pub fn mark_committed(&mut self, tree: XmlDocument) {
        self.baseline = tree.clone();
        self.tree = tree;
    }

    /// Records a validation result.
    pub fn record_validation(&mut self, result: ValidationResult) {
        self.last_validation = Some(result);
    }

    /// Describes the session for operators.
    #[must_use]
    pub fn descriptor(&self) -> SessionDescriptor {
        let mut elements = 0_usize;
        self.tree.root().visit(&mut |_, _| elements += 1);
        SessionDescriptor {
            path: self.source_path.clone(),
            root: self.tree.root().name().to_owned(),
            elements,
            dirty: self.is_dirty(),
            state: if self.is_dirty() {
                SessionState::Dirty
            } else {
                SessionState::Loaded
            },
            last_validation: self.last_validation.clone(),
        }
    }
}

/// Operator-facing summary of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionDescriptor {
    /// Source file.
    pub path: Utf8PathBuf,
    /// Root element name.
    pub root: String,
    /// Number of elements in the tree.
    pub elements: usize,
    /// Whether the tree has uncommitted changes.
    pub dirty: bool,
    /// Lifecycle state.
    pub state: SessionState,
    /// Most recent validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_validation: Option<ValidationResult>,
}

/// Holder of at most one active session.
///
/// Passed explicitly to every workspace operation; switching replaces the
/// session wholesale and never writes the previous one.
#[derive(Debug, Default)]
pub struct WorkspaceContext {
    session: Option<DocumentSession>,
}

impl WorkspaceContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match &self.session {
            None => SessionState::Empty,
            Some(session) if session.is_dirty() => SessionState::Dirty,
            Some(_) => SessionState::Loaded,
        }
    }

    /// Active session.
    #[must_use]
    pub const fn session(&self) -> Option<&DocumentSession> {
        self.session.as_ref()
    }

    /// Active session, mutably.
    pub fn session_mut(&mut self) -> Option<&mut DocumentSession> {
        self.session.as_mut()
    }

    /// Active session, or [`WorkspaceError::SessionNotLoaded`].
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::SessionNotLoaded`] in the empty state.
    pub fn current(&self) -> Result<&DocumentSession, WorkspaceError> {
        self.session.as_ref().ok_or(WorkspaceError::SessionNotLoaded)
    }

    /// Installs `session`, returning the one it replaced.
    pub fn replace(&mut self, session: DocumentSession) -> Option<DocumentSession> {
        self.session.replace(session)
    }

    /// Drops the active session.
    pub fn close(&mut self) -> Option<DocumentSession> {
        self.session.take()
    }
}

//! Adapter between the pipeline and the transformation engine.

use std::sync::Arc;

use digitxml_engine::{
    EngineOutput, ResultItem, Script, ScriptKind, TransformEngine, XmlDocument,
};
use tracing::debug;

use super::error::WorkspaceError;

const EXECUTOR_TARGET: &str = "digitxmld::executor";

/// Result of evaluating a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformationResult {
    /// Ordered query results.
    Sequence(Vec<ResultItem>),
    /// Candidate document, independent of any session tree.
    Candidate(XmlDocument),
}

/// Runs scripts against in-memory documents; never touches the filesystem.
#[derive(Clone)]
pub struct TransformationExecutor {
    engine: Arc<dyn TransformEngine>,
}

impl TransformationExecutor {
    /// Wraps an engine.
    #[must_use]
    pub fn new(engine: Arc<dyn TransformEngine>) -> Self {
        Self { engine }
    }

    /// Evaluates `script`, shaping the output by the script's kind.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::ScriptError`] or
    /// [`WorkspaceError::EngineUnavailable`] for engine failures, and
    /// `ScriptError` when a transform yields no document.
    pub fn evaluate(
        &self,
        document: &XmlDocument,
        script: &Script,
    ) -> Result<TransformationResult, WorkspaceError> {
        debug!(
            target: EXECUTOR_TARGET,
            language = script.language(),
            kind = %script.kind(),
            "evaluating script"
        );
        let output = self.engine.evaluate(document, script)?;
        match (script.kind(), output) {
            (ScriptKind::Query, EngineOutput::Sequence(items)) => {
                Ok(TransformationResult::Sequence(items))
            }
            (ScriptKind::Query, EngineOutput::Document(produced)) => Ok(
                TransformationResult::Sequence(vec![ResultItem(produced.to_xml_string())]),
            ),
            (ScriptKind::Transform, EngineOutput::Document(produced)) => {
                Ok(TransformationResult::Candidate(produced))
            }
            (ScriptKind::Transform, EngineOutput::Sequence(_)) => Err(WorkspaceError::ScriptError {
                message: "transform produced a sequence instead of a document".to_owned(),
            }),
        }
    }

    /// Evaluates a query script.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::InvalidRequest`] for transform scripts, plus
    /// the errors of [`TransformationExecutor::evaluate`].
    pub fn query(
        &self,
        document: &XmlDocument,
        script: &Script,
    ) -> Result<Vec<ResultItem>, WorkspaceError> {
        if script.kind() != ScriptKind::Query {
            return Err(WorkspaceError::invalid_request(format!(
                "{} scripts cannot be used as queries",
                script.language()
            )));
        }
        match self.evaluate(document, script)? {
            TransformationResult::Sequence(items) => Ok(items),
            TransformationResult::Candidate(produced) => {
                Ok(vec![ResultItem(produced.to_xml_string())])
            }
        }
    }

    /// Evaluates a transform script into a candidate document.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::InvalidRequest`] for query scripts, plus the
    /// errors of [`TransformationExecutor::evaluate`].
    pub fn transform(
        &self,
        document: &XmlDocument,
        script: &Script,
    ) -> Result<XmlDocument, WorkspaceError> {
        if script.kind() != ScriptKind::Transform {
            return Err(WorkspaceError::invalid_request(format!(
                "{} scripts cannot transform documents",
                script.language()
            )));
        }
        match self.evaluate(document, script)? {
            TransformationResult::Candidate(candidate) => Ok(candidate),
            TransformationResult::Sequence(_) => Err(WorkspaceError::ScriptError {
                message: "transform produced a sequence instead of a document".to_owned(),
            }),
        }
    }
}

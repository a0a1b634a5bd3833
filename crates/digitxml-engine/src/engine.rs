//! Script descriptions and the transformation engine seam.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::builtin::BuiltinTransform;
use crate::document::XmlDocument;

/// Whether a script reads a document or produces a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScriptKind {
    /// Produces a sequence of result items.
    Query,
    /// Produces a replacement document.
    Transform,
}

/// A script to evaluate against a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "language", rename_all = "snake_case")]
pub enum Script {
    /// XPath expression.
    Xpath {
        /// Expression text.
        expression: String,
    },
    /// XQuery main module.
    Xquery {
        /// Query source.
        source: String,
        /// External variable bindings.
        #[serde(default)]
        external_vars: BTreeMap<String, String>,
    },
    /// XSLT stylesheet.
    Xslt {
        /// Stylesheet source.
        stylesheet: String,
        /// Top-level string parameters.
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
    /// Native transform.
    Builtin {
        /// Transform name.
        transform: BuiltinTransform,
    },
}

impl Script {
    /// Builds an XPath script.
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::Xpath {
            expression: expression.into(),
        }
    }

    /// Builds a parameterless XSLT script.
    #[must_use]
    pub fn xslt(stylesheet: impl Into<String>) -> Self {
        Self::Xslt {
            stylesheet: stylesheet.into(),
            params: BTreeMap::new(),
        }
    }

    /// Classifies the script.
    #[must_use]
    pub const fn kind(&self) -> ScriptKind {
        match self {
            Self::Xpath { .. } | Self::Xquery { .. } => ScriptKind::Query,
            Self::Xslt { .. } | Self::Builtin { .. } => ScriptKind::Transform,
        }
    }

    /// Short language label used in logs and previews.
    #[must_use]
    pub const fn language(&self) -> &'static str {
        match self {
            Self::Xpath { .. } => "xpath",
            Self::Xquery { .. } => "xquery",
            Self::Xslt { .. } => "xslt",
            Self::Builtin { .. } => "builtin",
        }
    }
}

/// One item of a query result, rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultItem(pub String);

/// Output of evaluating a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutput {
    /// Items produced by a query.
    Sequence(Vec<ResultItem>),
    /// Document produced by a transform.
    Document(XmlDocument),
}

/// Failure reported by a transformation engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The script could not be compiled or raised an error while running.
    #[error("script error: {message}")]
    Script {
        /// Processor diagnostic.
        message: String,
    },
    /// No processor is available for the script's language.
    #[error("engine unavailable: {message}")]
    Unavailable {
        /// Why the processor could not be used.
        message: String,
    },
}

impl EngineError {
    /// Builds a script error.
    #[must_use]
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Builds an unavailability error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Evaluates scripts against documents.
///
/// Query scripts yield [`EngineOutput::Sequence`]; transform scripts yield
/// [`EngineOutput::Document`]. Implementations must not modify the input.
pub trait TransformEngine: Send + Sync {
    /// Runs `script` against `document`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the script fails or no processor is
    /// available.
    fn evaluate(&self, document: &XmlDocument, script: &Script)
    -> Result<EngineOutput, EngineError>;
}

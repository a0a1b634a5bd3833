//! Schema validation seam and diagnostic parsing.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use thiserror::Error;

use crate::document::XmlDocument;

/// A single validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// 1-based line, when the validator reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// 1-based column, when the validator reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Validator message.
    pub message: String,
}

impl Diagnostic {
    /// Builds a diagnostic without a location.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            line: None,
            column: None,
            message: message.into(),
        }
    }

    /// Attaches a location.
    #[must_use]
    pub const fn at(mut self, line: u32, column: Option<u32>) -> Self {
        self.line = Some(line);
        self.column = column;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{line}:{column}: {}", self.message),
            (Some(line), None) => write!(f, "{line}: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Outcome of validating a document that the validator could process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorReport {
    /// The document conforms to the schema.
    Valid,
    /// The document violates the schema.
    Invalid(Vec<Diagnostic>),
}

/// The validator could not decide.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidatorError {
    /// The validating tool could not be run.
    #[error("validator unavailable: {message}")]
    Unavailable {
        /// Why the tool could not be used.
        message: String,
    },
    /// The schema file is missing or unreadable.
    #[error("schema unavailable: {schema}")]
    SchemaUnavailable {
        /// Schema that could not be loaded.
        schema: Utf8PathBuf,
    },
}

/// Validates documents against a schema file.
pub trait SchemaValidator: Send + Sync {
    /// Validates `document` against `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError`] when no verdict could be reached.
    fn validate(
        &self,
        document: &XmlDocument,
        schema: &Utf8Path,
    ) -> Result<ValidatorReport, ValidatorError>;
}

/// Parses `file:line[:column]: message` lines emitted by validators.
///
/// Lines naming `document` lose the prefix and keep their location. Summary
/// lines such as `doc.xml validates` are dropped; anything else is kept as an
/// unlocated diagnostic.
#[must_use]
pub fn parse_diagnostics(output: &str, document: &str) -> Vec<Diagnostic> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !is_summary(line, document))
        .map(|line| {
            line.strip_prefix(document)
                .and_then(|rest| rest.strip_prefix(':'))
                .and_then(parse_located)
                .unwrap_or_else(|| Diagnostic::new(line))
        })
        .collect()
}

fn is_summary(line: &str, document: &str) -> bool {
    line.strip_prefix(document).is_some_and(|rest| {
        let rest = rest.trim();
        rest == "validates" || rest == "fails to validate"
    })
}

fn parse_located(rest: &str) -> Option<Diagnostic> {
    let (line, rest) = rest.split_once(':')?;
    let line = line.trim().parse::<u32>().ok()?;
    let (column, message) = rest
        .split_once(':')
        .and_then(|(column, message)| {
            column
                .trim()
                .parse::<u32>()
                .ok()
                .map(|column| (Some(column), message))
        })
        .unwrap_or((None, rest));
    let message = message.trim();
    let message = message.strip_prefix("error:").map_or(message, str::trim);
    Some(Diagnostic::new(message).at(line, column))
}

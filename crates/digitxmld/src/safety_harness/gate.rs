//! Classification of validator verdicts.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use digitxml_engine::{Diagnostic, SchemaValidator, ValidatorError, ValidatorReport, XmlDocument};
use serde::Serialize;
use tracing::debug;

const GATE_TARGET: &str = "digitxmld::gate";

/// Verdict reached by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// The document conforms to the schema.
    Valid,
    /// The document violates the schema.
    Invalid,
    /// No verdict could be reached; never treated as valid.
    ValidatorUnavailable,
}

/// Outcome plus ordered diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    outcome: ValidationOutcome,
    diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl ValidationResult {
    /// A passing result.
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            outcome: ValidationOutcome::Valid,
            diagnostics: Vec::new(),
            reason: None,
        }
    }

    /// A failing result.
    #[must_use]
    pub const fn invalid(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            outcome: ValidationOutcome::Invalid,
            diagnostics,
            reason: None,
        }
    }

    /// A result without a verdict.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            outcome: ValidationOutcome::ValidatorUnavailable,
            diagnostics: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    /// The verdict.
    #[must_use]
    pub const fn outcome(&self) -> ValidationOutcome {
        self.outcome
    }

    /// Diagnostics in validator order.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Why no verdict was reached, for unavailable results.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Consumes the result, returning its diagnostics.
    #[must_use]
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// Runs the configured schema validator and classifies its answer.
///
/// The gate never mutates the document it inspects.
#[derive(Clone)]
pub struct ValidationGate {
    validator: Arc<dyn SchemaValidator>,
    schema: Option<Utf8PathBuf>,
}

impl ValidationGate {
    /// Creates a gate for `schema`; `None` means no schema is configured.
    #[must_use]
    pub fn new(validator: Arc<dyn SchemaValidator>, schema: Option<Utf8PathBuf>) -> Self {
        Self { validator, schema }
    }

    /// Configured schema, if any.
    #[must_use]
    pub fn schema(&self) -> Option<&Utf8Path> {
        self.schema.as_deref()
    }

    /// Validates an in-memory document.
    #[must_use]
    pub fn validate(&self, document: &XmlDocument) -> ValidationResult {
        let Some(schema) = self.schema.as_deref() else {
            return ValidationResult::unavailable("no schema is configured");
        };
        let result = match self.validator.validate(document, schema) {
            Ok(ValidatorReport::Valid) => ValidationResult::valid(),
            Ok(ValidatorReport::Invalid(diagnostics)) => ValidationResult::invalid(diagnostics),
            Err(error @ ValidatorError::SchemaUnavailable { .. }) => {
                ValidationResult::unavailable(error.to_string())
            }
            Err(error @ ValidatorError::Unavailable { .. }) => {
                ValidationResult::unavailable(error.to_string())
            }
        };
        debug!(
            target: GATE_TARGET,
            %schema,
            outcome = ?result.outcome(),
            diagnostics = result.diagnostics().len(),
            "validation finished"
        );
        result
    }

    /// Validates serialised bytes; malformed XML is reported as invalid.
    #[must_use]
    pub fn validate_bytes(&self, bytes: &[u8]) -> ValidationResult {
        match XmlDocument::from_bytes(bytes) {
            Ok(document) => self.validate(&document),
            Err(error) => ValidationResult::invalid(vec![Diagnostic::new(error.to_string())]),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::safety_harness::test_doubles::ConfigurableValidator;

    fn document() -> XmlDocument {
        XmlDocument::parse("<a/>").expect("parse")
    }

    fn gate(validator: ConfigurableValidator) -> ValidationGate {
        ValidationGate::new(Arc::new(validator), Some(Utf8PathBuf::from("schema.rnc")))
    }

    #[rstest]
    #[case(ConfigurableValidator::passing(), ValidationOutcome::Valid)]
    #[case(
        ConfigurableValidator::failing(vec![Diagnostic::new("bad")]),
        ValidationOutcome::Invalid
    )]
    #[case(ConfigurableValidator::unavailable(), ValidationOutcome::ValidatorUnavailable)]
    #[case(
        ConfigurableValidator::missing_schema(),
        ValidationOutcome::ValidatorUnavailable
    )]
    fn classifies_validator_answers(
        #[case] validator: ConfigurableValidator,
        #[case] expected: ValidationOutcome,
    ) {
        assert_eq!(gate(validator).validate(&document()).outcome(), expected);
    }

    #[test]
    fn missing_schema_configuration_is_unavailable() {
        let gate = ValidationGate::new(Arc::new(ConfigurableValidator::passing()), None);
        let result = gate.validate(&document());
        assert_eq!(result.outcome(), ValidationOutcome::ValidatorUnavailable);
        assert_eq!(result.reason(), Some("no schema is configured"));
    }

    #[test]
    fn malformed_bytes_are_invalid() {
        let result = gate(ConfigurableValidator::passing()).validate_bytes(b"<a>");
        assert_eq!(result.outcome(), ValidationOutcome::Invalid);
        assert_eq!(result.diagnostics().len(), 1);
    }
}

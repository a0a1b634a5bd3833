//! Test doubles for the safety harness collaborators.
//!
//! These configurable types exist for tests and behavioural specs, allowing
//! scenarios to specify exact validator verdicts and storage failures.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use digitxml_engine::{Diagnostic, SchemaValidator, ValidatorError, ValidatorReport, XmlDocument};

use super::backup::{BackupLocation, StorageKind};
use super::commit::DocumentWriter;

#[derive(Debug, Clone)]
enum Verdict {
    Pass,
    Fail(Vec<Diagnostic>),
    RejectElement(String),
    Unavailable,
    MissingSchema,
}

/// Validator whose answer is fixed at construction.
#[derive(Debug, Clone)]
pub struct ConfigurableValidator {
    verdict: Verdict,
}

impl ConfigurableValidator {
    /// Accepts every document.
    #[must_use]
    pub const fn passing() -> Self {
        Self {
            verdict: Verdict::Pass,
        }
    }

    /// Rejects every document with `diagnostics`.
    #[must_use]
    pub const fn failing(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            verdict: Verdict::Fail(diagnostics),
        }
    }

    /// Rejects documents containing an element called `name`.
    #[must_use]
    pub fn rejecting_element(name: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::RejectElement(name.into()),
        }
    }

    /// Reports that the validating tool cannot be run.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            verdict: Verdict::Unavailable,
        }
    }

    /// Reports that the schema cannot be loaded.
    #[must_use]
    pub const fn missing_schema() -> Self {
        Self {
            verdict: Verdict::MissingSchema,
        }
    }
}

impl SchemaValidator for ConfigurableValidator {
    fn validate(
        &self,
        document: &XmlDocument,
        schema: &Utf8Path,
    ) -> Result<ValidatorReport, ValidatorError> {
        match &self.verdict {
            Verdict::Pass => Ok(ValidatorReport::Valid),
            Verdict::Fail(diagnostics) => Ok(ValidatorReport::Invalid(diagnostics.clone())),
            Verdict::RejectElement(name) => {
                let mut found = false;
                document
                    .root()
                    .visit(&mut |element, _| found |= element.name() == name);
                if found {
                    Ok(ValidatorReport::Invalid(vec![Diagnostic::new(format!(
                        "element {name} is not allowed here"
                    ))]))
                } else {
                    Ok(ValidatorReport::Valid)
                }
            }
            Verdict::Unavailable => Err(ValidatorError::Unavailable {
                message: "validator not installed".to_owned(),
            }),
            Verdict::MissingSchema => Err(ValidatorError::SchemaUnavailable {
                schema: schema.to_path_buf(),
            }),
        }
    }
}

/// Backup location that refuses every write.
#[derive(Debug, Clone, Copy)]
pub struct RejectingLocation {
    kind: StorageKind,
}

impl RejectingLocation {
    /// A refusing primary location.
    #[must_use]
    pub const fn primary() -> Self {
        Self {
            kind: StorageKind::Primary,
        }
    }

    /// A refusing fallback location.
    #[must_use]
    pub const fn ephemeral() -> Self {
        Self {
            kind: StorageKind::EphemeralFallback,
        }
    }
}

impl BackupLocation for RejectingLocation {
    fn kind(&self) -> StorageKind {
        self.kind
    }

    fn persist(&self, _name: &str, _bytes: &[u8]) -> io::Result<Utf8PathBuf> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "location is read-only",
        ))
    }
}

/// Writer whose every write fails after truncating the target.
///
/// Leaves a partial file behind so restore paths can be observed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingWriter;

impl DocumentWriter for FailingWriter {
    fn write(&self, path: &Utf8Path, _bytes: &[u8]) -> io::Result<()> {
        std::fs::write(path, b"<partial")?;
        Err(io::Error::other("disk full"))
    }
}

//! Engine and validator backed by external command-line tools.

use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use camino::Utf8Path;
use digitxml_config::Toolchain;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::document::XmlDocument;
use crate::engine::{EngineError, EngineOutput, ResultItem, Script, TransformEngine};
use crate::process::{self, Bindings, ToolError, ToolOutput};
use crate::validator::{
    Diagnostic, SchemaValidator, ValidatorError, ValidatorReport, parse_diagnostics,
};

const TOOLCHAIN_TARGET: &str = "digitxml_engine::toolchain";

/// Exit status `xmllint --xpath` uses for an empty node set.
const XMLLINT_EMPTY_RESULT: i32 = 10;

/// Runs scripts through the configured processors.
///
/// Built-in transforms run in process. XSLT and XPath go to the configured
/// commands; XQuery needs an explicit `toolchain.xquery` entry.
#[derive(Debug, Clone, Default)]
pub struct ToolchainEngine {
    toolchain: Toolchain,
}

impl ToolchainEngine {
    /// Creates an engine over the given templates.
    #[must_use]
    pub const fn new(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.toolchain.timeout_secs)
    }

    fn run_xslt(
        &self,
        document: &XmlDocument,
        stylesheet: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<EngineOutput, EngineError> {
        let input = staged(&document.to_xml_string(), ".xml").map_err(staging_failed)?;
        let script = staged(stylesheet, ".xsl").map_err(staging_failed)?;
        let expanded = params
            .iter()
            .flat_map(|(name, value)| ["--stringparam".to_owned(), name.clone(), value.clone()])
            .collect();
        let bindings = Bindings::default()
            .with("{document}", path_of(&input))
            .with("{script}", path_of(&script))
            .expanding("{params}", expanded);
        let output = self.invoke(&self.toolchain.xslt, &bindings)?;
        if !output.success() {
            return Err(EngineError::script(output.complaint()));
        }
        let produced = XmlDocument::from_bytes(&output.stdout).map_err(|error| {
            EngineError::script(format!(
                "stylesheet output is not a well-formed document: {error}"
            ))
        })?;
        Ok(EngineOutput::Document(produced))
    }

    fn run_xpath(
        &self,
        document: &XmlDocument,
        expression: &str,
    ) -> Result<EngineOutput, EngineError> {
        let input = staged(&document.to_xml_string(), ".xml").map_err(staging_failed)?;
        let bindings = Bindings::default()
            .with("{document}", path_of(&input))
            .with("{expression}", expression);
        let output = self.invoke(&self.toolchain.xpath, &bindings)?;
        if output.code == Some(XMLLINT_EMPTY_RESULT) || output.stderr.contains("XPath set is empty")
        {
            return Ok(EngineOutput::Sequence(Vec::new()));
        }
        if !output.success() {
            return Err(EngineError::script(output.complaint()));
        }
        Ok(EngineOutput::Sequence(items(&output.stdout_text())))
    }

    fn run_xquery(
        &self,
        document: &XmlDocument,
        source: &str,
        external_vars: &BTreeMap<String, String>,
    ) -> Result<EngineOutput, EngineError> {
        let template = self
            .toolchain
            .xquery
            .as_ref()
            .ok_or_else(|| EngineError::unavailable("no XQuery processor is configured"))?;
        let input = staged(&document.to_xml_string(), ".xml").map_err(staging_failed)?;
        let script = staged(source, ".xq").map_err(staging_failed)?;
        let expanded = external_vars
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        let bindings = Bindings::default()
            .with("{document}", path_of(&input))
            .with("{script}", path_of(&script))
            .expanding("{params}", expanded);
        let output = self.invoke(template, &bindings)?;
        if !output.success() {
            return Err(EngineError::script(output.complaint()));
        }
        Ok(EngineOutput::Sequence(items(&output.stdout_text())))
    }

    fn invoke(
        &self,
        template: &[String],
        bindings: &Bindings<'_>,
    ) -> Result<ToolOutput, EngineError> {
        let argv = process::expand(template, bindings);
        process::run(&argv, self.timeout()).map_err(unavailable)
    }
}

impl TransformEngine for ToolchainEngine {
    fn evaluate(
        &self,
        document: &XmlDocument,
        script: &Script,
    ) -> Result<EngineOutput, EngineError> {
        debug!(target: TOOLCHAIN_TARGET, language = script.language(), "evaluating script");
        match script {
            Script::Builtin { transform } => Ok(EngineOutput::Document(transform.apply(document))),
            Script::Xslt { stylesheet, params } => self.run_xslt(document, stylesheet, params),
            Script::Xpath { expression } => self.run_xpath(document, expression),
            Script::Xquery {
                source,
                external_vars,
            } => self.run_xquery(document, source, external_vars),
        }
    }
}

/// Validates documents with the tool matching the schema's extension.
#[derive(Debug, Clone, Default)]
pub struct CommandValidator {
    toolchain: Toolchain,
}

impl CommandValidator {
    /// Creates a validator over the given templates.
    #[must_use]
    pub const fn new(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }
}

impl SchemaValidator for CommandValidator {
    fn validate(
        &self,
        document: &XmlDocument,
        schema: &Utf8Path,
    ) -> Result<ValidatorReport, ValidatorError> {
        if !schema.is_file() {
            return Err(ValidatorError::SchemaUnavailable {
                schema: schema.to_path_buf(),
            });
        }
        let input = staged(&document.to_xml_string(), ".xml").map_err(|error| {
            ValidatorError::Unavailable {
                message: format!("failed to stage document: {error}"),
            }
        })?;
        let document_path = path_of(&input);
        let bindings = Bindings::default()
            .with("{document}", document_path.clone())
            .with("{schema}", schema.as_str());
        let argv = process::expand(&self.toolchain.validator_for(schema), &bindings);
        let output = process::run(&argv, Duration::from_secs(self.toolchain.timeout_secs))
            .map_err(|error| ValidatorError::Unavailable {
                message: error.to_string(),
            })?;

        if output.success() {
            return Ok(ValidatorReport::Valid);
        }
        let combined = format!("{}\n{}", output.stdout_text(), output.stderr);
        let mut diagnostics = parse_diagnostics(&combined, &document_path);
        if diagnostics.is_empty() {
            diagnostics.push(Diagnostic::new(format!(
                "validator exited with status {}",
                output
                    .code
                    .map_or_else(|| "unknown".to_owned(), |code| code.to_string())
            )));
        }
        debug!(
            target: TOOLCHAIN_TARGET,
            schema = %schema,
            diagnostics = diagnostics.len(),
            "document failed validation"
        );
        Ok(ValidatorReport::Invalid(diagnostics))
    }
}

fn staged(content: &str, suffix: &str) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("digitxml-")
        .suffix(suffix)
        .tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn path_of(file: &NamedTempFile) -> String {
    file.path().to_string_lossy().into_owned()
}

fn items(stdout: &str) -> Vec<ResultItem> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| ResultItem(line.to_owned()))
        .collect()
}

fn staging_failed(error: std::io::Error) -> EngineError {
    EngineError::unavailable(format!("failed to stage script input: {error}"))
}

fn unavailable(error: ToolError) -> EngineError {
    EngineError::unavailable(error.to_string())
}

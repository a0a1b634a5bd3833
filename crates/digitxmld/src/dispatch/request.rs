//! Tool request deserialization for the dispatch loop.
//!
//! Each request line is a JSON object whose `tool` field selects the
//! variant. Requests are validated here, before any workspace operation
//! runs, so handlers only see consistent inputs.

use std::collections::BTreeMap;

use digitxml_engine::{Correction, Script};
use serde::Deserialize;
use strum::IntoStaticStr;

use super::errors::DispatchError;
use crate::safety_harness::BatchPolicy;

const fn default_true() -> bool {
    true
}

/// A typed tool call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, IntoStaticStr)]
#[serde(tag = "tool", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolRequest {
    /// Evaluates an XPath expression.
    XpathQuery {
        /// Expression text.
        expression: String,
        /// Target document; the active session when absent.
        #[serde(default)]
        file: Option<String>,
        /// Return only the number of results.
        #[serde(default)]
        return_count: bool,
    },
    /// Evaluates an XQuery main module.
    XqueryQuery {
        /// Query source.
        query: String,
        /// Target document; the active session when absent.
        #[serde(default)]
        file: Option<String>,
        /// External variable bindings.
        #[serde(default)]
        external_vars: BTreeMap<String, String>,
    },
    /// Runs an XSLT stylesheet, previewing or committing the result.
    XsltTransform {
        /// Stylesheet source.
        stylesheet: String,
        /// Target document; the active session when absent.
        #[serde(default)]
        file: Option<String>,
        /// Top-level string parameters.
        #[serde(default)]
        params: BTreeMap<String, String>,
        /// Commit instead of previewing.
        #[serde(default)]
        commit: bool,
    },
    /// Runs any transform script through the commit pipeline.
    ApplyTransformation {
        /// Transform script.
        script: Script,
        /// Target document; the active session when absent.
        #[serde(default)]
        file: Option<String>,
        /// Validate the candidate before writing.
        #[serde(default = "default_true")]
        validate: bool,
        /// Validate the current bytes before changing anything.
        #[serde(default)]
        validate_before: bool,
        /// Abort when the current bytes are invalid.
        #[serde(default)]
        require_prior_validity: bool,
        /// Note logged with the commit.
        #[serde(default)]
        description: Option<String>,
    },
    /// Applies a sequence of corrections across documents.
    BatchCorrections {
        /// Items in processing order.
        items: Vec<BatchItemRequest>,
        /// Failure policy.
        #[serde(default)]
        policy: BatchPolicy,
    },
    /// Loads a document, by path or by a pattern matching exactly one file.
    SwitchXmlFile {
        /// Path or glob pattern.
        file: String,
    },
    /// Lists workspace documents.
    ListWorkspaceFiles {
        /// Glob pattern relative to the data root.
        #[serde(default)]
        pattern: Option<String>,
    },
    /// Snapshots a document.
    CreateBackup {
        /// Target document; the active session when absent.
        #[serde(default)]
        file: Option<String>,
    },
    /// Re-reads the active document from disk.
    ReloadDocument,
    /// Describes the active document.
    GetCurrentFile,
    /// Closes the active document without writing it.
    CloseDocument,
    /// Summarises element counts per depth.
    GetStructureSummary {
        /// Target document; the active session when absent.
        #[serde(default)]
        file: Option<String>,
        /// Deepest level to report.
        #[serde(default)]
        max_depth: Option<usize>,
    },
    /// Runs a list of checks and reports their matches.
    FindIrregularities {
        /// Target document; the active session when absent.
        #[serde(default)]
        file: Option<String>,
        /// Checks in reporting order.
        checks: Vec<CheckRequest>,
    },
    /// Validates a document against the configured schema.
    ValidateDocument {
        /// Target document; the active session when absent.
        #[serde(default)]
        file: Option<String>,
    },
}

/// One batch item: a script or a list of declarative corrections.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchItemRequest {
    /// Target document.
    pub file: String,
    /// Transform script.
    #[serde(default)]
    pub script: Option<Script>,
    /// Declarative corrections compiled into a stylesheet.
    #[serde(default)]
    pub corrections: Vec<Correction>,
}

/// One irregularity check.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckRequest {
    /// Operator-facing description.
    pub description: String,
    /// XPath query.
    #[serde(default)]
    pub xpath: Option<String>,
    /// XQuery query.
    #[serde(default)]
    pub xquery: Option<String>,
}

impl ToolRequest {
    /// Parses a request line.
    ///
    /// Trailing whitespace (including the newline delimiter) is trimmed
    /// before parsing.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MalformedRequest`] if the line is empty or
    /// is not a known tool request.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request line"));
        }
        serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)
    }

    /// Name of the requested tool.
    #[must_use]
    pub fn tool(&self) -> &'static str {
        self.into()
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidStructure`] describing the first
    /// inconsistency found.
    pub fn validate(&self) -> Result<(), DispatchError> {
        match self {
            Self::XpathQuery { expression, .. } => require_text("expression", expression),
            Self::XqueryQuery { query, .. } => require_text("query", query),
            Self::XsltTransform { stylesheet, .. } => require_text("stylesheet", stylesheet),
            Self::SwitchXmlFile { file } => require_text("file", file),
            Self::BatchCorrections { items, .. } => {
                if items.is_empty() {
                    return Err(DispatchError::invalid_structure("batch has no items"));
                }
                items.iter().enumerate().try_for_each(|(index, item)| {
                    require_text("file", &item.file)?;
                    if item.script.is_some() == !item.corrections.is_empty() {
                        return Err(DispatchError::invalid_structure(format!(
                            "item {index} must carry either a script or corrections"
                        )));
                    }
                    Ok(())
                })
            }
            Self::FindIrregularities { checks, .. } => {
                checks.iter().try_for_each(|check| match (&check.xpath, &check.xquery) {
                    (Some(_), None) | (None, Some(_)) => Ok(()),
                    _ => Err(DispatchError::invalid_structure(format!(
                        "check '{}' needs exactly one of xpath or xquery",
                        check.description
                    ))),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Best-effort tool name from a line that failed to parse.
#[must_use]
pub fn peek_tool(line: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(line.trim_ascii()).ok()?;
    value.get("tool")?.as_str().map(str::to_owned)
}

fn require_text(field: &str, value: &str) -> Result<(), DispatchError> {
    if value.trim().is_empty() {
        return Err(DispatchError::invalid_structure(format!(
            "{field} field is empty"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use digitxml_engine::BuiltinTransform;
    use rstest::rstest;

    use super::*;

    #[test]
    fn parses_query_with_defaults() {
        let request =
            ToolRequest::parse(br#"{"tool":"xpath_query","expression":"//item"}"#).expect("parse");
        assert_eq!(
            request,
            ToolRequest::XpathQuery {
                expression: "//item".to_owned(),
                file: None,
                return_count: false,
            }
        );
        assert_eq!(request.tool(), "xpath_query");
    }

    #[test]
    fn parses_unit_tools() {
        let request = ToolRequest::parse(b"{\"tool\":\"get_current_file\"}\n").expect("parse");
        assert_eq!(request, ToolRequest::GetCurrentFile);
    }

    #[test]
    fn parses_apply_with_builtin_script() {
        let request = ToolRequest::parse(
            br#"{"tool":"apply_transformation","script":{"language":"builtin","transform":"split-quant"}}"#,
        )
        .expect("parse");
        let ToolRequest::ApplyTransformation {
            script, validate, ..
        } = request
        else {
            panic!("wrong variant");
        };
        assert!(validate);
        assert_eq!(
            script,
            Script::Builtin {
                transform: BuiltinTransform::SplitQuant
            }
        );
    }

    #[rstest]
    #[case(b"".as_slice())]
    #[case(b"  \n".as_slice())]
    #[case(b"not json".as_slice())]
    #[case(br#"{"tool":"launch_rockets"}"#.as_slice())]
    fn rejects_malformed_lines(#[case] line: &[u8]) {
        assert!(matches!(
            ToolRequest::parse(line),
            Err(DispatchError::MalformedRequest { .. })
        ));
    }

    #[rstest]
    #[case(r#"{"tool":"xpath_query","expression":"  "}"#)]
    #[case(r#"{"tool":"batch_corrections","items":[]}"#)]
    #[case(r#"{"tool":"batch_corrections","items":[{"file":"a.xml"}]}"#)]
    #[case(r#"{"tool":"find_irregularities","checks":[{"description":"d"}]}"#)]
    fn rejects_inconsistent_requests(#[case] line: &str) {
        let request = ToolRequest::parse(line.as_bytes()).expect("parse");
        assert!(matches!(
            request.validate(),
            Err(DispatchError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn batch_items_accept_corrections() {
        let request = ToolRequest::parse(
            br#"{"tool":"batch_corrections","policy":"halt_on_first_failure","items":[{"file":"a.xml","corrections":[{"action":"set_attribute","match":"item","name":"n","value":"1"}]}]}"#,
        )
        .expect("parse");
        request.validate().expect("valid batch");
    }

    #[test]
    fn peeks_tool_name_of_unparseable_request() {
        assert_eq!(
            peek_tool(br#"{"tool":"xpath_query"}"#),
            Some("xpath_query".to_owned())
        );
        assert_eq!(peek_tool(b"nope"), None);
    }
}

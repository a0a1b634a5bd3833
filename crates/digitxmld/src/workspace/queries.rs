//! Read-only workspace operations.

use camino::Utf8PathBuf;
use digitxml_engine::{ResultItem, Script, StructureSummary, summarize};
use serde::Serialize;
use tracing::{debug, warn};

use super::{WORKSPACE_TARGET, WorkspaceManager};
use crate::safety_harness::{ValidationResult, WorkspaceError};
use crate::session::WorkspaceContext;

/// Query results for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryReport {
    /// Queried document.
    pub path: Utf8PathBuf,
    /// Number of result items.
    pub count: usize,
    /// Items in engine order; omitted when only the count was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ResultItem>>,
}

/// A named query whose matches are reported as issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrregularityCheck {
    /// Operator-facing description.
    pub description: String,
    /// Query to run.
    pub script: Script,
}

/// Matches of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    /// Check description.
    pub description: String,
    /// Number of matches.
    pub count: usize,
    /// Matched items.
    pub matches: Vec<ResultItem>,
    /// Why the check could not run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of all checks against one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IrregularityReport {
    /// Checked document.
    pub path: Utf8PathBuf,
    /// Per-check results in request order.
    pub checks: Vec<CheckResult>,
    /// Sum of all match counts.
    pub total_issues: usize,
}

/// Structure summary of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryReport {
    /// Summarised document.
    pub path: Utf8PathBuf,
    /// Per-depth element counts.
    #[serde(flatten)]
    pub summary: StructureSummary,
}

impl WorkspaceManager {
    /// Runs a query script against a target.
    ///
    /// # Errors
    ///
    /// Returns target resolution errors and engine errors.
    pub fn query(
        &self,
        context: &WorkspaceContext,
        target: Option<&str>,
        script: &Script,
        return_count: bool,
    ) -> Result<QueryReport, WorkspaceError> {
        let (path, document) = self.target(context, target)?;
        let items = self.pipeline.executor().query(&document, script)?;
        debug!(target: WORKSPACE_TARGET, %path, count = items.len(), "query finished");
        Ok(QueryReport {
            path,
            count: items.len(),
            items: (!return_count).then_some(items),
        })
    }

    /// Runs each check and totals the matches.
    ///
    /// A check that fails to run is reported with its error and zero
    /// matches; the remaining checks still run.
    ///
    /// # Errors
    ///
    /// Returns target resolution errors.
    pub fn find_irregularities(
        &self,
        context: &WorkspaceContext,
        target: Option<&str>,
        checks: &[IrregularityCheck],
    ) -> Result<IrregularityReport, WorkspaceError> {
        let (path, document) = self.target(context, target)?;
        let results: Vec<CheckResult> = checks
            .iter()
            .map(|check| match self.pipeline.executor().query(&document, &check.script) {
                Ok(matches) => CheckResult {
                    description: check.description.clone(),
                    count: matches.len(),
                    matches,
                    error: None,
                },
                Err(error) => {
                    warn!(
                        target: WORKSPACE_TARGET,
                        check = %check.description,
                        error = %error,
                        "irregularity check failed"
                    );
                    CheckResult {
                        description: check.description.clone(),
                        count: 0,
                        matches: Vec::new(),
                        error: Some(error.to_string()),
                    }
                }
            })
            .collect();
        let total_issues = results.iter().map(|result| result.count).sum();
        Ok(IrregularityReport {
            path,
            checks: results,
            total_issues,
        })
    }

    /// Summarises element counts per depth.
    ///
    /// # Errors
    ///
    /// Returns target resolution errors.
    pub fn structure_summary(
        &self,
        context: &WorkspaceContext,
        target: Option<&str>,
        max_depth: usize,
    ) -> Result<SummaryReport, WorkspaceError> {
        let (path, document) = self.target(context, target)?;
        Ok(SummaryReport {
            path,
            summary: summarize(&document, max_depth),
        })
    }

    /// Validates a target.
    ///
    /// The active session's tree is validated in memory and the result is
    /// recorded on the session; other targets are validated from disk.
    ///
    /// # Errors
    ///
    /// Returns target resolution errors.
    pub fn validate(
        &self,
        context: &mut WorkspaceContext,
        target: Option<&str>,
    ) -> Result<(Utf8PathBuf, ValidationResult), WorkspaceError> {
        let (path, document) = self.target(context, target)?;
        let result = self.pipeline.gate().validate(&document);
        if let Some(session) = context
            .session_mut()
            .filter(|session| session.source_path() == path)
        {
            session.record_validation(result.clone());
        }
        Ok((path, result))
    }
}

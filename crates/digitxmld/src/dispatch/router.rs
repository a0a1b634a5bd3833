//! Tool routing.
//!
//! Each [`ToolRequest`] variant maps to one workspace operation. Results are
//! converted to JSON here so the serve loop stays agnostic of result types.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use digitxml_engine::{DEFAULT_SUMMARY_DEPTH, Script, corrections_script};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use super::errors::DispatchError;
use super::request::{BatchItemRequest, CheckRequest, ToolRequest};
use crate::safety_harness::{ApplyOptions, BatchItem, CorrectionBatch};
use crate::session::WorkspaceContext;
use crate::workspace::{IrregularityCheck, WorkspaceManager};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Routes tool requests to the workspace manager.
pub struct ToolRouter {
    manager: WorkspaceManager,
    cancel: Arc<AtomicBool>,
}

impl ToolRouter {
    /// Creates a router; `cancel` aborts running batches between items.
    #[must_use]
    pub const fn new(manager: WorkspaceManager, cancel: Arc<AtomicBool>) -> Self {
        Self { manager, cancel }
    }

    /// The routed manager.
    #[must_use]
    pub const fn manager(&self) -> &WorkspaceManager {
        &self.manager
    }

    /// Runs `request` against `context`.
    ///
    /// # Errors
    ///
    /// Returns the workspace error of the failed operation, or
    /// [`DispatchError::InvalidStructure`] when a request cannot be turned
    /// into an operation.
    pub fn route(
        &self,
        context: &mut WorkspaceContext,
        request: &ToolRequest,
    ) -> Result<Value, DispatchError> {
        debug!(target: DISPATCH_TARGET, tool = request.tool(), "routing request");
        let manager = &self.manager;
        match request {
            ToolRequest::XpathQuery {
                expression,
                file,
                return_count,
            } => to_json(&manager.query(
                context,
                file.as_deref(),
                &Script::xpath(expression.as_str()),
                *return_count,
            )?),
            ToolRequest::XqueryQuery {
                query,
                file,
                external_vars,
            } => {
                let script = Script::Xquery {
                    source: query.clone(),
                    external_vars: external_vars.clone(),
                };
                to_json(&manager.query(context, file.as_deref(), &script, false)?)
            }
            ToolRequest::XsltTransform {
                stylesheet,
                file,
                params,
                commit,
            } => {
                let script = Script::Xslt {
                    stylesheet: stylesheet.clone(),
                    params: params.clone(),
                };
                to_json(&manager.transform(context, file.as_deref(), &script, *commit)?)
            }
            ToolRequest::ApplyTransformation {
                script,
                file,
                validate,
                validate_before,
                require_prior_validity,
                description,
            } => {
                let options = ApplyOptions {
                    validate_after: *validate,
                    validate_before: *validate_before,
                    require_prior_validity: *require_prior_validity,
                    description: description.clone(),
                    ..manager.apply_options()
                };
                to_json(&manager.apply_transformation(context, file.as_deref(), script, options)?)
            }
            ToolRequest::BatchCorrections { items, policy } => {
                let items = items
                    .iter()
                    .map(|item| self.batch_item(item))
                    .collect::<Result<Vec<_>, _>>()?;
                let batch = CorrectionBatch::new(items, *policy);
                to_json(&manager.batch(context, &batch, &self.cancel))
            }
            ToolRequest::SwitchXmlFile { file } => to_json(&manager.load_or_switch(context, file)?),
            ToolRequest::ListWorkspaceFiles { pattern } => {
                let files = manager.list_workspace_files(pattern.as_deref())?;
                Ok(json!({ "count": files.len(), "files": files }))
            }
            ToolRequest::CreateBackup { file } => {
                to_json(&manager.create_backup(context, file.as_deref())?)
            }
            ToolRequest::ReloadDocument => to_json(&manager.reload(context)?),
            ToolRequest::GetCurrentFile => to_json(&manager.current(context)?),
            ToolRequest::CloseDocument => to_json(&manager.close(context)),
            ToolRequest::GetStructureSummary { file, max_depth } => to_json(
                &manager.structure_summary(
                    context,
                    file.as_deref(),
                    max_depth.unwrap_or(DEFAULT_SUMMARY_DEPTH),
                )?,
            ),
            ToolRequest::FindIrregularities { file, checks } => {
                let checks = checks.iter().map(irregularity_check).collect::<Vec<_>>();
                to_json(&manager.find_irregularities(context, file.as_deref(), &checks)?)
            }
            ToolRequest::ValidateDocument { file } => {
                let (path, result) = manager.validate(context, file.as_deref())?;
                Ok(json!({ "path": path, "validation": result }))
            }
        }
    }

    fn batch_item(&self, item: &BatchItemRequest) -> Result<BatchItem, DispatchError> {
        // Unresolvable targets still become items so they fail in order.
        let resolver = self.manager.resolver();
        let target = resolver
            .locate(&item.file)
            .unwrap_or_else(|_| resolver.data_root().join(&item.file));
        let script = match &item.script {
            Some(script) => script.clone(),
            None => corrections_script(&item.corrections)
                .map_err(|error| DispatchError::invalid_structure(error.to_string()))?,
        };
        Ok(BatchItem { target, script })
    }
}

fn irregularity_check(check: &CheckRequest) -> IrregularityCheck {
    let script = check.xquery.as_ref().map_or_else(
        || Script::xpath(check.xpath.clone().unwrap_or_default()),
        |query| Script::Xquery {
            source: query.clone(),
            external_vars: BTreeMap::new(),
        },
    );
    IrregularityCheck {
        description: check.description.clone(),
        script,
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, DispatchError> {
    Ok(serde_json::to_value(value)?)
}

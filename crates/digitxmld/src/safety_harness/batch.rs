//! Ordered multi-document corrections.
//!
//! Each item runs the full single-document pipeline against its own target
//! and gets its own backup. A batch is not a transaction: items committed
//! before a failure stay committed.

use std::sync::atomic::{AtomicBool, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use digitxml_engine::{Diagnostic, Script, XmlDocument};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{info, warn};

use super::backup::Backup;
use super::pipeline::{ApplyOptions, ApplyPipeline, CommitOutcome};

const BATCH_TARGET: &str = "digitxmld::batch";

/// What to do after an item is rejected or fails.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchPolicy {
    /// Stop at the first rejected or failed item.
    HaltOnFirstFailure,
    /// Attempt every item.
    #[default]
    ContinueAndCollect,
}

/// One target and the script to apply to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    /// Resolved document path.
    pub target: Utf8PathBuf,
    /// Transform script.
    pub script: Script,
}

/// Ordered items plus a failure policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionBatch {
    items: Vec<BatchItem>,
    policy: BatchPolicy,
}

impl CorrectionBatch {
    /// Creates a batch.
    #[must_use]
    pub const fn new(items: Vec<BatchItem>, policy: BatchPolicy) -> Self {
        Self { items, policy }
    }

    /// Items in processing order.
    #[must_use]
    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    /// Failure policy.
    #[must_use]
    pub const fn policy(&self) -> BatchPolicy {
        self.policy
    }
}

/// Per-item result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CorrectionOutcome {
    /// The item was written.
    Committed {
        /// Written file.
        target: Utf8PathBuf,
        /// Snapshot taken for this item.
        backup: Option<Backup>,
    },
    /// The candidate failed validation and was not written.
    SkippedInvalid {
        /// Untouched file.
        target: Utf8PathBuf,
        /// Validator diagnostics.
        diagnostics: Vec<Diagnostic>,
    },
    /// The item could not run to a verdict, or its write failed.
    Failed {
        /// Target file.
        target: Utf8PathBuf,
        /// Human-readable cause.
        reason: String,
        /// Error tag.
        kind: String,
    },
}

impl CorrectionOutcome {
    /// Target of the item.
    #[must_use]
    pub fn target(&self) -> &Utf8Path {
        match self {
            Self::Committed { target, .. }
            | Self::SkippedInvalid { target, .. }
            | Self::Failed { target, .. } => target,
        }
    }

    /// Returns true for committed items.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Counts per outcome tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Items submitted.
    pub total: usize,
    /// Items that ran.
    pub attempted: usize,
    /// Items written.
    pub committed: usize,
    /// Items rejected by validation.
    pub skipped_invalid: usize,
    /// Items that failed.
    pub failed: usize,
    /// Items never started because of the policy or a cancellation.
    pub not_attempted: usize,
    /// Whether a cancellation stopped the batch.
    pub cancelled: bool,
}

/// Ordered outcomes plus their summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// One entry per attempted item, in input order.
    pub outcomes: Vec<CorrectionOutcome>,
    /// Aggregate counts.
    pub summary: BatchSummary,
}

impl ApplyPipeline {
    /// Runs `batch` item by item.
    ///
    /// `cancel` is checked between items only; an item in flight always
    /// reaches its own outcome. `on_commit` receives every committed
    /// document so callers can refresh their sessions.
    pub fn apply_batch(
        &self,
        batch: &CorrectionBatch,
        options: &ApplyOptions,
        cancel: &AtomicBool,
        on_commit: &mut dyn FnMut(&Utf8Path, &XmlDocument),
    ) -> BatchReport {
        let mut summary = BatchSummary {
            total: batch.items.len(),
            ..BatchSummary::default()
        };
        let mut outcomes = Vec::with_capacity(batch.items.len());

        for (index, item) in batch.items.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                warn!(target: BATCH_TARGET, index, "batch cancelled");
                summary.cancelled = true;
                break;
            }

            let outcome = self.run_item(item, options, on_commit);
            summary.attempted += 1;
            match &outcome {
                CorrectionOutcome::Committed { .. } => summary.committed += 1,
                CorrectionOutcome::SkippedInvalid { .. } => summary.skipped_invalid += 1,
                CorrectionOutcome::Failed { .. } => summary.failed += 1,
            }
            let stop = !outcome.is_committed() && batch.policy == BatchPolicy::HaltOnFirstFailure;
            outcomes.push(outcome);
            if stop {
                warn!(target: BATCH_TARGET, index, "halting batch after failed item");
                break;
            }
        }

        summary.not_attempted = summary.total - summary.attempted;
        info!(
            target: BATCH_TARGET,
            total = summary.total,
            committed = summary.committed,
            skipped_invalid = summary.skipped_invalid,
            failed = summary.failed,
            not_attempted = summary.not_attempted,
            "batch finished"
        );
        BatchReport { outcomes, summary }
    }

    fn run_item(
        &self,
        item: &BatchItem,
        options: &ApplyOptions,
        on_commit: &mut dyn FnMut(&Utf8Path, &XmlDocument),
    ) -> CorrectionOutcome {
        let target = item.target.clone();
        match self.apply_to_path(&item.target, &item.script, options) {
            Ok(CommitOutcome::Committed {
                backup, document, ..
            }) => {
                on_commit(&item.target, &document);
                CorrectionOutcome::Committed { target, backup }
            }
            Ok(CommitOutcome::Rejected { diagnostics, .. }) => {
                CorrectionOutcome::SkippedInvalid { target, diagnostics }
            }
            Ok(CommitOutcome::Failed { reason, .. }) => CorrectionOutcome::Failed {
                target,
                reason,
                kind: "io".to_owned(),
            },
            Err(error) => CorrectionOutcome::Failed {
                target,
                reason: error.to_string(),
                kind: error.kind().to_owned(),
            },
        }
    }
}

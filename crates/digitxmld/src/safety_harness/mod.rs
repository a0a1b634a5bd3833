//! Safe-mutation harness for workspace documents.
//!
//! No document is written unless a recoverable snapshot of its previous bytes
//! exists and the candidate has been through the validation gate:
//!
//! 1. **Backup Store**: immutable, timestamped snapshots in the configured
//!    backup directory, falling back to a process-wide ephemeral directory
//!    when the primary cannot be written.
//!
//! 2. **Validation Gate**: classifies the external validator's answer as
//!    valid, invalid or unavailable. Unavailable is never treated as valid;
//!    the pipeline either soft-passes it with a warning or rejects.
//!
//! 3. **Apply/Commit Pipeline**: validate, back up, transform, re-validate,
//!    write atomically and restore on write failure, all under a per-path
//!    lock. Batches sequence the pipeline across documents without sharing
//!    backups or providing cross-file atomicity.
//!
//! Rejected candidates are outcomes, not errors; [`WorkspaceError`] is
//! reserved for operations that could not reach a verdict.

mod backup;
mod batch;
mod clock;
mod commit;
mod error;
mod executor;
mod gate;
mod locks;
mod pipeline;
pub mod test_doubles;

pub use backup::{
    Backup, BackupLocation, BackupStore, DirectoryLocation, StorageKind, ephemeral_dir,
};
pub use batch::{
    BatchItem, BatchPolicy, BatchReport, BatchSummary, CorrectionBatch, CorrectionOutcome,
};
pub use clock::{MonotonicClock, file_stamp};
pub use commit::{AtomicWriter, DocumentWriter};
pub use error::WorkspaceError;
pub use executor::{TransformationExecutor, TransformationResult};
pub use gate::{ValidationGate, ValidationOutcome, ValidationResult};
pub use locks::{PathGuard, PathLocks};
pub use pipeline::{ApplyOptions, ApplyPipeline, CommitOutcome, load_document};
pub use test_doubles::{ConfigurableValidator, FailingWriter, RejectingLocation};

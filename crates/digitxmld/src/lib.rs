//! Safe-mutation daemon for XML document workspaces.
//!
//! `digitxmld` lets an automated agent query and correct XML documents in a
//! workspace while keeping the on-disk files recoverable and schema-valid.
//! Requests arrive as newline-delimited JSON on stdin (see [`dispatch`]) and
//! are served one at a time against a single active document session.
//!
//! ## Safe mutation
//!
//! Every write passes through the [`safety_harness`] pipeline:
//!
//! 1. The target path is locked so concurrent mutations serialise.
//! 2. The current bytes are copied to the backup directory, falling back to
//!    an ephemeral location when the primary one is unwritable.
//! 3. The transformation runs on an in-memory copy of the tree.
//! 4. The candidate is validated against the configured schema. An invalid
//!    candidate is never written and the outcome is reported as rejected.
//! 5. The candidate is written atomically. A failed write is undone from the
//!    backup.
//!
//! Read-only requests (queries, summaries, validation) never lock or write.

mod bootstrap;
mod cli;
mod diagnose;
pub mod dispatch;
mod health;
pub mod safety_harness;
mod session;
mod shutdown;
mod telemetry;
pub mod workspace;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, FileConfigLoader, StaticConfigLoader, bootstrap_with,
    build_manager,
};
pub use cli::run;
pub use diagnose::{Check, DiagnosticReport, diagnose};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use session::{DocumentSession, SessionDescriptor, SessionState, WorkspaceContext};
pub use shutdown::{FORCED_EXIT_CODE, ShutdownError, install as install_signal_handlers};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use workspace::{CloseReport, WorkspaceManager};

#[cfg(test)]
mod tests;

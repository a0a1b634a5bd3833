//! Shared harness for the behavioural suites.

mod install;
mod reporter;

pub use install::TestInstall;
pub use reporter::{HealthEvent, RecordingHealthReporter};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// File name of the log sink written inside the configured log directory.
pub const LOG_FILE_NAME: &str = "digitxmld.log";

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Joins the log sink file name onto a resolved log directory.
#[must_use]
pub fn log_file_in(log_dir: &Utf8Path) -> Utf8PathBuf {
    log_dir.join(LOG_FILE_NAME)
}

//! Shared configuration for the digitxml workspace tools.
//!
//! The configuration is a JSON document whose path-like values are logical:
//! they are interpreted relative to an installation root by the
//! [`WorkspaceResolver`], so the same file behaves identically regardless of
//! the process working directory. A missing configuration file is not an
//! error; the defaults describe a `./data` workspace with `./backups` and
//! `./logs` beside it.

mod defaults;
mod logging;
mod resolver;

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::warn;

pub use defaults::{
    DEFAULT_CONFIG_FILE, DEFAULT_DISCOVERY_PATTERN, DEFAULT_LOG_FILTER, DEFAULT_TOOL_TIMEOUT_SECS,
    default_log_filter, default_log_format,
};
pub use logging::{LOG_FILE_NAME, LogFormat, LogFormatParseError, log_file_in};
pub use resolver::{ResolveError, WorkspaceResolver, is_pattern};

/// How the commit pipeline treats a validator that could not run.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum UnavailableValidatorPolicy {
    /// Commit anyway and record a warning.
    #[default]
    SoftPass,
    /// Refuse to commit without a definite validation verdict.
    Reject,
}

/// Command templates for the external query, transform and validation tools.
///
/// Each template is an argv vector. The placeholders `{script}`,
/// `{document}`, `{schema}` and `{expression}` are replaced by the
/// corresponding value. `{params}` expands to zero or more arguments:
/// `--stringparam name value` triples for XSLT and `name=value` pairs for
/// XQuery external variables.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Toolchain {
    /// XSLT processor.
    pub xslt: Vec<String>,
    /// XPath evaluator.
    pub xpath: Vec<String>,
    /// XQuery processor; none is configured by default.
    pub xquery: Option<Vec<String>>,
    /// Validator override used for every schema type when set.
    pub validator: Option<Vec<String>>,
    /// Per-invocation timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            xslt: defaults::default_xslt_command(),
            xpath: defaults::default_xpath_command(),
            xquery: None,
            validator: None,
            timeout_secs: defaults::default_tool_timeout_secs(),
        }
    }
}

impl Toolchain {
    /// Returns the validator template for a schema, chosen by extension
    /// unless an explicit override is configured.
    #[must_use]
    pub fn validator_for(&self, schema: &Utf8Path) -> Vec<String> {
        if let Some(command) = &self.validator {
            return command.clone();
        }
        match schema.extension().map(str::to_ascii_lowercase).as_deref() {
            Some("rnc") => defaults::default_rnc_validator(),
            Some("xsd") => defaults::default_xsd_validator(),
            _ => defaults::default_rng_validator(),
        }
    }
}

/// Workspace configuration.
///
/// Immutable once loaded; changing it requires a restart.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    xml_data_path: Utf8PathBuf,
    xml_schema_path: Option<Utf8PathBuf>,
    backup_dir: Utf8PathBuf,
    log_dir: Utf8PathBuf,
    default_file: Option<Utf8PathBuf>,
    log_filter: String,
    log_format: LogFormat,
    unavailable_validator: UnavailableValidatorPolicy,
    lock_timeout_ms: Option<u64>,
    toolchain: Toolchain,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            xml_data_path: defaults::default_xml_data_path(),
            xml_schema_path: None,
            backup_dir: defaults::default_backup_dir(),
            log_dir: defaults::default_log_dir(),
            default_file: None,
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
            unavailable_validator: UnavailableValidatorPolicy::default(),
            lock_timeout_ms: None,
            toolchain: Toolchain::default(),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read configuration '{path}': {source}")]
    Read {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON for [`Config`].
    #[error("failed to parse configuration '{path}': {source}")]
    Parse {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Underlying decoding error.
        #[source]
        source: serde_json::Error,
    },
}

impl Config {
    /// Loads configuration from `path`, falling back to defaults when the file
    /// does not exist.
    ///
    /// A relative `path` is interpreted against `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file exists but cannot be read or
    /// decoded.
    pub fn load(root: &Utf8Path, path: &Utf8Path) -> Result<Self, ConfigError> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        match fs::read_to_string(&path) {
            Ok(text) => Self::from_json(&path, &text),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    target: "digitxml_config",
                    path = %path,
                    "configuration file not found, using defaults"
                );
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    /// Decodes configuration text; `origin` is only used for error reporting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not a valid document.
    pub fn from_json(origin: &Utf8Path, text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Logical location of the XML data (a directory or a single file).
    #[must_use]
    pub fn xml_data_path(&self) -> &Utf8Path {
        &self.xml_data_path
    }

    /// Logical location of the schema, if validation is configured.
    #[must_use]
    pub fn xml_schema_path(&self) -> Option<&Utf8Path> {
        self.xml_schema_path.as_deref()
    }

    /// Logical backup directory.
    #[must_use]
    pub fn backup_dir(&self) -> &Utf8Path {
        &self.backup_dir
    }

    /// Logical log directory.
    #[must_use]
    pub fn log_dir(&self) -> &Utf8Path {
        &self.log_dir
    }

    /// Document opened at start-up, if any.
    #[must_use]
    pub fn default_file(&self) -> Option<&Utf8Path> {
        self.default_file.as_deref()
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Policy applied when the validator is unavailable.
    #[must_use]
    pub const fn unavailable_validator(&self) -> UnavailableValidatorPolicy {
        self.unavailable_validator
    }

    /// Default per-path lock timeout in milliseconds.
    #[must_use]
    pub const fn lock_timeout_ms(&self) -> Option<u64> {
        self.lock_timeout_ms
    }

    /// External tool templates.
    #[must_use]
    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Replaces the log filter, used by command-line overrides.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Replaces the log format, used by command-line overrides.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Points the workspace at a data location.
    #[must_use]
    pub fn with_xml_data_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.xml_data_path = path.into();
        self
    }

    /// Sets the schema used by the validation gate.
    #[must_use]
    pub fn with_xml_schema_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.xml_schema_path = Some(path.into());
        self
    }

    /// Sets the backup directory.
    #[must_use]
    pub fn with_backup_dir(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.backup_dir = path.into();
        self
    }

    /// Sets the log directory.
    #[must_use]
    pub fn with_log_dir(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.log_dir = path.into();
        self
    }

    /// Sets the document opened at start-up.
    #[must_use]
    pub fn with_default_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.default_file = Some(path.into());
        self
    }

    /// Sets the unavailable-validator policy.
    #[must_use]
    pub const fn with_unavailable_validator(mut self, policy: UnavailableValidatorPolicy) -> Self {
        self.unavailable_validator = policy;
        self
    }

    /// Sets the default lock timeout.
    #[must_use]
    pub const fn with_lock_timeout_ms(mut self, timeout: Option<u64>) -> Self {
        self.lock_timeout_ms = timeout;
        self
    }

    /// Replaces the external tool templates.
    #[must_use]
    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }
}

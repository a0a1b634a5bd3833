//! Default values shared by the configuration loader and the binaries.

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Default configuration file name, looked up relative to the installation root.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default timeout applied to every external tool invocation.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;

/// Default glob used when listing workspace files without a pattern.
pub const DEFAULT_DISCOVERY_PATTERN: &str = "**/*.xml";

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default logical location of the XML data.
#[must_use]
pub fn default_xml_data_path() -> Utf8PathBuf {
    Utf8PathBuf::from("./data")
}

/// Default logical backup directory.
#[must_use]
pub fn default_backup_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("./backups")
}

/// Default logical log directory.
#[must_use]
pub fn default_log_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("./logs")
}

/// Default timeout for external tools.
#[must_use]
pub fn default_tool_timeout_secs() -> u64 {
    DEFAULT_TOOL_TIMEOUT_SECS
}

fn template(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|token| (*token).to_owned()).collect()
}

/// `xsltproc` invocation used for XSLT stylesheets.
#[must_use]
pub fn default_xslt_command() -> Vec<String> {
    template(&["xsltproc", "{params}", "{script}", "{document}"])
}

/// `xmllint` invocation used for XPath expressions.
#[must_use]
pub fn default_xpath_command() -> Vec<String> {
    template(&["xmllint", "--xpath", "{expression}", "{document}"])
}

/// Validator invocation for RELAX NG compact syntax schemas.
#[must_use]
pub fn default_rnc_validator() -> Vec<String> {
    template(&["jing", "-c", "{schema}", "{document}"])
}

/// Validator invocation for RELAX NG XML syntax schemas.
#[must_use]
pub fn default_rng_validator() -> Vec<String> {
    template(&["xmllint", "--noout", "--relaxng", "{schema}", "{document}"])
}

/// Validator invocation for W3C XML Schema documents.
#[must_use]
pub fn default_xsd_validator() -> Vec<String> {
    template(&["xmllint", "--noout", "--schema", "{schema}", "{document}"])
}

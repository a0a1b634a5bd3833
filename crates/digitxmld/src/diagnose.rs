//! Installation diagnostics behind `digitxmld --check`.
//!
//! Each check is attempted for real (configuration is loaded, the backup
//! directory is written to) and reported as PASS or FAIL with a short detail.

use std::env;
use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::Path;

use camino::Utf8Path;
use digitxml_config::{Config, WorkspaceResolver};
use tempfile::NamedTempFile;

use crate::bootstrap::ConfigLoader;

/// Result of one diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    /// What was checked.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Extra context shown under the result line.
    pub detail: Option<String>,
}

impl Check {
    fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: Some(detail.into()),
        }
    }

    fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

/// Ordered list of check results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticReport {
    checks: Vec<Check>,
}

impl DiagnosticReport {
    /// Individual results in the order they ran.
    #[must_use]
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Returns true when every check passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    /// Looks up a check by name.
    #[must_use]
    pub fn check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|check| check.name == name)
    }

    /// Writes the human-readable report.
    ///
    /// # Errors
    ///
    /// Propagates write failures from `out`.
    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "digitxmld diagnostics")?;
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            writeln!(out, "{status} {}", check.name)?;
            if let Some(detail) = &check.detail {
                writeln!(out, "     {detail}")?;
            }
        }
        let failed = self.checks.iter().filter(|check| !check.passed).count();
        writeln!(
            out,
            "{} checks, {failed} failed",
            self.checks.len()
        )?;
        out.flush()
    }

    fn push(&mut self, check: Check) {
        self.checks.push(check);
    }
}

/// Runs every diagnostic check for an installation rooted at `root`.
///
/// `search_path` is the `PATH`-style list used to find external tools.
#[must_use]
pub fn diagnose(
    loader: &dyn ConfigLoader,
    root: &Utf8Path,
    search_path: Option<&OsStr>,
) -> DiagnosticReport {
    let mut report = DiagnosticReport::default();

    let config = match loader.load() {
        Ok(config) => {
            report.push(Check::pass("configuration", "loaded"));
            config
        }
        Err(error) => {
            report.push(Check::fail("configuration", error.to_string()));
            return report;
        }
    };

    let resolver = match WorkspaceResolver::new(root, &config) {
        Ok(resolver) => resolver,
        Err(error) => {
            report.push(Check::fail("workspace root", error.to_string()));
            return report;
        }
    };

    report.push(check_data(&resolver));
    report.push(check_schema(&resolver));
    report.push(check_backup_dir(resolver.backup_dir()));
    for (role, program) in tool_programs(&config, &resolver) {
        report.push(check_tool(&role, &program, search_path));
    }
    report
}

fn check_data(resolver: &WorkspaceResolver) -> Check {
    let root = resolver.data_root();
    if !root.is_dir() {
        return Check::fail("data path", format!("{root} is not a directory"));
    }
    match resolver.default_document() {
        Some(document) if !document.is_file() => {
            Check::fail("data path", format!("default document {document} does not exist"))
        }
        Some(document) => Check::pass("data path", format!("{root}, default document {document}")),
        None => Check::pass("data path", root.as_str()),
    }
}

fn check_schema(resolver: &WorkspaceResolver) -> Check {
    match resolver.schema_path() {
        None => Check::pass("schema", "not configured; commits are not validated"),
        Some(schema) if schema.is_file() => Check::pass("schema", schema.as_str()),
        Some(schema) => Check::fail("schema", format!("{schema} does not exist")),
    }
}

fn check_backup_dir(dir: &Utf8Path) -> Check {
    let writable = std::fs::create_dir_all(dir).and_then(|()| NamedTempFile::new_in(dir));
    match writable {
        Ok(file) => match file.close() {
            Ok(()) => Check::pass("backup directory", format!("{dir} is writable")),
            Err(error) => Check::fail("backup directory", format!("{dir}: {error}")),
        },
        Err(error) => Check::fail(
            "backup directory",
            format!("{dir} is not writable ({error}); backups will use the ephemeral fallback"),
        ),
    }
}

/// Programs named by the configured command templates.
fn tool_programs(config: &Config, resolver: &WorkspaceResolver) -> Vec<(String, String)> {
    let toolchain = config.toolchain();
    let mut programs = vec![
        ("xslt".to_owned(), toolchain.xslt.first().cloned()),
        ("xpath".to_owned(), toolchain.xpath.first().cloned()),
    ];
    if let Some(xquery) = &toolchain.xquery {
        programs.push(("xquery".to_owned(), xquery.first().cloned()));
    }
    if let Some(schema) = resolver.schema_path() {
        programs.push(("validator".to_owned(), toolchain.validator_for(schema).first().cloned()));
    }
    programs
        .into_iter()
        .map(|(role, program)| (role, program.unwrap_or_default()))
        .collect()
}

fn check_tool(role: &str, program: &str, search_path: Option<&OsStr>) -> Check {
    let name = format!("tool {role}");
    if program.is_empty() {
        return Check::fail(name, "command template is empty");
    }
    match find_executable(program, search_path) {
        Some(found) => Check::pass(name, format!("{program} at {}", found.display())),
        None => Check::fail(name, format!("{program} not found on PATH")),
    }
}

/// Finds `program` directly when it names a path, else on `search_path`.
fn find_executable(program: &str, search_path: Option<&OsStr>) -> Option<std::path::PathBuf> {
    let direct = Path::new(program);
    if direct.components().count() > 1 {
        return direct.is_file().then(|| direct.to_path_buf());
    }
    env::split_paths(search_path?)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

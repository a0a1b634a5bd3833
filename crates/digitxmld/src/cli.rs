//! Command-line entry point for the `digitxmld` binary.
//!
//! Without `--check` the daemon serves JSONL tool requests from stdin until
//! it reaches end of input or receives a termination signal.

use std::env;
use std::ffi::OsString;
use std::io::{BufRead, Write};
use std::path;
use std::process::ExitCode;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use digitxml_config::{DEFAULT_CONFIG_FILE, LogFormat};

use crate::bootstrap::{FileConfigLoader, bootstrap_with};
use crate::diagnose::diagnose;
use crate::health::StructuredHealthReporter;
use crate::shutdown;

/// Command-line interface for the XML workspace daemon.
#[derive(Parser, Debug)]
#[command(name = "digitxmld", version, about)]
pub(crate) struct Cli {
    /// Installation root every configured path is anchored at. Defaults to
    /// the directory containing the executable.
    #[arg(long, value_name = "DIR")]
    pub(crate) root: Option<Utf8PathBuf>,
    /// Configuration file, relative to the root unless absolute.
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub(crate) config_path: Utf8PathBuf,
    /// Overrides the configured log filter.
    #[arg(long, value_name = "FILTER")]
    pub(crate) log_filter: Option<String>,
    /// Overrides the configured log format (`json` or `compact`).
    #[arg(long, value_name = "FORMAT")]
    pub(crate) log_format: Option<LogFormat>,
    /// Checks the installation, prints a PASS/FAIL report and exits.
    #[arg(long)]
    pub(crate) check: bool,
}

/// Parses `args` and runs the daemon or the diagnostics report.
pub fn run<I, R, W, E>(args: I, stdin: R, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: BufRead,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let exit = if error.use_stderr() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            };
            let stream: &mut dyn Write = if error.use_stderr() { stderr } else { stdout };
            if write!(stream, "{}", error.render()).is_err() {
                return ExitCode::FAILURE;
            }
            return exit;
        }
    };

    let root = match installation_root(cli.root.as_deref()) {
        Ok(root) => root,
        Err(message) => return report_failure(stderr, &message),
    };
    let loader = FileConfigLoader::new(root.clone(), cli.config_path)
        .with_log_filter(cli.log_filter)
        .with_log_format(cli.log_format);

    if cli.check {
        let report = diagnose(&loader, &root, env::var_os("PATH").as_deref());
        if let Err(error) = report.write_to(&mut *stdout) {
            return report_failure(stderr, &error.to_string());
        }
        return if report.passed() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let mut daemon = match bootstrap_with(&loader, &root, Arc::new(StructuredHealthReporter::new()))
    {
        Ok(daemon) => daemon,
        Err(error) => return report_failure(stderr, &error.to_string()),
    };
    if let Err(error) = shutdown::install(&daemon.cancel_flag()) {
        return report_failure(stderr, &error.to_string());
    }
    match daemon.serve(stdin, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report_failure(stderr, &error.to_string()),
    }
}

fn report_failure<E: Write>(stderr: &mut E, message: &str) -> ExitCode {
    if writeln!(stderr, "digitxmld: {message}").is_err() {
        return ExitCode::FAILURE;
    }
    ExitCode::FAILURE
}

/// Resolves the installation root to an absolute UTF-8 path.
fn installation_root(requested: Option<&Utf8Path>) -> Result<Utf8PathBuf, String> {
    let raw = match requested {
        Some(root) => root.as_std_path().to_path_buf(),
        None => env::current_exe()
            .map_err(|error| format!("cannot locate the executable: {error}"))?
            .parent()
            .map(path::Path::to_path_buf)
            .ok_or_else(|| "the executable has no parent directory".to_owned())?,
    };
    let absolute = path::absolute(&raw)
        .map_err(|error| format!("cannot resolve root {}: {error}", raw.display()))?;
    Utf8PathBuf::from_path_buf(absolute)
        .map_err(|path| format!("root {} is not valid UTF-8", path.display()))
}

//! Entry point for the XML workspace daemon.
//!
//! Delegates to [`digitxmld::run`], which parses the command line, bootstraps
//! the daemon, and serves JSONL tool requests over stdin and stdout.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    digitxmld::run(std::env::args_os(), stdin, &mut stdout, &mut stderr)
}

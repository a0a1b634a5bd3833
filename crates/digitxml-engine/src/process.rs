//! Runs external XML tools with a timeout.
//!
//! Commands come from configured templates whose tokens may contain
//! `{placeholder}` markers. `{params}` expands to zero or more arguments;
//! every other placeholder is substituted in place.

use std::borrow::Cow;
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// Tracing target for tool invocations.
const PROCESS_TARGET: &str = "digitxml_engine::process";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Values substituted into a command template.
#[derive(Debug, Default)]
pub(crate) struct Bindings<'a> {
    pub(crate) substitutions: Vec<(&'a str, String)>,
    pub(crate) expansions: Vec<(&'a str, Vec<String>)>,
}

impl<'a> Bindings<'a> {
    pub(crate) fn with(mut self, placeholder: &'a str, value: impl Into<String>) -> Self {
        self.substitutions.push((placeholder, value.into()));
        self
    }

    pub(crate) fn expanding(mut self, placeholder: &'a str, values: Vec<String>) -> Self {
        self.expansions.push((placeholder, values));
        self
    }
}

/// Builds an argv from a template.
pub(crate) fn expand(template: &[String], bindings: &Bindings<'_>) -> Vec<String> {
    let mut argv = Vec::with_capacity(template.len());
    for token in template {
        if let Some((_, values)) = bindings
            .expansions
            .iter()
            .find(|(placeholder, _)| token == placeholder)
        {
            argv.extend(values.iter().cloned());
            continue;
        }
        let mut token = token.clone();
        for (placeholder, value) in &bindings.substitutions {
            if token.contains(placeholder) {
                token = token.replace(placeholder, value);
            }
        }
        argv.push(token);
    }
    argv
}

/// Captured result of a finished tool.
#[derive(Debug)]
pub(crate) struct ToolOutput {
    pub(crate) code: Option<i32>,
    /// Raw stdout; documents are decoded by the XML parser, not here.
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: String,
}

impl ToolOutput {
    pub(crate) fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout as text for query results and messages.
    pub(crate) fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Stderr, or stdout when stderr is empty.
    pub(crate) fn complaint(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout_text().trim().to_owned()
        } else {
            stderr.to_owned()
        }
    }
}

/// Reasons a tool produced no usable exit status.
#[derive(Debug, Error)]
pub(crate) enum ToolError {
    #[error("command template is empty")]
    EmptyCommand,
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("'{program}' did not finish within {timeout_secs}s")]
    Timeout { program: String, timeout_secs: u64 },
    #[error("failed waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Spawns `argv`, captures its output and enforces `timeout`.
pub(crate) fn run(argv: &[String], timeout: Duration) -> Result<ToolOutput, ToolError> {
    let (program, args) = argv.split_first().ok_or(ToolError::EmptyCommand)?;

    debug!(target: PROCESS_TARGET, %program, ?args, "spawning tool");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);
    let code = wait_for_exit(program, &mut child, timeout)?;

    let output = ToolOutput {
        code,
        stdout: collect(stdout),
        stderr: String::from_utf8_lossy(&collect(stderr)).into_owned(),
    };
    debug!(
        target: PROCESS_TARGET,
        %program,
        code = ?output.code,
        stdout_bytes = output.stdout.len(),
        "tool exited"
    );
    Ok(output)
}

fn drain(mut pipe: impl Read + Send + 'static) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        drop(pipe.read_to_end(&mut buffer));
        buffer
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn wait_for_exit(
    program: &str,
    child: &mut Child,
    timeout: Duration,
) -> Result<Option<i32>, ToolError> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status.code()),
            Ok(None) if start.elapsed() > timeout => {
                warn!(
                    target: PROCESS_TARGET,
                    %program,
                    timeout_secs = timeout.as_secs(),
                    "tool timed out, killing process"
                );
                drop(child.kill());
                drop(child.wait());
                return Err(ToolError::Timeout {
                    program: program.to_owned(),
                    timeout_secs: timeout.as_secs(),
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                return Err(ToolError::Wait {
                    program: program.to_owned(),
                    source,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|token| (*token).to_owned()).collect()
    }

    #[test]
    fn expands_placeholders_and_argument_lists() {
        let bindings = Bindings::default()
            .with("{document}", "/tmp/doc.xml")
            .with("{script}", "/tmp/s.xsl")
            .expanding(
                "{params}",
                vec!["--stringparam".to_owned(), "a".to_owned(), "1".to_owned()],
            );
        let argv = expand(
            &template(&["xsltproc", "{params}", "{script}", "--in={document}"]),
            &bindings,
        );
        assert_eq!(
            argv,
            template(&[
                "xsltproc",
                "--stringparam",
                "a",
                "1",
                "/tmp/s.xsl",
                "--in=/tmp/doc.xml"
            ])
        );
    }

    #[test]
    fn empty_expansion_removes_token() {
        let bindings = Bindings::default().expanding("{params}", Vec::new());
        let argv = expand(&template(&["tool", "{params}", "x"]), &bindings);
        assert_eq!(argv, template(&["tool", "x"]));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let result = run(
            &template(&["digitxml-definitely-not-installed"]),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(ToolError::Spawn { .. })));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(
            run(&[], Duration::from_secs(1)),
            Err(ToolError::EmptyCommand)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn captures_output_and_exit_code() {
        let output = run(
            &template(&["sh", "-c", "echo out; echo err >&2; exit 3"]),
            Duration::from_secs(5),
        )
        .expect("run shell");
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout_text().trim(), "out");
        assert_eq!(output.complaint(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn keeps_stdout_bytes_intact() {
        let output = run(
            &template(&["sh", "-c", "printf 'caf\\351'"]),
            Duration::from_secs(5),
        )
        .expect("run shell");
        assert_eq!(output.stdout, b"caf\xe9");
    }

    #[cfg(unix)]
    #[test]
    fn kills_tools_that_overrun() {
        let result = run(&template(&["sleep", "5"]), Duration::from_millis(100));
        assert!(matches!(result, Err(ToolError::Timeout { .. })));
    }
}

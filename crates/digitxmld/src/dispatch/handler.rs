//! Sequential JSONL serve loop.
//!
//! Requests are read one line at a time and each is handled to completion
//! before the next is read. Malformed or oversized lines produce an error
//! response and the loop continues.

use std::io::{self, BufRead, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use super::errors::DispatchError;
use super::request::{ToolRequest, peek_tool};
use super::response::{ResponseWriter, ToolResponse};
use super::router::{DISPATCH_TARGET, ToolRouter};
use crate::session::WorkspaceContext;

/// Maximum size of a single request line in bytes.
pub(crate) const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Outcome of reading one request line.
enum Line {
    Request(Vec<u8>),
    TooLarge(usize),
    Eof,
}

/// Serves requests from `input` until end of input or until `stop` is set.
///
/// # Errors
///
/// Returns [`DispatchError::Io`] when reading requests or writing a response
/// fails; request-level failures are reported in-band.
pub fn serve<R: BufRead, W: Write>(
    router: &ToolRouter,
    context: &mut WorkspaceContext,
    mut input: R,
    output: W,
    stop: &AtomicBool,
) -> Result<(), DispatchError> {
    let mut writer = ResponseWriter::new(output);
    let mut handled = 0_usize;
    while !stop.load(Ordering::SeqCst) {
        let response = match read_request_line(&mut input)? {
            Line::Eof => break,
            Line::TooLarge(size) => {
                let error = DispatchError::request_too_large(size, MAX_REQUEST_BYTES);
                warn!(target: DISPATCH_TARGET, %error, "oversized request");
                ToolResponse::failure(None, &error)
            }
            Line::Request(line) if line.trim_ascii().is_empty() => continue,
            Line::Request(line) => handle_line(router, context, &line),
        };
        writer.write_response(&response)?;
        handled += 1;
    }
    info!(target: DISPATCH_TARGET, handled, "serve loop finished");
    Ok(())
}

/// Parses, validates and routes one request line.
#[must_use]
pub fn handle_line(router: &ToolRouter, context: &mut WorkspaceContext, line: &[u8]) -> ToolResponse {
    let request = match ToolRequest::parse(line).and_then(|request| {
        request.validate()?;
        Ok(request)
    }) {
        Ok(request) => request,
        Err(error) => {
            warn!(target: DISPATCH_TARGET, %error, "rejected request");
            return ToolResponse::failure(peek_tool(line), &error);
        }
    };

    let tool = request.tool();
    debug!(target: DISPATCH_TARGET, tool, "dispatching request");
    match router.route(context, &request) {
        Ok(result) => ToolResponse::success(tool, result),
        Err(error) => {
            warn!(target: DISPATCH_TARGET, tool, kind = error.kind(), %error, "tool failed");
            ToolResponse::failure(Some(tool.to_owned()), &error)
        }
    }
}

/// Reads one newline-terminated line of at most [`MAX_REQUEST_BYTES`].
///
/// An oversized line is consumed up to its newline and reported by size.
fn read_request_line<R: BufRead>(input: &mut R) -> io::Result<Line> {
    let mut buffer = Vec::new();
    let limit = u64::try_from(MAX_REQUEST_BYTES + 1).unwrap_or(u64::MAX);
    let read = input.by_ref().take(limit).read_until(b'\n', &mut buffer)?;
    if read == 0 {
        return Ok(Line::Eof);
    }
    if buffer.len() <= MAX_REQUEST_BYTES || buffer.ends_with(b"\n") {
        return Ok(Line::Request(buffer));
    }
    let mut size = buffer.len();
    buffer.clear();
    loop {
        let chunk = input.by_ref().take(limit).read_until(b'\n', &mut buffer)?;
        size += chunk;
        if chunk == 0 || buffer.ends_with(b"\n") {
            return Ok(Line::TooLarge(size));
        }
        buffer.clear();
    }
}

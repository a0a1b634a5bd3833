//! Response envelopes and JSONL framing.
//!
//! Every request produces exactly one line:
//! `{"success":true,"tool":...,"result":...}` or
//! `{"success":false,"tool":...,"error":{"kind":...,"message":...}}`.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use super::errors::DispatchError;

/// Error body of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Stable error tag.
    pub kind: String,
    /// Human-readable description.
    pub message: String,
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl ToolResponse {
    /// A successful response.
    #[must_use]
    pub fn success(tool: &str, result: Value) -> Self {
        Self {
            success: true,
            tool: Some(tool.to_owned()),
            result: Some(result),
            error: None,
        }
    }

    /// A failed response; `tool` is absent when the request was unreadable.
    #[must_use]
    pub fn failure(tool: Option<String>, error: &DispatchError) -> Self {
        Self {
            success: false,
            tool,
            result: None,
            error: Some(ErrorBody {
                kind: error.kind().to_owned(),
                message: error.to_string(),
            }),
        }
    }

    /// Whether the call succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }
}

/// Writer that frames responses as JSON lines.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one response line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_response(&mut self, response: &ToolResponse) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, response)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

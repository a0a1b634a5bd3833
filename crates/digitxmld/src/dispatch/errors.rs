//! Error types for request dispatch failures.
//!
//! Each variant maps to a specific failure mode and carries enough context to
//! produce an actionable error response. Workspace failures are wrapped
//! verbatim so their tag survives into the response envelope.

use std::io;

use thiserror::Error;

use crate::safety_harness::WorkspaceError;

/// Errors surfaced during request parsing and dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line could not be parsed as a known tool request.
    #[error("malformed request: {message}")]
    MalformedRequest {
        /// Parser message.
        message: String,
        /// Underlying JSON error, when there is one.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Request parsed but its fields are inconsistent.
    #[error("invalid request structure: {message}")]
    InvalidStructure {
        /// What is inconsistent.
        message: String,
    },

    /// Request exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge {
        /// Bytes read before giving up.
        size: usize,
        /// Limit in bytes.
        max_size: usize,
    },

    /// IO error while reading requests or writing responses.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Response serialization failed.
    #[error("failed to serialize response: {0}")]
    SerializeResponse(#[from] serde_json::Error),

    /// The workspace operation failed.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

impl DispatchError {
    /// Creates a malformed request error without a JSON source.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a malformed request error from a JSON parse failure.
    pub fn from_json_error(error: serde_json::Error) -> Self {
        Self::MalformedRequest {
            message: error.to_string(),
            source: Some(error),
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates a request too large error.
    pub const fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }

    /// Stable tag reported in error responses.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRequest { .. } => "malformed_request",
            Self::InvalidStructure { .. } => "invalid_structure",
            Self::RequestTooLarge { .. } => "request_too_large",
            Self::Io(_) => "io",
            Self::SerializeResponse(_) => "internal",
            Self::Workspace(error) => error.kind(),
        }
    }
}

//! JSONL tool dispatch.
//!
//! The daemon reads one tool request per line from its input, routes it to
//! the workspace manager, and writes one response line per request:
//!
//! ```json
//! {"tool":"switch_xml_file","file":"recipes/*.xml"}
//! ```
//!
//! ```json
//! {"success":true,"tool":"switch_xml_file","result":{"path":"...","root":"recipes","elements":12,"dirty":false,"state":"loaded"}}
//! ```
//!
//! Failures carry a stable `kind` tag:
//!
//! ```json
//! {"success":false,"tool":"get_current_file","error":{"kind":"session_not_loaded","message":"no document is loaded"}}
//! ```
//!
//! A rejected commit is not a failure: it is a successful call whose result
//! has `"outcome":"rejected"`.

mod errors;
mod handler;
mod request;
mod response;
mod router;

pub use errors::DispatchError;
pub use handler::{handle_line, serve};
pub use request::{BatchItemRequest, CheckRequest, ToolRequest};
pub use response::{ErrorBody, ResponseWriter, ToolResponse};
pub use router::ToolRouter;

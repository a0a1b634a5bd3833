//! XML documents and the collaborators that query, transform and validate
//! them.
//!
//! The crate owns the in-memory document tree and the two seams used by the
//! safe-mutation pipeline: [`TransformEngine`] evaluates XPath, XQuery, XSLT
//! and built-in scripts, and [`SchemaValidator`] checks documents against a
//! schema. [`ToolchainEngine`] and [`CommandValidator`] implement both seams
//! with external command-line tools.

mod builtin;
mod corrections;
mod document;
mod engine;
mod process;
mod summary;
mod toolchain;
mod validator;

pub use builtin::BuiltinTransform;
pub use corrections::{Correction, CorrectionError, corrections_script, corrections_stylesheet};
pub use document::{Attribute, Declaration, Element, Node, ParseError, XmlDocument};
pub use engine::{EngineError, EngineOutput, ResultItem, Script, ScriptKind, TransformEngine};
pub use summary::{DEFAULT_SUMMARY_DEPTH, LevelSummary, StructureSummary, summarize};
pub use toolchain::{CommandValidator, ToolchainEngine};
pub use validator::{
    Diagnostic, SchemaValidator, ValidatorError, ValidatorReport, parse_diagnostics,
};

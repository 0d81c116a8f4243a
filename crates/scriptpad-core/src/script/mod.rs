//! PadScript: the embedded script language sessions execute.
//!
//! A submission flows through the pipeline below. Parsing stops at the
//! first syntax error; binding collects every error it finds.
//!
//! ```text
//! source ──▶ lexer ──▶ parser ──▶ loader (#load) ──▶ binder ──▶ interpreter
//!                                                      │
//!                                  SessionState ───────┘ (prior names, slots)
//! ```
//!
//! # Module Structure
//!
//! - `lexer` / `parser` / `ast` - Source text to syntax tree
//! - `loader` - `#load` expansion
//! - `binder` / `bound` - Name resolution and type checking
//! - `interpreter` - Tree-walking evaluation
//! - `library` - Host library catalogue (`#r` targets)
//! - `host` - Runtime services and faults

pub(crate) mod ast;
pub(crate) mod binder;
pub(crate) mod bound;
mod diagnostic;
mod host;
pub(crate) mod interpreter;
mod lexer;
pub mod library;
pub(crate) mod loader;
pub(crate) mod parser;
mod types;
mod value;

pub use diagnostic::{Diagnostic, Pos, SourceMap};
pub use host::{Fault, HostContext};
pub use types::Type;
pub use value::{ExceptionKind, ExceptionValue, ListRef, Value, format_double};

//! Core engine for scriptpad interactive script sessions.
//!
//! This crate provides:
//! - PadScript, the embedded script language (lexer, parser, binder, interpreter)
//! - Immutable session snapshots carried across submissions
//! - The script engine with cooperative cancellation
//! - Session bootstrapping with default imports
//! - Output sinks and engine configuration

pub mod config;
pub mod error;
pub mod execute;
pub mod output;
pub mod script;
pub mod state;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use execute::{
    AbortHandle, Failure, FailureKind, INITIALIZING_MESSAGE, OK_MESSAGE, ScriptEngine,
    add_default_imports,
};
pub use output::{Emission, RecordingOutput, ScriptOutput, TracingOutput};
pub use script::{Type, Value};
pub use state::{Import, SessionState, Variable};

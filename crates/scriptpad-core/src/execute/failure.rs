//! Submission failures.

use std::fmt;

use crate::script::{Diagnostic, Fault};

/// Why a submission failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Syntax or binding errors; nothing ran.
    Compilation,
    /// A fault raised while the script ran.
    Runtime,
    /// The abort handle was triggered.
    Canceled,
    /// The worker task panicked.
    Internal,
}

/// A failed submission: one message per cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub causes: Vec<String>,
}

impl Failure {
    pub fn new(kind: FailureKind, causes: Vec<String>) -> Self {
        Self { kind, causes }
    }

    pub fn canceled() -> Self {
        Self::from(Fault::Canceled)
    }

    /// Compile failure with one cause per diagnostic.
    pub fn compilation(diagnostics: &[Diagnostic]) -> Self {
        Self::new(
            FailureKind::Compilation,
            diagnostics.iter().map(Diagnostic::to_string).collect(),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Internal, vec![message.into()])
    }

    /// All causes joined with `\n`, as written to the error channel.
    pub fn message(&self) -> String {
        self.causes.join("\n")
    }
}

impl From<Fault> for Failure {
    fn from(fault: Fault) -> Self {
        let kind = match fault {
            Fault::Canceled => FailureKind::Canceled,
            Fault::Single(_) | Fault::Aggregate(_) => FailureKind::Runtime,
        };
        Self::new(kind, fault.into_causes())
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for Failure {}

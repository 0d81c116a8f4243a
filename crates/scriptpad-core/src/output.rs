//! Output sinks for session emissions.
//!
//! The engine writes to its sink synchronously, in emission order, and never
//! buffers. For one submission the order is: echo (if requested), then any
//! info emitted by the script itself, then exactly one of result, `OK` info
//! or error.

use std::sync::{Mutex, PoisonError};

use tracing::{error, info};

/// Receiver of everything a session reports.
pub trait ScriptOutput: Send + Sync {
    /// The submitted source, before compilation.
    fn echo(&self, text: &str);

    /// Status lines and script console output.
    fn info(&self, text: &str);

    /// Rendered value of a successful submission.
    fn result(&self, text: &str);

    /// Failure causes, joined with `\n`.
    fn error(&self, text: &str);
}

/// One recorded emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    Echo(String),
    Info(String),
    Result(String),
    Error(String),
}

/// Thread-safe in-memory log of emissions.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    log: Mutex<Vec<Emission>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, emission: Emission) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(emission);
    }

    /// Everything recorded so far, in order.
    pub fn emissions(&self) -> Vec<Emission> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<Emission> {
        std::mem::take(&mut *self.log.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl ScriptOutput for RecordingOutput {
    fn echo(&self, text: &str) {
        self.push(Emission::Echo(text.to_string()));
    }

    fn info(&self, text: &str) {
        self.push(Emission::Info(text.to_string()));
    }

    fn result(&self, text: &str) {
        self.push(Emission::Result(text.to_string()));
    }

    fn error(&self, text: &str) {
        self.push(Emission::Error(text.to_string()));
    }
}

/// Forwards emissions to `tracing`, for embedders without a console.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingOutput;

impl ScriptOutput for TracingOutput {
    fn echo(&self, text: &str) {
        info!(target: "scriptpad::echo", "{text}");
    }

    fn info(&self, text: &str) {
        info!(target: "scriptpad::info", "{text}");
    }

    fn result(&self, text: &str) {
        info!(target: "scriptpad::result", "{text}");
    }

    fn error(&self, text: &str) {
        error!(target: "scriptpad::error", "{text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_preserves_order() {
        let output = RecordingOutput::new();
        output.echo("1 + 1");
        output.result("2");
        output.info("OK");
        assert_eq!(
            output.emissions(),
            vec![
                Emission::Echo("1 + 1".into()),
                Emission::Result("2".into()),
                Emission::Info("OK".into()),
            ]
        );
    }

    #[test]
    fn test_take_drains() {
        let output = RecordingOutput::new();
        output.error("boom");
        assert_eq!(output.take(), vec![Emission::Error("boom".into())]);
        assert!(output.emissions().is_empty());
    }
}

//! Terminal output sink.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use scriptpad_core::ScriptOutput;

use crate::colors;

/// Writes session emissions to the terminal.
///
/// Echo, info and results go to stdout, errors to stderr. Colors are used
/// only when the stream is a terminal. Errors are counted so headless
/// commands can set the exit status. Write failures (a closed pipe) are
/// ignored.
#[derive(Debug)]
pub struct ConsoleOutput {
    color_out: bool,
    color_err: bool,
    errors: AtomicUsize,
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self {
            color_out: io::stdout().is_terminal(),
            color_err: io::stderr().is_terminal(),
            errors: AtomicUsize::new(0),
        }
    }

    /// Number of error emissions so far.
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// Write one line, dropping any I/O error.
fn emit(mut stream: impl Write, line: &str) {
    let _ = writeln!(stream, "{line}");
}

impl ScriptOutput for ConsoleOutput {
    fn echo(&self, text: &str) {
        let mut out = io::stdout().lock();
        for line in text.lines() {
            emit(
                &mut out,
                &colors::paint(self.color_out, colors::DIM, &format!("> {line}")),
            );
        }
    }

    fn info(&self, text: &str) {
        emit(io::stdout().lock(), text);
    }

    fn result(&self, text: &str) {
        emit(
            io::stdout().lock(),
            &colors::paint(self.color_out, colors::GREEN, text),
        );
    }

    fn error(&self, text: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        emit(
            io::stderr().lock(),
            &colors::paint(self.color_err, colors::RED, text),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_are_counted() {
        let output = ConsoleOutput::new();
        output.info("OK");
        output.error("first");
        output.error("second");
        assert_eq!(output.error_count(), 2);
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn test_emit_ignores_closed_pipe() {
        emit(ClosedPipe, "dropped");

        let mut buffer = Vec::new();
        emit(&mut buffer, "kept");
        assert_eq!(buffer, b"kept\n");
    }

    #[test]
    fn test_default_counts_from_zero() {
        assert_eq!(ConsoleOutput::default().error_count(), 0);
    }
}

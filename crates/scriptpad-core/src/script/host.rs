//! Runtime services shared by the interpreter and host libraries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::value::{ExceptionKind, ExceptionValue};
use crate::execute::AbortHandle;
use crate::output::ScriptOutput;

/// Granularity of cancellable waits.
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// A fault raised while running a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// A single failure cause.
    Single(String),
    /// Several independent causes (an `AggregateException` with inner
    /// exceptions).
    Aggregate(Vec<String>),
    /// The run observed its abort handle.
    Canceled,
}

impl Fault {
    pub const CANCELED_MESSAGE: &'static str = "The operation was canceled.";

    pub fn single(message: impl Into<String>) -> Self {
        Fault::Single(message.into())
    }

    /// The fault raised by `throw e`.
    pub fn from_exception(exception: &ExceptionValue) -> Self {
        match exception.kind {
            ExceptionKind::Aggregate if !exception.inner.is_empty() => Fault::Aggregate(
                exception.inner.iter().map(|e| e.message.clone()).collect(),
            ),
            _ => Fault::Single(exception.message.clone()),
        }
    }

    /// The messages of every cause, in order.
    pub fn into_causes(self) -> Vec<String> {
        match self {
            Fault::Single(message) => vec![message],
            Fault::Aggregate(messages) => messages,
            Fault::Canceled => vec![Self::CANCELED_MESSAGE.to_string()],
        }
    }
}

/// What host functions may touch while a submission runs.
#[derive(Clone)]
pub struct HostContext {
    output: Arc<dyn ScriptOutput>,
    abort: AbortHandle,
}

impl HostContext {
    pub fn new(output: Arc<dyn ScriptOutput>, abort: AbortHandle) -> Self {
        Self { output, abort }
    }

    pub fn output(&self) -> &dyn ScriptOutput {
        self.output.as_ref()
    }

    /// Fail with [`Fault::Canceled`] once the run has been aborted.
    pub fn check(&self) -> Result<(), Fault> {
        if self.abort.is_aborted() {
            Err(Fault::Canceled)
        } else {
            Ok(())
        }
    }

    /// Block for `millis` milliseconds (`-1` waits until cancelled),
    /// polling the abort handle between slices.
    pub fn sleep(&self, millis: i64) -> Result<(), Fault> {
        if millis < -1 || millis > i64::from(i32::MAX) {
            return Err(Fault::single(
                "Number must be either non-negative and less than or equal to Int32.MaxValue or -1.",
            ));
        }
        let deadline = u64::try_from(millis)
            .ok()
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        loop {
            self.check()?;
            let slice = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(());
                    }
                    remaining.min(WAIT_SLICE)
                }
                None => WAIT_SLICE,
            };
            std::thread::sleep(slice);
        }
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("aborted", &self.abort.is_aborted())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RecordingOutput;

    fn context(abort: &AbortHandle) -> HostContext {
        HostContext::new(Arc::new(RecordingOutput::new()), abort.clone())
    }

    #[test]
    fn test_aggregate_fault_lists_inner_messages() {
        let inner = vec![
            Arc::new(ExceptionValue::new("first")),
            Arc::new(ExceptionValue::new("second")),
        ];
        let fault = Fault::from_exception(&ExceptionValue::aggregate(None, inner));
        assert_eq!(fault.into_causes(), vec!["first", "second"]);
    }

    #[test]
    fn test_empty_aggregate_is_single() {
        let fault = Fault::from_exception(&ExceptionValue::aggregate(None, Vec::new()));
        assert_eq!(
            fault,
            Fault::Single(ExceptionValue::AGGREGATE_MESSAGE.to_string())
        );
    }

    #[test]
    fn test_sleep_completes() {
        let abort = AbortHandle::new();
        let start = Instant::now();
        context(&abort).sleep(30).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_sleep_observes_abort() {
        let abort = AbortHandle::new();
        abort.abort();
        assert_eq!(context(&abort).sleep(-1), Err(Fault::Canceled));
    }

    #[test]
    fn test_sleep_rejects_negative() {
        let abort = AbortHandle::new();
        assert!(matches!(context(&abort).sleep(-5), Err(Fault::Single(_))));
    }
}

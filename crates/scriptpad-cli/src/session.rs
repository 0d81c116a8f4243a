//! Caller side of a script session.
//!
//! `ReplSession` picks the code to run (a whole buffer or a selection of
//! it), gives every run its own abort handle and tracks whether a run is in
//! progress. An [`Interrupter`] obtained before a run can cancel it from
//! another task, which is how Ctrl-C and `--timeout` are implemented.

use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use scriptpad_core::{AbortHandle, ScriptEngine, Value, add_default_imports};
use tracing::debug;

/// Handle of the run in progress, if any.
type RunSlot = Arc<Mutex<Option<AbortHandle>>>;

/// Cancels whatever run is in progress on its session.
#[derive(Clone)]
pub struct Interrupter(RunSlot);

impl Interrupter {
    /// Abort the current run. Returns `false` when the session was idle.
    pub fn interrupt(&self) -> bool {
        match self.0.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(handle) => {
                debug!("Interrupting running submission");
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Whether the session has a run in progress.
    pub fn is_running(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

pub struct ReplSession {
    engine: ScriptEngine,
    running: RunSlot,
}

impl ReplSession {
    pub fn new(engine: ScriptEngine) -> Self {
        Self {
            engine,
            running: Arc::new(Mutex::new(None)),
        }
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter(Arc::clone(&self.running))
    }

    pub fn engine(&self) -> &ScriptEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ScriptEngine {
        &mut self.engine
    }

    pub async fn bootstrap(&mut self) -> bool {
        add_default_imports(&mut self.engine).await
    }

    /// Run `buffer`, or only the `selection` of it when one is given and
    /// non-empty.
    pub async fn run(
        &mut self,
        buffer: &str,
        selection: Option<Range<usize>>,
        echo: bool,
    ) -> Option<Value> {
        let code = selected_code(buffer, selection);
        let cancel = self.begin();
        let value = self.engine.execute(code, echo, &cancel).await;
        self.finish();
        value
    }

    pub async fn run_file(&mut self, path: &Path) -> Option<Value> {
        let cancel = self.begin();
        let value = self.engine.execute_script(path, &cancel).await;
        self.finish();
        value
    }

    fn begin(&self) -> AbortHandle {
        let handle = AbortHandle::new();
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
        handle
    }

    fn finish(&self) {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// The text a run executes: the selection when it is non-empty and lies on
/// character boundaries of `buffer`, else the whole buffer.
fn selected_code(buffer: &str, selection: Option<Range<usize>>) -> &str {
    selection
        .filter(|range| !range.is_empty())
        .and_then(|range| buffer.get(range))
        .unwrap_or(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptpad_core::{Emission, EngineConfig, RecordingOutput};
    use std::time::Duration;

    fn session() -> (ReplSession, Arc<RecordingOutput>) {
        let output = Arc::new(RecordingOutput::new());
        let engine = ScriptEngine::new(output.clone(), EngineConfig::default());
        (ReplSession::new(engine), output)
    }

    #[test]
    fn test_selected_code() {
        let buffer = "int x = 1;\nx + 1";
        assert_eq!(selected_code(buffer, None), buffer);
        assert_eq!(selected_code(buffer, Some(11..16)), "x + 1");
        assert_eq!(selected_code(buffer, Some(3..3)), buffer);
        assert_eq!(selected_code(buffer, Some(0..99)), buffer);
    }

    #[tokio::test]
    async fn test_run_selection() {
        let (mut session, output) = session();
        session.run("int x = 20;", None, false).await;
        let value = session.run("int y = 0;\nx * 2 + 2", Some(11..20), true).await;
        assert_eq!(value, Some(Value::Int(42)));
        assert!(session.engine().state().unwrap().variable("y").is_none());
        assert_eq!(
            output.take(),
            vec![
                Emission::Info("OK".into()),
                Emission::Echo("x * 2 + 2".into()),
                Emission::Result("42".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_interrupt_running_submission() {
        let (mut session, output) = session();
        assert!(!session.interrupter().interrupt());

        let interrupter = session.interrupter();
        let remote = interrupter.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(20)).await;
                if remote.interrupt() {
                    break;
                }
            }
        });
        session.run("while (true) { }", None, false).await;

        assert!(!session.interrupter().is_running());
        assert_eq!(
            output.take(),
            vec![Emission::Error("The operation was canceled.".into())]
        );
    }

    #[tokio::test]
    async fn test_each_run_gets_a_fresh_handle() {
        let (mut session, _) = session();
        session.run("int n = 1;", None, false).await;
        // An interrupt while idle must not poison the next run.
        session.interrupter().interrupt();
        assert_eq!(session.run("n", None, false).await, Some(Value::Int(1)));
    }
}

//! The script engine: one interactive session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::context::AbortHandle;
use super::failure::Failure;
use super::submission::{SubmissionContext, run_submission};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::output::ScriptOutput;
use crate::script::library;
use crate::script::{HostContext, Value};
use crate::state::SessionState;

/// Info line emitted for a successful submission without a value.
pub const OK_MESSAGE: &str = "OK";

/// Stack reserved for each submission thread. Parsing, binding and
/// evaluation all recurse over the syntax tree, whose height the parser
/// caps, and evaluation nests once more per user call.
const SUBMISSION_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Executes submissions one at a time against an evolving session state.
///
/// The engine owns the only current-state slot. A successful submission
/// replaces it with a new snapshot; a failed or cancelled one leaves it as
/// it was. `execute` takes `&mut self`, so an engine never runs two
/// submissions at once.
pub struct ScriptEngine {
    output: Arc<dyn ScriptOutput>,
    references: Arc<[String]>,
    imports: Vec<String>,
    script_root: Option<PathBuf>,
    state: Option<Arc<SessionState>>,
}

impl ScriptEngine {
    /// Create an engine without state.
    ///
    /// References that name no known library are dropped with a warning.
    pub fn new(output: Arc<dyn ScriptOutput>, config: EngineConfig) -> Self {
        let references: Vec<String> = config
            .references
            .into_iter()
            .filter(|name| {
                let known = library::library(name).is_some();
                if !known {
                    warn!("Ignoring unknown reference '{}'", name);
                }
                known
            })
            .collect();
        Self {
            output,
            references: references.into(),
            imports: config.imports,
            script_root: config.script_root,
            state: None,
        }
    }

    /// Compile and run `code`, reporting the outcome on the output sink.
    ///
    /// With `echo`, the code is written to the echo channel first. Returns
    /// the submission's value when it has a non-empty rendering; every other
    /// outcome (no value, failure, cancellation) returns `None`.
    pub async fn execute(&mut self, code: &str, echo: bool, cancel: &AbortHandle) -> Option<Value> {
        self.try_execute(code, echo, cancel).await.ok().flatten()
    }

    /// Like [`execute`](Self::execute), but also hands the failure back to
    /// the caller. Emissions are identical.
    pub async fn try_execute(
        &mut self,
        code: &str,
        echo: bool,
        cancel: &AbortHandle,
    ) -> Result<Option<Value>, Failure> {
        if echo {
            self.output.echo(code);
        }

        let prior = self.state.clone();
        let references = Arc::clone(&self.references);
        let script_root = self.script_root.clone();
        let host = HostContext::new(Arc::clone(&self.output), cancel.clone());
        let source = code.to_string();
        debug!(
            "Executing submission ({} bytes) on {}",
            source.len(),
            prior
                .as_ref()
                .map_or("a fresh session".to_string(), |s| format!(
                    "state #{}",
                    s.submissions()
                ))
        );

        // The interpreter blocks (loops, Thread.Sleep) and recurses, so it
        // runs on its own thread with a stack sized for the deepest call
        // chain of maximally nested code.
        let (tx, rx) = oneshot::channel();
        let spawned = thread::Builder::new()
            .name("scriptpad-submission".to_string())
            .stack_size(SUBMISSION_STACK_SIZE)
            .spawn(move || {
                let outcome = run_submission(
                    &source,
                    SubmissionContext {
                        prior: prior.as_deref(),
                        references: &references,
                        script_root: script_root.as_deref(),
                        host: &host,
                    },
                );
                // The receiver only goes away when the caller was dropped.
                let _ = tx.send(outcome);
            });
        let outcome = match spawned {
            Ok(_) => rx.await.unwrap_or_else(|_| {
                tracing::error!("Submission thread ended without a result");
                Err(Failure::internal("Submission thread panicked"))
            }),
            Err(e) => {
                tracing::error!("Failed to spawn submission thread: {}", e);
                Err(Failure::internal(format!(
                    "Failed to spawn submission thread: {e}"
                )))
            }
        };

        match outcome {
            Ok(state) => {
                let value = state.return_value().cloned();
                debug!("Adopting state #{}", state.submissions());
                self.state = Some(Arc::new(state));
                match value {
                    Some(value) => {
                        let rendered = value.to_string();
                        if rendered.is_empty() {
                            self.output.info(OK_MESSAGE);
                            Ok(None)
                        } else {
                            self.output.result(&rendered);
                            Ok(Some(value))
                        }
                    }
                    None => {
                        self.output.info(OK_MESSAGE);
                        Ok(None)
                    }
                }
            }
            Err(failure) => {
                debug!("Submission failed ({:?})", failure.kind);
                self.output.error(&failure.message());
                Err(failure)
            }
        }
    }

    /// Run a script file without echo.
    ///
    /// The file's directory becomes the script root, so its `#load`s
    /// resolve next to it.
    pub async fn execute_script(&mut self, path: &Path, cancel: &AbortHandle) -> Option<Value> {
        self.output
            .info(&format!("Loading script: {}", path.display()));
        let code = match tokio::fs::read_to_string(path).await {
            Ok(code) => code,
            Err(source) => {
                let err = Error::Read {
                    path: path.to_path_buf(),
                    source,
                };
                self.output.error(&err.to_string());
                return None;
            }
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            self.set_script_root(dir);
        }
        self.execute(&code, false, cancel).await
    }

    /// Current session snapshot, if any submission has succeeded.
    pub fn state(&self) -> Option<Arc<SessionState>> {
        self.state.clone()
    }

    /// Discard the session; the next submission starts fresh.
    pub fn reset(&mut self) {
        debug!("Resetting session");
        self.state = None;
    }

    pub fn script_root(&self) -> Option<&Path> {
        self.script_root.as_deref()
    }

    /// Set the root for relative `#load` paths of later submissions.
    pub fn set_script_root(&mut self, root: impl Into<PathBuf>) {
        let root = root.into();
        debug!("Script root set to {}", root.display());
        self.script_root = Some(root);
    }

    /// Libraries every submission references.
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Directives issued by the bootstrapper.
    pub fn default_imports(&self) -> &[String] {
        &self.imports
    }

    pub fn output(&self) -> &Arc<dyn ScriptOutput> {
        &self.output
    }
}

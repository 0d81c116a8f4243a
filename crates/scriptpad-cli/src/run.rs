//! Headless commands: `run` a script file, `eval` snippets.

use std::path::Path;
use std::time::Duration;

use crate::session::ReplSession;

/// Bootstrap (unless disabled), then run the script at `path`.
///
/// With a timeout, the run is aborted through its cancellation handle once
/// the time is up.
pub async fn execute_file(
    session: &mut ReplSession,
    path: &Path,
    timeout: Option<Duration>,
    bootstrap: bool,
) {
    if bootstrap {
        session.bootstrap().await;
    }

    let interrupter = session.interrupter();
    let run = session.run_file(path);
    tokio::pin!(run);
    match timeout {
        Some(limit) => {
            tokio::select! {
                _ = &mut run => {}
                _ = tokio::time::sleep(limit) => {
                    if interrupter.is_running() {
                        tracing::warn!("Script exceeded {:?}, cancelling", limit);
                        interrupter.interrupt();
                    }
                    run.await;
                }
            }
        }
        None => {
            run.await;
        }
    }
}

/// Bootstrap (unless disabled), then run each snippet in order against the
/// same session.
pub async fn eval_snippets(
    session: &mut ReplSession,
    snippets: &[String],
    echo: bool,
    bootstrap: bool,
) {
    if bootstrap {
        session.bootstrap().await;
    }
    for snippet in snippets {
        session.run(snippet, None, echo).await;
    }
}

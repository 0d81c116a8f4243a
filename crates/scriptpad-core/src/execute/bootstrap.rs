//! Session bootstrapping.

use tracing::debug;

use super::context::AbortHandle;
use super::engine::ScriptEngine;

/// Info line emitted before the bootstrap submission.
pub const INITIALIZING_MESSAGE: &str = "Initializing scripting...";

/// Submit the engine's default import directives as one hidden submission.
///
/// The submission is not echoed and cannot be cancelled. It succeeds or
/// fails like any other; on failure the engine keeps no state and the next
/// submission starts fresh. Returns whether the imports were adopted.
pub async fn add_default_imports(engine: &mut ScriptEngine) -> bool {
    engine.output().info(INITIALIZING_MESSAGE);
    let source = engine.default_imports().join("\n");
    debug!("Bootstrapping session with {} imports", engine.default_imports().len());
    engine
        .try_execute(&source, false, &AbortHandle::new())
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::EngineConfig;
    use crate::output::{Emission, RecordingOutput};
    use crate::state::Import;

    #[tokio::test]
    async fn test_default_imports_are_adopted() {
        let output = Arc::new(RecordingOutput::new());
        let mut engine = ScriptEngine::new(output.clone(), EngineConfig::default());

        assert!(add_default_imports(&mut engine).await);
        assert_eq!(
            output.take(),
            vec![
                Emission::Info(INITIALIZING_MESSAGE.into()),
                Emission::Info("OK".into()),
            ]
        );
        let state = engine.state().unwrap();
        assert!(state.imports().contains(&Import::Static("Pad.Api.Host".into())));
        assert_eq!(state.imports().len(), 5);
    }

    #[tokio::test]
    async fn test_failed_bootstrap_leaves_no_state() {
        let output = Arc::new(RecordingOutput::new());
        let config = EngineConfig {
            imports: vec!["using Missing.Namespace;".into()],
            ..EngineConfig::default()
        };
        let mut engine = ScriptEngine::new(output.clone(), config);

        assert!(!add_default_imports(&mut engine).await);
        assert!(engine.state().is_none());
        assert!(matches!(output.emissions().last(), Some(Emission::Error(_))));
    }
}

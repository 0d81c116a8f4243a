//! Compile and run one submission against a prior state.

use std::path::Path;

use tracing::debug;

use super::failure::Failure;
use crate::script::binder::bind;
use crate::script::interpreter::Machine;
use crate::script::loader::load;
use crate::script::{HostContext, SourceMap, Value};
use crate::state::{SessionState, StateBuilder};

/// Everything a submission needs besides its source text.
pub(crate) struct SubmissionContext<'a> {
    pub prior: Option<&'a SessionState>,
    pub references: &'a [String],
    pub script_root: Option<&'a Path>,
    pub host: &'a HostContext,
}

/// Compile `code` against the prior state and run it.
///
/// On success returns the state that supersedes the prior one; the
/// submission's value is its `return_value`. The prior state is never
/// modified: the script runs against a copy of its variable slots.
pub(crate) fn run_submission(code: &str, cx: SubmissionContext<'_>) -> Result<SessionState, Failure> {
    cx.host.check()?;

    let mut sources = SourceMap::new();
    let submission =
        load(code, cx.script_root, &mut sources).map_err(|d| Failure::compilation(&[sources.locate(d)]))?;
    let bound = bind(&submission, cx.prior, cx.references).map_err(|diagnostics| {
        let located: Vec<_> = diagnostics.into_iter().map(|d| sources.locate(d)).collect();
        Failure::compilation(&located)
    })?;
    debug!(
        "Compiled submission: {} statements, {} new variables, {} new functions",
        bound.body.len(),
        bound.globals.len(),
        bound.functions.len()
    );

    cx.host.check()?;

    let mut globals = cx.prior.map(SessionState::values).unwrap_or_default();
    globals.extend(bound.globals.iter().map(|g| Value::default_for(&g.ty)));
    let mut functions = cx
        .prior
        .map(|s| s.function_table().to_vec())
        .unwrap_or_default();
    functions.extend(bound.functions.iter().cloned());

    let mut machine = Machine::new(globals, functions, cx.host);
    let value = machine.run(&bound)?;

    let declared = bound
        .globals
        .iter()
        .map(|g| (g.name.clone(), g.ty.clone()))
        .collect();
    Ok(StateBuilder::from_prior(cx.prior)
        .references(bound.references.clone())
        .imports(bound.imports.clone())
        .variables(machine.into_globals(), declared)
        .functions(bound.functions.clone())
        .return_value(value)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::execute::{AbortHandle, FailureKind};
    use crate::output::RecordingOutput;

    fn references() -> Vec<String> {
        vec!["System.Runtime".to_string(), "Pad.Api".to_string()]
    }

    fn submit(code: &str, prior: Option<&SessionState>) -> Result<SessionState, Failure> {
        let host = HostContext::new(Arc::new(RecordingOutput::new()), AbortHandle::new());
        let references = references();
        run_submission(
            code,
            SubmissionContext {
                prior,
                references: &references,
                script_root: None,
                host: &host,
            },
        )
    }

    #[test]
    fn test_state_carries_variables_forward() {
        let s1 = submit("int x = 5;", None).unwrap();
        assert_eq!(s1.variable("x").unwrap().value, Value::Int(5));
        assert_eq!(s1.return_value(), None);

        let s2 = submit("x = x * 2; x + 1", Some(&s1)).unwrap();
        assert_eq!(s2.variable("x").unwrap().value, Value::Int(10));
        assert_eq!(s2.return_value(), Some(&Value::Int(11)));
        // The prior snapshot is untouched.
        assert_eq!(s1.variable("x").unwrap().value, Value::Int(5));
    }

    #[test]
    fn test_runtime_failure_discards_working_copy() {
        let s1 = submit("int x = 5;", None).unwrap();
        let err = submit("x = 7; x / 0", Some(&s1)).unwrap_err();
        assert_eq!(err.kind, FailureKind::Runtime);
        assert_eq!(s1.variable("x").unwrap().value, Value::Int(5));
    }

    #[test]
    fn test_redeclared_variable_keeps_old_slot_for_old_functions() {
        let s1 = submit("int x = 1;\nint GetX() { return x; }", None).unwrap();
        let s2 = submit("string x = \"new\";", Some(&s1)).unwrap();
        let s3 = submit("GetX()", Some(&s2)).unwrap();
        assert_eq!(s3.return_value(), Some(&Value::Int(1)));
        assert_eq!(s3.variable("x").unwrap().value, Value::str("new"));
        assert_eq!(s3.variables().count(), 1);
    }

    #[test]
    fn test_aborted_before_compile() {
        let abort = AbortHandle::new();
        abort.abort();
        let host = HostContext::new(Arc::new(RecordingOutput::new()), abort);
        let err = run_submission(
            "int x = 1;",
            SubmissionContext {
                prior: None,
                references: &references(),
                script_root: None,
                host: &host,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind, FailureKind::Canceled);
    }

    #[test]
    fn test_compile_errors_are_all_reported() {
        let err = submit("int a = b;\nint c = d;", None).unwrap_err();
        assert_eq!(err.kind, FailureKind::Compilation);
        assert_eq!(err.causes.len(), 2);
        assert!(err.causes[0].starts_with("(1,9): error SP0103"));
        assert!(err.causes[1].starts_with("(2,9): error SP0103"));
    }
}

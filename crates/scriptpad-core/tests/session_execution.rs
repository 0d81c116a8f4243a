//! Integration tests for script sessions.
//!
//! Each test drives a `ScriptEngine` through a sequence of submissions and
//! checks both the emissions and the resulting session state.

use std::sync::Arc;
use std::time::Duration;

use scriptpad_core::{
    AbortHandle, Emission, EngineConfig, RecordingOutput, ScriptEngine, Value, add_default_imports,
};
use tempfile::TempDir;

fn engine() -> (ScriptEngine, Arc<RecordingOutput>) {
    let output = Arc::new(RecordingOutput::new());
    let engine = ScriptEngine::new(output.clone(), EngineConfig::default());
    (engine, output)
}

async fn bootstrapped() -> (ScriptEngine, Arc<RecordingOutput>) {
    let (mut engine, output) = engine();
    assert!(add_default_imports(&mut engine).await);
    output.take();
    (engine, output)
}

fn info(text: &str) -> Emission {
    Emission::Info(text.to_string())
}

fn result(text: &str) -> Emission {
    Emission::Result(text.to_string())
}

// =============================================================================
// Submission results
// =============================================================================

#[tokio::test]
async fn test_declare_use_fail_and_recover() {
    let (mut engine, output) = engine();
    let cancel = AbortHandle::new();

    assert_eq!(engine.execute("int x = 5;", false, &cancel).await, None);
    assert_eq!(output.take(), vec![info("OK")]);
    let state = engine.state().unwrap();
    assert_eq!(state.variable("x").unwrap().value, Value::Int(5));

    assert_eq!(engine.execute("x + 1", false, &cancel).await, Some(Value::Int(6)));
    assert_eq!(output.take(), vec![result("6")]);

    assert_eq!(engine.execute("x + ;", false, &cancel).await, None);
    let emissions = output.take();
    assert_eq!(emissions.len(), 1);
    assert!(matches!(&emissions[0], Emission::Error(msg) if msg.contains("SP1525")));

    assert_eq!(engine.execute("x", false, &cancel).await, Some(Value::Int(5)));
    assert_eq!(output.take(), vec![result("5")]);
}

#[tokio::test]
async fn test_compile_failure_keeps_state_snapshot() {
    let (mut engine, _output) = engine();
    let cancel = AbortHandle::new();

    engine.execute("int x = 5;", false, &cancel).await;
    let before = engine.state().unwrap();

    engine.execute("x = \"text\";", false, &cancel).await;
    let after = engine.state().unwrap();

    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.variable("x").unwrap().value, Value::Int(5));
}

#[tokio::test]
async fn test_echo_precedes_result_and_error() {
    let (mut engine, output) = engine();
    let cancel = AbortHandle::new();

    engine.execute("1 + 1", true, &cancel).await;
    engine.execute("nope", true, &cancel).await;

    let emissions = output.take();
    assert_eq!(emissions[0], Emission::Echo("1 + 1".into()));
    assert_eq!(emissions[1], result("2"));
    assert_eq!(emissions[2], Emission::Echo("nope".into()));
    assert!(matches!(&emissions[3], Emission::Error(msg)
        if msg == "(1,1): error SP0103: The name 'nope' does not exist in the current context"));
}

#[tokio::test]
async fn test_side_effect_only_submission_reports_ok_once() {
    let (mut engine, output) = bootstrapped().await;
    let cancel = AbortHandle::new();

    engine.execute("int x = 5;", false, &cancel).await;
    output.take();
    engine
        .execute("Console.WriteLine(\"x = {0}\", x);", false, &cancel)
        .await;
    assert_eq!(output.take(), vec![info("x = 5"), info("OK")]);
}

#[tokio::test]
async fn test_empty_submission() {
    let (mut engine, output) = engine();
    assert_eq!(engine.execute("", false, &AbortHandle::new()).await, None);
    assert_eq!(output.take(), vec![info("OK")]);
    assert_eq!(engine.state().unwrap().submissions(), 1);
}

#[tokio::test]
async fn test_every_binding_error_is_reported() {
    let (mut engine, output) = engine();
    engine
        .execute("int a = missing1;\nstring b = 5;", false, &AbortHandle::new())
        .await;

    let emissions = output.take();
    let Emission::Error(message) = &emissions[0] else {
        panic!("expected an error, got {emissions:?}");
    };
    let lines: Vec<&str> = message.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("(1,9): error SP0103"));
    assert!(lines[1].starts_with("(2,12): error SP0029"));
    assert!(engine.state().is_none());
}

// =============================================================================
// Runtime failures
// =============================================================================

#[tokio::test]
async fn test_aggregate_exception_lists_inner_messages() {
    let (mut engine, output) = bootstrapped().await;
    engine
        .execute(
            "throw new AggregateException(new Exception(\"first\"), new Exception(\"second\"));",
            false,
            &AbortHandle::new(),
        )
        .await;
    assert_eq!(output.take(), vec![Emission::Error("first\nsecond".into())]);
}

#[tokio::test]
async fn test_runtime_failure_withholds_new_variables() {
    let (mut engine, output) = bootstrapped().await;
    let cancel = AbortHandle::new();

    engine.execute("int x = 1;", false, &cancel).await;
    engine
        .execute("x = 2; int y = 3; throw new Exception(\"stop\");", false, &cancel)
        .await;
    assert_eq!(output.emissions().last(), Some(&Emission::Error("stop".into())));

    let state = engine.state().unwrap();
    assert_eq!(state.variable("x").unwrap().value, Value::Int(1));
    assert!(state.variable("y").is_none());
}

#[tokio::test]
async fn test_shared_list_mutations_are_not_rolled_back() {
    let (mut engine, _output) = bootstrapped().await;
    let cancel = AbortHandle::new();

    engine.execute("var xs = new List<int>();", false, &cancel).await;
    engine
        .execute("xs.Add(1); throw new Exception(\"late\");", false, &cancel)
        .await;
    assert_eq!(engine.execute("xs.Count", false, &cancel).await, Some(Value::Int(1)));
}

// =============================================================================
// Nesting and recursion limits
// =============================================================================

#[tokio::test]
async fn test_recursion_just_under_the_call_limit_completes() {
    let (mut engine, output) = engine();
    let cancel = AbortHandle::new();

    engine
        .execute(
            "int F(int n) { return n == 0 ? 0 : 1 + F(n - 1); }",
            false,
            &cancel,
        )
        .await;
    output.take();

    // 100 nested calls, the most allowed.
    assert_eq!(engine.execute("F(99)", false, &cancel).await, Some(Value::Int(99)));
    assert_eq!(output.take(), vec![result("99")]);

    assert_eq!(engine.execute("F(100)", false, &cancel).await, None);
    assert_eq!(
        output.take(),
        vec![Emission::Error(
            "Insufficient execution stack to continue the execution of the program.".into()
        )]
    );
}

#[tokio::test]
async fn test_recursion_with_deep_expression_body() {
    let (mut engine, output) = engine();
    let cancel = AbortHandle::new();

    // Every call evaluates a deeply nested expression before recursing.
    let body = format!(
        "int G(int n) {{ return n == 0 ? 0 : {}G(n - 1){}; }}",
        "1 + (0 + ".repeat(30),
        ")".repeat(30)
    );
    engine.execute(&body, false, &cancel).await;
    assert_eq!(output.take(), vec![info("OK")]);

    assert_eq!(engine.execute("G(99)", false, &cancel).await, Some(Value::Int(2970)));
}

#[tokio::test]
async fn test_deeply_nested_submission_is_a_compile_error() {
    let (mut engine, output) = engine();
    let cancel = AbortHandle::new();

    engine.execute("int x = 1;", false, &cancel).await;
    output.take();
    let before = engine.state().unwrap();

    let parens = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
    assert_eq!(engine.execute(&parens, false, &cancel).await, None);
    let emissions = output.take();
    assert_eq!(emissions.len(), 1);
    assert!(matches!(
        &emissions[0],
        Emission::Error(msg) if msg.contains("error SP8078: An expression is too long or complex to compile")
    ));
    assert!(Arc::ptr_eq(&before, &engine.state().unwrap()));

    let blocks = format!("if (true) {}x = 2;{}", "{".repeat(5000), "}".repeat(5000));
    engine.execute(&blocks, false, &cancel).await;
    assert!(matches!(&output.take()[0], Emission::Error(msg) if msg.contains("SP8078")));

    assert_eq!(engine.execute("x", false, &cancel).await, Some(Value::Int(1)));
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_infinite_loop() {
    let (mut engine, output) = engine();
    let cancel = AbortHandle::new();

    engine.execute("int n = 0;", false, &cancel).await;
    let before = engine.state().unwrap();
    output.take();

    let remote = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        remote.abort();
    });
    let value = engine.execute("while (true) { n++; }", false, &cancel).await;

    assert_eq!(value, None);
    assert_eq!(
        output.take(),
        vec![Emission::Error("The operation was canceled.".into())]
    );
    assert!(Arc::ptr_eq(&before, &engine.state().unwrap()));
    assert_eq!(before.variable("n").unwrap().value, Value::Int(0));
}

#[tokio::test]
async fn test_cancel_infinite_sleep() {
    let (mut engine, output) = bootstrapped().await;
    let cancel = AbortHandle::new();

    let remote = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        remote.abort();
    });
    engine.execute("Thread.Sleep(-1);", false, &cancel).await;
    assert_eq!(
        output.take(),
        vec![Emission::Error("The operation was canceled.".into())]
    );
}

#[tokio::test]
async fn test_already_cancelled_handle_runs_nothing() {
    let (mut engine, output) = bootstrapped().await;
    let cancel = AbortHandle::new();
    cancel.abort();

    engine.execute("Print(\"never\");", true, &cancel).await;
    assert_eq!(
        output.take(),
        vec![
            Emission::Echo("Print(\"never\");".into()),
            Emission::Error("The operation was canceled.".into()),
        ]
    );
}

// =============================================================================
// Bootstrapping and session continuity
// =============================================================================

#[tokio::test]
async fn test_imports_persist_after_bootstrap() {
    let (mut engine, output) = bootstrapped().await;
    let cancel = AbortHandle::new();

    assert_eq!(
        engine.execute("Math.Max(2, 7)", false, &cancel).await,
        Some(Value::Int(7))
    );
    engine.execute("using System;\nPrint(\"hi\");", false, &cancel).await;
    assert_eq!(output.take(), vec![result("7"), info("hi"), info("OK")]);
    assert_eq!(engine.state().unwrap().imports().len(), 5);
}

#[tokio::test]
async fn test_symbols_unavailable_without_bootstrap() {
    let (mut engine, output) = engine();
    engine.execute("Math.Max(2, 7)", false, &AbortHandle::new()).await;
    assert!(matches!(&output.take()[0], Emission::Error(msg) if msg.contains("SP0103")));
}

#[tokio::test]
async fn test_functions_and_redeclarations_across_submissions() {
    let (mut engine, _output) = engine();
    let cancel = AbortHandle::new();

    engine
        .execute("int Square(int n) { return n * n; }", false, &cancel)
        .await;
    assert_eq!(engine.execute("Square(9)", false, &cancel).await, Some(Value::Int(81)));

    engine.execute("string Square(string s) { return s + s; }", false, &cancel).await;
    assert_eq!(
        engine.execute("Square(\"ab\")", false, &cancel).await,
        Some(Value::str("abab"))
    );
}

// =============================================================================
// Scripts and #load
// =============================================================================

#[tokio::test]
async fn test_execute_script_resolves_loads_next_to_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("helpers.csx"), "int Twice(int n) { return n * 2; }").unwrap();
    std::fs::write(dir.path().join("main.csx"), "#load \"helpers.csx\"\nTwice(21)").unwrap();

    let (mut engine, output) = engine();
    let script = dir.path().join("main.csx");
    let value = engine.execute_script(&script, &AbortHandle::new()).await;

    assert_eq!(value, Some(Value::Int(42)));
    assert_eq!(
        output.take(),
        vec![
            info(&format!("Loading script: {}", script.display())),
            result("42"),
        ]
    );
    assert_eq!(engine.script_root(), Some(dir.path()));
}

#[tokio::test]
async fn test_error_in_loaded_file_names_the_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("bad.csx"), "int y = undefinedName;").unwrap();

    let (mut engine, output) = engine();
    engine.set_script_root(dir.path());
    engine.execute("#load \"bad.csx\"", false, &AbortHandle::new()).await;

    let emissions = output.take();
    assert!(matches!(&emissions[0], Emission::Error(msg)
        if msg.contains("bad.csx(1,9): error SP0103")));
}

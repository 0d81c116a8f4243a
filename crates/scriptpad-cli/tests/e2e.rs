//! End-to-end tests for scriptpad CLI commands.
//!
//! These tests run the real binary against snippets, script files and
//! piped REPL input.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::PathBuf;
use std::process::Stdio;

use assert_cmd::Command;
use assert_cmd::cargo::CommandCargoExt;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// A temporary directory holding script files.
struct TestScripts {
    temp_dir: TempDir,
}

impl TestScripts {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    fn write(&self, name: &str, source: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, source).expect("Failed to write script");
        path
    }
}

fn scriptpad() -> Command {
    let mut cmd = Command::cargo_bin("scriptpad").unwrap();
    // Keep the per-user configuration out of the tests.
    cmd.env("XDG_CONFIG_HOME", "/nonexistent-scriptpad-test-config");
    cmd
}

// =============================================================================
// eval
// =============================================================================

#[test]
fn test_eval_carries_state_between_snippets() {
    scriptpad()
        .args(["eval", "int x = 5;", "x + 1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initializing scripting..."))
        .stdout(predicate::str::contains("OK"))
        .stdout(predicate::str::contains("6"));
}

#[test]
fn test_eval_compile_error_fails() {
    scriptpad()
        .args(["eval", "int x = 5;", "x + ;", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("(1,5): error SP1525"))
        .stdout(predicate::str::contains("5"));
}

#[test]
fn test_eval_echo() {
    scriptpad()
        .args(["eval", "--echo", "2 * 21"])
        .assert()
        .success()
        .stdout(predicate::str::contains("> 2 * 21"))
        .stdout(predicate::str::contains("42"));
}

#[test]
fn test_eval_without_bootstrap_lacks_imports() {
    scriptpad()
        .args(["eval", "--no-bootstrap", "Math.Max(1, 2)"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Initializing").not())
        .stderr(predicate::str::contains("The name 'Math' does not exist"));

    scriptpad()
        .args(["eval", "Math.Max(1, 2)"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2"));
}

#[test]
fn test_eval_runtime_aggregate_error() {
    scriptpad()
        .args([
            "eval",
            "throw new AggregateException(new Exception(\"one\"), new Exception(\"two\"));",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("one\ntwo"));
}

#[test]
fn test_eval_survives_closed_stdout() {
    let mut child = std::process::Command::cargo_bin("scriptpad")
        .unwrap()
        .env("XDG_CONFIG_HOME", "/nonexistent-scriptpad-test-config")
        .args(["eval", "1 + 1", "\"done\""])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn scriptpad");
    // Close the read end before anything is written.
    drop(child.stdout.take());

    let status = child.wait().expect("Failed to wait for scriptpad");
    assert_eq!(status.code(), Some(0));
}

// =============================================================================
// run
// =============================================================================

#[test]
fn test_run_script_with_load() {
    let scripts = TestScripts::new();
    scripts.write("lib.csx", "int Twice(int n) { return n * 2; }");
    let main = scripts.write(
        "main.csx",
        "#load \"lib.csx\"\nConsole.WriteLine(\"start\");\nTwice(21)",
    );

    scriptpad()
        .arg("run")
        .arg(&main)
        .assert()
        .success()
        .stdout(predicate::str::contains("Loading script:"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("42"));
}

#[test]
fn test_run_nonexistent_script() {
    scriptpad()
        .args(["run", "/nonexistent/script.csx"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn test_run_timeout_cancels_script() {
    let scripts = TestScripts::new();
    let forever = scripts.write("forever.csx", "while (true) { }");

    scriptpad()
        .args(["run", "--timeout", "1"])
        .arg(&forever)
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stderr(predicate::str::contains("The operation was canceled."));
}

#[test]
fn test_run_with_config_file() {
    let scripts = TestScripts::new();
    let config = scripts.write(
        "config.json",
        r#"{ "imports": ["using System;"] }"#,
    );
    let script = scripts.write("main.csx", "Math.Abs(-3)");

    scriptpad()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("3"));

    // Pad.Api is not imported by this configuration.
    let print = scripts.write("print.csx", "Print(\"hi\");");
    scriptpad()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg(&print)
        .assert()
        .failure()
        .stderr(predicate::str::contains("SP0103"));
}

// =============================================================================
// repl
// =============================================================================

#[test]
fn test_repl_piped_session() {
    scriptpad()
        .arg("repl")
        .write_stdin("int x = 2;\nx * 21\n:vars\n:quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("42"))
        .stdout(predicate::str::contains(": int = 2"));
}

#[test]
fn test_repl_multiline_function() {
    scriptpad()
        .arg("repl")
        .write_stdin("int Inc(int n) {\n    return n + 1;\n}\nInc(41)\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn test_repl_errors_do_not_end_session() {
    scriptpad()
        .arg("repl")
        .write_stdin("int x = 1;\nx = \"s\";\nx + 1\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("SP0029"))
        .stdout(predicate::str::contains("2"));
}

#[test]
fn test_repl_root_and_load() {
    let scripts = TestScripts::new();
    scripts.write("lib.csx", "string Greet(string who) { return \"hello \" + who; }");
    let root = scripts.temp_dir.path().display().to_string();

    scriptpad()
        .arg("repl")
        .write_stdin(format!(":root {root}\n#load \"lib.csx\"\nGreet(\"pad\")\n"))
        .assert()
        .success()
        .stdout(predicate::str::contains("hello pad"));
}

#[test]
fn test_repl_unknown_command() {
    scriptpad()
        .arg("repl")
        .write_stdin(":nope\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("unknown command"));
}

// =============================================================================
// help
// =============================================================================

#[test]
fn test_help() {
    scriptpad()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("repl"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("eval"));
}

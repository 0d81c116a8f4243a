//! Interactive read-eval-print loop.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::colors;
use crate::session::ReplSession;

const PROMPT: &str = "> ";
const CONTINUATION_PROMPT: &str = ". ";

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand<'a> {
    Quit,
    Help,
    Vars,
    Reset,
    Root(&'a str),
    Load(&'a str),
}

#[derive(Debug, PartialEq, Eq)]
enum ParsedCommand<'a> {
    NotACommand,
    UnknownCommand,
    InvalidUsage(&'static str),
    Command(ReplCommand<'a>),
}

fn parse_repl_command(line: &str) -> ParsedCommand<'_> {
    let trimmed = line.trim();
    if !trimmed.starts_with(':') {
        return ParsedCommand::NotACommand;
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("");
    let arg = parts
        .next()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match cmd {
        ":quit" | ":q" => ParsedCommand::Command(ReplCommand::Quit),
        ":help" | ":h" => ParsedCommand::Command(ReplCommand::Help),
        ":vars" | ":v" => ParsedCommand::Command(ReplCommand::Vars),
        ":reset" | ":r" => ParsedCommand::Command(ReplCommand::Reset),
        ":root" => match arg {
            Some(dir) => ParsedCommand::Command(ReplCommand::Root(dir)),
            None => ParsedCommand::InvalidUsage("Usage: :root <dir>"),
        },
        ":load" | ":l" => match arg {
            Some(path) => ParsedCommand::Command(ReplCommand::Load(path)),
            None => ParsedCommand::InvalidUsage("Usage: :load <file>"),
        },
        _ => ParsedCommand::UnknownCommand,
    }
}

/// Whether `input` has unclosed brackets or an unterminated block comment.
///
/// Brackets inside string literals and comments do not count.
fn needs_more_input(input: &str) -> bool {
    let mut depth: i32 = 0;
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '"' | '\n' => break,
                        _ => {}
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '*' && chars.next_if_eq(&'/').is_some() {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return true;
                }
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth > 0
}

/// Run the interactive loop until `:quit`, end of input or Ctrl-C while
/// idle.
pub async fn run(mut session: ReplSession, bootstrap: bool) -> anyhow::Result<()> {
    println!(
        "{}scriptpad{} {}",
        colors::BOLD,
        colors::RESET,
        env!("CARGO_PKG_VERSION")
    );
    println!(
        "{}Type :help for available commands, :quit to exit.{}",
        colors::DIM,
        colors::RESET
    );
    if bootstrap {
        session.bootstrap().await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut buffer = String::new();
    loop {
        print!(
            "{}",
            if buffer.is_empty() {
                PROMPT
            } else {
                CONTINUATION_PROMPT
            }
        );
        colors::flush_stdout();

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        if buffer.is_empty() {
            match handle_command(&line, &mut session, bootstrap).await {
                Some(true) => continue,
                Some(false) => break,
                None => {}
            }
            if line.trim().is_empty() {
                continue;
            }
        }

        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(&line);
        if needs_more_input(&buffer) {
            continue;
        }

        let code = std::mem::take(&mut buffer);
        run_interruptible(&mut session, &code).await;
    }
    Ok(())
}

/// Run one submission; Ctrl-C aborts it instead of leaving the loop.
async fn run_interruptible(session: &mut ReplSession, code: &str) {
    let interrupter = session.interrupter();
    let run = session.run(code, None, false);
    tokio::pin!(run);
    loop {
        tokio::select! {
            _ = &mut run => break,
            _ = tokio::signal::ctrl_c() => {
                interrupter.interrupt();
            }
        }
    }
}

/// Handle REPL commands. Returns Some(true) to continue, Some(false) to quit, None if not a command.
async fn handle_command(line: &str, session: &mut ReplSession, bootstrap: bool) -> Option<bool> {
    match parse_repl_command(line) {
        ParsedCommand::NotACommand => None,
        ParsedCommand::UnknownCommand => {
            eprintln!("{}Error:{} unknown command. Type :help for usage.", colors::RED, colors::RESET);
            Some(true)
        }
        ParsedCommand::InvalidUsage(usage) => {
            eprintln!("{}Error:{} {}", colors::RED, colors::RESET, usage);
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Quit) => Some(false),
        ParsedCommand::Command(ReplCommand::Help) => {
            print_help();
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Vars) => {
            print_vars(session);
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Reset) => {
            session.engine_mut().reset();
            println!("{}Session state reset.{}", colors::DIM, colors::RESET);
            if bootstrap {
                session.bootstrap().await;
            }
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Root(dir)) => {
            session.engine_mut().set_script_root(PathBuf::from(dir));
            println!("Script root: {dir}");
            Some(true)
        }
        ParsedCommand::Command(ReplCommand::Load(path)) => {
            session.run_file(Path::new(path)).await;
            Some(true)
        }
    }
}

fn print_vars(session: &ReplSession) {
    let Some(state) = session.engine().state() else {
        println!("{}No session yet.{}", colors::DIM, colors::RESET);
        return;
    };
    for import in state.imports() {
        println!("{}{}{}", colors::DIM, import, colors::RESET);
    }
    for variable in state.variables() {
        println!(
            "{}{}{} : {} = {}",
            colors::CYAN,
            variable.name,
            colors::RESET,
            variable.ty,
            variable.value
        );
    }
    for name in state.function_names() {
        println!("{}{}{}(...)", colors::YELLOW, name, colors::RESET);
    }
}

fn print_help() {
    println!("{}Commands:{}", colors::BOLD, colors::RESET);
    println!("  :help, :h        Show this help");
    println!("  :vars, :v        List imports, variables and functions");
    println!("  :reset, :r       Discard the session state");
    println!("  :root <dir>      Resolve #load paths against <dir>");
    println!("  :load <file>     Run a script file");
    println!("  :quit, :q        Exit the REPL");
    println!();
    println!("Input continues on the next line while brackets are open.");
    println!("A final expression without ';' prints its value.");
    println!("Ctrl-C cancels a running submission.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_more_input_brackets() {
        assert!(needs_more_input("int F(int n) {"));
        assert!(needs_more_input("Print(1,"));
        assert!(!needs_more_input("int F(int n) { return n; }"));
        assert!(!needs_more_input("xs[0]"));
    }

    #[test]
    fn test_needs_more_input_ignores_strings_and_comments() {
        assert!(!needs_more_input("Print(\"(\");"));
        assert!(!needs_more_input("Print(\"\\\"{\");"));
        assert!(!needs_more_input("int x = 1; // {"));
        assert!(needs_more_input("/* open"));
        assert!(!needs_more_input("/* { */ 1"));
    }

    #[test]
    fn test_parse_repl_command() {
        assert_eq!(parse_repl_command(":q"), ParsedCommand::Command(ReplCommand::Quit));
        assert_eq!(
            parse_repl_command(":root /tmp/scripts"),
            ParsedCommand::Command(ReplCommand::Root("/tmp/scripts"))
        );
        assert_eq!(
            parse_repl_command(":load"),
            ParsedCommand::InvalidUsage("Usage: :load <file>")
        );
        assert_eq!(parse_repl_command(":nope"), ParsedCommand::UnknownCommand);
        assert_eq!(parse_repl_command("x + 1"), ParsedCommand::NotACommand);
    }
}

//! scriptpad CLI - interactive PadScript sessions.

mod colors;
mod console;
mod repl;
mod run;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use scriptpad_core::{EngineConfig, ScriptEngine};

use crate::console::ConsoleOutput;
use crate::session::ReplSession;

#[derive(Parser)]
#[command(name = "scriptpad")]
#[command(about = "Interactive script sessions with persistent state")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session
    Repl {
        /// Directory that relative #load paths resolve against
        #[arg(long)]
        root: Option<PathBuf>,

        /// Skip the default imports
        #[arg(long)]
        no_bootstrap: bool,
    },

    /// Run a script file
    Run {
        /// Path to the script
        file: PathBuf,

        /// Cancel the script after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Skip the default imports
        #[arg(long)]
        no_bootstrap: bool,
    },

    /// Run snippets in order against one session
    Eval {
        /// Code to run; each snippet is one submission
        #[arg(required = true)]
        snippets: Vec<String>,

        /// Echo each snippet before running it
        #[arg(long)]
        echo: bool,

        /// Skip the default imports
        #[arg(long)]
        no_bootstrap: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_default()?,
    };
    if let Commands::Repl {
        root: Some(root), ..
    } = &cli.command
    {
        config.script_root = Some(root.clone());
    }

    let output = Arc::new(ConsoleOutput::new());
    let mut session = ReplSession::new(ScriptEngine::new(output.clone(), config));

    match cli.command {
        Commands::Repl { no_bootstrap, .. } => {
            return repl::run(session, !no_bootstrap).await;
        }

        Commands::Run {
            file,
            timeout,
            no_bootstrap,
        } => {
            let timeout = timeout.map(Duration::from_secs);
            run::execute_file(&mut session, &file, timeout, !no_bootstrap).await;
        }

        Commands::Eval {
            snippets,
            echo,
            no_bootstrap,
        } => {
            run::eval_snippets(&mut session, &snippets, echo, !no_bootstrap).await;
        }
    }

    // Headless runs fail when any submission reported an error.
    let errors = output.error_count();
    if errors > 0 {
        anyhow::bail!("{} submission(s) failed", errors);
    }
    Ok(())
}

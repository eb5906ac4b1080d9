mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::breaker::BreakerSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "warden",
    about = "Hook-driven process enforcement for AI coding assistants",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .warden/ or .git/)
    #[arg(long, global = true, env = "WARDEN_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize warden in the current project
    Init,

    /// Show enforcement state (breaker, research, edits, work loop)
    Status,

    /// Hook entry point: reads one JSON event from stdin
    ///
    /// Exit code 0 allows the operation, 2 blocks it. Never exits nonzero
    /// for any other reason.
    Hook {
        /// Event name: session-start, user-prompt-submit, pre-tool-use,
        /// post-tool-use, stop
        event: String,
    },

    /// Manage the circuit breaker
    Breaker {
        #[command(subcommand)]
        subcommand: BreakerSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Hook { event } => {
            // The hook contract is the process exit code; lower the decision
            // here, at the very last step.
            std::process::exit(cmd::hook::run(&root, &event));
        }
        Commands::Breaker { subcommand } => cmd::breaker::run(&root, subcommand),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

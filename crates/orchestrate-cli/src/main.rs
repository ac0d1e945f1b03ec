mod cmd;
mod output;
mod root;

use clap::{ArgAction, Parser, Subcommand};
use orchestrate_core::cancel::CancelToken;
use orchestrate_core::OrchestrateError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "orchestrate",
    about = "Build, optionally push, and deploy a multi-service plan in dependency order",
    version,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Project root (default: auto-detect from .orchestrate/ or .git/)
    #[arg(long, global = true, env = "ORCHESTRATE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(flatten)]
    deploy: cmd::deploy::DeployArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List recorded runs, most recent last
    Runs {
        /// How many records to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let cancel = CancelToken::new();
    let handler = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("interrupt received; stopping at the next stage boundary");
        handler.cancel();
    }) {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }

    let result = match cli.command {
        Some(Commands::Runs { limit }) => cmd::runs::run(&root, limit, cli.json),
        None => cmd::deploy::run(&root, &cli.deploy, cli.json, cancel),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        let code = match e.downcast_ref::<OrchestrateError>() {
            Some(err) => {
                if err.stage().has_cluster_effect() {
                    eprintln!("note: resources applied before the failure remain in the cluster");
                }
                err.exit_code()
            }
            None => 1,
        };
        std::process::exit(code);
    }
}

//! Tether CLI - Reconcile an owner's resources against a Kubernetes cluster

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;

use error::Result;

#[derive(Parser)]
#[command(name = "tether")]
#[command(author = "Tether Contributors")]
#[command(version)]
#[command(about = "Reconcile the resources of an operator owner against a Kubernetes cluster", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: <config dir>/tether/config.yaml)
    #[arg(long, global = true, env = "TETHER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

/// Manifest and owner shared by the cluster commands
#[derive(Args)]
pub struct Target {
    /// Manifest of desired objects (multi-document YAML)
    manifest: PathBuf,

    /// Owner object as namespace/name
    #[arg(long)]
    owner: String,

    /// Default namespace for namespaced objects (default: owner namespace)
    #[arg(short, long)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the resource kinds the store manages
    Kinds,

    /// Show the objects as the store would write them, without a cluster
    Inject {
        #[command(flatten)]
        target: Target,

        /// Owner uid used for owner references
        #[arg(long)]
        owner_uid: String,
    },

    /// Show what apply would create and update
    Diff {
        #[command(flatten)]
        target: Target,
    },

    /// Create and update the objects of a manifest
    Apply {
        #[command(flatten)]
        target: Target,

        /// Also delete the owner's objects missing from the manifest
        #[arg(long)]
        prune: bool,
    },

    /// Delete every object of a manifest that the store manages
    Teardown {
        #[command(flatten)]
        target: Target,
    },

    /// List marker-labeled objects on the cluster
    List {
        /// Only show objects of this owner (namespace/name)
        #[arg(long)]
        owner: Option<String>,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Kinds => commands::kinds::run(&config),
        Commands::Inject { target, owner_uid } => {
            commands::inject::run(&config, &target, &owner_uid)
        }
        Commands::Diff { target } => commands::diff::run(&config, &target).await,
        Commands::Apply { target, prune } => commands::apply::run(&config, &target, prune).await,
        Commands::Teardown { target } => commands::teardown::run(&config, &target).await,
        Commands::List { owner } => commands::list::run(&config, owner.as_deref()).await,
    }
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

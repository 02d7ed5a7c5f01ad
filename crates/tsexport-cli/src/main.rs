//! tsexport — run the time-series upload pipeline against a simulated
//! backend.
//!
//! # Usage
//!
//! ```text
//! tsexport config init --path tsexport.toml
//! tsexport simulate --config tsexport.toml --metrics 50 --series 20 --fail-every 3
//! tsexport --json simulate --project demo --stream
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tsexport",
    about = "Batch and upload time series to a monitoring backend",
    version,
    propagate_version = true
)]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push synthetic metrics through the pipeline and print the summary.
    Simulate(commands::simulate::SimulateArgs),
    /// Create or inspect a tsexport.toml.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a tsexport.toml with every default spelled out.
    Init {
        #[arg(short, long, default_value = "tsexport.toml")]
        path: PathBuf,
        /// Project to write into the scaffold.
        #[arg(long, default_value = "my-project")]
        project: String,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Validate a config and print it with defaults filled in.
    Show {
        #[arg(short, long, default_value = "tsexport.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args).await,
        Commands::Config { action } => match action {
            ConfigAction::Init {
                path,
                project,
                force,
            } => commands::config::init(&path, &project, force),
            ConfigAction::Show { path } => commands::config::show(&path),
        },
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tsexport=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

mod cmd;

use clap::{Parser, Subcommand};
use model_assets::AvailableModel;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "model-assets")]
#[command(version)]
#[command(about = "Download and cache encoder/decoder model bundles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a bundle, or load it from the cache if already present
    Pull { model: AvailableModel },
    /// List cached bundles
    #[command(alias = "ls")]
    List,
    /// Describe a cached bundle without downloading anything
    Show { model: AvailableModel },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Pull { model } => cmd::pull(model).await,
        Commands::List => cmd::list().await,
        Commands::Show { model } => cmd::show(model).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

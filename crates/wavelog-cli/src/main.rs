//! wavelog command line
//!
//! `wavelog bakery` runs the bakery demo on an in-process network;
//! `wavelog order` sorts a clock-stamped log file offline.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{bakery, order};

#[derive(Parser)]
#[command(name = "wavelog")]
#[command(about = "Causally ordered log collection over wave algorithms", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bakery relay on in-process nodes and collect their logs
    Bakery(bakery::BakeryArgs),

    /// Sort a log file by vector clock or timestamp
    Order(order::OrderArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Bakery(args) => bakery::run(args, cli.verbose).await,
        Commands::Order(args) => order::run(&args),
    }
}

mod commands;
mod input;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tidemark",
    version,
    about = "Incremental extraction connector for the commerce API"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync invocation: read request JSON, print response JSON
    Sync {
        /// Path to the invocation JSON (stdin when omitted)
        input: Option<PathBuf>,
        /// Wall-clock budget for this invocation in seconds
        #[arg(long, default_value_t = 600)]
        budget_secs: u64,
        /// Records requested per source API call
        #[arg(long, default_value_t = 100)]
        page_size: u32,
        /// Concurrent entity extractions
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
    /// Print the schema-discovery document for the shipped catalog
    Discover,
    /// Test credential acquisition against the auth endpoint
    Check {
        /// Path to the invocation JSON (stdin when omitted)
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Sync { input, budget_secs, page_size, workers } => {
            commands::sync(input.as_deref(), budget_secs, page_size, workers).await
        }
        Commands::Discover => commands::discover(),
        Commands::Check { input } => commands::check(input.as_deref()).await,
    }
}

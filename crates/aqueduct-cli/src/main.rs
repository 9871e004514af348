mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "aqueduct",
    version,
    about = "DAG-structured ETL pipelines over pluggable connectors"
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
    /// Run one batch pass of a pipeline
    Run {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
        /// Window end as epoch millis (default: now)
        #[arg(long)]
        window_end: Option<i64>,
    },
    /// Validate a pipeline's configuration and stage graph
    Check {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
    /// Run a realtime pipeline's workers until interrupted
    Worker {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
    /// Show recent runs of a pipeline
    History {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
        /// Maximum runs to show
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            pipeline,
            window_end,
        } => commands::run::execute(&pipeline, window_end).await,
        Commands::Check { pipeline } => commands::check::execute(&pipeline),
        Commands::Worker { pipeline } => commands::worker::execute(&pipeline).await,
        Commands::History { pipeline, limit } => commands::history::execute(&pipeline, limit),
    }
}

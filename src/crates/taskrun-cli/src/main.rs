//! # taskrun
//!
//! Inspect dead-letter files, effective run configuration, retry delay
//! schedules and task expansion without running anything.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tooling::logging::{init_logging, LogConfig};

#[derive(Parser)]
#[command(name = "taskrun")]
#[command(about = "taskrun - Inspect and plan taskforge runs", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, env = "TASKRUN_LOG", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a dead-letter file
    Dlq {
        /// Path to the JSONL dead-letter file
        path: PathBuf,

        /// Print every record as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Print the effective run configuration (file + TASKRUN_* overrides)
    Config {
        /// YAML run configuration
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Print the retry delay schedule
    Delays {
        /// YAML run configuration to start from
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Backoff strategy: constant, linear, exponential
        #[arg(long)]
        strategy: Option<String>,

        /// Initial delay in milliseconds
        #[arg(long)]
        initial_ms: Option<u64>,

        /// Delay cap in milliseconds
        #[arg(long)]
        max_ms: Option<u64>,

        #[arg(long)]
        factor: Option<f64>,

        /// Number of retries to show
        #[arg(long)]
        retries: Option<u32>,

        /// Apply jitter (each run differs)
        #[arg(long, overrides_with = "no_jitter")]
        jitter: bool,

        /// Disable jitter set by the config file
        #[arg(long)]
        no_jitter: bool,
    },

    /// Show how conditions, repeats and a dataset expand into tasks
    Expand {
        /// JSONL dataset, one sample per line
        #[arg(short, long)]
        dataset: PathBuf,

        /// Comma-separated condition names
        #[arg(short, long, value_delimiter = ',', required = true)]
        conditions: Vec<String>,

        #[arg(short, long, default_value_t = 1)]
        repeat: u32,

        /// How many tasks to list
        #[arg(long, default_value_t = 10)]
        show: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(
        &LogConfig::default()
            .with_filter(cli.log_level.clone())
            .with_json(cli.log_json),
    )?;

    let output = match cli.command {
        Commands::Dlq { path, json } => commands::dlq(&path, json).await?,
        Commands::Config { file } => commands::config(file.as_deref()).await?,
        Commands::Delays {
            file,
            strategy,
            initial_ms,
            max_ms,
            factor,
            retries,
            jitter,
            no_jitter,
        } => {
            let overrides = commands::DelayOverrides {
                strategy,
                initial_ms,
                max_ms,
                factor,
                retries,
                jitter: match (jitter, no_jitter) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
            };
            commands::delays(file.as_deref(), overrides).await?
        }
        Commands::Expand {
            dataset,
            conditions,
            repeat,
            show,
        } => commands::expand(&dataset, &conditions, repeat, show).await?,
    };

    print!("{}", output);
    Ok(())
}

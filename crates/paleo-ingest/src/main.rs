//! PaleoMap ingest - fossil occurrence dataset builder

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use paleo_common::logging::{init_logging, LogConfig, LogLevel};
use paleo_ingest::cache::CacheStatus;
use paleo_ingest::{classify, IngestConfig, IngestionPipeline};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "paleo-ingest")]
#[command(author, version, about = "PaleoMap fossil occurrence ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the processed dataset, serving the cache while it is valid
    Dataset {
        /// Write the payload to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ignore the cache and rebuild from upstream
        #[arg(long)]
        refresh: bool,
    },

    /// Classify a geological era name into its map bucket
    Classify {
        /// Era or stage name, e.g. "Late/Maastrichtian"
        era: String,
    },

    /// List the taxa a rebuild would query
    Catalog,

    /// Report whether the cache artifact would be served
    CacheStatus,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("paleo-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Classify { era } => {
            println!("{}", classify(Some(&era)));
        },
        Command::Dataset { output, refresh } => {
            let config = IngestConfig::from_env()?;
            let pipeline = IngestionPipeline::from_config(&config)?;

            let dataset = if refresh {
                let (dataset, stats) = pipeline.refresh().await;
                info!(
                    taxa = stats.taxa,
                    points = stats.points,
                    poisoned = ?stats.poisoned,
                    "Refresh complete"
                );
                dataset
            } else {
                pipeline.get_dataset().await
            };

            let json = serde_json::to_string_pretty(&dataset)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), points = dataset.len(), "Dataset written");
                },
                None => {
                    let mut stdout = std::io::stdout().lock();
                    writeln!(stdout, "{}", json)?;
                },
            }
        },
        Command::Catalog => {
            let config = IngestConfig::from_env()?;
            let pipeline = IngestionPipeline::from_config(&config)?;

            let mut stdout = std::io::stdout().lock();
            for taxon in pipeline.taxon_list().await {
                writeln!(stdout, "{}", taxon)?;
            }
        },
        Command::CacheStatus => {
            let config = IngestConfig::from_env()?;
            let pipeline = IngestionPipeline::from_config(&config)?;
            let cache = pipeline.cache();

            let Some(envelope) = cache.read().await else {
                println!("missing: no readable artifact at {}", cache.path().display());
                return Ok(());
            };

            match cache.check(&envelope, Utc::now()) {
                CacheStatus::Fresh => println!(
                    "fresh: {} points stored at {}",
                    envelope.points.len(),
                    envelope.stored_at
                ),
                CacheStatus::Expired { age } => {
                    println!("expired: stored {} hours ago", age.num_hours())
                },
                CacheStatus::LogicChanged { found, expected } => {
                    println!("stale logic: artifact is {}, current is {}", found, expected)
                },
            }
        },
    }

    Ok(())
}

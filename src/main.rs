//! Flight Advisor - real-time crew advisory pipeline
//!
//! # Usage
//!
//! ```bash
//! # Build the procedure index from a corpus
//! flight-advisor build-index --corpus procedures.json
//!
//! # Live telemetry from the simulator
//! flight-sim --profile approach | flight-advisor run
//!
//! # Replay a recorded flight at 10x
//! flight-advisor run --replay flight.jsonl --speed 10
//!
//! # Validate and print the effective configuration
//! flight-advisor check-config --print
//! ```
//!
//! # Environment Variables
//!
//! - `FLIGHT_ADVISOR_CONFIG`: path to the TOML config file
//! - `FLIGHT_ADVISOR_API_KEY`: bearer token for the HTTP generation backend
//! - `RUST_LOG`: logging level (default: info)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use flight_advisor::app::{self, Collaborators};
use flight_advisor::config::AdvisorConfig;
use flight_advisor::pipeline::{JsonLinesSource, ReplaySource, TelemetrySource};
use flight_advisor::retrieval::{Embedder, HashingEmbedder};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "flight-advisor")]
#[command(about = "Real-time crew advisory pipeline")]
#[command(version)]
struct CliArgs {
    /// Config file (overrides the FLIGHT_ADVISOR_CONFIG / ./flight_advisor.toml search)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON objects, one per line
    #[arg(long, global = true, env = "FLIGHT_ADVISOR_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the advisory pipeline over telemetry (stdin unless --replay/--input)
    Run {
        /// Replay a recorded JSON-lines flight, paced by its timestamps
        #[arg(long, conflicts_with = "input")]
        replay: Option<PathBuf>,

        /// Replay speed multiplier (0 = as fast as possible)
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Stream a JSON-lines file without pacing
        #[arg(long)]
        input: Option<PathBuf>,

        /// Override the index dataset path
        #[arg(long)]
        index: Option<PathBuf>,

        /// Override the advisory history path
        #[arg(long)]
        history: Option<PathBuf>,

        /// Do not persist advisories
        #[arg(long)]
        no_history: bool,
    },

    /// Embed a procedure corpus (JSON array) into an index dataset
    BuildIndex {
        #[arg(long)]
        corpus: PathBuf,

        /// Output dataset (defaults to index.path from the config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Corpus version label (defaults to the current UTC time)
        #[arg(long)]
        version: Option<String>,
    },

    /// Validate the configuration
    CheckConfig {
        /// Print the effective configuration as TOML
        #[arg(long)]
        print: bool,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // Telemetry may arrive on stdin; logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let mut config = AdvisorConfig::load_or_search(args.config.as_deref())?;

    match args.command {
        SubCommand::CheckConfig { print } => {
            config.validate()?;
            info!(triggers = config.triggers.len(), "[Config] Configuration is valid");
            if print {
                println!("{}", config.to_toml()?);
            }
            Ok(())
        }

        SubCommand::BuildIndex {
            corpus,
            output,
            version,
        } => {
            config.validate()?;
            let output = output.unwrap_or_else(|| config.index.path.clone());
            let version = version.unwrap_or_else(|| chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string());
            let embedder = HashingEmbedder::new(config.embedding.dimension);
            let count = app::build_index_file(&corpus, &output, &version, &embedder).await?;
            info!(
                procedures = count,
                dimension = embedder.dimension(),
                output = %output.display(),
                version = %version,
                "[Index] Dataset built"
            );
            Ok(())
        }

        SubCommand::Run {
            replay,
            speed,
            input,
            index,
            history,
            no_history,
        } => {
            if let Some(path) = index {
                config.index.path = path;
            }
            if let Some(path) = history {
                config.storage.history_path = path;
            }
            if no_history {
                config.storage.enabled = false;
            }
            config.validate()?;

            let collaborators = Collaborators::from_config(&config)?;

            // Graceful shutdown via Ctrl+C
            let cancel_token = CancellationToken::new();
            let shutdown_token = cancel_token.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("[Advisor] Received Ctrl+C, shutting down");
                shutdown_token.cancel();
            });

            let mut source: Box<dyn TelemetrySource> = if let Some(path) = replay {
                info!(path = %path.display(), speed, "[Advisor] Input: replay");
                Box::new(ReplaySource::load(&path, speed)?)
            } else if let Some(path) = input {
                info!(path = %path.display(), "[Advisor] Input: file");
                Box::new(JsonLinesSource::open(&path).await?)
            } else {
                info!("[Advisor] Input: stdin (JSON lines)");
                Box::new(JsonLinesSource::stdin())
            };

            let summary = app::run_pipeline(&config, collaborators, source.as_mut(), cancel_token)
                .await
                .context("advisory pipeline failed")?;
            info!(
                summary = %serde_json::to_string(&summary).unwrap_or_default(),
                "[Advisor] Exiting"
            );
            Ok(())
        }
    }
}

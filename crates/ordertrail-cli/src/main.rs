use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ordertrail_core::REVIEW_THRESHOLD;
use ordertrail_extract::{classify, extract_message, load_message_fixture, Document};
use ordertrail_sync::PipelineConfig;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ordertrail")]
#[command(about = "Reconcile merchant order emails into canonical orders")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest every fixture message and write a run report.
    Ingest {
        /// Overrides ORDERTRAIL_FIXTURES_DIR.
        #[arg(long)]
        fixtures: Option<PathBuf>,
        /// Overrides ORDERTRAIL_USER.
        #[arg(long)]
        user: Option<String>,
    },
    /// Print the lifecycle stage of one message fixture.
    Classify { file: PathBuf },
    /// Print the extracted record of one message fixture as JSON.
    Parse {
        file: PathBuf,
        #[arg(long, default_value_t = REVIEW_THRESHOLD)]
        threshold: f64,
    },
    /// Summarize the most recent runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Ingest {
        fixtures: None,
        user: None,
    }) {
        Commands::Ingest { fixtures, user } => {
            let mut config = PipelineConfig::from_env();
            if let Some(fixtures) = fixtures {
                config.fixtures_dir = fixtures;
            }
            if let Some(user) = user {
                config.user_id = user;
            }
            let summary = ordertrail_sync::run_ingest_once(config).await?;
            println!(
                "ingest complete: run_id={} messages={} created={} updated={} skipped={} errors={} reports={}",
                summary.run_id,
                summary.messages,
                summary.created,
                summary.updated,
                summary.skipped,
                summary.errors,
                summary.reports_dir
            );
        }
        Commands::Classify { file } => {
            let message = load_message_fixture(&file)?;
            let stage = classify(&Document::from_message(&message));
            println!("{}\t{stage}", message.id);
        }
        Commands::Parse { file, threshold } => {
            let message = load_message_fixture(&file)?;
            let extraction = extract_message(&message, threshold)
                .with_context(|| format!("extracting {}", file.display()))?;
            let out = serde_json::json!({
                "message_id": message.id,
                "stage": extraction.stage,
                "extractor": extraction.extractor,
                "fell_back": extraction.fell_back,
                "record": extraction.record,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Report { runs } => {
            let config = PipelineConfig::from_env();
            println!("{}", ordertrail_sync::report_markdown(runs, &config.reports_dir)?);
        }
    }

    Ok(())
}

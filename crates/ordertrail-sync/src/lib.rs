//! Reconciliation and batch orchestration for ordertrail.

pub mod config;
pub mod merge;
pub mod pipeline;
pub mod reports;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ordertrail_extract::load_message_fixtures;
use ordertrail_storage::{MessageArchive, ReturnPolicyTable};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

pub use config::PipelineConfig;
pub use merge::{AbstainReason, OrderMerger, ReconcileOutcome, UNKNOWN_PRODUCT};
pub use pipeline::{BatchReport, IngestPipeline, MessageOutcome, MessageReport};
pub use reports::{export_parquet_snapshots, report_markdown, write_reports, IngestRunRecord};

pub const CRATE_NAME: &str = "ordertrail-sync";

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub messages: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub orders: usize,
    pub reports_dir: String,
    pub parquet_manifest: String,
}

/// Return policies from the workspace rules file. A missing file leaves every
/// merchant on the configured default window.
pub fn load_return_policies(config: &PipelineConfig) -> Result<ReturnPolicyTable> {
    let path = config.return_policies_path();
    if !path.exists() {
        warn!(path = %path.display(), "no return policy file; using default window");
        return Ok(ReturnPolicyTable::empty());
    }
    ReturnPolicyTable::load(&path)
}

/// Load fixture messages, archive them, run them through the pipeline and
/// write the run's reports and snapshots.
pub async fn run_ingest_once(config: PipelineConfig) -> Result<IngestRunSummary> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();

    let policies = load_return_policies(&config)?;
    let messages = load_message_fixtures(&config.fixtures_dir)
        .with_context(|| format!("loading messages from {}", config.fixtures_dir.display()))?;
    info!(%run_id, messages = messages.len(), "starting ingest run");

    let archive = MessageArchive::new(config.archive_dir.clone());
    let mut archived = 0usize;
    for message in &messages {
        let stored = archive.store_message(&config.user_id, message).await?;
        if !stored.deduplicated {
            archived += 1;
        }
    }

    let mut pipeline = IngestPipeline::new(&config, Box::new(policies));
    let batch = pipeline.process_batch(&config.user_id, messages);
    let orders = pipeline.orders(&config.user_id);
    let finished_at = Utc::now();

    let run = IngestRunRecord {
        run_id,
        user_id: config.user_id.clone(),
        started_at,
        finished_at,
        messages: batch.messages.len(),
        archived,
        created: batch.created(),
        updated: batch.updated(),
        skipped: batch.skipped(),
        errors: batch.errors(),
    };
    let reports_dir: PathBuf = write_reports(&config.reports_dir, &run, &batch, &orders).await?;
    let manifest_path = export_parquet_snapshots(&reports_dir, &orders).await?;
    info!(
        %run_id,
        created = run.created,
        updated = run.updated,
        skipped = run.skipped,
        errors = run.errors,
        "ingest run complete"
    );

    Ok(IngestRunSummary {
        run_id,
        started_at,
        finished_at,
        messages: run.messages,
        created: run.created,
        updated: run.updated,
        skipped: run.skipped,
        errors: run.errors,
        orders: orders.len(),
        reports_dir: reports_dir.display().to_string(),
        parquet_manifest: manifest_path.display().to_string(),
    })
}

pub async fn run_ingest_once_from_env() -> Result<IngestRunSummary> {
    run_ingest_once(PipelineConfig::from_env()).await
}

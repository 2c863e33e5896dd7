//! Per-run reports: a markdown summary, a JSON delta of touched orders and
//! Parquet snapshots with a checksummed manifest.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{BooleanArray, Float64Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, NaiveDate, Utc};
use ordertrail_core::CanonicalOrder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use uuid::Uuid;

use crate::pipeline::{BatchReport, MessageOutcome};

pub const SUMMARY_FILE: &str = "run_summary.md";
pub const DELTA_FILE: &str = "orders_delta.json";
pub const SNAPSHOT_DIR: &str = "snapshots";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRunRecord {
    pub run_id: Uuid,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub messages: usize,
    pub archived: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Write `run_summary.md` and `orders_delta.json` under
/// `<reports_root>/<run_id>/` and return that directory.
pub async fn write_reports(
    reports_root: &Path,
    run: &IngestRunRecord,
    batch: &BatchReport,
    orders: &[CanonicalOrder],
) -> Result<PathBuf> {
    let reports_dir = reports_root.join(run.run_id.to_string());
    fs::create_dir_all(&reports_dir)
        .await
        .with_context(|| format!("creating {}", reports_dir.display()))?;

    fs::write(reports_dir.join(SUMMARY_FILE), run_summary_markdown(run, batch, orders))
        .await
        .with_context(|| format!("writing {SUMMARY_FILE}"))?;

    let delta_json = serde_json::to_vec_pretty(&serde_json::json!({
        "run": run,
        "messages": batch.messages,
        "orders": orders,
    }))
    .context("serializing orders delta")?;
    fs::write(reports_dir.join(DELTA_FILE), delta_json)
        .await
        .with_context(|| format!("writing {DELTA_FILE}"))?;

    Ok(reports_dir)
}

fn run_summary_markdown(
    run: &IngestRunRecord,
    batch: &BatchReport,
    orders: &[CanonicalOrder],
) -> String {
    let mut lines = vec![
        "# Order Trail Run Summary".to_string(),
        String::new(),
        format!("- Run ID: `{}`", run.run_id),
        format!("- User: `{}`", run.user_id),
        format!("- Started: {}", run.started_at),
        format!("- Finished: {}", run.finished_at),
        format!("- Messages: {} ({} archived)", run.messages, run.archived),
        format!(
            "- Created: {}, updated: {}, skipped: {}, errors: {}",
            run.created, run.updated, run.skipped, run.errors
        ),
        String::new(),
        "## Messages".to_string(),
    ];
    for message in &batch.messages {
        let stage = message.stage.map_or("-", |s| s.as_str());
        let outcome = match &message.outcome {
            MessageOutcome::Created { .. } => "created".to_string(),
            MessageOutcome::Updated { .. } => "updated".to_string(),
            MessageOutcome::SkippedDuplicateInput { .. } => "skipped (duplicate input)".to_string(),
            MessageOutcome::Skipped { reason } => format!("skipped: {reason}"),
            MessageOutcome::Error { field, reason, .. } => format!("error in {field}: {reason}"),
        };
        lines.push(format!("- `{}` [{stage}] {outcome}", message.message_id));
    }

    lines.push(String::new());
    lines.push("## Orders".to_string());
    for order in orders {
        let total = order.total.as_ref().map_or_else(|| "-".to_string(), |m| m.to_string());
        let deadline = order
            .return_deadline()
            .map_or_else(|| "unknown".to_string(), |d| d.to_string());
        let review = if order.needs_review() { " (needs review)" } else { "" };
        lines.push(format!(
            "- {} `{}`: {} item(s), total {total}, return by {deadline}, confidence {:.2}{review}",
            order.merchant_name,
            order.order_id,
            order.total_quantity(),
            order.confidence(),
        ));
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Write `orders.parquet` and `order_products.parquet` plus a manifest with
/// each file's SHA-256 and size. Returns the manifest path.
pub async fn export_parquet_snapshots(
    reports_dir: &Path,
    orders: &[CanonicalOrder],
) -> Result<PathBuf> {
    let snapshot_dir = reports_dir.join(SNAPSHOT_DIR);
    fs::create_dir_all(&snapshot_dir)
        .await
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let orders_path = snapshot_dir.join("orders.parquet");
    let products_path = snapshot_dir.join("order_products.parquet");
    write_orders_parquet(&orders_path, orders)?;
    write_order_products_parquet(&products_path, orders)?;

    let manifest = ParquetManifest {
        schema_version: 1,
        files: vec![
            manifest_entry("orders", reports_dir, &orders_path)?,
            manifest_entry("order_products", reports_dir, &products_path)?,
        ],
    };
    let manifest_path = snapshot_dir.join(MANIFEST_FILE);
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    fs::write(&manifest_path, bytes)
        .await
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}

/// Markdown digest of the `runs` most recent run directories under
/// `reports_root`, newest first.
pub fn report_markdown(runs: usize, reports_root: &Path) -> Result<String> {
    let mut dirs = std::fs::read_dir(reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .filter(|entry| entry.path().join(DELTA_FILE).exists())
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();

    let mut lines = vec!["# Order Trail Report".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let run_id = dir.file_name().to_string_lossy().to_string();
        let delta_path = dir.path().join(DELTA_FILE);
        let manifest_path = dir.path().join(SNAPSHOT_DIR).join(MANIFEST_FILE);

        let delta: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&delta_path)
                .with_context(|| format!("reading {}", delta_path.display()))?,
        )
        .with_context(|| format!("parsing {}", delta_path.display()))?;
        let orders = delta.get("orders").and_then(|v| v.as_array());
        let order_count = orders.map_or(0, |a| a.len());
        let review_count = orders.map_or(0, |a| {
            a.iter()
                .filter(|o| o.get("needs_review").and_then(|v| v.as_bool()).unwrap_or(false))
                .count()
        });
        let run = delta.get("run");
        let count = |key: &str| run.and_then(|r| r.get(key)).and_then(|v| v.as_u64()).unwrap_or(0);

        lines.push(format!("## Run `{run_id}`"));
        lines.push(format!(
            "- messages: {} (created {}, updated {}, skipped {}, errors {})",
            count("messages"),
            count("created"),
            count("updated"),
            count("skipped"),
            count("errors")
        ));
        lines.push(format!("- orders: {order_count} ({review_count} need review)"));
        lines.push(format!("- delta: `{}`", delta_path.display()));
        if manifest_path.exists() {
            lines.push(format!("- parquet manifest: `{}`", manifest_path.display()));
        }
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = parquet::arrow::ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn date_column(dates: impl Iterator<Item = Option<NaiveDate>>) -> StringArray {
    StringArray::from(dates.map(|d| d.map(|d| d.to_string())).collect::<Vec<_>>())
}

fn write_orders_parquet(path: &Path, orders: &[CanonicalOrder]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("id", DataType::Utf8, false),
        ArrowField::new("user_id", DataType::Utf8, false),
        ArrowField::new("merchant_name", DataType::Utf8, false),
        ArrowField::new("order_id", DataType::Utf8, false),
        ArrowField::new("order_date", DataType::Utf8, false),
        ArrowField::new("delivery_date", DataType::Utf8, true),
        ArrowField::new("return_window_days", DataType::UInt32, false),
        ArrowField::new("return_deadline", DataType::Utf8, true),
        ArrowField::new("total_amount", DataType::Utf8, true),
        ArrowField::new("currency", DataType::Utf8, true),
        ArrowField::new("confidence", DataType::Float64, false),
        ArrowField::new("needs_review", DataType::Boolean, false),
        ArrowField::new("tracking_number", DataType::Utf8, true),
    ]));

    let ids = StringArray::from(orders.iter().map(|o| Some(o.id.to_string())).collect::<Vec<_>>());
    let users = StringArray::from(
        orders
            .iter()
            .map(|o| Some(o.user_id.as_str()))
            .collect::<Vec<_>>(),
    );
    let merchants = StringArray::from(
        orders
            .iter()
            .map(|o| Some(o.merchant_name.as_str()))
            .collect::<Vec<_>>(),
    );
    let order_ids = StringArray::from(
        orders
            .iter()
            .map(|o| Some(o.order_id.as_str()))
            .collect::<Vec<_>>(),
    );
    let order_dates = date_column(orders.iter().map(|o| Some(o.order_date)));
    let delivery_dates = date_column(orders.iter().map(|o| o.delivery_date()));
    let windows = UInt32Array::from(
        orders
            .iter()
            .map(|o| o.return_window_days())
            .collect::<Vec<_>>(),
    );
    let deadlines = date_column(orders.iter().map(|o| o.return_deadline()));
    let totals = StringArray::from(
        orders
            .iter()
            .map(|o| o.total.as_ref().map(|m| m.amount.to_string()))
            .collect::<Vec<_>>(),
    );
    let currencies = StringArray::from(
        orders
            .iter()
            .map(|o| o.total.as_ref().map(|m| m.currency.as_str()))
            .collect::<Vec<_>>(),
    );
    let confidences = Float64Array::from(orders.iter().map(|o| o.confidence()).collect::<Vec<_>>());
    let reviews = BooleanArray::from(orders.iter().map(|o| o.needs_review()).collect::<Vec<_>>());
    let tracking = StringArray::from(
        orders
            .iter()
            .map(|o| o.provenance.tracking.tracking_number.as_deref())
            .collect::<Vec<_>>(),
    );

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(ids),
            Arc::new(users),
            Arc::new(merchants),
            Arc::new(order_ids),
            Arc::new(order_dates),
            Arc::new(delivery_dates),
            Arc::new(windows),
            Arc::new(deadlines),
            Arc::new(totals),
            Arc::new(currencies),
            Arc::new(confidences),
            Arc::new(reviews),
            Arc::new(tracking),
        ],
    )
    .context("building orders record batch")?;
    write_parquet(path, batch)
}

fn write_order_products_parquet(path: &Path, orders: &[CanonicalOrder]) -> Result<()> {
    let rows = orders
        .iter()
        .flat_map(|o| o.products.iter().map(move |p| (o.id, p)))
        .collect::<Vec<_>>();

    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("order_id", DataType::Utf8, false),
        ArrowField::new("product_id", DataType::Utf8, false),
        ArrowField::new("name", DataType::Utf8, false),
        ArrowField::new("size", DataType::Utf8, false),
        ArrowField::new("quantity", DataType::UInt32, false),
        ArrowField::new("price", DataType::Utf8, false),
        ArrowField::new("seller", DataType::Utf8, false),
        ArrowField::new("return_deadline", DataType::Utf8, true),
        ArrowField::new("return_status", DataType::Utf8, false),
    ]));

    let order_ids = StringArray::from(
        rows.iter()
            .map(|(id, _)| Some(id.to_string()))
            .collect::<Vec<_>>(),
    );
    let product_ids = StringArray::from(
        rows.iter()
            .map(|(_, p)| Some(p.id.to_string()))
            .collect::<Vec<_>>(),
    );
    let names = StringArray::from(
        rows.iter()
            .map(|(_, p)| Some(p.name.as_str()))
            .collect::<Vec<_>>(),
    );
    let sizes = StringArray::from(
        rows.iter()
            .map(|(_, p)| Some(p.size.as_str()))
            .collect::<Vec<_>>(),
    );
    let quantities = UInt32Array::from(rows.iter().map(|(_, p)| p.quantity).collect::<Vec<_>>());
    let prices = StringArray::from(
        rows.iter()
            .map(|(_, p)| Some(p.price.to_string()))
            .collect::<Vec<_>>(),
    );
    let sellers = StringArray::from(
        rows.iter()
            .map(|(_, p)| Some(p.seller.as_str()))
            .collect::<Vec<_>>(),
    );
    let deadlines = date_column(rows.iter().map(|(_, p)| p.return_deadline));
    let statuses = StringArray::from(
        rows.iter()
            .map(|(_, p)| Some(p.return_status.as_str()))
            .collect::<Vec<_>>(),
    );

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(order_ids),
            Arc::new(product_ids),
            Arc::new(names),
            Arc::new(sizes),
            Arc::new(quantities),
            Arc::new(prices),
            Arc::new(sellers),
            Arc::new(deadlines),
            Arc::new(statuses),
        ],
    )
    .context("building order_products record batch")?;
    write_parquet(path, batch)
}

fn manifest_entry(name: &str, reports_dir: &Path, path: &Path) -> Result<ParquetManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let rel = path.strip_prefix(reports_dir).unwrap_or(path).display().to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        sha256: hex::encode(hasher.finalize()),
        bytes: bytes.len() as u64,
    })
}

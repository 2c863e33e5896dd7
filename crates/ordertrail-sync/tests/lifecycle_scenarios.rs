use std::path::PathBuf;

use chrono::{NaiveDate, TimeZone, Utc};
use ordertrail_core::{CanonicalOrder, RawMessage};
use ordertrail_extract::load_message_fixtures;
use ordertrail_sync::{
    load_return_policies, report_markdown, run_ingest_once, IngestPipeline, MessageOutcome,
    PipelineConfig,
};
use rust_decimal_macros::dec;

const USER: &str = "asha";

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn pipeline() -> IngestPipeline {
    let config = PipelineConfig::for_workspace(workspace_root());
    let policies = load_return_policies(&config).unwrap();
    IngestPipeline::new(&config, Box::new(policies))
}

fn fixtures(ids: &[&str]) -> Vec<RawMessage> {
    let all = load_message_fixtures(workspace_root().join("fixtures/messages")).unwrap();
    ids.iter()
        .map(|id| {
            all.iter()
                .find(|m| m.id == *id)
                .cloned()
                .unwrap_or_else(|| panic!("fixture {id} missing"))
        })
        .collect()
}

fn single_order(pipeline: &IngestPipeline, merchant: &str) -> CanonicalOrder {
    let mut orders: Vec<_> = pipeline
        .orders(USER)
        .into_iter()
        .filter(|o| o.merchant_name == merchant)
        .collect();
    assert_eq!(orders.len(), 1, "expected exactly one {merchant} order");
    orders.remove(0)
}

fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, day)
}

#[test]
fn myntra_lifecycle_keeps_confirmation_total_over_delivery_sum() {
    let mut pipeline = pipeline();
    let report = pipeline.process_batch(
        USER,
        fixtures(&["msg-myntra-0001", "msg-myntra-0002", "msg-myntra-0003", "msg-myntra-0004"]),
    );
    assert_eq!(report.created(), 1);
    assert_eq!(report.updated(), 3);
    assert_eq!(report.errors(), 0);

    let order = single_order(&pipeline, "Myntra");
    assert_eq!(order.order_id, "1234567890123");
    assert_eq!(order.order_date, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    assert_eq!(order.total.as_ref().map(|m| m.amount), Some(dec!(1200)));
    assert_eq!(order.delivery_date(), d(2025, 1, 10));
    assert_eq!(order.return_window_days(), 30);
    assert_eq!(order.return_deadline(), d(2025, 2, 9));
    assert_eq!(order.products.len(), 2);
    for product in &order.products {
        assert_eq!(product.quantity, 1);
        assert_eq!(product.return_deadline, d(2025, 2, 9));
    }
    assert_eq!(order.confidence(), 1.0);
    assert!(!order.needs_review());
}

#[test]
fn shipment_labelled_by_tracking_number_updates_the_existing_order() {
    let mut pipeline = pipeline();
    let report = pipeline.process_batch(
        USER,
        fixtures(&["msg-myntra-0001", "msg-myntra-0002", "msg-myntra-0003"]),
    );
    let created = report.outcome_for("msg-myntra-0001").cloned();
    let Some(MessageOutcome::Created { order: created }) = created else {
        panic!("confirmation should create the order");
    };
    assert_eq!(
        report.outcome_for("msg-myntra-0003"),
        Some(&MessageOutcome::Updated { order: created })
    );

    let order = single_order(&pipeline, "Myntra");
    let tracking = &order.provenance.tracking;
    assert_eq!(tracking.tracking_number.as_deref(), Some("TRK999"));
    assert_eq!(tracking.logistics_partner.as_deref(), Some("Ekart Logistics"));
    assert_eq!(tracking.shipping_date, d(2025, 1, 3));
    assert_eq!(tracking.estimated_delivery, d(2025, 1, 9));
    // estimates never move a delivery date that is already known
    assert_eq!(order.delivery_date(), d(2025, 1, 7));
    assert_eq!(order.total.as_ref().map(|m| m.amount), Some(dec!(1200)));
}

#[test]
fn delivery_before_confirmation_still_ends_on_the_confirmed_total() {
    let mut pipeline = pipeline();
    let mut last_confidence = 0.0;
    for message in fixtures(&["msg-myntra-0004", "msg-myntra-0002", "msg-myntra-0001"]) {
        pipeline.process_message(USER, message);
        let confidence = single_order(&pipeline, "Myntra").confidence();
        assert!(confidence >= last_confidence, "confidence dropped to {confidence}");
        last_confidence = confidence;
    }

    let order = single_order(&pipeline, "Myntra");
    assert_eq!(order.total.as_ref().map(|m| m.amount), Some(dec!(1200)));
    assert_eq!(order.order_date, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    assert_eq!(order.delivery_date(), d(2025, 1, 10));
    assert_eq!(order.return_deadline(), d(2025, 2, 9));
    // the late confirmation prices the delivered items instead of re-adding them
    assert_eq!(order.products.len(), 2);
    for product in &order.products {
        assert_eq!(product.quantity, 1, "{}", product.name);
        assert!(product.price > dec!(0), "{} left unpriced", product.name);
    }
    assert_eq!(order.total_quantity(), 2);
}

#[test]
fn delivery_date_with_full_month_name_sets_the_deadline() {
    let mut pipeline = pipeline();
    let message = RawMessage {
        id: "msg-nykaa-0001".to_string(),
        sender: "orders@nykaa.com".to_string(),
        to_address: None,
        subject: "Your Nykaa order has been delivered".to_string(),
        received_at: Utc.with_ymd_and_hms(2025, 1, 16, 8, 0, 0).unwrap(),
        html_body: String::new(),
        text_body: "Your order OD5150 was delivered on 15 January 2025.\nAmount paid: ₹899"
            .to_string(),
    };
    let report = pipeline.process_batch(USER, [message]);
    assert_eq!(report.created(), 1);

    let order = single_order(&pipeline, "Nykaa");
    assert_eq!(order.order_id, "OD5150");
    assert_eq!(order.delivery_date(), d(2025, 1, 15));
    assert_eq!(order.return_window_days(), 15);
    assert_eq!(order.return_deadline(), d(2025, 1, 30));
}

#[test]
fn repeated_message_is_skipped_without_double_counting() {
    let mut pipeline = pipeline();
    let report = pipeline.process_batch(USER, fixtures(&["msg-myntra-0001", "msg-myntra-0001"]));
    assert_eq!(report.created(), 1);
    assert!(matches!(
        report.messages[1].outcome,
        MessageOutcome::SkippedDuplicateInput { order: Some(_) }
    ));

    let order = single_order(&pipeline, "Myntra");
    assert_eq!(order.products.len(), 2);
    assert_eq!(order.total_quantity(), 2);
}

#[test]
fn stated_windows_drive_the_deadline() {
    let mut pipeline = pipeline();
    pipeline.process_batch(USER, fixtures(&["msg-hm-0001", "msg-flipkart-0001"]));

    let hm = single_order(&pipeline, "H&M");
    assert_eq!(hm.order_id, "60412345");
    assert_eq!(hm.return_window_days(), 15);
    assert_eq!(hm.delivery_date(), d(2025, 1, 9));
    assert_eq!(hm.return_deadline(), d(2025, 1, 24));
    assert_eq!(hm.products.len(), 2);
    assert!(hm.products.iter().all(|p| p.price == dec!(999.00)));
    assert_eq!(hm.total.as_ref().map(|m| m.amount), Some(dec!(1998.00)));

    let flipkart = single_order(&pipeline, "Flipkart");
    assert_eq!(flipkart.return_window_days(), 10);
    assert_eq!(flipkart.return_deadline(), d(2025, 1, 22));
    assert_eq!(flipkart.products[0].name, "BoAt Rockerz 255 Neckband");
}

#[test]
fn newsletter_is_skipped_not_failed() {
    let mut pipeline = pipeline();
    let report = pipeline.process_batch(USER, fixtures(&["msg-news-0001"]));
    assert!(matches!(report.messages[0].outcome, MessageOutcome::Skipped { .. }));
    assert_eq!(report.errors(), 0);
    assert!(pipeline.orders(USER).is_empty());
}

#[tokio::test]
async fn ingest_run_writes_reports_and_snapshots() {
    let scratch = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::for_workspace(workspace_root());
    config.archive_dir = scratch.path().join("archive");
    config.reports_dir = scratch.path().join("reports");

    let summary = run_ingest_once(config.clone()).await.unwrap();
    assert_eq!(summary.messages, 7);
    assert_eq!(summary.created, 3);
    assert_eq!(summary.updated, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.orders, 3);

    let run_dir = PathBuf::from(&summary.reports_dir);
    assert!(run_dir.join("run_summary.md").exists());
    assert!(run_dir.join("orders_delta.json").exists());
    assert!(run_dir.join("snapshots/orders.parquet").exists());
    assert!(run_dir.join("snapshots/order_products.parquet").exists());

    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary.parquet_manifest).unwrap()).unwrap();
    let files = manifest["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f["sha256"].as_str().map(str::len) == Some(64)));

    let digest = report_markdown(5, &config.reports_dir).unwrap();
    assert!(digest.contains(&format!("## Run `{}`", summary.run_id)));
    assert!(digest.contains("- orders: 3"));

    // archive paths are keyed by the configured user
    assert!(scratch.path().join("archive/local/20250101").is_dir());
    let again = run_ingest_once(config).await.unwrap();
    assert_eq!(again.created, 3);
    assert_ne!(again.run_id, summary.run_id);
}

use std::path::PathBuf;

use chrono::NaiveDate;
use ordertrail_core::{LifecycleStage, RawMessage, REVIEW_THRESHOLD};
use ordertrail_extract::{extract_message, load_message_fixtures, Extraction};
use rust_decimal_macros::dec;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/messages")
}

fn fixture(id: &str) -> RawMessage {
    load_message_fixtures(fixtures_dir())
        .unwrap()
        .into_iter()
        .find(|m| m.id == id)
        .unwrap_or_else(|| panic!("fixture {id} missing"))
}

fn extract(id: &str) -> Extraction {
    extract_message(&fixture(id), REVIEW_THRESHOLD).unwrap()
}

fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, day)
}

#[test]
fn every_fixture_loads_with_a_body() {
    let messages = load_message_fixtures(fixtures_dir()).unwrap();
    assert_eq!(messages.len(), 7);
    for message in &messages {
        assert!(
            !message.html_body.is_empty() || !message.text_body.is_empty(),
            "{} has no body",
            message.id
        );
    }
}

#[test]
fn myntra_confirmation_reads_items_and_total() {
    let extraction = extract("msg-myntra-0001");
    assert_eq!(extraction.stage, LifecycleStage::Confirmation);
    assert!(!extraction.fell_back);
    let record = extraction.record;
    assert_eq!(record.order_id.as_deref(), Some("1234567890123"));
    assert_eq!(record.order_date, d(2025, 1, 1));
    assert_eq!(record.shipping.estimated_delivery, d(2025, 1, 7));
    assert_eq!(record.total.as_ref().map(|m| m.amount), Some(dec!(1200)));
    let names: Vec<_> = record.products.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Roadster Men Slim Fit Casual Shirt", "HRX Running Shorts"]);
    assert_eq!(record.products[0].seller, "Truenet Commerce");
    assert_eq!(record.products[1].size, "L");
    assert_eq!(record.confidence, 1.0);
    assert_eq!(record.provenance.source, "html-myntra-confirmation-v1");
}

#[test]
fn myntra_shipping_reads_tracking() {
    let record = extract("msg-myntra-0002").record;
    assert_eq!(record.stage, LifecycleStage::Shipping);
    assert_eq!(record.order_id.as_deref(), Some("1234567890123"));
    assert_eq!(record.shipping.tracking_number.as_deref(), Some("TRK999"));
    assert_eq!(record.shipping.logistics_partner.as_deref(), Some("Ekart Logistics"));
    assert_eq!(record.shipping.shipping_date, d(2025, 1, 3));
    assert_eq!(record.shipping.estimated_delivery, d(2025, 1, 7));
    assert_eq!(
        record.shipping.tracking_url.as_deref(),
        Some("https://ekartlogistics.com/shipmenttrack/TRK999")
    );
    assert!(record.total.is_none());
}

#[test]
fn myntra_delivery_carries_the_lower_item_sum() {
    let record = extract("msg-myntra-0004").record;
    assert_eq!(record.stage, LifecycleStage::Delivery);
    assert_eq!(record.delivery_date, d(2025, 1, 10));
    assert_eq!(record.return_deadline, None);
    assert_eq!(record.total.as_ref().map(|m| m.amount), Some(dec!(950)));
}

#[test]
fn hm_names_unpriced_items_and_spreads_the_total() {
    let extraction = extract("msg-hm-0001");
    assert_eq!(extraction.stage, LifecycleStage::Confirmation);
    assert_eq!(extraction.extractor, "hm");
    let record = extraction.record;
    assert_eq!(record.stage, LifecycleStage::Delivery);
    assert_eq!(record.order_id.as_deref(), Some("60412345"));
    assert_eq!(record.return_window_days, Some(15));
    assert_eq!(record.products.len(), 2);
    for product in &record.products {
        assert_eq!(product.price, dec!(999.00));
        assert_eq!(product.seller, "H&M");
    }
    assert_eq!(record.products[0].size, "M");
    assert_eq!(record.confidence, 1.0);
}

#[test]
fn text_only_message_goes_through_the_generic_extractor() {
    let extraction = extract("msg-flipkart-0001");
    assert_eq!(extraction.extractor, "generic");
    assert_eq!(extraction.stage, LifecycleStage::Delivery);
    let record = extraction.record;
    assert_eq!(record.merchant_name.as_deref(), Some("Flipkart"));
    assert_eq!(record.order_id.as_deref(), Some("OD431122334455"));
    assert_eq!(record.return_window_days, Some(10));
    assert_eq!(record.products.len(), 1);
    assert_eq!(record.products[0].name, "BoAt Rockerz 255 Neckband");
    assert_eq!(record.products[0].price, dec!(1299));
}

#[test]
fn newsletter_is_unknown_without_an_order_id() {
    let extraction = extract("msg-news-0001");
    assert_eq!(extraction.stage, LifecycleStage::Unknown);
    assert!(extraction.record.order_id.is_none());
    assert!(extraction.record.confidence < REVIEW_THRESHOLD);
}

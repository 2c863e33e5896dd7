//! Message classification and field extraction.
//!
//! A message is parsed once into a [`Document`], classified into a
//! [`LifecycleStage`], then handed to the merchant extractor chosen by the
//! sender. When that structural pass is not confident enough the plain-text
//! [`TextFallbackParser`] gets a turn and the better record wins.

pub mod classify;
pub mod dates;
pub mod document;
pub mod fallback;
pub mod fixtures;
pub mod merchants;
pub mod patterns;
mod probe;
pub mod products;

use ordertrail_core::{LifecycleStage, ParsedRecord, RawMessage};
use thiserror::Error;
use tracing::{debug, info_span};

pub use classify::classify;
pub use dates::resolve_date;
pub use document::Document;
pub use fallback::TextFallbackParser;
pub use fixtures::{load_message_fixture, load_message_fixtures, MessageFixture};
pub use merchants::{
    extractor_for_merchant, extractor_for_sender, ConfidenceWeights, GenericExtractor, HmExtractor,
    MerchantExtractor, MyntraExtractor,
};
pub use products::{
    extract_products, CascadeOutcome, CascadeProfile, ProductStrategy, PLACEHOLDER_PRODUCT,
};

pub const CRATE_NAME: &str = "ordertrail-extract";

/// Infrastructure faults only. A field that is simply missing or malformed
/// in a message is reported as absent, never as an error.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector `{selector}` for {field}: {reason}")]
    Selector {
        field: &'static str,
        selector: String,
        reason: String,
    },
}

impl ExtractError {
    pub fn field(&self) -> &str {
        match self {
            Self::Selector { field, .. } => field,
        }
    }
}

/// Result of running one message through classification and extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub stage: LifecycleStage,
    pub extractor: &'static str,
    pub record: ParsedRecord,
    /// True when the plain-text record replaced the structural one.
    pub fell_back: bool,
}

/// Classify `message`, run its merchant extractor and, when the structural
/// confidence does not exceed `threshold`, let the text fallback compete.
/// Ties keep the structural record.
pub fn extract_message(
    message: &RawMessage,
    threshold: f64,
) -> Result<Extraction, ExtractError> {
    let span = info_span!("extract", message_id = %message.id);
    let _guard = span.enter();

    let document = Document::from_message(message);
    let stage = classify(&document);
    let extractor = extractor_for_sender(&message.sender);
    let mut structural = extractor.extract(&document, stage)?;
    debug!(
        stage = %stage,
        extractor = extractor.name(),
        confidence = structural.confidence,
        "structural extraction"
    );

    if structural.confidence > threshold {
        structural.provenance.note("selection", "structural");
        return Ok(Extraction {
            stage,
            extractor: extractor.name(),
            record: structural,
            fell_back: false,
        });
    }

    let mut fallback = TextFallbackParser.parse_document(&document);
    fallback.stage = stage;
    let structural_confidence = structural.confidence.to_string();
    let fallback_confidence = fallback.confidence.to_string();
    let fell_back = fallback.confidence > structural.confidence;
    debug!(
        structural = structural.confidence,
        fallback = fallback.confidence,
        fell_back,
        "fallback parser compared"
    );

    let mut record = if fell_back {
        carry_structural_extras(fallback, structural)
    } else {
        structural
    };
    record
        .provenance
        .note("selection", if fell_back { "fallback" } else { "structural" });
    record.provenance.note("structural_confidence", structural_confidence);
    record.provenance.note("fallback_confidence", fallback_confidence);
    Ok(Extraction {
        stage,
        extractor: extractor.name(),
        record,
        fell_back,
    })
}

/// The text parser reads no carrier data or line items, so a winning
/// fallback record keeps whatever the structural pass found for them.
fn carry_structural_extras(mut fallback: ParsedRecord, structural: ParsedRecord) -> ParsedRecord {
    let mut shipping = structural.shipping;
    shipping.merge_from(&fallback.shipping);
    fallback.shipping = shipping;
    if fallback.products.is_empty() {
        fallback.products = structural.products;
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(sender: &str, html: &str, text: &str) -> RawMessage {
        RawMessage {
            id: "msg-1".to_string(),
            sender: sender.to_string(),
            to_address: None,
            subject: String::new(),
            received_at: Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap(),
            html_body: html.to_string(),
            text_body: text.to_string(),
        }
    }

    #[test]
    fn confident_structural_record_is_kept() {
        let html = r#"<ul><li id="OrderId">1234567890123</li></ul>
            <span id="OrderDeliveredDateId">on 10 Jan 2025</span>
            <span id="AvailableTillDateId">09 Feb 2025</span>
            <p>Total Amount: ₹1,200</p>"#;
        let extraction = extract_message(&message("updates@myntra.com", html, ""), 0.7).unwrap();
        assert_eq!(extraction.stage, LifecycleStage::Delivery);
        assert_eq!(extraction.extractor, "myntra");
        assert!(!extraction.fell_back);
        assert_eq!(
            extraction.record.provenance.notes.get("selection").map(String::as_str),
            Some("structural")
        );
    }

    #[test]
    fn weak_structural_record_loses_to_better_text_parse() {
        let text = "Your order OD9988 has been delivered.\nDelivered on 12 Jan 2025\n\
            Amount paid: ₹640\nAWB: TRK4455";
        let sender = "updates@unknown-shop.example";
        let extraction = extract_message(&message(sender, "", text), 0.7).unwrap();
        // generic: order id + delivery date + amount = 0.6; text: 0.3 + 0.2 + 0.2 = 0.7
        assert!(extraction.fell_back);
        assert_eq!(extraction.stage, LifecycleStage::Delivery);
        assert_eq!(extraction.record.stage, LifecycleStage::Delivery);
        assert_eq!(extraction.record.provenance.source, TextFallbackParser::SOURCE);
        assert_eq!(extraction.record.order_id.as_deref(), Some("OD9988"));
        assert!(extraction.record.provenance.notes.contains_key("structural_confidence"));
        // carrier data read by the structural pass survives the switch
        assert_eq!(extraction.record.shipping.tracking_number.as_deref(), Some("TRK4455"));
    }

    #[test]
    fn full_month_names_reach_the_fallback_record() {
        let text = "Your order OD5150 was delivered on 15 January 2025.\nAmount paid: ₹899";
        let extraction = extract_message(&message("no-reply@flipkart.com", "", text), 0.7).unwrap();
        assert_eq!(
            extraction.record.delivery_date,
            chrono::NaiveDate::from_ymd_opt(2025, 1, 15)
        );
    }

    #[test]
    fn ties_keep_the_structural_record() {
        // both read only the delivery date: 0.2 each
        let text = "Delivered on 12 Jan 2025";
        let extraction = extract_message(&message("someone@example.org", "", text), 0.7).unwrap();
        assert!(!extraction.fell_back);
        assert_eq!(extraction.record.confidence, 0.2);
        assert_eq!(extraction.record.provenance.source, "text-generic-delivery-v1");
    }

    #[test]
    fn error_reports_its_field() {
        let reference = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let document = Document::from_text("x", reference);
        let err = document.select("order_id", "li[").unwrap_err();
        assert_eq!(err.field(), "order_id");
    }
}

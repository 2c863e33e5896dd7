use chrono::NaiveDate;
use ordertrail_core::{LifecycleStage, Money, ParsedRecord};

use crate::document::Document;
use crate::patterns::{merchant_for_sender, AMOUNT, DELIVERED_ON, ORDER_DATE, ORDER_ID};
use crate::probe::Probe;

const MERCHANT_WEIGHT: u32 = 20;
const ORDER_ID_WEIGHT: u32 = 30;
const AMOUNT_WEIGHT: u32 = 20;
const DELIVERY_DATE_WEIGHT: u32 = 20;
const ORDER_DATE_WEIGHT: u32 = 10;

/// Plain-text parser used when structural extraction is not trusted. Works
/// on the visible text alone and never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFallbackParser;

impl TextFallbackParser {
    pub const SOURCE: &'static str = "regex-parser-v1";

    pub fn parse_text(&self, body: &str, sender: &str, reference: NaiveDate) -> ParsedRecord {
        let document = Document::from_text(body, reference).with_sender(sender);
        self.parse_document(&document)
    }

    /// Same as [`parse_text`](Self::parse_text) over an already built view.
    pub fn parse_document(&self, document: &Document) -> ParsedRecord {
        let mut probe = Probe::new(document, Self::SOURCE);
        probe.note("sender", document.sender());

        let merchant_name = merchant_for_sender(document.sender()).map(str::to_string);
        if merchant_name.is_some() {
            probe.record("merchant_name", "sender-domain", document.sender());
        }
        let order_id = probe.pattern_order_id("order_id", &ORDER_ID);
        let delivery_date = probe.pattern_date("delivery_date", &DELIVERED_ON);
        let order_date = probe.pattern_date("order_date", &ORDER_DATE);
        let total = probe.pattern_amount("total", &AMOUNT).map(Money::inr);

        let hundredths = [
            (merchant_name.is_some(), MERCHANT_WEIGHT),
            (order_id.is_some(), ORDER_ID_WEIGHT),
            (total.is_some(), AMOUNT_WEIGHT),
            (delivery_date.is_some(), DELIVERY_DATE_WEIGHT),
            (order_date.is_some(), ORDER_DATE_WEIGHT),
        ]
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, weight)| weight)
        .sum::<u32>();

        let mut record = ParsedRecord::empty(LifecycleStage::Unknown, Self::SOURCE);
        record.merchant_name = merchant_name;
        record.order_id = order_id;
        record.order_date = order_date;
        record.delivery_date = delivery_date;
        record.total = total;
        record.confidence = f64::from(hundredths) / 100.0;
        record.provenance = probe.finish();
        record
    }
}

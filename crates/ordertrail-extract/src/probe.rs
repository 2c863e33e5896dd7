use chrono::NaiveDate;
use ordertrail_core::Provenance;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::dates::resolve_date;
use crate::document::Document;
use crate::patterns::{
    amount_in, first_amount, first_capture, first_date, first_days, first_order_id,
};
use crate::ExtractError;

/// Field reader over one document that records where every value came
/// from. Element lookups can fail on a bad selector; pattern lookups can't.
pub(crate) struct Probe<'a> {
    document: &'a Document,
    provenance: Provenance,
}

impl<'a> Probe<'a> {
    pub fn new(document: &'a Document, source: impl Into<String>) -> Self {
        Self {
            document,
            provenance: Provenance::new(source),
        }
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    pub fn record(&mut self, field: &str, pointer: &str, snippet: &str) {
        self.provenance.record(field, pointer, snippet);
    }

    pub fn note(&mut self, key: &str, value: impl Into<String>) {
        self.provenance.note(key, value);
    }

    pub fn finish(self) -> Provenance {
        self.provenance
    }

    pub fn element_text(
        &mut self,
        field: &'static str,
        css: &str,
    ) -> Result<Option<String>, ExtractError> {
        let value = self.document.select_first_text(field, css)?;
        if let Some(value) = &value {
            self.provenance.record(field, css, value);
        }
        Ok(value)
    }

    pub fn element_date(
        &mut self,
        field: &'static str,
        css: &str,
    ) -> Result<Option<NaiveDate>, ExtractError> {
        let Some(text) = self.document.select_first_text(field, css)? else {
            return Ok(None);
        };
        let date = resolve_date(&text, self.document.reference_date());
        match date {
            Some(_) => self.provenance.record(field, css, &text),
            None => debug!(field, text = %text, "element date did not resolve"),
        }
        Ok(date)
    }

    pub fn element_amount(
        &mut self,
        field: &'static str,
        css: &str,
    ) -> Result<Option<Decimal>, ExtractError> {
        let Some(text) = self.document.select_first_text(field, css)? else {
            return Ok(None);
        };
        let amount = amount_in(&text);
        if amount.is_some() {
            self.provenance.record(field, css, &text);
        }
        Ok(amount)
    }

    pub fn pattern_text(&mut self, field: &str, patterns: &[Regex]) -> Option<String> {
        let capture = first_capture(patterns, self.document.text())?;
        self.provenance.record(field, &capture.pattern, &capture.value);
        Some(capture.value)
    }

    pub fn pattern_order_id(&mut self, field: &str, patterns: &[Regex]) -> Option<String> {
        let capture = first_order_id(patterns, self.document.text())?;
        self.provenance.record(field, &capture.pattern, &capture.value);
        Some(capture.value)
    }

    pub fn pattern_date(&mut self, field: &str, patterns: &[Regex]) -> Option<NaiveDate> {
        let reference = self.document.reference_date();
        let (date, capture) = first_date(patterns, self.document.text(), reference)?;
        self.provenance.record(field, &capture.pattern, &capture.value);
        Some(date)
    }

    pub fn pattern_amount(&mut self, field: &str, patterns: &[Regex]) -> Option<Decimal> {
        let (amount, capture) = first_amount(patterns, self.document.text())?;
        self.provenance.record(field, &capture.pattern, &capture.value);
        Some(amount)
    }

    pub fn pattern_days(&mut self, field: &str, patterns: &[Regex]) -> Option<u32> {
        let (days, capture) = first_days(patterns, self.document.text())?;
        self.provenance.record(field, &capture.pattern, &capture.value);
        Some(days)
    }
}

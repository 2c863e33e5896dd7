//! Core domain model and provenance types for ordertrail.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "ordertrail-core";

/// Orders whose confidence falls below this are flagged for manual review.
pub const REVIEW_THRESHOLD: f64 = 0.7;
pub const DEFAULT_CURRENCY: &str = "INR";
pub const DEFAULT_RETURN_WINDOW_DAYS: u32 = 30;

/// One notification message as handed over by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub sender: String,
    #[serde(default)]
    pub to_address: Option<String>,
    #[serde(default)]
    pub subject: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub html_body: String,
    #[serde(default)]
    pub text_body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Confirmation,
    Shipping,
    Delivery,
    Unknown,
}

impl LifecycleStage {
    pub const ALL: [LifecycleStage; 4] = [
        LifecycleStage::Confirmation,
        LifecycleStage::Shipping,
        LifecycleStage::Delivery,
        LifecycleStage::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmation => "confirmation",
            Self::Shipping => "shipping",
            Self::Delivery => "delivery",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown lifecycle stage: {s}"))
    }
}

/// Fixed-point amount tagged with its currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    pub fn inr(amount: Decimal) -> Self {
        Self::new(amount, DEFAULT_CURRENCY)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.currency, self.amount)
    }
}

/// Dedup identity of a line item within one order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductKey {
    pub name: String,
    pub size: String,
}

impl ProductKey {
    pub fn new(name: &str, size: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            size: size.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedProduct {
    pub name: String,
    #[serde(default)]
    pub size: String,
    pub quantity: u32,
    pub price: Decimal,
    #[serde(default)]
    pub seller: String,
}

impl ParsedProduct {
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            size: String::new(),
            quantity: 1,
            price,
            seller: String::new(),
        }
    }

    pub fn key(&self) -> ProductKey {
        ProductKey::new(&self.name, &self.size)
    }
}

/// Carrier metadata. Used both as a per-message extraction result and as the
/// accumulated tracking section of an order's merge provenance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub logistics_partner: Option<String>,
    pub shipping_date: Option<NaiveDate>,
    pub estimated_delivery: Option<NaiveDate>,
}

impl ShippingInfo {
    pub fn is_empty(&self) -> bool {
        self.tracking_number.is_none()
            && self.tracking_url.is_none()
            && self.logistics_partner.is_none()
            && self.shipping_date.is_none()
            && self.estimated_delivery.is_none()
    }

    /// Field-by-field merge: present incoming values replace stored ones,
    /// absent incoming values never erase anything.
    pub fn merge_from(&mut self, incoming: &ShippingInfo) -> bool {
        let mut changed = false;
        changed |= merge_opt(&mut self.tracking_number, &incoming.tracking_number);
        changed |= merge_opt(&mut self.tracking_url, &incoming.tracking_url);
        changed |= merge_opt(&mut self.logistics_partner, &incoming.logistics_partner);
        changed |= merge_opt(&mut self.shipping_date, &incoming.shipping_date);
        changed |= merge_opt(&mut self.estimated_delivery, &incoming.estimated_delivery);
        changed
    }
}

fn merge_opt<T: Clone + PartialEq>(slot: &mut Option<T>, incoming: &Option<T>) -> bool {
    match incoming {
        Some(value) if slot.as_ref() != Some(value) => {
            *slot = Some(value.clone());
            true
        }
        _ => false,
    }
}

/// Provenance pointer attached to an extracted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub field: String,
    pub selector_or_pointer: String,
    pub snippet: String,
}

/// Which extraction path produced a record, and where each field came from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
}

impl Provenance {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            evidence: Vec::new(),
            notes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, field: &str, selector_or_pointer: &str, snippet: &str) {
        let snippet: String = snippet.trim().chars().take(120).collect();
        self.evidence.push(EvidenceRef {
            field: field.to_string(),
            selector_or_pointer: selector_or_pointer.to_string(),
            snippet,
        });
    }

    pub fn note(&mut self, key: &str, value: impl Into<String>) {
        self.notes.insert(key.to_string(), value.into());
    }

    pub fn evidence_for(&self, field: &str) -> Option<&EvidenceRef> {
        self.evidence.iter().find(|e| e.field == field)
    }
}

/// One message's extraction result. Transient: consumed by the merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub merchant_name: Option<String>,
    pub order_id: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub return_deadline: Option<NaiveDate>,
    pub return_window_days: Option<u32>,
    pub total: Option<Money>,
    pub stage: LifecycleStage,
    pub confidence: f64,
    pub shipping: ShippingInfo,
    pub products: Vec<ParsedProduct>,
    pub provenance: Provenance,
}

impl ParsedRecord {
    pub fn empty(stage: LifecycleStage, source: impl Into<String>) -> Self {
        Self {
            merchant_name: None,
            order_id: None,
            order_date: None,
            delivery_date: None,
            return_deadline: None,
            return_window_days: None,
            total: None,
            stage,
            confidence: 0.0,
            shipping: ShippingInfo::default(),
            products: Vec::new(),
            provenance: Provenance::new(source),
        }
    }

    /// Date usable as the order date: the order date itself, then the
    /// shipping date, then the delivery date.
    pub fn effective_order_date(&self) -> Option<NaiveDate> {
        self.order_date
            .or(self.shipping.shipping_date)
            .or(self.delivery_date)
    }

    /// Delivery date, or the carrier's estimate when no actual date is known.
    pub fn effective_delivery_date(&self) -> Option<NaiveDate> {
        self.delivery_date.or(self.shipping.estimated_delivery)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    NotReturned,
    ReturnRequested,
    Returned,
    ReturnRejected,
}

impl ReturnStatus {
    /// Same spelling serde writes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotReturned => "not_returned",
            Self::ReturnRequested => "return_requested",
            Self::Returned => "returned",
            Self::ReturnRejected => "return_rejected",
        }
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReturnError {
    #[error("no return deadline is known for this item")]
    NoDeadline,
    #[error("return window closed on {deadline}")]
    WindowClosed { deadline: NaiveDate },
    #[error("cannot move return status from {from:?} to {to:?}")]
    InvalidTransition { from: ReturnStatus, to: ReturnStatus },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOrderProduct {
    pub id: Uuid,
    pub name: String,
    pub size: String,
    pub quantity: u32,
    pub price: Decimal,
    pub seller: String,
    pub return_deadline: Option<NaiveDate>,
    pub return_status: ReturnStatus,
    pub return_requested_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl CanonicalOrderProduct {
    pub fn from_parsed(parsed: &ParsedProduct, return_deadline: Option<NaiveDate>) -> Self {
        let key = parsed.key();
        Self {
            id: Uuid::new_v4(),
            name: key.name,
            size: key.size,
            quantity: parsed.quantity.max(1),
            price: parsed.price,
            seller: parsed.seller.trim().to_string(),
            return_deadline,
            return_status: ReturnStatus::NotReturned,
            return_requested_at: None,
            returned_at: None,
        }
    }

    pub fn key(&self) -> ProductKey {
        ProductKey::new(&self.name, &self.size)
    }

    /// Merge a re-sighting of the same (name, size): quantities add up and
    /// the price only moves upwards.
    pub fn absorb(&mut self, parsed: &ParsedProduct) {
        self.quantity = self.quantity.saturating_add(parsed.quantity.max(1));
        self.merge_price(parsed);
    }

    /// Take the higher price and a missing seller from a later description
    /// of the same item. Quantity is left alone.
    pub fn merge_price(&mut self, parsed: &ParsedProduct) {
        if parsed.price > self.price {
            self.price = parsed.price;
        }
        if self.seller.is_empty() && !parsed.seller.trim().is_empty() {
            self.seller = parsed.seller.trim().to_string();
        }
    }

    pub fn can_return(&self, today: NaiveDate) -> bool {
        self.return_status == ReturnStatus::NotReturned
            && self.return_deadline.is_some_and(|deadline| today <= deadline)
    }

    pub fn request_return(&mut self, now: DateTime<Utc>) -> Result<(), ReturnError> {
        if self.return_status != ReturnStatus::NotReturned {
            return Err(ReturnError::InvalidTransition {
                from: self.return_status,
                to: ReturnStatus::ReturnRequested,
            });
        }
        let deadline = self.return_deadline.ok_or(ReturnError::NoDeadline)?;
        if now.date_naive() > deadline {
            return Err(ReturnError::WindowClosed { deadline });
        }
        self.return_status = ReturnStatus::ReturnRequested;
        self.return_requested_at = Some(now);
        Ok(())
    }

    pub fn mark_returned(&mut self, now: DateTime<Utc>) -> Result<(), ReturnError> {
        self.complete_return(ReturnStatus::Returned)?;
        self.returned_at = Some(now);
        Ok(())
    }

    pub fn reject_return(&mut self) -> Result<(), ReturnError> {
        self.complete_return(ReturnStatus::ReturnRejected)
    }

    fn complete_return(&mut self, to: ReturnStatus) -> Result<(), ReturnError> {
        if self.return_status != ReturnStatus::ReturnRequested {
            return Err(ReturnError::InvalidTransition {
                from: self.return_status,
                to,
            });
        }
        self.return_status = to;
        Ok(())
    }
}

/// Order-owned record of everything merged into the order so far.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergeProvenance {
    #[serde(default)]
    pub tracking: ShippingInfo,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub applied_messages: BTreeSet<String>,
}

impl MergeProvenance {
    pub fn record_source(&mut self, source: &str) {
        if !self.sources.iter().any(|s| s == source) {
            self.sources.push(source.to_string());
        }
    }

    pub fn has_applied(&self, message_id: &str) -> bool {
        self.applied_messages.contains(message_id)
    }

    pub fn mark_applied(&mut self, message_id: &str) -> bool {
        self.applied_messages.insert(message_id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductUpsert {
    Inserted,
    Merged,
}

/// Canonical, merged representation of one purchase.
///
/// The return deadline is a projection of `delivery_date + return_window_days`
/// and has no setter; every mutation of either input recomputes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOrder {
    pub id: Uuid,
    pub user_id: String,
    pub source_message_id: Option<String>,
    pub merchant_name: String,
    pub order_id: String,
    pub order_date: NaiveDate,
    delivery_date: Option<NaiveDate>,
    return_window_days: u32,
    return_deadline: Option<NaiveDate>,
    pub total: Option<Money>,
    confidence: f64,
    needs_review: bool,
    pub provenance: MergeProvenance,
    pub products: Vec<CanonicalOrderProduct>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanonicalOrder {
    pub fn new(
        user_id: impl Into<String>,
        merchant_name: impl Into<String>,
        order_id: impl Into<String>,
        order_date: NaiveDate,
        return_window_days: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            source_message_id: None,
            merchant_name: merchant_name.into(),
            order_id: order_id.into(),
            order_date,
            delivery_date: None,
            return_window_days,
            return_deadline: None,
            total: None,
            confidence: 0.0,
            needs_review: true,
            provenance: MergeProvenance::default(),
            products: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn delivery_date(&self) -> Option<NaiveDate> {
        self.delivery_date
    }

    pub fn return_window_days(&self) -> u32 {
        self.return_window_days
    }

    pub fn return_deadline(&self) -> Option<NaiveDate> {
        self.return_deadline
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn needs_review(&self) -> bool {
        self.needs_review
    }

    pub fn set_delivery_date(&mut self, delivery_date: Option<NaiveDate>) {
        self.delivery_date = delivery_date;
        self.recompute_return_deadline();
    }

    pub fn set_return_window_days(&mut self, days: u32) {
        self.return_window_days = days;
        self.recompute_return_deadline();
    }

    pub fn recompute_return_deadline(&mut self) {
        self.return_deadline = self
            .delivery_date
            .and_then(|d| d.checked_add_days(Days::new(u64::from(self.return_window_days))));
    }

    /// Raise confidence if `candidate` is strictly higher. Returns whether it
    /// changed; `needs_review` is recomputed only on change.
    pub fn raise_confidence(&mut self, candidate: f64) -> bool {
        let candidate = candidate.clamp(0.0, 1.0);
        if candidate > self.confidence {
            self.confidence = candidate;
            self.needs_review = candidate < REVIEW_THRESHOLD;
            return true;
        }
        false
    }

    pub fn find_product(&self, key: &ProductKey) -> Option<&CanonicalOrderProduct> {
        self.products.iter().find(|p| &p.key() == key)
    }

    pub fn upsert_product(&mut self, parsed: &ParsedProduct) -> ProductUpsert {
        let key = parsed.key();
        if let Some(existing) = self.products.iter_mut().find(|p| p.key() == key) {
            existing.absorb(parsed);
            return ProductUpsert::Merged;
        }
        self.products
            .push(CanonicalOrderProduct::from_parsed(parsed, self.return_deadline));
        ProductUpsert::Inserted
    }

    /// Fold a later message's line items into an order that already has
    /// items. Items the order knows keep their quantity and only take
    /// price and seller; unseen items are inserted and summed among
    /// themselves.
    pub fn merge_product_prices(&mut self, products: &[ParsedProduct]) -> usize {
        let known: BTreeSet<ProductKey> = self.products.iter().map(|p| p.key()).collect();
        let mut inserted = 0;
        for parsed in products {
            let key = parsed.key();
            if known.contains(&key) {
                if let Some(existing) = self.products.iter_mut().find(|p| p.key() == key) {
                    existing.merge_price(parsed);
                }
            } else if self.upsert_product(parsed) == ProductUpsert::Inserted {
                inserted += 1;
            }
        }
        inserted
    }

    /// Copy the order deadline onto every item that does not already carry it.
    pub fn propagate_return_deadline(&mut self) -> usize {
        let Some(deadline) = self.return_deadline else {
            return 0;
        };
        let mut updated = 0;
        for product in &mut self.products {
            if product.return_deadline != Some(deadline) {
                product.return_deadline = Some(deadline);
                updated += 1;
            }
        }
        updated
    }

    pub fn total_quantity(&self) -> u32 {
        self.products.iter().map(|p| p.quantity).sum()
    }
}
